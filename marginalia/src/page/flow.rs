//! Flows a [`Document`] into terminal lines.
//!
//! Block elements start new lines, inline content is word-wrapped at the
//! panel width, and `pre` keeps its own line breaks. Every run of cells on
//! screen is a [`Segment`] that remembers which node and which bytes of that
//! node it shows, which is all [`Geometry`] and hit-testing need.
//!
//! A flow describes one state of the tree. Any mutation (a highlight
//! wrapped, a marker class toggled) invalidates node ids and the flow must
//! be rebuilt.

use std::ops::Range;

use marginalia_core::highlight::{is_marker, ACTIVE_CLASS, HOVERED_CLASS, MARKER_ATTR};
use marginalia_core::locator::{image_label, is_comment_ui};
use marginalia_core::{
    AnchorTarget, Boundary, ClientRect, Document, Element, Geometry, MarkerState, NodeId,
};

/// Elements that start and end on their own lines.
const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "body", "dd", "details", "div", "dl", "dt",
    "figcaption", "figure", "footer", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "html",
    "li", "main", "nav", "ol", "p", "pre", "section", "summary", "table", "tr", "ul",
];

/// Blocks followed by an empty line.
const SPACED_TAGS: &[&str] = &[
    "blockquote", "dl", "figure", "h1", "h2", "h3", "h4", "h5", "h6", "hr", "ol", "p", "pre",
    "table", "ul",
];

const HEADING_TAGS: &[&str] = &["h1", "h2", "h3", "h4", "h5", "h6"];

const BULLET: &str = "• ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Emphasis {
    #[default]
    Plain,
    Heading,
    Code,
    Link,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    /// Bytes `range` of a text node.
    Text,
    /// An `img`, drawn as its label.
    Image,
    /// Chrome such as list bullets; selects as the start of `node`.
    Decoration,
}

/// The comment marker a segment sits inside.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mark {
    pub id: String,
    pub state: MarkerState,
}

impl Mark {
    fn from_element(el: &Element) -> Option<Self> {
        if !is_marker(el) {
            return None;
        }
        let state = if el.has_class(ACTIVE_CLASS) {
            MarkerState::Active
        } else if el.has_class(HOVERED_CLASS) {
            MarkerState::Hovered
        } else {
            MarkerState::Idle
        };
        Some(Self {
            id: el.attr(MARKER_ATTR)?.to_owned(),
            state,
        })
    }
}

/// A run of cells on one line.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub col: usize,
    pub text: String,
    pub node: NodeId,
    pub range: Range<usize>,
    pub kind: SegmentKind,
    pub emphasis: Emphasis,
    pub mark: Option<Mark>,
}

impl Segment {
    pub fn width(&self) -> usize {
        self.text.chars().count()
    }

    pub fn end_col(&self) -> usize {
        self.col + self.width()
    }

    /// Byte offset in the node text of the `k`th displayed char.
    fn offset_of(&self, k: usize) -> usize {
        let within = self
            .text
            .char_indices()
            .nth(k)
            .map_or(self.text.len(), |(i, _)| i);
        self.range.start + within
    }

    /// Display column of byte `offset` of the node text.
    fn col_of(&self, offset: usize) -> usize {
        let k = offset.saturating_sub(self.range.start);
        self.col
            + self
                .text
                .get(..k)
                .map_or(self.width(), |s| s.chars().count())
    }
}

#[derive(Debug, Clone, Default)]
struct Context {
    emphasis: Emphasis,
    pre: bool,
    mark: Option<Mark>,
}

/// A document laid out at a fixed width.
#[derive(Debug, Clone, Default)]
pub struct Flow {
    width: usize,
    lines: Vec<Vec<Segment>>,
}

impl Flow {
    pub fn new(doc: &Document, root: NodeId, width: usize) -> Self {
        let mut builder = Builder {
            doc,
            width: width.max(1),
            lines: vec![Vec::new()],
            col: 0,
            pending_space: false,
            want_gap: false,
        };
        builder.walk(root, &Context::default());
        while builder.lines.last().is_some_and(Vec::is_empty) && builder.lines.len() > 1 {
            builder.lines.pop();
        }
        Self {
            width: builder.width,
            lines: builder.lines,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn line(&self, n: usize) -> &[Segment] {
        self.lines.get(n).map_or(&[], Vec::as_slice)
    }

    fn segments(&self) -> impl Iterator<Item = (usize, &Segment)> {
        self.lines
            .iter()
            .enumerate()
            .flat_map(|(n, segs)| segs.iter().map(move |s| (n, s)))
    }

    /// Position of byte `offset` in text node `node`.
    ///
    /// Offsets inside collapsed whitespace snap to the next word.
    fn text_position(&self, node: NodeId, offset: usize) -> Option<(usize, usize)> {
        let mut last = None;
        for (line, seg) in self.segments() {
            if seg.node != node || seg.kind != SegmentKind::Text {
                continue;
            }
            if offset < seg.range.start {
                return Some((line, seg.col));
            }
            if offset <= seg.range.end {
                return Some((line, seg.col_of(offset)));
            }
            last = Some((line, seg.end_col()));
        }
        last
    }

    fn boundary_position(&self, doc: &Document, b: Boundary) -> Option<(usize, usize)> {
        if doc.text(b.node).is_some() {
            return self.text_position(b.node, b.offset);
        }
        let children = doc.children(b.node);
        if let Some(child) = children.get(b.offset) {
            return self
                .segments()
                .find(|(_, s)| within(doc, s.node, *child))
                .map(|(line, s)| (line, s.col));
        }
        if children.is_empty() {
            return self
                .segments()
                .find(|(_, s)| s.node == b.node)
                .map(|(line, s)| (line, s.col));
        }
        self.segments()
            .filter(|(_, s)| within(doc, s.node, b.node))
            .last()
            .map(|(line, s)| (line, s.end_col()))
    }

    fn rect_between(&self, start: (usize, usize), end: (usize, usize)) -> ClientRect {
        let (top, left) = start;
        let (bottom, right) = end;
        ClientRect {
            top: top as f64,
            left: left as f64,
            width: if top == bottom {
                right.saturating_sub(left) as f64
            } else {
                self.width.saturating_sub(left) as f64
            },
            height: (bottom.saturating_sub(top) + 1) as f64,
        }
    }

    /// Geometry in document rows, as if the viewport were at the top.
    pub fn rect_of(&self, doc: &Document, target: &AnchorTarget) -> Option<ClientRect> {
        if !doc.is_attached(target.node()) {
            return None;
        }
        match target {
            AnchorTarget::Text(m) => {
                let start = self.text_position(m.node, m.start)?;
                let end = self.text_position(m.node, m.end)?;
                Some(self.rect_between(start, end))
            }
            AnchorTarget::Image(img) => {
                let (line, seg) = self.segments().find(|(_, s)| s.node == *img)?;
                Some(self.rect_between((line, seg.col), (line, seg.end_col())))
            }
        }
    }

    pub fn range_rect_of(&self, doc: &Document, start: Boundary, end: Boundary) -> Option<ClientRect> {
        let a = self.boundary_position(doc, start)?;
        let b = self.boundary_position(doc, end)?;
        Some(self.rect_between(a.min(b), a.max(b)))
    }

    /// Maps a cell of the flowed document back to a tree position.
    ///
    /// Blank lines snap to the nearest content below, or above when there
    /// is none.
    pub fn boundary_at(&self, doc: &Document, line: usize, col: usize) -> Option<Boundary> {
        let segs = self.line(line);
        if segs.is_empty() {
            return self.nearest_boundary(doc, line);
        }
        let seg = segs
            .iter()
            .find(|s| col < s.end_col())
            .or_else(|| segs.last())?;
        let k = col.saturating_sub(seg.col).min(seg.width());
        segment_boundary(doc, seg, k)
    }

    fn nearest_boundary(&self, doc: &Document, line: usize) -> Option<Boundary> {
        let below = self.lines.iter().skip(line).find_map(|segs| segs.first());
        if let Some(seg) = below {
            return segment_boundary(doc, seg, 0);
        }
        let above = self
            .lines
            .iter()
            .take(line.min(self.lines.len()))
            .rev()
            .find_map(|segs| segs.last())?;
        segment_boundary(doc, above, above.width())
    }

    /// Comment id of the marker under a cell.
    pub fn mark_at(&self, line: usize, col: usize) -> Option<&str> {
        self.line(line)
            .iter()
            .find(|s| s.col <= col && col < s.end_col())
            .and_then(|s| s.mark.as_ref())
            .map(|m| m.id.as_str())
    }

    /// A view of this flow scrolled to `scroll` rows.
    pub fn on_screen(&self, scroll: usize) -> OnScreen<'_> {
        OnScreen { flow: self, scroll }
    }
}

fn within(doc: &Document, node: NodeId, ancestor: NodeId) -> bool {
    node == ancestor || doc.ancestors(node).any(|a| a == ancestor)
}

fn segment_boundary(doc: &Document, seg: &Segment, k: usize) -> Option<Boundary> {
    match seg.kind {
        SegmentKind::Text => Some(Boundary::new(seg.node, seg.offset_of(k))),
        SegmentKind::Decoration => Some(Boundary::new(seg.node, 0)),
        SegmentKind::Image => {
            let parent = doc.parent(seg.node)?;
            let index = doc.children(parent).iter().position(|c| *c == seg.node)?;
            let after = k * 2 >= seg.width();
            Some(Boundary::new(parent, index + usize::from(after)))
        }
    }
}

/// [`Geometry`] for a flow at a scroll position: rects are relative to the
/// top visible row.
#[derive(Debug, Clone, Copy)]
pub struct OnScreen<'a> {
    flow: &'a Flow,
    scroll: usize,
}

impl OnScreen<'_> {
    fn shift(&self, mut rect: ClientRect) -> ClientRect {
        rect.top -= self.scroll as f64;
        rect
    }
}

impl Geometry for OnScreen<'_> {
    fn client_rect(&self, doc: &Document, target: &AnchorTarget) -> Option<ClientRect> {
        self.flow.rect_of(doc, target).map(|r| self.shift(r))
    }

    fn range_rect(&self, doc: &Document, start: Boundary, end: Boundary) -> Option<ClientRect> {
        self.flow
            .range_rect_of(doc, start, end)
            .map(|r| self.shift(r))
    }
}

struct Builder<'a> {
    doc: &'a Document,
    width: usize,
    lines: Vec<Vec<Segment>>,
    col: usize,
    pending_space: bool,
    want_gap: bool,
}

impl Builder<'_> {
    fn walk(&mut self, id: NodeId, ctx: &Context) {
        let doc = self.doc;
        if let Some(text) = doc.text(id) {
            if ctx.pre {
                self.preformatted(id, text, ctx);
            } else {
                self.words(id, text, ctx);
            }
            return;
        }
        let Some(el) = doc.element(id) else { return };
        if is_comment_ui(doc, id) {
            return;
        }
        let tag = el.tag.as_str();
        match tag {
            "br" => {
                self.force_break();
                return;
            }
            "img" => {
                let label = format!("[image: {}]", image_label(doc, id));
                self.atom(id, label, SegmentKind::Image, ctx);
                return;
            }
            _ => {}
        }

        let block = BLOCK_TAGS.contains(&tag);
        if block {
            self.break_line();
        }
        let mut inner = ctx.clone();
        if HEADING_TAGS.contains(&tag) {
            inner.emphasis = Emphasis::Heading;
        }
        match tag {
            "pre" => {
                inner.pre = true;
                inner.emphasis = Emphasis::Code;
            }
            "code" | "kbd" | "samp" => inner.emphasis = Emphasis::Code,
            "a" if inner.emphasis == Emphasis::Plain => inner.emphasis = Emphasis::Link,
            "li" => self.atom(id, BULLET.to_owned(), SegmentKind::Decoration, ctx),
            _ => {}
        }
        if let Some(mark) = Mark::from_element(el) {
            inner.mark = Some(mark);
        }

        for child in doc.children(id) {
            self.walk(*child, &inner);
        }

        if block {
            self.break_line();
            if SPACED_TAGS.contains(&tag) {
                self.want_gap = true;
            }
        }
    }

    fn current(&mut self) -> &mut Vec<Segment> {
        if self.lines.is_empty() {
            self.lines.push(Vec::new());
        }
        let last = self.lines.len() - 1;
        &mut self.lines[last]
    }

    /// Ends the current line unless it is already empty.
    fn break_line(&mut self) {
        if !self.current().is_empty() {
            self.lines.push(Vec::new());
        }
        self.col = 0;
        self.pending_space = false;
    }

    /// Ends the current line even if it is empty.
    fn force_break(&mut self) {
        self.lines.push(Vec::new());
        self.col = 0;
        self.pending_space = false;
    }

    /// Inserts the blank line a spaced block asked for, once content follows.
    fn open_gap(&mut self) {
        if self.want_gap && self.col == 0 {
            let has_content = self.lines.iter().any(|l| !l.is_empty());
            if has_content {
                self.lines.push(Vec::new());
            }
        }
        self.want_gap = false;
    }

    fn push(&mut self, seg: Segment) {
        self.col = seg.end_col();
        self.pending_space = false;
        self.current().push(seg);
    }

    /// Places `width` cells, wrapping first if they would overflow.
    fn place(&mut self, width: usize) -> usize {
        self.open_gap();
        let space = usize::from(self.pending_space && self.col > 0);
        if self.col > 0 && self.col + space + width > self.width {
            self.break_line();
            return 0;
        }
        self.col + space
    }

    fn words(&mut self, node: NodeId, text: &str, ctx: &Context) {
        let mut start = None;
        for (i, ch) in text.char_indices().chain(std::iter::once((text.len(), ' '))) {
            if !ch.is_whitespace() {
                start.get_or_insert(i);
                continue;
            }
            if let Some(s) = start.take() {
                let word = &text[s..i];
                let col = self.place(word.chars().count());
                self.push(Segment {
                    col,
                    text: word.to_owned(),
                    node,
                    range: s..i,
                    kind: SegmentKind::Text,
                    emphasis: ctx.emphasis,
                    mark: ctx.mark.clone(),
                });
            }
            if i < text.len() {
                self.pending_space = true;
            }
        }
    }

    fn preformatted(&mut self, node: NodeId, text: &str, ctx: &Context) {
        let mut offset = 0;
        for (n, piece) in text.split('\n').enumerate() {
            if n > 0 {
                self.force_break();
            }
            if !piece.is_empty() {
                self.open_gap();
                let col = self.col;
                self.push(Segment {
                    col,
                    text: piece.to_owned(),
                    node,
                    range: offset..offset + piece.len(),
                    kind: SegmentKind::Text,
                    emphasis: ctx.emphasis,
                    mark: ctx.mark.clone(),
                });
            }
            offset += piece.len() + 1;
        }
    }

    fn atom(&mut self, node: NodeId, label: String, kind: SegmentKind, ctx: &Context) {
        let col = self.place(label.chars().count());
        self.push(Segment {
            col,
            text: label,
            node,
            range: 0..0,
            kind,
            emphasis: ctx.emphasis,
            mark: ctx.mark.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marginalia_core::highlight::{marker_for, set_marker_state};
    use marginalia_core::locator::locate;
    use marginalia_core::{html, Anchor, HighlightManager, Selection, SelectionCapture, Viewport};

    fn text_of(flow: &Flow, line: usize) -> String {
        let mut out = String::new();
        for seg in flow.line(line) {
            while out.chars().count() < seg.col {
                out.push(' ');
            }
            out.push_str(&seg.text);
        }
        out
    }

    fn all_lines(flow: &Flow) -> Vec<String> {
        (0..flow.line_count()).map(|n| text_of(flow, n)).collect()
    }

    #[test]
    fn wraps_words_and_separates_blocks() {
        let doc = html::parse(
            "<h1>Title</h1><p>one two three four five six</p><p>end</p>",
        )
        .unwrap();
        let flow = Flow::new(&doc, doc.root(), 14);
        assert_eq!(
            all_lines(&flow),
            ["Title", "", "one two three", "four five six", "", "end"]
        );
        assert_eq!(flow.line(0)[0].emphasis, Emphasis::Heading);
    }

    #[test]
    fn inline_elements_do_not_break_lines() {
        let doc = html::parse("<p>say <b>hello</b> world, <code>x</code>y</p>").unwrap();
        let flow = Flow::new(&doc, doc.root(), 80);
        assert_eq!(all_lines(&flow), ["say hello world, xy"]);
        let code = flow.line(0).iter().find(|s| s.text == "x").unwrap();
        assert_eq!(code.emphasis, Emphasis::Code);
    }

    #[test]
    fn pre_keeps_its_lines() {
        let doc = html::parse("<pre>fn main() {\n    run();\n}</pre>").unwrap();
        let flow = Flow::new(&doc, doc.root(), 8);
        assert_eq!(all_lines(&flow), ["fn main() {", "    run();", "}"]);
    }

    #[test]
    fn images_lists_and_comment_ui() {
        let doc = html::parse(
            "<ul><li>first</li><li><img src=\"/a.png\" alt=\"Arch\"></li></ul>\
             <aside id=\"comment-sidebar\"><p>hidden</p></aside>\
             <div data-comment-ui=\"\">also hidden</div>",
        )
        .unwrap();
        let flow = Flow::new(&doc, doc.root(), 40);
        assert_eq!(all_lines(&flow), ["• first", "• [image: Arch]"]);
        assert_eq!(flow.line(1)[1].kind, SegmentKind::Image);
    }

    #[test]
    fn located_text_has_a_rect_on_its_line() {
        let doc = html::parse("<p>alpha beta</p><p>we say hello world today</p>").unwrap();
        let root = doc.root();
        let flow = Flow::new(&doc, root, 12);
        // "we say hello" / "world today" after the gap line.
        let m = locate(&doc, root, &Anchor::new("hello world", "say", "today")).unwrap();
        let rect = flow.rect_of(&doc, &AnchorTarget::Text(m)).unwrap();
        assert_eq!(rect.top, 2.0);
        assert_eq!(rect.left, 7.0);
        assert_eq!(rect.height, 2.0);

        let scrolled = flow.on_screen(2);
        let rect = scrolled.client_rect(&doc, &AnchorTarget::Text(m)).unwrap();
        assert_eq!(rect.top, 0.0);
    }

    #[test]
    fn hit_testing_drives_selection_capture() {
        let doc = html::parse("<p>intro</p><p>we say hello world today and more</p>").unwrap();
        let root = doc.root();
        let flow = Flow::new(&doc, root, 80);
        // Line 2 is "we say hello world today and more".
        let start = flow.boundary_at(&doc, 2, 7).unwrap();
        let end = flow.boundary_at(&doc, 2, 18).unwrap();
        let mut capture = SelectionCapture::new();
        let info = capture
            .on_pointer_release(
                &doc,
                Some(Selection::new(start, end)),
                &flow.on_screen(0),
                Viewport::new(0.0, 0.0),
            )
            .unwrap();
        assert_eq!(info.text, "hello world");
        assert_eq!(info.context_before, "we say");
        assert_eq!(info.y, 2.0);
        assert_eq!(info.x, 7.0);
    }

    #[test]
    fn clicks_past_line_end_and_on_blank_lines_snap() {
        let doc = html::parse("<p>short</p><p>next</p>").unwrap();
        let flow = Flow::new(&doc, doc.root(), 80);
        let end = flow.boundary_at(&doc, 0, 50).unwrap();
        assert_eq!(end.offset, "short".len());
        let gap = flow.boundary_at(&doc, 1, 0).unwrap();
        assert_eq!(doc.text(gap.node), Some("next"));
        assert_eq!(gap.offset, 0);
        let past = flow.boundary_at(&doc, 99, 0).unwrap();
        assert_eq!(doc.text(past.node), Some("next"));
        assert_eq!(past.offset, 4);
    }

    #[test]
    fn image_drag_covers_the_element() {
        let doc = html::parse("<p><img src=\"/d.png\" alt=\"Diagram\"></p>").unwrap();
        let root = doc.root();
        let flow = Flow::new(&doc, root, 80);
        let start = flow.boundary_at(&doc, 0, 0).unwrap();
        let end = flow.boundary_at(&doc, 0, 15).unwrap();
        let mut capture = SelectionCapture::new();
        let info = capture
            .on_pointer_release(
                &doc,
                Some(Selection::new(start, end)),
                &flow.on_screen(0),
                Viewport::default(),
            )
            .unwrap();
        assert_eq!(info.text, "Diagram");
        assert_eq!(info.src.as_deref(), Some("/d.png"));
    }

    #[test]
    fn markers_carry_their_id_and_state() {
        let mut doc = html::parse("<p>we say hello world today</p>").unwrap();
        let root = doc.root();
        let comment = marginalia_core::Comment::from_draft(
            "c1",
            &marginalia_core::Draft {
                page: "/p".to_owned(),
                anchor: Anchor::new("hello world", "say", "today"),
                kind: marginalia_core::CommentKind::Text,
                src: None,
                comment: "hm".to_owned(),
                y: 0.0,
                user: "ada".to_owned(),
                created_at: 0,
            },
        );
        HighlightManager::new().sync(&mut doc, root, &[comment]);
        assert!(marker_for(&doc, root, "c1").is_some());
        set_marker_state(&mut doc, root, "c1", MarkerState::Active);

        let flow = Flow::new(&doc, root, 80);
        assert_eq!(all_lines(&flow), ["we say hello world today"]);
        assert_eq!(flow.mark_at(0, 8), Some("c1"));
        assert_eq!(flow.mark_at(0, 2), None);
        let marked: Vec<_> = flow.line(0).iter().filter(|s| s.mark.is_some()).collect();
        assert_eq!(marked.len(), 2);
        assert!(marked.iter().all(|s| s.mark.as_ref().unwrap().state == MarkerState::Active));
    }
}
