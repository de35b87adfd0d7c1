//! Selection Capture: turns a finished pointer selection into a candidate anchor.

use std::cmp::Ordering;

use tracing::debug;

use crate::document::{Boundary, Document, NodeId};
use crate::geometry::{Geometry, Viewport};
use crate::highlight::is_marker;
use crate::locator::{image_label, is_comment_ui};
use crate::types::{CommentKind, SelectionInfo};

/// Words of context kept on each side of a selection.
pub const CONTEXT_WORDS: usize = 5;

/// A selection as the host reports it: where the drag started and where it
/// ended. The two may be in either document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub anchor: Boundary,
    pub focus: Boundary,
}

impl Selection {
    pub fn new(anchor: Boundary, focus: Boundary) -> Self {
        Self { anchor, focus }
    }

    /// `(start, end)` in document order, or `None` if collapsed or detached.
    pub fn ordered(&self, doc: &Document) -> Option<(Boundary, Boundary)> {
        match doc.compare_boundaries(self.anchor, self.focus)? {
            Ordering::Less => Some((self.anchor, self.focus)),
            Ordering::Greater => Some((self.focus, self.anchor)),
            Ordering::Equal => None,
        }
    }
}

/// Last `n` whitespace-delimited words of `text`.
pub fn words_before(text: &str, n: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    words[words.len().saturating_sub(n)..].join(" ")
}

/// First `n` whitespace-delimited words of `text`.
pub fn words_after(text: &str, n: usize) -> String {
    text.split_whitespace().take(n).collect::<Vec<_>>().join(" ")
}

/// The element whose text bounds the context of a boundary: the nearest
/// ancestor that is not a highlight marker.
fn container(doc: &Document, node: NodeId) -> NodeId {
    let start = if doc.text(node).is_some() {
        doc.parent(node).unwrap_or(node)
    } else {
        node
    };
    doc.closest(start, |e| !is_marker(e)).unwrap_or(start)
}

/// `(context_before, context_after)` for the range `start..end`.
pub fn context_words(doc: &Document, start: Boundary, end: Boundary) -> (String, String) {
    let head = container(doc, start.node);
    let tail = container(doc, end.node);
    let before = doc.range_text(Boundary::new(head, 0), start);
    let after = doc.range_text(end, Boundary::new(tail, doc.children(tail).len()));
    (
        words_before(&before, CONTEXT_WORDS),
        words_after(&after, CONTEXT_WORDS),
    )
}

/// Extracts a [`SelectionInfo`] from `selection`.
///
/// Returns `None` for a collapsed or blank selection, one that starts inside
/// comment UI, or one the host cannot measure.
pub fn capture<G>(
    doc: &Document,
    selection: Selection,
    geometry: &G,
    viewport: Viewport,
) -> Option<SelectionInfo>
where
    G: Geometry + ?Sized,
{
    let (start, end) = selection.ordered(doc)?;
    if is_comment_ui(doc, start.node) || is_comment_ui(doc, end.node) {
        return None;
    }
    let Some(rect) = geometry.range_rect(doc, start, end) else {
        debug!(?start, ?end, "selection has no layout");
        return None;
    };
    let x = rect.left + viewport.scroll_x;
    let y = rect.top + viewport.scroll_y;
    let (context_before, context_after) = context_words(doc, start, end);

    if let Some(img) = doc.elements_in_range(start, end, "img").first().copied() {
        return Some(SelectionInfo {
            kind: CommentKind::Image,
            text: image_label(doc, img),
            context_before,
            context_after,
            x,
            y,
            image: Some(img),
            src: doc.attr(img, "src").map(str::to_owned),
        });
    }

    let text = doc.range_text(start, end).trim().to_owned();
    if text.is_empty() {
        return None;
    }
    Some(SelectionInfo {
        kind: CommentKind::Text,
        text,
        context_before,
        context_after,
        x,
        y,
        image: None,
        src: None,
    })
}

/// Holds the live selection between pointer release and draft creation.
#[derive(Debug, Default)]
pub struct SelectionCapture {
    current: Option<SelectionInfo>,
}

impl SelectionCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the captured state with whatever `selection` holds.
    /// A missing, collapsed or empty selection clears it.
    pub fn on_pointer_release<G>(
        &mut self,
        doc: &Document,
        selection: Option<Selection>,
        geometry: &G,
        viewport: Viewport,
    ) -> Option<&SelectionInfo>
    where
        G: Geometry + ?Sized,
    {
        self.current = selection.and_then(|s| capture(doc, s, geometry, viewport));
        self.current.as_ref()
    }

    pub fn current(&self) -> Option<&SelectionInfo> {
        self.current.as_ref()
    }

    pub fn clear(&mut self) {
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::ClientRect;
    use crate::html;
    use crate::locator::{self, AnchorTarget, MatchTier};

    struct Flat;

    impl Geometry for Flat {
        fn client_rect(&self, _doc: &Document, _target: &AnchorTarget) -> Option<ClientRect> {
            None
        }

        fn range_rect(&self, _doc: &Document, _start: Boundary, _end: Boundary) -> Option<ClientRect> {
            Some(ClientRect {
                top: 30.0,
                left: 4.0,
                width: 10.0,
                height: 1.0,
            })
        }
    }

    fn first_text(doc: &Document) -> NodeId {
        doc.text_nodes(doc.root())[0]
    }

    fn select(doc: &Document, node: NodeId, needle: &str) -> Selection {
        let at = doc.text(node).unwrap().find(needle).unwrap();
        Selection::new(Boundary::new(node, at), Boundary::new(node, at + needle.len()))
    }

    #[test]
    fn text_selection_captures_context_and_position() {
        let doc = html::parse(
            "<p>one two three four five six seven target words here and more after that end</p>",
        )
        .unwrap();
        let t = first_text(&doc);
        let info = capture(&doc, select(&doc, t, "target words "), &Flat, Viewport::new(2.0, 100.0))
            .unwrap();
        assert_eq!(info.kind, CommentKind::Text);
        assert_eq!(info.text, "target words");
        assert_eq!(info.context_before, "three four five six seven");
        assert_eq!(info.context_after, "here and more after that");
        assert_eq!((info.x, info.y), (6.0, 130.0));
    }

    #[test]
    fn backwards_drag_is_normalized() {
        let doc = html::parse("<p>alpha beta gamma</p>").unwrap();
        let t = first_text(&doc);
        let forward = select(&doc, t, "beta");
        let backward = Selection::new(forward.focus, forward.anchor);
        let info = capture(&doc, backward, &Flat, Viewport::default()).unwrap();
        assert_eq!(info.text, "beta");
        assert_eq!(info.context_before, "alpha");
        assert_eq!(info.context_after, "gamma");
    }

    #[test]
    fn collapsed_or_blank_selection_clears() {
        let doc = html::parse("<p>alpha   beta</p>").unwrap();
        let t = first_text(&doc);
        let mut capture = SelectionCapture::new();

        assert!(capture
            .on_pointer_release(&doc, Some(select(&doc, t, "beta")), &Flat, Viewport::default())
            .is_some());
        let collapsed = Selection::new(Boundary::new(t, 2), Boundary::new(t, 2));
        assert!(capture
            .on_pointer_release(&doc, Some(collapsed), &Flat, Viewport::default())
            .is_none());
        assert!(capture.current().is_none());

        let blank = Selection::new(Boundary::new(t, 5), Boundary::new(t, 8));
        assert!(capture
            .on_pointer_release(&doc, Some(blank), &Flat, Viewport::default())
            .is_none());
        assert!(capture
            .on_pointer_release(&doc, None, &Flat, Viewport::default())
            .is_none());
    }

    #[test]
    fn image_selection_uses_alt_text() {
        let doc = html::parse(r#"<p>look at <img src="/arch.png" alt=" Diagram "> here</p>"#).unwrap();
        let p = doc.children(doc.root())[0];
        let info = capture(
            &doc,
            Selection::new(Boundary::new(p, 1), Boundary::new(p, 2)),
            &Flat,
            Viewport::default(),
        )
        .unwrap();
        assert_eq!(info.kind, CommentKind::Image);
        assert_eq!(info.text, "Diagram");
        assert_eq!(info.src.as_deref(), Some("/arch.png"));
        assert_eq!(info.context_before, "look at");
        assert_eq!(info.context_after, "here");
        assert_eq!(doc.tag(info.image.unwrap()), Some("img"));
    }

    #[test]
    fn unlabelled_image_gets_placeholder() {
        let doc = html::parse(r#"<p><img src="/x.png"></p>"#).unwrap();
        let p = doc.children(doc.root())[0];
        let info = capture(
            &doc,
            Selection::new(Boundary::new(p, 0), Boundary::new(p, 1)),
            &Flat,
            Viewport::default(),
        )
        .unwrap();
        assert_eq!(info.text, "[Image]");
    }

    #[test]
    fn selections_in_comment_ui_are_ignored() {
        let doc = html::parse(r#"<aside data-comment-ui="sidebar"><p>a comment body</p></aside>"#)
            .unwrap();
        let t = first_text(&doc);
        assert!(capture(&doc, select(&doc, t, "comment"), &Flat, Viewport::default()).is_none());
    }

    #[test]
    fn captured_anchor_locates_back_to_the_same_text() {
        let doc = html::parse("<p>Then we say hello world today and leave.</p>").unwrap();
        let t = first_text(&doc);
        let info = capture(&doc, select(&doc, t, "hello world"), &Flat, Viewport::default())
            .unwrap();
        let m = locator::locate(&doc, doc.root(), &info.anchor()).unwrap();
        assert_eq!(m.tier, MatchTier::Full);
        assert_eq!(&doc.text(m.node).unwrap()[m.start..m.end], "hello world");
    }

    #[test]
    fn word_windows() {
        assert_eq!(words_before("  a b  c d e f g ", 5), "c d e f g");
        assert_eq!(words_before("a b", 5), "a b");
        assert_eq!(words_after(" x  y ", 5), "x y");
        assert_eq!(words_after("", 5), "");
    }
}
