//! Text Locator: finds where a stored anchor sits in a freshly rendered tree.
//!
//! The search is node-local. Every searchable text node is tried in document
//! order against four candidate strings, most context first:
//!
//! 1. `before text after`
//! 2. `before text`
//! 3. `text after`
//! 4. `text`
//!
//! An occurrence is accepted only if the nearest enclosing (non-marker)
//! element also contains the tail of `before` and the head of `after`, which
//! keeps a common word from matching the wrong paragraph. When nothing passes
//! that check but `text` occurs exactly once under the root, that single
//! occurrence is taken: the context drifted, the fragment did not.
//!
//! Whitespace runs are collapsed to one space on both sides before comparing,
//! so reflowed source (`hello\n    world`) still matches `hello world`.
//! Offsets in the returned [`TextMatch`] are raw byte offsets into the node.

use tracing::trace;

use crate::document::{Document, Element, NodeId};
use crate::highlight::is_marker;
use crate::types::{Anchor, Comment, CommentKind};

/// Attribute that flags a subtree as comment UI, never searched.
pub const COMMENT_UI_ATTR: &str = "data-comment-ui";

/// Element id of the comment sidebar, never searched.
pub const COMMENT_SIDEBAR_ID: &str = "comment-sidebar";

/// Label used for images without alt text.
pub const IMAGE_PLACEHOLDER: &str = "[Image]";

/// How many characters of each context window the plausibility check uses.
const CONTEXT_EDGE_CHARS: usize = 10;

/// Which candidate produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchTier {
    /// `before text after`
    Full,
    /// `before text`
    Before,
    /// `text after`
    After,
    /// `text` alone, context still plausible.
    TextOnly,
    /// `text` alone and the only occurrence under the root.
    Unique,
}

/// A located fragment: bytes `start..end` of text node `node`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextMatch {
    pub node: NodeId,
    pub start: usize,
    pub end: usize,
    pub tier: MatchTier,
}

/// A located anchor of either kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorTarget {
    Text(TextMatch),
    Image(NodeId),
}

impl AnchorTarget {
    /// The node the anchor lives in (the text node or the `img` element).
    pub fn node(&self) -> NodeId {
        match self {
            AnchorTarget::Text(m) => m.node,
            AnchorTarget::Image(id) => *id,
        }
    }
}

/// `true` if `id` is inside (or is) a subtree flagged as comment UI.
pub fn is_comment_ui(doc: &Document, id: NodeId) -> bool {
    doc.closest(id, is_comment_ui_element).is_some()
}

fn is_comment_ui_element(el: &Element) -> bool {
    el.attr(COMMENT_UI_ATTR).is_some() || el.attr("id") == Some(COMMENT_SIDEBAR_ID)
}

/// Non-blank text nodes under `root` in document order, comment UI excluded.
pub fn searchable_text_nodes(doc: &Document, root: NodeId) -> Vec<NodeId> {
    if is_comment_ui(doc, root) {
        return Vec::new();
    }
    let mut out = Vec::new();
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        if let Some(text) = doc.text(id) {
            if !text.trim().is_empty() {
                out.push(id);
            }
            continue;
        }
        if doc.element(id).is_some_and(is_comment_ui_element) {
            continue;
        }
        stack.extend(doc.children(id).iter().rev().copied());
    }
    out
}

/// Collapses whitespace runs to single spaces and trims the ends.
pub fn squash_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Node text with whitespace runs collapsed, plus a map back to raw offsets.
struct Collapsed {
    text: String,
    /// `offsets[i]` is the raw byte offset of collapsed byte `i`;
    /// the final entry is the raw length.
    offsets: Vec<usize>,
}

impl Collapsed {
    fn new(raw: &str) -> Self {
        let mut text = String::with_capacity(raw.len());
        let mut offsets = Vec::with_capacity(raw.len() + 1);
        let mut in_space = false;
        for (i, ch) in raw.char_indices() {
            if ch.is_whitespace() {
                if in_space {
                    continue;
                }
                in_space = true;
                text.push(' ');
                offsets.push(i);
            } else {
                in_space = false;
                text.push(ch);
                for k in 0..ch.len_utf8() {
                    offsets.push(i + k);
                }
            }
        }
        offsets.push(raw.len());
        Self { text, offsets }
    }

    fn raw_range(&self, start: usize, end: usize) -> (usize, usize) {
        (self.offsets[start], self.offsets[end])
    }
}

struct Candidate {
    full: String,
    /// Byte length of the context in front of `text` inside `full`.
    prefix: usize,
    tier: MatchTier,
}

fn candidates(before: &str, text: &str, after: &str) -> Vec<Candidate> {
    let prefix = if before.is_empty() { 0 } else { before.len() + 1 };
    let mut out = Vec::with_capacity(4);
    if !before.is_empty() || !after.is_empty() {
        let full = [before, text, after]
            .iter()
            .filter(|p| !p.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" ");
        out.push(Candidate {
            full,
            prefix,
            tier: MatchTier::Full,
        });
    }
    if !before.is_empty() && !after.is_empty() {
        out.push(Candidate {
            full: format!("{before} {text}"),
            prefix,
            tier: MatchTier::Before,
        });
        out.push(Candidate {
            full: format!("{text} {after}"),
            prefix: 0,
            tier: MatchTier::After,
        });
    }
    out.push(Candidate {
        full: text.to_owned(),
        prefix: 0,
        tier: MatchTier::TextOnly,
    });
    out
}

fn last_chars(s: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    match s.char_indices().rev().nth(n - 1) {
        Some((i, _)) => &s[i..],
        None => s,
    }
}

fn first_chars(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

/// Does the element around `node` still carry the anchor's context?
fn context_plausible(doc: &Document, node: NodeId, before: &str, after: &str) -> bool {
    if before.is_empty() && after.is_empty() {
        return true;
    }
    let Some(scope) = doc
        .ancestors(node)
        .find(|n| doc.element(*n).is_some_and(|e| !is_marker(e)))
    else {
        return false;
    };
    let haystack = squash_whitespace(&doc.text_content(scope));
    let tail = last_chars(before, CONTEXT_EDGE_CHARS);
    let head = first_chars(after, CONTEXT_EDGE_CHARS);
    haystack.contains(tail) && haystack.contains(head)
}

/// Finds `anchor` under `root`.
///
/// Returns `None` for an empty anchor text or when no candidate is both
/// present and plausible (and `text` is not unique either). Fragments that
/// cross text-node boundaries are not found.
pub fn locate(doc: &Document, root: NodeId, anchor: &Anchor) -> Option<TextMatch> {
    let text = squash_whitespace(anchor.text());
    if text.is_empty() {
        return None;
    }
    let before = squash_whitespace(anchor.context_before());
    let after = squash_whitespace(anchor.context_after());
    let candidates = candidates(&before, &text, &after);

    let nodes: Vec<(NodeId, Collapsed)> = searchable_text_nodes(doc, root)
        .into_iter()
        .filter_map(|n| doc.text(n).map(|t| (n, Collapsed::new(t))))
        .collect();

    'nodes: for (node, collapsed) in &nodes {
        for cand in &candidates {
            let Some(at) = collapsed.text.find(&cand.full) else {
                continue;
            };
            if !context_plausible(doc, *node, &before, &after) {
                continue 'nodes;
            }
            let start = at + cand.prefix;
            let (start, end) = collapsed.raw_range(start, start + text.len());
            return Some(TextMatch {
                node: *node,
                start,
                end,
                tier: cand.tier,
            });
        }
    }

    // Context drifted everywhere. Accept `text` only if it is unambiguous.
    // Occurrences may overlap ("aa" twice in "aaa"), so step one char at a time.
    let step = text.chars().next().map_or(1, char::len_utf8);
    let mut only = None;
    for (node, collapsed) in &nodes {
        let mut from = 0;
        while let Some(found) = collapsed.text[from..].find(text.as_str()) {
            let at = from + found;
            from = at + step;
            if only.is_some() {
                trace!(text = %text, "anchor text is ambiguous without context");
                return None;
            }
            let (start, end) = collapsed.raw_range(at, at + text.len());
            only = Some(TextMatch {
                node: *node,
                start,
                end,
                tier: MatchTier::Unique,
            });
        }
    }
    only
}

/// Accessible label of an image element: trimmed `alt`, or the placeholder.
pub fn image_label(doc: &Document, img: NodeId) -> String {
    match doc.attr(img, "alt").map(str::trim) {
        Some(alt) if !alt.is_empty() => alt.to_owned(),
        _ => IMAGE_PLACEHOLDER.to_owned(),
    }
}

/// Finds the `img` an image comment points at.
///
/// A known `src` wins; otherwise the first image whose label equals `label`.
pub fn locate_image(
    doc: &Document,
    root: NodeId,
    label: &str,
    src: Option<&str>,
) -> Option<NodeId> {
    if is_comment_ui(doc, root) {
        return None;
    }
    let mut images = Vec::new();
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        let Some(el) = doc.element(id) else { continue };
        if is_comment_ui_element(el) {
            continue;
        }
        if el.tag == "img" {
            images.push(id);
        }
        stack.extend(doc.children(id).iter().rev().copied());
    }

    if let Some(src) = src.filter(|s| !s.is_empty()) {
        if let Some(hit) = images.iter().find(|i| doc.attr(**i, "src") == Some(src)) {
            return Some(*hit);
        }
    }
    let label = label.trim();
    images.into_iter().find(|i| image_label(doc, *i) == label)
}

/// Locates a comment's anchor according to its kind.
pub fn locate_target(doc: &Document, root: NodeId, comment: &Comment) -> Option<AnchorTarget> {
    match comment.kind {
        CommentKind::Text => locate(doc, root, comment.anchor()).map(AnchorTarget::Text),
        CommentKind::Image => {
            locate_image(doc, root, comment.text(), comment.src.as_deref()).map(AnchorTarget::Image)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html;

    fn matched<'a>(doc: &'a Document, m: &TextMatch) -> &'a str {
        &doc.text(m.node).unwrap()[m.start..m.end]
    }

    #[test]
    fn full_context_candidate_matches_first() {
        let doc = html::parse("<article><p>Then we say hello world today and leave.</p></article>")
            .unwrap();
        let anchor = Anchor::new("hello world", "say", "today");
        let m = locate(&doc, doc.root(), &anchor).unwrap();
        assert_eq!(matched(&doc, &m), "hello world");
        assert_eq!(m.tier, MatchTier::Full);
    }

    #[test]
    fn drifted_context_falls_back_to_unique_text() {
        let doc = html::parse("<article><p>Then we greet hello world now and leave.</p></article>")
            .unwrap();
        let anchor = Anchor::new("hello world", "say", "today");
        let m = locate(&doc, doc.root(), &anchor).unwrap();
        assert_eq!(matched(&doc, &m), "hello world");
        assert_eq!(m.tier, MatchTier::Unique);
    }

    #[test]
    fn overlapping_occurrences_are_ambiguous() {
        let doc = html::parse("<p>the aaa key</p>").unwrap();
        let anchor = Anchor::new("aa", "press", "twice");
        assert_eq!(locate(&doc, doc.root(), &anchor), None);
    }

    #[test]
    fn context_picks_the_right_paragraph() {
        let doc = html::parse("<p>first the cat sat</p><p>second a dog sat</p>").unwrap();
        let anchor = Anchor::new("sat", "a dog", "");
        let m = locate(&doc, doc.root(), &anchor).unwrap();
        assert_eq!(doc.text(m.node), Some("second a dog sat"));
        assert_eq!(matched(&doc, &m), "sat");
    }

    #[test]
    fn context_picks_the_right_occurrence_within_a_node() {
        let doc = html::parse("<p>the cat sat, then a dog sat</p>").unwrap();
        let anchor = Anchor::new("sat", "a dog", "");
        let m = locate(&doc, doc.root(), &anchor).unwrap();
        assert_eq!(m.start, "the cat sat, then a dog ".len());
    }

    #[test]
    fn repeated_text_without_plausible_context_is_not_found() {
        let doc = html::parse("<p>a word here</p><p>a word there</p>").unwrap();
        let anchor = Anchor::new("word", "nothing like it", "");
        assert_eq!(locate(&doc, doc.root(), &anchor), None);
    }

    #[test]
    fn comment_ui_is_never_searched() {
        let doc = html::parse(
            r#"<aside id="comment-sidebar"><p>say hello world today</p></aside><p>we say hello world today</p>"#,
        )
        .unwrap();
        let anchor = Anchor::new("hello world", "say", "today");
        let m = locate(&doc, doc.root(), &anchor).unwrap();
        assert_eq!(doc.text(m.node), Some("we say hello world today"));

        let only_ui =
            html::parse(r#"<div data-comment-ui="card"><p>hello world</p></div>"#).unwrap();
        assert_eq!(locate(&only_ui, only_ui.root(), &anchor), None);
    }

    #[test]
    fn whitespace_runs_are_collapsed() {
        let doc = html::parse("<p>say   hello\n      world today</p>").unwrap();
        let anchor = Anchor::new("hello world", "say", "today");
        let m = locate(&doc, doc.root(), &anchor).unwrap();
        assert_eq!(matched(&doc, &m), "hello\n      world");
        assert_eq!(m.tier, MatchTier::Full);
    }

    #[test]
    fn empty_or_missing_text_is_not_found() {
        let doc = html::parse("<p>say hello world today</p>").unwrap();
        assert_eq!(locate(&doc, doc.root(), &Anchor::new("  ", "say", "")), None);
        assert_eq!(locate(&doc, doc.root(), &Anchor::new("goodbye", "", "")), None);
    }

    #[test]
    fn text_split_by_inline_markup_is_not_found() {
        let doc = html::parse("<p>say hello <em>world</em> today</p>").unwrap();
        assert_eq!(locate(&doc, doc.root(), &Anchor::new("hello world", "", "")), None);
    }

    #[test]
    fn multibyte_offsets_stay_on_char_boundaries() {
        let doc = html::parse("<p>naïve café  au lait</p>").unwrap();
        let m = locate(&doc, doc.root(), &Anchor::new("café au", "naïve", "")).unwrap();
        assert_eq!(matched(&doc, &m), "café  au");
    }

    #[test]
    fn matching_uses_context_edges() {
        assert_eq!(last_chars("the quick brown fox", 10), " brown fox");
        assert_eq!(first_chars("jumps over the lazy dog", 10), "jumps over");
        assert_eq!(last_chars("fox", 10), "fox");
        assert_eq!(first_chars("", 10), "");
    }

    #[test]
    fn images_match_by_src_then_label() {
        let doc = html::parse(
            r#"<p><img src="/a.png" alt="Architecture"><img src="/b.png"></p>"#,
        )
        .unwrap();
        let by_src = locate_image(&doc, doc.root(), "whatever", Some("/b.png")).unwrap();
        assert_eq!(doc.attr(by_src, "src"), Some("/b.png"));

        let by_alt = locate_image(&doc, doc.root(), "Architecture", None).unwrap();
        assert_eq!(doc.attr(by_alt, "src"), Some("/a.png"));

        let placeholder = locate_image(&doc, doc.root(), IMAGE_PLACEHOLDER, Some("/gone.png"))
            .unwrap();
        assert_eq!(doc.attr(placeholder, "src"), Some("/b.png"));
    }
}
