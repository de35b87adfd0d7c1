//! Highlight Manager: keeps marker wrappers in the tree in step with the
//! current comment set.
//!
//! The set of highlighted ids is always re-read from the tree itself because
//! the host may have regenerated the document since the last pass. The
//! difference between what is there and what should be there is computed by
//! [`reconcile`], a pure function, and only then applied.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use crate::document::{Document, DomError, Element, NodeId};
use crate::locator::{self, AnchorTarget};
use crate::types::Comment;

pub const MARKER_TAG: &str = "mark";
/// Attribute carrying the comment id on a marker.
pub const MARKER_ATTR: &str = "data-comment-id";
pub const MARKER_CLASS: &str = "comment-highlight";
pub const HOVERED_CLASS: &str = "hovered";
pub const ACTIVE_CLASS: &str = "active";

/// `true` for a marker wrapper element.
pub fn is_marker(el: &Element) -> bool {
    el.tag == MARKER_TAG && el.attr(MARKER_ATTR).is_some()
}

fn marker_element(id: &str) -> Element {
    Element::new(MARKER_TAG)
        .with_attr(MARKER_ATTR, id)
        .with_attr("class", MARKER_CLASS)
}

/// One tree mutation decided by [`reconcile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HighlightOp {
    Unwrap(String),
    Wrap(String),
}

/// Ops that turn the `existing` marker set into the `wanted` one.
///
/// Unwraps come first so text freed by a removed marker is visible to the
/// locator when the new markers are placed. Ids in both sets produce nothing.
pub fn reconcile(existing: &BTreeSet<String>, wanted: &BTreeSet<String>) -> Vec<HighlightOp> {
    existing
        .difference(wanted)
        .map(|id| HighlightOp::Unwrap(id.clone()))
        .chain(
            wanted
                .difference(existing)
                .map(|id| HighlightOp::Wrap(id.clone())),
        )
        .collect()
}

/// Every marker under `root`, keyed by comment id.
pub fn markers(doc: &Document, root: NodeId) -> BTreeMap<String, Vec<NodeId>> {
    let mut out: BTreeMap<String, Vec<NodeId>> = BTreeMap::new();
    for id in doc.descendants(root) {
        let Some(el) = doc.element(id).filter(|e| is_marker(e)) else {
            continue;
        };
        if let Some(comment_id) = el.attr(MARKER_ATTR) {
            out.entry(comment_id.to_owned()).or_default().push(id);
        }
    }
    out
}

/// The marker for comment `id`, if it is highlighted.
pub fn marker_for(doc: &Document, root: NodeId, id: &str) -> Option<NodeId> {
    doc.descendants(root).find(|n| {
        doc.element(*n)
            .is_some_and(|e| is_marker(e) && e.attr(MARKER_ATTR) == Some(id))
    })
}

/// Interaction state reflected on a marker through CSS hook classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MarkerState {
    #[default]
    Idle,
    Hovered,
    Active,
}

/// Sets the hover/active classes on every marker for `id`.
/// Returns `false` if the comment has no marker.
pub fn set_marker_state(doc: &mut Document, root: NodeId, id: &str, state: MarkerState) -> bool {
    let nodes = markers(doc, root).remove(id).unwrap_or_default();
    for node in &nodes {
        // Markers are elements, so the class toggles cannot fail.
        let _ = doc.toggle_class(*node, HOVERED_CLASS, state == MarkerState::Hovered);
        let _ = doc.toggle_class(*node, ACTIVE_CLASS, state == MarkerState::Active);
    }
    !nodes.is_empty()
}

/// What one [`HighlightManager::sync`] pass did.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub wrapped: Vec<String>,
    pub unwrapped: Vec<String>,
    /// Comments whose anchor was not found in the current tree.
    pub missed: Vec<String>,
    /// Comments whose anchor was found but could not be wrapped.
    pub failed: Vec<(String, DomError)>,
}

impl SyncReport {
    /// `true` if the pass touched the tree.
    pub fn mutated(&self) -> bool {
        !self.wrapped.is_empty() || !self.unwrapped.is_empty()
    }
}

/// Owns the highlight set of one document.
#[derive(Debug, Default)]
pub struct HighlightManager {
    highlighted: BTreeSet<String>,
}

impl HighlightManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids highlighted after the last [`sync`](Self::sync).
    pub fn highlighted(&self) -> &BTreeSet<String> {
        &self.highlighted
    }

    /// Brings the markers under `root` in line with `comments`.
    ///
    /// Resolved comments and comments with empty text are not highlighted.
    /// A comment that cannot be located or wrapped is skipped; the rest of
    /// the set is still processed. Calling this twice with the same set does
    /// not touch the tree the second time.
    pub fn sync(&mut self, doc: &mut Document, root: NodeId, comments: &[Comment]) -> SyncReport {
        let wanted_comments: BTreeMap<&str, &Comment> = comments
            .iter()
            .filter(|c| !c.is_resolved() && !c.text().trim().is_empty())
            .map(|c| (c.id.as_str(), c))
            .collect();
        let wanted: BTreeSet<String> = wanted_comments.keys().map(|k| (*k).to_owned()).collect();

        let mut present = markers(doc, root);
        let existing: BTreeSet<String> = present.keys().cloned().collect();

        let mut report = SyncReport::default();
        for op in reconcile(&existing, &wanted) {
            match op {
                HighlightOp::Unwrap(id) => {
                    for node in present.remove(&id).unwrap_or_default() {
                        if let Err(err) = doc.unwrap(node) {
                            warn!(comment = %id, error = %err, "failed to unwrap marker");
                        }
                    }
                    report.unwrapped.push(id);
                }
                HighlightOp::Wrap(id) => {
                    let Some(comment) = wanted_comments.get(id.as_str()) else {
                        continue;
                    };
                    match wrap(doc, root, comment) {
                        Ok(Some(_)) => report.wrapped.push(id),
                        Ok(None) => {
                            debug!(comment = %id, "anchor not found, highlight skipped");
                            report.missed.push(id);
                        }
                        Err(err) => {
                            debug!(comment = %id, error = %err, "anchor could not be wrapped");
                            report.failed.push((id, err));
                        }
                    }
                }
            }
        }

        self.highlighted = markers(doc, root).into_keys().collect();
        report
    }

    /// Unwraps every marker under `root`.
    pub fn clear(&mut self, doc: &mut Document, root: NodeId) -> SyncReport {
        self.sync(doc, root, &[])
    }
}

fn wrap(doc: &mut Document, root: NodeId, comment: &Comment) -> Result<Option<NodeId>, DomError> {
    let Some(target) = locator::locate_target(doc, root, comment) else {
        return Ok(None);
    };
    let marker = marker_element(&comment.id);
    let node = match target {
        AnchorTarget::Text(m) => doc.wrap_text_range(m.node, m.start, m.end, marker)?,
        AnchorTarget::Image(img) => doc.wrap_node(img, marker)?,
    };
    Ok(Some(node))
}
