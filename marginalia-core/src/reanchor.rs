//! Reanchor Service: recomputes each comment's `y` against the current render.

use tracing::debug;

use crate::document::{Document, NodeId};
use crate::geometry::{Geometry, Viewport};
use crate::locator;
use crate::types::Comment;

/// Document-absolute top of `comment`'s anchor, if it can be found and measured.
pub fn anchor_y<G>(
    comment: &Comment,
    doc: &Document,
    root: NodeId,
    geometry: &G,
    viewport: Viewport,
) -> Option<f64>
where
    G: Geometry + ?Sized,
{
    if comment.text().trim().is_empty() {
        return None;
    }
    let Some(target) = locator::locate_target(doc, root, comment) else {
        debug!(comment = %comment.id, text = %comment.text(), "anchor not found, keeping previous y");
        return None;
    };
    let Some(rect) = geometry.client_rect(doc, &target) else {
        debug!(comment = %comment.id, "anchor has no layout, keeping previous y");
        return None;
    };
    Some(rect.top + viewport.scroll_y)
}

/// Returns a copy of `comments` with fresh `y` values.
///
/// Comments that cannot be located keep their previous `y`; none are
/// dropped and the input is never modified. Run this before
/// [`HighlightManager::sync`](crate::highlight::HighlightManager::sync) in
/// an update cycle.
pub fn reanchor<G>(
    comments: &[Comment],
    doc: &Document,
    root: NodeId,
    geometry: &G,
    viewport: Viewport,
) -> Vec<Comment>
where
    G: Geometry + ?Sized,
{
    comments
        .iter()
        .map(|c| match anchor_y(c, doc, root, geometry, viewport) {
            Some(y) => c.with_y(y),
            None => c.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::document::Boundary;
    use crate::geometry::ClientRect;
    use crate::html;
    use crate::locator::AnchorTarget;
    use crate::testutil::{image_comment, text_comment};

    /// Reports a fixed top for each node it knows about.
    #[derive(Default)]
    struct FixedGeometry {
        tops: HashMap<NodeId, f64>,
    }

    impl Geometry for FixedGeometry {
        fn client_rect(&self, _doc: &Document, target: &AnchorTarget) -> Option<ClientRect> {
            self.tops.get(&target.node()).map(|top| ClientRect {
                top: *top,
                ..ClientRect::default()
            })
        }

        fn range_rect(&self, _doc: &Document, start: Boundary, _end: Boundary) -> Option<ClientRect> {
            self.tops.get(&start.node).map(|top| ClientRect {
                top: *top,
                ..ClientRect::default()
            })
        }
    }

    fn setup() -> (Document, FixedGeometry) {
        let doc = html::parse(
            r#"<p>intro line</p><p>we say hello world today</p><p><img src="/a.png" alt="A"></p>"#,
        )
        .unwrap();
        let mut geometry = FixedGeometry::default();
        let texts = doc.text_nodes(doc.root());
        geometry.tops.insert(texts[0], 10.0);
        geometry.tops.insert(texts[1], 40.0);
        let img = doc
            .descendants(doc.root())
            .find(|n| doc.tag(*n) == Some("img"))
            .unwrap();
        geometry.tops.insert(img, 90.0);
        (doc, geometry)
    }

    #[test]
    fn y_is_document_absolute() {
        let (doc, geometry) = setup();
        let comments = vec![text_comment("c1", "hello world", "say", "today")];
        let out = reanchor(&comments, &doc, doc.root(), &geometry, Viewport::new(0.0, 500.0));
        assert_eq!(out[0].y, 540.0);
        assert_eq!(comments[0].y, 0.0);
    }

    #[test]
    fn misses_keep_previous_y() {
        let (doc, geometry) = setup();
        let comments = vec![
            text_comment("gone", "nowhere to be seen", "", "").with_y(123.0),
            text_comment("c1", "hello world", "say", "today"),
        ];
        let out = reanchor(&comments, &doc, doc.root(), &geometry, Viewport::default());
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].y, 123.0);
        assert_eq!(out[1].y, 40.0);
    }

    #[test]
    fn unmeasurable_anchor_keeps_previous_y() {
        let (doc, mut geometry) = setup();
        geometry.tops.clear();
        let comments = vec![text_comment("c1", "hello world", "say", "today").with_y(7.0)];
        let out = reanchor(&comments, &doc, doc.root(), &geometry, Viewport::default());
        assert_eq!(out[0].y, 7.0);
    }

    #[test]
    fn image_comments_use_the_image_rect() {
        let (doc, geometry) = setup();
        let comments = vec![image_comment("i1", "A", "/a.png")];
        let out = reanchor(&comments, &doc, doc.root(), &geometry, Viewport::new(0.0, 10.0));
        assert_eq!(out[0].y, 100.0);
    }

    #[test]
    fn empty_text_is_left_alone() {
        let (doc, geometry) = setup();
        let comments = vec![text_comment("c1", "", "", "").with_y(5.0)];
        let out = reanchor(&comments, &doc, doc.root(), &geometry, Viewport::default());
        assert_eq!(out, comments);
    }
}
