//! Builders shared by unit tests.

use crate::document::{Boundary, Document, NodeId};
use crate::geometry::{ClientRect, Geometry};
use crate::locator::AnchorTarget;
use crate::types::{Anchor, Comment, CommentKind, Draft};

pub fn draft(text: &str, before: &str, after: &str) -> Draft {
    Draft {
        page: "/docs/intro".to_owned(),
        anchor: Anchor::new(text, before, after),
        kind: CommentKind::Text,
        src: None,
        comment: "looks off".to_owned(),
        y: 0.0,
        user: "ada".to_owned(),
        created_at: 1_700_000_000,
    }
}

pub fn text_comment(id: &str, text: &str, before: &str, after: &str) -> Comment {
    Comment::from_draft(id, &draft(text, before, after))
}

pub fn image_comment(id: &str, label: &str, src: &str) -> Comment {
    let mut d = draft(label, "", "");
    d.kind = CommentKind::Image;
    d.src = Some(src.to_owned());
    Comment::from_draft(id, &d)
}

/// Places every node on its own row, numbered in document order.
pub struct OrderGeometry;

impl OrderGeometry {
    fn row(doc: &Document, node: NodeId) -> Option<ClientRect> {
        let row = doc.descendants(doc.root()).position(|n| n == node)?;
        Some(ClientRect {
            top: row as f64,
            left: 0.0,
            width: 1.0,
            height: 1.0,
        })
    }
}

impl Geometry for OrderGeometry {
    fn client_rect(&self, doc: &Document, target: &AnchorTarget) -> Option<ClientRect> {
        Self::row(doc, target.node())
    }

    fn range_rect(&self, doc: &Document, start: Boundary, _end: Boundary) -> Option<ClientRect> {
        Self::row(doc, start.node)
    }
}
