use serde::{Deserialize, Serialize};

use crate::document::NodeId;

/// What a comment is attached to. Fixed at creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CommentKind {
    #[default]
    Text,
    Image,
}

impl CommentKind {
    /// Storage/wire spelling: `"TEXT"` or `"IMAGE"`.
    pub fn as_str(self) -> &'static str {
        match self {
            CommentKind::Text => "TEXT",
            CommentKind::Image => "IMAGE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "TEXT" => Some(CommentKind::Text),
            "IMAGE" => Some(CommentKind::Image),
            _ => None,
        }
    }
}

/// The `(text, contextBefore, contextAfter)` tuple a comment attaches to.
///
/// Captured once when the selection is made and never re-derived: there are
/// no mutating accessors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Anchor {
    text: String,
    #[serde(default)]
    context_before: String,
    #[serde(default)]
    context_after: String,
}

impl Anchor {
    pub fn new(
        text: impl Into<String>,
        context_before: impl Into<String>,
        context_after: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            context_before: context_before.into(),
            context_after: context_after.into(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn context_before(&self) -> &str {
        &self.context_before
    }

    pub fn context_after(&self) -> &str {
        &self.context_after
    }
}

/// A persisted comment attached to a page.
///
/// `y` is a cache of the last computed document-absolute anchor coordinate;
/// it is recomputed on every reanchor pass and never authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub page: String,
    #[serde(flatten)]
    anchor: Anchor,
    pub comment: String,
    #[serde(default, rename = "type")]
    pub kind: CommentKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    resolved: bool,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub created_at: i64, // Unix timestamp seconds
}

impl Comment {
    /// Builds the persisted form of `draft` once the store has assigned `id`.
    pub fn from_draft(id: impl Into<String>, draft: &Draft) -> Self {
        Self {
            id: id.into(),
            page: draft.page.clone(),
            anchor: draft.anchor.clone(),
            comment: draft.comment.clone(),
            kind: draft.kind,
            src: draft.src.clone(),
            y: draft.y,
            resolved: false,
            user: draft.user.clone(),
            created_at: draft.created_at,
        }
    }

    /// Reassembles a comment from stored columns.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: String,
        page: String,
        anchor: Anchor,
        comment: String,
        kind: CommentKind,
        src: Option<String>,
        y: f64,
        resolved: bool,
        user: String,
        created_at: i64,
    ) -> Self {
        Self {
            id,
            page,
            anchor,
            comment,
            kind,
            src,
            y,
            resolved,
            user,
            created_at,
        }
    }

    pub fn anchor(&self) -> &Anchor {
        &self.anchor
    }

    pub fn text(&self) -> &str {
        self.anchor.text()
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    /// Flips `resolved` to `true`. There is no way back.
    pub fn mark_resolved(&mut self) {
        self.resolved = true;
    }

    /// Copy of this comment with a new cached anchor coordinate.
    pub fn with_y(&self, y: f64) -> Self {
        Self { y, ..self.clone() }
    }
}

/// A comment being written, not yet persisted and therefore without an id.
#[derive(Debug, Clone, PartialEq)]
pub struct Draft {
    pub page: String,
    pub anchor: Anchor,
    pub kind: CommentKind,
    pub src: Option<String>,
    pub comment: String,
    pub y: f64,
    pub user: String,
    pub created_at: i64,
}

/// Identifies one card in the comment sidebar.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CardKey {
    /// The single in-progress draft.
    Draft,
    /// A persisted comment, by id.
    Comment(String),
}

/// A sidebar card with its anchor coordinate and, once laid out, its `top`.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionedComment {
    pub key: CardKey,
    /// Document-absolute anchor coordinate.
    pub y: f64,
    /// Rendered height, when it has been measured.
    pub height: Option<f64>,
    /// Offset within the sidebar assigned by the layout engine.
    pub top: f64,
}

impl PositionedComment {
    /// A card that has not been placed yet (`top` equals `y`).
    pub fn unplaced(key: CardKey, y: f64, height: Option<f64>) -> Self {
        Self {
            key,
            y,
            height,
            top: y,
        }
    }
}

/// The live selection, extracted on pointer release. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionInfo {
    pub kind: CommentKind,
    pub text: String,
    pub context_before: String,
    pub context_after: String,
    /// Document-absolute left edge of the selection.
    pub x: f64,
    /// Document-absolute top edge of the selection.
    pub y: f64,
    /// The selected image element, for image selections.
    pub image: Option<NodeId>,
    pub src: Option<String>,
}

impl SelectionInfo {
    pub fn anchor(&self) -> Anchor {
        Anchor::new(
            self.text.clone(),
            self.context_before.clone(),
            self.context_after.clone(),
        )
    }
}
