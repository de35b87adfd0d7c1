//! Anchored comments for rendered documentation pages.
//!
//! The host renders a page into a [`Document`] and implements [`Geometry`];
//! this crate finds where stored comments belong in that render, marks them,
//! and stacks their cards beside the text. Persistence sits behind
//! [`CommentStore`], with an in-memory and a SQLite implementation.

pub mod db;
pub mod document;
pub mod error;
pub mod geometry;
pub mod highlight;
pub mod html;
pub mod layout;
pub mod locator;
pub mod permission;
pub mod reanchor;
pub mod schema;
pub mod selection;
pub mod session;
pub mod store;
pub mod types;
pub mod wire;

#[cfg(test)]
mod testutil;

pub use db::SqliteStore;
pub use document::{Boundary, Document, DomError, Element, NodeId};
pub use error::{Error, Result};
pub use geometry::{ClientRect, Geometry, Viewport};
pub use highlight::{HighlightManager, MarkerState};
pub use layout::{layout, LayoutMetrics};
pub use locator::{locate, AnchorTarget, TextMatch};
pub use permission::{CommentPermission, PermissionOracle, Permissions, PolicyOracle, User};
pub use reanchor::reanchor;
pub use selection::{Selection, SelectionCapture};
pub use session::{Delivery, PageSession, Submission, Ticket};
pub use store::{CommentStore, MemoryStore};
pub use types::{Anchor, CardKey, Comment, CommentKind, Draft, PositionedComment, SelectionInfo};
