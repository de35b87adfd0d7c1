//! Host-provided geometry.
//!
//! The core has no notion of pixels, fonts or terminal cells. Whatever draws
//! the document implements [`Geometry`] and answers "where is this on
//! screen" in its own units; the core only adds the scroll offset it is
//! handed explicitly through [`Viewport`].

use crate::document::{Boundary, Document};
use crate::locator::AnchorTarget;

/// A viewport-relative rectangle.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ClientRect {
    pub top: f64,
    pub left: f64,
    pub width: f64,
    pub height: f64,
}

/// Current scroll position of the viewport, in the same units as [`ClientRect`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Viewport {
    pub scroll_x: f64,
    pub scroll_y: f64,
}

impl Viewport {
    pub fn new(scroll_x: f64, scroll_y: f64) -> Self {
        Self { scroll_x, scroll_y }
    }
}

/// Measures rendered content. Implemented by the host renderer.
///
/// Both methods return `None` when the content is not currently laid out
/// (hidden, detached, or outside whatever the host has rendered).
pub trait Geometry {
    /// Bounding rect of a located anchor.
    fn client_rect(&self, doc: &Document, target: &AnchorTarget) -> Option<ClientRect>;

    /// Bounding rect of the selection `start..end`.
    fn range_rect(&self, doc: &Document, start: Boundary, end: Boundary) -> Option<ClientRect>;
}
