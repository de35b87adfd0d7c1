//! Error type shared by every fallible operation in `marginalia-core`.
//!
//! Nothing in the core is fatal to the host: callers receive one of these
//! variants and decide whether to surface it, log it, or ignore it.

use crate::document::DomError;

/// All failures the core can report across its boundary.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The local SQLite store failed (open, migrate, query or write).
    #[error("database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),

    /// A remote collaborator could not be reached or answered with a failure status.
    #[error("network error: {0}")]
    Network(String),

    /// A payload or request was structurally invalid (missing fields, empty body, ...).
    #[error("validation error: {0}")]
    Validation(String),

    /// The referenced comment does not exist in the store.
    #[error("comment not found: {0}")]
    NotFound(String),

    /// The rendered page could not be loaded into a document tree.
    #[error("html error: {0}")]
    Html(String),

    /// A tree mutation was rejected.
    #[error(transparent)]
    Dom(#[from] DomError),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
