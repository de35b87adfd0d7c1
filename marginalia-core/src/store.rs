//! The comment store contract and an in-process implementation.
//!
//! A store is anything that can list, create and resolve comments for a
//! page. Every call is async and fallible; failures come back as
//! [`Error`](crate::Error) values and never panic across the boundary.

use std::future::Future;

use tokio::sync::Mutex;
use tracing::info;

use crate::error::{Error, Result};
use crate::types::{Comment, Draft};

/// External persistence for comments.
pub trait CommentStore: Send + Sync {
    /// Every comment recorded for `page`, resolved ones included.
    fn list(&self, page: &str) -> impl Future<Output = Result<Vec<Comment>>> + Send;

    /// Persists `draft` and returns the id the store assigned.
    fn create(&self, draft: &Draft) -> impl Future<Output = Result<String>> + Send;

    /// Marks comment `id` resolved (or removes it, depending on the store).
    fn resolve(&self, id: &str) -> impl Future<Output = Result<()>> + Send;
}

/// Rejects drafts no store should accept.
pub fn validate_draft(draft: &Draft) -> Result<()> {
    if draft.comment.trim().is_empty() {
        return Err(Error::Validation("comment body is empty".into()));
    }
    if draft.anchor.text().trim().is_empty() {
        return Err(Error::Validation("anchor text is empty".into()));
    }
    if draft.page.is_empty() {
        return Err(Error::Validation("page is empty".into()));
    }
    Ok(())
}

/// Keeps comments in memory for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    comments: Mutex<Vec<Comment>>,
    delete_on_resolve: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes comments on resolve instead of flagging them.
    pub fn delete_on_resolve(mut self, on: bool) -> Self {
        self.delete_on_resolve = on;
        self
    }

    /// Seeds the store, for example from an imported export.
    pub fn with_comments(comments: Vec<Comment>) -> Self {
        Self {
            comments: Mutex::new(comments),
            delete_on_resolve: false,
        }
    }

    /// Snapshot of everything in the store, all pages.
    pub async fn all(&self) -> Vec<Comment> {
        self.comments.lock().await.clone()
    }
}

impl CommentStore for MemoryStore {
    async fn list(&self, page: &str) -> Result<Vec<Comment>> {
        let comments = self.comments.lock().await;
        Ok(comments.iter().filter(|c| c.page == page).cloned().collect())
    }

    async fn create(&self, draft: &Draft) -> Result<String> {
        validate_draft(draft)?;
        let id = uuid::Uuid::new_v4().to_string();
        self.comments
            .lock()
            .await
            .push(Comment::from_draft(id.clone(), draft));
        info!(comment = %id, page = %draft.page, "comment created");
        Ok(id)
    }

    async fn resolve(&self, id: &str) -> Result<()> {
        let mut comments = self.comments.lock().await;
        let pos = comments
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| Error::NotFound(id.to_owned()))?;
        if self.delete_on_resolve {
            comments.remove(pos);
        } else {
            comments[pos].mark_resolved();
        }
        info!(comment = %id, hard = self.delete_on_resolve, "comment resolved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::draft;

    #[tokio::test]
    async fn create_list_resolve() {
        let store = MemoryStore::new();
        let id = store.create(&draft("hello world", "say", "today")).await.unwrap();

        let listed = store.list("/docs/intro").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, id);
        assert!(store.list("/docs/other").await.unwrap().is_empty());

        store.resolve(&id).await.unwrap();
        let listed = store.list("/docs/intro").await.unwrap();
        assert!(listed[0].is_resolved());
    }

    #[tokio::test]
    async fn hard_delete_on_resolve() {
        let store = MemoryStore::new().delete_on_resolve(true);
        let id = store.create(&draft("hello", "", "")).await.unwrap();
        store.resolve(&id).await.unwrap();
        assert!(store.all().await.is_empty());
    }

    #[tokio::test]
    async fn empty_body_is_rejected() {
        let store = MemoryStore::new();
        let mut d = draft("hello", "", "");
        d.comment = "   ".into();
        assert!(matches!(store.create(&d).await, Err(Error::Validation(_))));
        assert!(store.all().await.is_empty());
    }

    #[tokio::test]
    async fn resolving_unknown_id_is_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(store.resolve("nope").await, Err(Error::NotFound(_))));
    }
}
