//! Per-page controller tying the pieces together.
//!
//! A [`PageSession`] owns the comment list, the highlight set, the live
//! selection and the draft for whatever page is on screen. Work that has to
//! wait on a store is split into a synchronous `start_*` half and a
//! `finish_*`/`apply_*` half, so a host can run the store call on a spawned
//! task and feed the result back through its event loop. Every result is
//! tagged with the [`Ticket`] taken when the work started; results whose
//! ticket no longer matches the session (the reader navigated away) are
//! dropped.
//!
//! One update cycle runs: load, reanchor, highlight sync, then the host
//! re-flows the document and asks for [`PageSession::positioned`].

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::document::{Document, NodeId};
use crate::error::{Error, Result};
use crate::geometry::{Geometry, Viewport};
use crate::highlight::{HighlightManager, SyncReport};
use crate::layout::{layout, LayoutMetrics};
use crate::permission::Permissions;
use crate::reanchor::reanchor;
use crate::selection::{Selection, SelectionCapture};
use crate::store::CommentStore;
use crate::types::{CardKey, Comment, Draft, PositionedComment, SelectionInfo};

/// Identifies the page and navigation generation a piece of work belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub page: String,
    pub generation: u64,
}

/// Whether a delivered result was applied or dropped as stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Applied,
    Stale,
}

/// A draft handed to the store, with the ticket to deliver the result under.
#[derive(Debug, Clone)]
pub struct Submission {
    pub ticket: Ticket,
    pub draft: Draft,
}

#[derive(Debug, Default)]
pub struct PageSession {
    page: String,
    generation: u64,
    comments: Vec<Comment>,
    highlights: HighlightManager,
    selection: SelectionCapture,
    draft: Option<Draft>,
    submitting: bool,
    permissions: Permissions,
    heights: HashMap<CardKey, f64>,
    metrics: LayoutMetrics,
}

impl PageSession {
    pub fn new(page: impl Into<String>, metrics: LayoutMetrics) -> Self {
        Self {
            page: page.into(),
            metrics,
            ..Self::default()
        }
    }

    pub fn page(&self) -> &str {
        &self.page
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn ticket(&self) -> Ticket {
        Ticket {
            page: self.page.clone(),
            generation: self.generation,
        }
    }

    pub fn is_current(&self, ticket: &Ticket) -> bool {
        ticket.generation == self.generation && ticket.page == self.page
    }

    /// Switches to `page`. Everything in flight for the old page becomes stale.
    pub fn navigate(&mut self, page: impl Into<String>) {
        self.page = page.into();
        self.generation += 1;
        self.comments.clear();
        self.highlights = HighlightManager::new();
        self.selection.clear();
        self.draft = None;
        self.submitting = false;
        self.permissions = Permissions::default();
        self.heights.clear();
        debug!(page = %self.page, generation = self.generation, "navigated");
    }

    pub fn metrics(&self) -> &LayoutMetrics {
        &self.metrics
    }

    pub fn set_metrics(&mut self, metrics: LayoutMetrics) {
        self.metrics = metrics;
    }

    // -----------------------------------------------------------------------
    // Comments
    // -----------------------------------------------------------------------

    /// Comments shown to the reader: everything not resolved.
    pub fn visible(&self) -> Vec<&Comment> {
        self.comments.iter().filter(|c| !c.is_resolved()).collect()
    }

    pub fn comment(&self, id: &str) -> Option<&Comment> {
        self.comments.iter().find(|c| c.id == id)
    }

    pub fn highlighted(&self) -> impl Iterator<Item = &str> {
        self.highlights.highlighted().iter().map(String::as_str)
    }

    /// Delivers the result of `list(page)`.
    ///
    /// Stale results are dropped. A failed load leaves the session as it was
    /// and hands the error back.
    pub fn apply_loaded<G>(
        &mut self,
        ticket: &Ticket,
        result: Result<Vec<Comment>>,
        doc: &mut Document,
        root: NodeId,
        geometry: &G,
        viewport: Viewport,
    ) -> Result<Delivery>
    where
        G: Geometry + ?Sized,
    {
        if !self.is_current(ticket) {
            debug!(page = %ticket.page, generation = ticket.generation, "dropping stale load");
            return Ok(Delivery::Stale);
        }
        let comments = result.inspect_err(|err| {
            warn!(page = %self.page, error = %err, "failed to load comments");
        })?;
        info!(page = %self.page, count = comments.len(), "comments loaded");
        self.comments = comments;
        self.refresh(doc, root, geometry, viewport);
        Ok(Delivery::Applied)
    }

    /// Recomputes positions against the current render, then re-syncs
    /// highlights. Run after a resize, a content change, or any change to
    /// the comment set.
    pub fn refresh<G>(
        &mut self,
        doc: &mut Document,
        root: NodeId,
        geometry: &G,
        viewport: Viewport,
    ) -> SyncReport
    where
        G: Geometry + ?Sized,
    {
        self.comments = reanchor(&self.comments, doc, root, geometry, viewport);
        let visible: Vec<Comment> = self.visible().into_iter().cloned().collect();
        let report = self.highlights.sync(doc, root, &visible);
        if !report.missed.is_empty() || !report.failed.is_empty() {
            debug!(
                missed = report.missed.len(),
                failed = report.failed.len(),
                "some comments are not highlighted"
            );
        }
        report
    }

    // -----------------------------------------------------------------------
    // Permissions
    // -----------------------------------------------------------------------

    pub fn permissions(&self) -> Permissions {
        self.permissions
    }

    pub fn set_permissions(&mut self, ticket: &Ticket, permissions: Permissions) -> Delivery {
        if !self.is_current(ticket) {
            return Delivery::Stale;
        }
        self.permissions = permissions;
        if !permissions.can_comment {
            self.draft = None;
        }
        Delivery::Applied
    }

    // -----------------------------------------------------------------------
    // Selection and drafts
    // -----------------------------------------------------------------------

    pub fn capture_selection<G>(
        &mut self,
        doc: &Document,
        selection: Option<Selection>,
        geometry: &G,
        viewport: Viewport,
    ) -> Option<&SelectionInfo>
    where
        G: Geometry + ?Sized,
    {
        self.selection
            .on_pointer_release(doc, selection, geometry, viewport)
    }

    pub fn selection(&self) -> Option<&SelectionInfo> {
        self.selection.current()
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    /// Opens a draft on the current selection.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] if the reader may not comment, nothing is
    /// selected, or the previous draft is still being saved.
    pub fn begin_draft(&mut self, user: impl Into<String>, now: i64) -> Result<&Draft> {
        if !self.permissions.can_comment {
            return Err(Error::Validation("commenting is not permitted".into()));
        }
        if self.submitting {
            return Err(Error::Validation("the previous comment is still saving".into()));
        }
        let selection = self
            .selection
            .current()
            .ok_or_else(|| Error::Validation("nothing is selected".into()))?;
        let draft = Draft {
            page: self.page.clone(),
            anchor: selection.anchor(),
            kind: selection.kind,
            src: selection.src.clone(),
            comment: String::new(),
            y: selection.y,
            user: user.into(),
            created_at: now,
        };
        self.heights.remove(&CardKey::Draft);
        Ok(self.draft.insert(draft))
    }

    pub fn draft(&self) -> Option<&Draft> {
        self.draft.as_ref()
    }

    /// The draft body, for editing in place.
    pub fn draft_body_mut(&mut self) -> Option<&mut String> {
        self.draft.as_mut().map(|d| &mut d.comment)
    }

    pub fn cancel_draft(&mut self) {
        self.draft = None;
        self.heights.remove(&CardKey::Draft);
    }

    /// Hands the draft out for submission.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] if there is no draft, its body is blank, or a
    /// submission is already in flight. The draft is kept in every case.
    pub fn start_submit(&mut self) -> Result<Submission> {
        if self.submitting {
            return Err(Error::Validation("a submission is already in flight".into()));
        }
        let draft = self
            .draft
            .as_ref()
            .ok_or_else(|| Error::Validation("no draft to submit".into()))?;
        if draft.comment.trim().is_empty() {
            return Err(Error::Validation("comment body is empty".into()));
        }
        self.submitting = true;
        Ok(Submission {
            ticket: self.ticket(),
            draft: draft.clone(),
        })
    }

    /// Delivers the store's answer to a [`Submission`].
    ///
    /// Success adds the comment under the store's id. Failure adds nothing
    /// and clears both the draft and the selection; the error is returned.
    pub fn finish_submit(&mut self, submission: Submission, result: Result<String>) -> Result<Delivery> {
        if !self.is_current(&submission.ticket) {
            debug!(page = %submission.ticket.page, "dropping stale submit result");
            return Ok(Delivery::Stale);
        }
        self.submitting = false;
        self.draft = None;
        self.heights.remove(&CardKey::Draft);
        self.selection.clear();
        match result {
            Ok(id) => {
                info!(comment = %id, page = %self.page, "comment added");
                self.comments.push(Comment::from_draft(id, &submission.draft));
                Ok(Delivery::Applied)
            }
            Err(err) => {
                warn!(page = %self.page, error = %err, "failed to submit comment");
                Err(err)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Resolve
    // -----------------------------------------------------------------------

    /// Checks that `id` is a visible comment and returns the ticket to
    /// deliver the store's answer under.
    pub fn start_resolve(&self, id: &str) -> Result<Ticket> {
        match self.comment(id) {
            Some(c) if !c.is_resolved() => Ok(self.ticket()),
            _ => Err(Error::NotFound(id.to_owned())),
        }
    }

    /// Delivers the store's answer to a resolve. Success hides the comment;
    /// failure keeps it visible and returns the error.
    pub fn finish_resolve(&mut self, ticket: &Ticket, id: &str, result: Result<()>) -> Result<Delivery> {
        if !self.is_current(ticket) {
            return Ok(Delivery::Stale);
        }
        if let Err(err) = result {
            warn!(comment = %id, error = %err, "failed to resolve comment");
            return Err(err);
        }
        if let Some(c) = self.comments.iter_mut().find(|c| c.id == id) {
            c.mark_resolved();
        }
        self.heights.remove(&CardKey::Comment(id.to_owned()));
        info!(comment = %id, "comment resolved");
        Ok(Delivery::Applied)
    }

    // -----------------------------------------------------------------------
    // Layout
    // -----------------------------------------------------------------------

    /// Records the rendered height of a card for the next layout pass.
    pub fn record_height(&mut self, key: CardKey, height: f64) {
        self.heights.insert(key, height);
    }

    /// Cards for the sidebar, draft included, in layout order.
    pub fn positioned(&self) -> Vec<PositionedComment> {
        let mut cards: Vec<PositionedComment> = self
            .visible()
            .into_iter()
            .map(|c| {
                let key = CardKey::Comment(c.id.clone());
                let height = self.heights.get(&key).copied();
                PositionedComment::unplaced(key, c.y, height)
            })
            .collect();
        if let Some(draft) = &self.draft {
            let height = self.heights.get(&CardKey::Draft).copied();
            cards.push(PositionedComment::unplaced(CardKey::Draft, draft.y, height));
        }
        layout(&cards, &self.metrics)
    }

    // -----------------------------------------------------------------------
    // Store round trips
    // -----------------------------------------------------------------------

    /// Lists the current page from `store` and applies the result.
    pub async fn load<S, G>(
        &mut self,
        store: &S,
        doc: &mut Document,
        root: NodeId,
        geometry: &G,
        viewport: Viewport,
    ) -> Result<Delivery>
    where
        S: CommentStore,
        G: Geometry + ?Sized,
    {
        let ticket = self.ticket();
        let result = store.list(&ticket.page).await;
        self.apply_loaded(&ticket, result, doc, root, geometry, viewport)
    }

    /// Submits the draft to `store`; returns the new id on success.
    pub async fn submit<S: CommentStore>(&mut self, store: &S) -> Result<String> {
        let submission = self.start_submit()?;
        let result = store.create(&submission.draft).await;
        let id = result.as_ref().ok().cloned();
        self.finish_submit(submission, result)?;
        id.ok_or_else(|| Error::Validation("store returned no id".into()))
    }

    /// Resolves comment `id` through `store`.
    pub async fn resolve<S: CommentStore>(&mut self, store: &S, id: &str) -> Result<Delivery> {
        let ticket = self.start_resolve(id)?;
        let result = store.resolve(id).await;
        self.finish_resolve(&ticket, id, result)
    }
}
