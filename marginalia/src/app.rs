//! Central application state for marginalia.
//!
//! `App` owns the loaded pages, the [`PageSession`] of the page on screen,
//! and all UI state (mode, scroll, focus, drag). Store and permission calls
//! run on spawned tasks and come back through the event channel; the
//! `on_*` methods deliver those answers to the session.

use marginalia_core::db::now_secs;
use marginalia_core::highlight::set_marker_state;
use marginalia_core::permission::resolve_permissions;
use marginalia_core::{
    CardKey, Comment, CommentStore, Delivery, MarkerState, PageSession, Permissions,
    PolicyOracle, PositionedComment, Result, Selection, SqliteStore, Submission, Ticket, User,
    Viewport,
};
use ratatui::layout::Rect;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

use crate::config::Config;
use crate::event::AppEvent;
use crate::page::Page;

/// Editor mode controlling which keybinding set is active.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    #[default]
    Normal,
    /// Typing into the draft card.
    Insert,
    HelpOverlay,
    /// Quit-confirmation dialog shown while a draft has text.
    ConfirmQuit,
}

/// A mouse drag in document coordinates (line, column).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Drag {
    pub anchor: (usize, usize),
    pub focus: (usize, usize),
}

impl Drag {
    /// Endpoints in reading order.
    pub fn ordered(&self) -> ((usize, usize), (usize, usize)) {
        (self.anchor.min(self.focus), self.anchor.max(self.focus))
    }

    pub fn is_click(&self) -> bool {
        self.anchor == self.focus
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Info(String),
    Error(String),
}

/// Everything the background tasks need, cloned into each task.
#[derive(Clone)]
struct Backend {
    store: SqliteStore,
    tx: UnboundedSender<AppEvent>,
    user: Option<User>,
    view_policy: PolicyOracle,
    comment_policy: PolicyOracle,
}

pub struct App {
    pub mode: Mode,
    pub pages: Vec<Page>,
    pub current: usize,
    pub session: PageSession,
    backend: Backend,

    pub show_sidebar: bool,
    /// First document line on screen.
    pub scroll: usize,
    /// Document panel height, cached after each render.
    pub viewport_height: u16,
    pub help_scroll: u16,
    /// Inner panel rects from the last render, for mouse hit-testing.
    pub doc_area: Rect,
    pub sidebar_area: Rect,

    /// Comment whose card has keyboard focus.
    pub focused: Option<String>,
    /// Comment under the pointer.
    pub hovered: Option<String>,
    pub drag: Option<Drag>,
    /// Cards as placed by the last render.
    pub cards: Vec<PositionedComment>,
    pub status: Option<Status>,
}

impl App {
    /// Creates the app on the first page. `pages` must not be empty.
    pub fn new(
        pages: Vec<Page>,
        store: SqliteStore,
        tx: UnboundedSender<AppEvent>,
        config: &Config,
    ) -> Self {
        let key = pages.first().map(|p| p.key.clone()).unwrap_or_default();
        Self {
            mode: Mode::Normal,
            pages,
            current: 0,
            session: PageSession::new(key, config.metrics()),
            backend: Backend {
                store,
                tx,
                user: config.user(),
                view_policy: PolicyOracle::new(config.view_permission, &config.repo_owner),
                comment_policy: PolicyOracle::new(config.comment_permission, &config.repo_owner),
            },
            show_sidebar: config.auto_show_comments,
            scroll: 0,
            viewport_height: 0,
            help_scroll: 0,
            doc_area: Rect::default(),
            sidebar_area: Rect::default(),
            focused: None,
            hovered: None,
            drag: None,
            cards: Vec::new(),
            status: None,
        }
    }

    pub fn page(&self) -> &Page {
        &self.pages[self.current]
    }

    pub fn user(&self) -> Option<&User> {
        self.backend.user.as_ref()
    }

    fn viewport(&self) -> Viewport {
        Viewport::new(0.0, self.scroll as f64)
    }

    fn info(&mut self, msg: impl Into<String>) {
        self.status = Some(Status::Info(msg.into()));
    }

    fn error(&mut self, msg: impl Into<String>) {
        self.status = Some(Status::Error(msg.into()));
    }

    // -----------------------------------------------------------------------
    // Pages
    // -----------------------------------------------------------------------

    /// Starts the first page: asks for permissions, which in turn loads.
    pub fn start(&mut self) {
        self.request_permissions();
    }

    /// Switches to page `index`, re-reading it from disk.
    pub fn open_page(&mut self, index: usize) {
        if index >= self.pages.len() {
            return;
        }
        self.current = index;
        if let Err(e) = self.pages[index].reload() {
            warn!(page = %self.pages[index].key, error = %e, "reload failed, keeping last render");
            self.error(format!("reload failed: {e}"));
        }
        let key = self.pages[index].key.clone();
        self.session.navigate(key);
        self.scroll = 0;
        self.focused = None;
        self.hovered = None;
        self.drag = None;
        self.cards.clear();
        if self.mode == Mode::Insert {
            self.mode = Mode::Normal;
        }
        self.request_permissions();
    }

    pub fn next_page(&mut self) {
        if self.pages.len() > 1 {
            self.open_page((self.current + 1) % self.pages.len());
        }
    }

    pub fn prev_page(&mut self) {
        if self.pages.len() > 1 {
            self.open_page((self.current + self.pages.len() - 1) % self.pages.len());
        }
    }

    /// Re-reads the current page from disk and re-anchors every comment in
    /// the new tree.
    pub fn reload_page(&mut self) {
        let current = self.current;
        match self.pages[current].reload() {
            Ok(()) => {
                self.drag = None;
                self.session.clear_selection();
                self.refresh();
                self.info("page reloaded");
            }
            Err(e) => self.error(format!("reload failed: {e}")),
        }
    }

    // -----------------------------------------------------------------------
    // Layout
    // -----------------------------------------------------------------------

    /// Re-flows the current page at `width` and re-anchors if it changed.
    pub fn relayout(&mut self, width: usize) {
        let current = self.current;
        if self.pages[current].set_width(width) {
            self.refresh();
        }
    }

    /// Reanchor, highlight sync, then re-flow the mutated tree.
    pub fn refresh(&mut self) {
        let viewport = self.viewport();
        let scroll = self.scroll;
        let page = &mut self.pages[self.current];
        let geometry = page.flow.on_screen(scroll);
        self.session
            .refresh(&mut page.doc, page.root, &geometry, viewport);
        self.restyle();
    }

    /// Pushes focus and hover onto the markers, then re-flows.
    fn restyle(&mut self) {
        let page = &mut self.pages[self.current];
        for id in self.session.highlighted() {
            let state = if self.focused.as_deref() == Some(id) {
                MarkerState::Active
            } else if self.hovered.as_deref() == Some(id) {
                MarkerState::Hovered
            } else {
                MarkerState::Idle
            };
            set_marker_state(&mut page.doc, page.root, id, state);
        }
        page.reflow();
    }

    // -----------------------------------------------------------------------
    // Background work
    // -----------------------------------------------------------------------

    fn request_permissions(&self) {
        let backend = self.backend.clone();
        let ticket = self.session.ticket();
        tokio::spawn(async move {
            let permissions = resolve_permissions(
                &backend.view_policy,
                &backend.comment_policy,
                backend.user.as_ref(),
                &ticket.page,
            )
            .await;
            let _ = backend.tx.send(AppEvent::Permissions(ticket, permissions));
        });
    }

    fn request_load(&self) {
        let backend = self.backend.clone();
        let ticket = self.session.ticket();
        tokio::spawn(async move {
            let result = backend.store.list(&ticket.page).await;
            let _ = backend.tx.send(AppEvent::Loaded(ticket, result));
        });
    }

    pub fn on_permissions(&mut self, ticket: Ticket, permissions: Permissions) {
        if self.session.set_permissions(&ticket, permissions) == Delivery::Stale {
            return;
        }
        info!(page = %ticket.page, ?permissions, "permissions resolved");
        if !permissions.can_comment && self.mode == Mode::Insert {
            self.mode = Mode::Normal;
        }
        if permissions.can_view {
            self.request_load();
        }
    }

    pub fn on_loaded(&mut self, ticket: Ticket, result: Result<Vec<Comment>>) {
        let viewport = self.viewport();
        let scroll = self.scroll;
        let page = &mut self.pages[self.current];
        let geometry = page.flow.on_screen(scroll);
        match self
            .session
            .apply_loaded(&ticket, result, &mut page.doc, page.root, &geometry, viewport)
        {
            Ok(Delivery::Applied) => self.restyle(),
            Ok(Delivery::Stale) => {}
            Err(e) => self.error(format!("could not load comments: {e}")),
        }
    }

    // -----------------------------------------------------------------------
    // Selection and drafts
    // -----------------------------------------------------------------------

    pub fn begin_drag(&mut self, line: usize, col: usize) {
        self.drag = Some(Drag {
            anchor: (line, col),
            focus: (line, col),
        });
    }

    pub fn extend_drag(&mut self, line: usize, col: usize) {
        if let Some(drag) = &mut self.drag {
            drag.focus = (line, col);
        }
    }

    /// Pointer release: captures the dragged range, or focuses the comment
    /// under a plain click.
    pub fn finish_drag(&mut self) {
        let Some(drag) = self.drag else { return };
        let viewport = self.viewport();
        let page = &self.pages[self.current];

        if drag.is_click() {
            let (line, col) = drag.anchor;
            let hit = page.flow.mark_at(line, col).map(str::to_owned);
            self.drag = None;
            self.session.clear_selection();
            if hit.is_some() {
                self.set_focus(hit);
            }
            return;
        }

        let (start, end) = drag.ordered();
        let selection = page
            .flow
            .boundary_at(&page.doc, start.0, start.1)
            .zip(page.flow.boundary_at(&page.doc, end.0, end.1))
            .map(|(a, b)| Selection::new(a, b));
        let geometry = page.flow.on_screen(self.scroll);
        let captured = self
            .session
            .capture_selection(&page.doc, selection, &geometry, viewport)
            .is_some();
        if !captured {
            self.drag = None;
        }
    }

    pub fn clear_selection(&mut self) {
        self.drag = None;
        self.session.clear_selection();
    }

    /// Opens a draft on the current selection and enters insert mode.
    pub fn begin_draft(&mut self) {
        let user = self
            .backend
            .user
            .as_ref()
            .map_or_else(|| "anonymous".to_owned(), |u| u.name.clone());
        match self.session.begin_draft(user, now_secs()) {
            Ok(_) => {
                self.mode = Mode::Insert;
                self.show_sidebar = true;
                self.drag = None;
            }
            Err(e) => self.error(e.to_string()),
        }
    }

    pub fn type_char(&mut self, c: char) {
        if let Some(body) = self.session.draft_body_mut() {
            body.push(c);
        }
    }

    pub fn backspace(&mut self) {
        if let Some(body) = self.session.draft_body_mut() {
            body.pop();
        }
    }

    pub fn cancel_draft(&mut self) {
        self.session.cancel_draft();
        self.session.clear_selection();
        self.mode = Mode::Normal;
    }

    /// `true` while a draft holds text that quitting would lose.
    pub fn has_unsaved_draft(&self) -> bool {
        self.session
            .draft()
            .is_some_and(|d| !d.comment.trim().is_empty())
    }

    pub fn submit_draft(&mut self) {
        let submission = match self.session.start_submit() {
            Ok(s) => s,
            Err(e) => {
                self.error(e.to_string());
                return;
            }
        };
        self.mode = Mode::Normal;
        self.info("saving…");
        let backend = self.backend.clone();
        tokio::spawn(async move {
            let result = backend.store.create(&submission.draft).await;
            let _ = backend.tx.send(AppEvent::Created(submission, result));
        });
    }

    pub fn on_created(&mut self, submission: Submission, result: Result<String>) {
        match self.session.finish_submit(submission, result) {
            Ok(Delivery::Applied) => {
                self.info("comment added");
                self.refresh();
            }
            Ok(Delivery::Stale) => {}
            Err(e) => self.error(format!("could not save comment: {e}")),
        }
    }

    // -----------------------------------------------------------------------
    // Cards
    // -----------------------------------------------------------------------

    /// Ids of the placed comment cards, top to bottom.
    fn card_ids(&self) -> Vec<String> {
        let source = if self.cards.is_empty() {
            self.session.positioned()
        } else {
            self.cards.clone()
        };
        source
            .into_iter()
            .filter_map(|c| match c.key {
                CardKey::Comment(id) => Some(id),
                CardKey::Draft => None,
            })
            .collect()
    }

    pub fn set_focus(&mut self, id: Option<String>) {
        if self.focused == id {
            return;
        }
        self.focused = id;
        if let Some(comment) = self.focused.as_deref().and_then(|id| self.session.comment(id)) {
            let line = comment.y.max(0.0) as usize;
            let height = usize::from(self.viewport_height.max(1));
            if line < self.scroll || line >= self.scroll + height {
                self.scroll = line.saturating_sub(height / 3);
            }
        }
        self.restyle();
    }

    pub fn focus_next_card(&mut self) {
        self.step_focus(1);
    }

    pub fn focus_prev_card(&mut self) {
        self.step_focus(-1);
    }

    fn step_focus(&mut self, delta: isize) {
        let ids = self.card_ids();
        if ids.is_empty() {
            return;
        }
        let next = match self
            .focused
            .as_ref()
            .and_then(|f| ids.iter().position(|id| id == f))
        {
            Some(i) => (i as isize + delta).rem_euclid(ids.len() as isize) as usize,
            None if delta >= 0 => 0,
            None => ids.len() - 1,
        };
        self.set_focus(ids.get(next).cloned());
    }

    pub fn hover(&mut self, id: Option<String>) {
        if self.hovered != id {
            self.hovered = id;
            self.restyle();
        }
    }

    /// Card under document row `row`, if any.
    pub fn card_at(&self, row: usize) -> Option<&PositionedComment> {
        let metrics = self.session.metrics();
        self.cards.iter().find(|c| {
            let top = c.top.max(0.0) as usize;
            let height = metrics.height_of(c).max(1.0) as usize;
            (top..top + height).contains(&row)
        })
    }

    pub fn resolve_focused(&mut self) {
        let Some(id) = self.focused.clone() else {
            self.error("no comment focused");
            return;
        };
        let ticket = match self.session.start_resolve(&id) {
            Ok(t) => t,
            Err(e) => {
                self.error(e.to_string());
                return;
            }
        };
        let backend = self.backend.clone();
        tokio::spawn(async move {
            let result = backend.store.resolve(&id).await;
            let _ = backend.tx.send(AppEvent::Resolved(ticket, id, result));
        });
    }

    pub fn on_resolved(&mut self, ticket: Ticket, id: String, result: Result<()>) {
        match self.session.finish_resolve(&ticket, &id, result) {
            Ok(Delivery::Applied) => {
                if self.focused.as_deref() == Some(id.as_str()) {
                    self.focused = None;
                }
                self.info("comment resolved");
                self.refresh();
            }
            Ok(Delivery::Stale) => {}
            Err(e) => self.error(format!("could not resolve comment: {e}")),
        }
    }

    pub fn toggle_sidebar(&mut self) {
        self.show_sidebar = !self.show_sidebar;
        if self.show_sidebar {
            self.refresh();
        }
    }

    // -----------------------------------------------------------------------
    // Scrolling
    // -----------------------------------------------------------------------

    fn max_scroll(&self) -> usize {
        self.page().flow.line_count().saturating_sub(1)
    }

    pub fn scroll_down(&mut self, lines: usize) {
        self.scroll = (self.scroll + lines).min(self.max_scroll());
    }

    pub fn scroll_up(&mut self, lines: usize) {
        self.scroll = self.scroll.saturating_sub(lines);
    }

    pub fn scroll_top(&mut self) {
        self.scroll = 0;
    }

    pub fn scroll_bottom(&mut self) {
        let height = usize::from(self.viewport_height);
        self.scroll = self.page().flow.line_count().saturating_sub(height);
    }

    pub fn half_page(&self) -> usize {
        usize::from(self.viewport_height / 2).max(1)
    }

    pub fn full_page(&self) -> usize {
        usize::from(self.viewport_height).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use tokio::sync::mpsc;

    const PAGE: &str = "<h1>Intro</h1><p>To get started we say hello world today.</p>";

    fn write_page(dir: &std::path::Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::File::create(&path)
            .unwrap()
            .write_all(body.as_bytes())
            .unwrap();
        path
    }

    async fn app() -> (App, mpsc::UnboundedReceiver<AppEvent>, tempfile::TempDir) {
        let dir = tempfile::TempDir::new().unwrap();
        let first = write_page(dir.path(), "intro.html", PAGE);
        let second = write_page(dir.path(), "next.html", "<p>other page</p>");
        let store = SqliteStore::open(&dir.path().join("c.db").to_string_lossy())
            .await
            .unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        let pages = vec![Page::load(&first).unwrap(), Page::load(&second).unwrap()];
        let config = Config::parse("[user]\nname = \"ada\"").unwrap();
        let mut app = App::new(pages, store, tx, &config);
        app.relayout(80);
        (app, rx, dir)
    }

    /// Feeds background answers back until one of the wanted kind arrives.
    async fn pump(app: &mut App, rx: &mut mpsc::UnboundedReceiver<AppEvent>) {
        match rx.recv().await.unwrap() {
            AppEvent::Permissions(t, p) => app.on_permissions(t, p),
            AppEvent::Loaded(t, r) => app.on_loaded(t, r),
            AppEvent::Created(s, r) => app.on_created(s, r),
            AppEvent::Resolved(t, id, r) => app.on_resolved(t, id, r),
            other => panic!("unexpected event {other:?}"),
        }
    }

    fn select_hello_world(app: &mut App) {
        // Line 2: "To get started we say hello world today."
        let line = app.page().flow.line(2);
        let hello = line.iter().find(|s| s.text == "hello").unwrap().col;
        let world = line.iter().find(|s| s.text == "world").unwrap().end_col();
        app.begin_drag(2, hello);
        app.extend_drag(2, world);
        app.finish_drag();
    }

    #[tokio::test]
    async fn draft_submit_focus_and_resolve() {
        let (mut app, mut rx, _dir) = app().await;
        app.start();
        pump(&mut app, &mut rx).await; // permissions
        pump(&mut app, &mut rx).await; // empty load
        assert!(app.session.permissions().can_comment);

        select_hello_world(&mut app);
        assert_eq!(app.session.selection().unwrap().text, "hello world");
        app.begin_draft();
        assert_eq!(app.mode, Mode::Insert);
        for c in "louder".chars() {
            app.type_char(c);
        }
        assert!(app.has_unsaved_draft());
        app.submit_draft();
        assert_eq!(app.mode, Mode::Normal);
        pump(&mut app, &mut rx).await; // created
        assert_eq!(app.status, Some(Status::Info("comment added".into())));
        assert!(app.session.draft().is_none());

        app.focus_next_card();
        let id = app.focused.clone().unwrap();
        let marked = app
            .page()
            .flow
            .line(2)
            .iter()
            .filter_map(|s| s.mark.as_ref())
            .all(|m| m.id == id && m.state == MarkerState::Active);
        assert!(marked);

        app.resolve_focused();
        pump(&mut app, &mut rx).await; // resolved
        assert!(app.focused.is_none());
        assert!(app.session.visible().is_empty());
        assert!(app.page().flow.line(2).iter().all(|s| s.mark.is_none()));
    }

    #[tokio::test]
    async fn leaving_a_page_drops_its_answers() {
        let (mut app, mut rx, _dir) = app().await;
        app.start();
        app.next_page();
        // Permissions for the first page arrive after navigation.
        pump(&mut app, &mut rx).await;
        assert_eq!(app.session.page(), app.page().key);
        assert!(app.page().key.ends_with("next.html"));
    }

    #[tokio::test]
    async fn drafts_need_a_selection() {
        let (mut app, mut rx, _dir) = app().await;
        app.start();
        pump(&mut app, &mut rx).await;
        app.begin_draft();
        assert_eq!(app.mode, Mode::Normal);
        assert!(matches!(app.status, Some(Status::Error(_))));
    }
}
