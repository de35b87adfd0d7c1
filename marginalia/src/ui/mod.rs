//! UI rendering for marginalia.
//!
//! `render()` is the single entry point called by the event loop's
//! `terminal.draw()` closure. Layout arithmetic lives in `layout.rs`; the
//! document panel in `document_view.rs` and the comment cards in `sidebar.rs`.

mod layout;
pub mod document_view;
pub mod help;
pub mod keybindings;
pub mod sidebar;

use ratatui::Frame;

use crate::app::{App, Mode};
use crate::theme::Theme;
use layout::{compute_layout, inner_rect, render_status_bar};

/// Renders one complete frame.
///
/// Panel rects and the viewport height are cached on `app` before drawing so
/// the next key or mouse event can hit-test and page against this frame. A
/// width change re-flows the page and re-anchors comments before the document
/// is drawn.
pub fn render(frame: &mut Frame, app: &mut App, theme: &Theme) {
    let [document, sidebar, status_bar] = compute_layout(frame, app.show_sidebar);

    let doc_inner = inner_rect(document);
    app.doc_area = doc_inner;
    app.sidebar_area = if sidebar.width > 0 {
        inner_rect(sidebar)
    } else {
        Default::default()
    };
    app.viewport_height = doc_inner.height;
    app.relayout(usize::from(doc_inner.width.max(1)));

    document_view::render_document(frame, document, app, theme);
    if sidebar.width > 0 {
        sidebar::render_sidebar(frame, sidebar, app, theme);
    } else {
        app.cards.clear();
    }
    render_status_bar(frame, status_bar, app, theme);

    match app.mode {
        Mode::HelpOverlay => help::render_help_overlay(frame, theme, app.help_scroll),
        Mode::ConfirmQuit => help::render_confirm_quit(frame, theme),
        Mode::Normal | Mode::Insert => {}
    }
}
