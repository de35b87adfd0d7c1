//! Keybinding dispatcher for marginalia.
//!
//! Translates raw crossterm key and mouse events into `App` calls and returns a
//! `KeyAction` telling the event loop whether to continue or quit. The
//! dispatcher branches first on `app.mode` so that HelpOverlay, ConfirmQuit,
//! Insert, and Normal each have an isolated handler.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};
use marginalia_core::CardKey;
use ratatui::layout::{Position, Rect};

use crate::app::{App, Mode};

/// Lines moved per scroll-wheel notch.
const WHEEL_LINES: usize = 3;

/// Control-flow signal returned from the dispatchers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Continue,
    Quit,
}

/// Dispatches a key event to the handler for the current mode.
pub fn handle_key(key: KeyEvent, app: &mut App) -> KeyAction {
    if app.mode != Mode::Insert {
        app.status = None;
    }
    match app.mode {
        Mode::HelpOverlay => handle_help(key, app),
        Mode::ConfirmQuit => handle_confirm_quit(key, app),
        Mode::Normal => handle_normal(key, app),
        Mode::Insert => handle_insert(key, app),
    }
}

// ---------------------------------------------------------------------------
// Normal mode
// ---------------------------------------------------------------------------

fn handle_normal(key: KeyEvent, app: &mut App) -> KeyAction {
    if handle_scroll_key(key, app) {
        return KeyAction::Continue;
    }

    match key.code {
        KeyCode::Char('q') => {
            if app.has_unsaved_draft() {
                app.mode = Mode::ConfirmQuit;
            } else {
                return KeyAction::Quit;
            }
        }
        KeyCode::Esc => {
            app.clear_selection();
            app.set_focus(None);
        }
        KeyCode::Char('?') => {
            app.help_scroll = 0;
            app.mode = Mode::HelpOverlay;
        }

        // Comments
        KeyCode::Char('c') => app.toggle_sidebar(),
        KeyCode::Char('a') => app.begin_draft(),
        KeyCode::Char('r') => app.resolve_focused(),
        KeyCode::Tab => app.focus_next_card(),
        KeyCode::BackTab => app.focus_prev_card(),

        // Pages
        KeyCode::Char('n') => app.next_page(),
        KeyCode::Char('p') => app.prev_page(),
        KeyCode::Char('R') => app.reload_page(),

        _ => {}
    }
    KeyAction::Continue
}

/// j / k / g / G and the Ctrl page keys. Returns `true` when consumed.
fn handle_scroll_key(key: KeyEvent, app: &mut App) -> bool {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Char('j') | KeyCode::Down => app.scroll_down(1),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_up(1),
        KeyCode::Char('g') | KeyCode::Home => app.scroll_top(),
        KeyCode::Char('G') | KeyCode::End => app.scroll_bottom(),
        KeyCode::Char('d') if ctrl => app.scroll_down(app.half_page()),
        KeyCode::Char('u') if ctrl => app.scroll_up(app.half_page()),
        KeyCode::Char('f') if ctrl => app.scroll_down(app.full_page()),
        KeyCode::Char('b') if ctrl => app.scroll_up(app.full_page()),
        KeyCode::PageDown => app.scroll_down(app.full_page()),
        KeyCode::PageUp => app.scroll_up(app.full_page()),
        _ => return false,
    }
    true
}

// ---------------------------------------------------------------------------
// HelpOverlay mode
// ---------------------------------------------------------------------------

fn handle_help(key: KeyEvent, app: &mut App) -> KeyAction {
    match key.code {
        KeyCode::Char('j') | KeyCode::Down => {
            app.help_scroll = app.help_scroll.saturating_add(1);
        }
        KeyCode::Char('k') | KeyCode::Up => {
            app.help_scroll = app.help_scroll.saturating_sub(1);
        }
        KeyCode::Char('g') => app.help_scroll = 0,
        KeyCode::Char('G') => app.help_scroll = u16::MAX,
        KeyCode::Char('?') | KeyCode::Esc | KeyCode::Char('q') => app.mode = Mode::Normal,
        _ => {}
    }
    KeyAction::Continue
}

// ---------------------------------------------------------------------------
// ConfirmQuit mode
// ---------------------------------------------------------------------------

fn handle_confirm_quit(key: KeyEvent, app: &mut App) -> KeyAction {
    match key.code {
        KeyCode::Char('y') | KeyCode::Char('Y') => KeyAction::Quit,
        KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
            app.mode = if app.session.draft().is_some() {
                Mode::Insert
            } else {
                Mode::Normal
            };
            KeyAction::Continue
        }
        _ => KeyAction::Continue,
    }
}

// ---------------------------------------------------------------------------
// Insert mode
// ---------------------------------------------------------------------------

/// Typing into the draft card.
fn handle_insert(key: KeyEvent, app: &mut App) -> KeyAction {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Esc => app.cancel_draft(),
        KeyCode::Enter => app.submit_draft(),
        KeyCode::Backspace => app.backspace(),
        KeyCode::Char('c') if ctrl => {
            if app.has_unsaved_draft() {
                app.mode = Mode::ConfirmQuit;
            } else {
                return KeyAction::Quit;
            }
        }
        KeyCode::Char(c) if !ctrl => app.type_char(c),
        _ => {}
    }
    KeyAction::Continue
}

// ---------------------------------------------------------------------------
// Mouse events
// ---------------------------------------------------------------------------

/// Drag-to-select and click-to-focus in the document, click-to-focus on
/// cards, hover, and the scroll wheel.
pub fn handle_mouse(mouse: MouseEvent, app: &mut App) -> KeyAction {
    let pos = Position {
        x: mouse.column,
        y: mouse.row,
    };
    match mouse.kind {
        MouseEventKind::Down(MouseButton::Left) if app.mode == Mode::Normal => {
            if app.doc_area.contains(pos) {
                let (line, col) = doc_point(app, pos);
                app.begin_drag(line, col);
            } else if let Some(id) = card_under(app, pos) {
                app.clear_selection();
                app.set_focus(Some(id));
            }
        }
        MouseEventKind::Drag(MouseButton::Left) => {
            if app.drag.is_some() {
                let (line, col) = doc_point(app, pos);
                app.extend_drag(line, col);
            }
        }
        MouseEventKind::Up(MouseButton::Left) => app.finish_drag(),
        MouseEventKind::Moved => {
            let hovered = if app.doc_area.contains(pos) {
                let (line, col) = doc_point(app, pos);
                app.page().flow.mark_at(line, col).map(str::to_owned)
            } else {
                card_under(app, pos)
            };
            app.hover(hovered);
        }
        MouseEventKind::ScrollUp => {
            if app.mode == Mode::HelpOverlay {
                app.help_scroll = app.help_scroll.saturating_sub(WHEEL_LINES as u16);
            } else {
                app.scroll_up(WHEEL_LINES);
            }
        }
        MouseEventKind::ScrollDown => {
            if app.mode == Mode::HelpOverlay {
                app.help_scroll = app.help_scroll.saturating_add(WHEEL_LINES as u16);
            } else {
                app.scroll_down(WHEEL_LINES);
            }
        }
        _ => {}
    }
    KeyAction::Continue
}

/// Screen position to document (line, column), clamped to the panel.
fn doc_point(app: &App, pos: Position) -> (usize, usize) {
    let area = app.doc_area;
    let (row, col) = clamp(area, pos);
    (app.scroll + row, col)
}

fn clamp(area: Rect, pos: Position) -> (usize, usize) {
    let x = pos.x.clamp(area.x, area.right().saturating_sub(1).max(area.x));
    let y = pos.y.clamp(area.y, area.bottom().saturating_sub(1).max(area.y));
    (usize::from(y - area.y), usize::from(x - area.x))
}

/// Id of the comment card under a sidebar position.
fn card_under(app: &App, pos: Position) -> Option<String> {
    if app.sidebar_area.width == 0 || !app.sidebar_area.contains(pos) {
        return None;
    }
    let row = app.scroll + usize::from(pos.y - app.sidebar_area.y);
    match &app.card_at(row)?.key {
        CardKey::Comment(id) => Some(id.clone()),
        CardKey::Draft => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_clamp_to_the_panel() {
        let area = Rect::new(1, 1, 10, 5);
        assert_eq!(clamp(area, Position { x: 3, y: 2 }), (1, 2));
        assert_eq!(clamp(area, Position { x: 0, y: 0 }), (0, 0));
        assert_eq!(clamp(area, Position { x: 40, y: 40 }), (4, 9));
    }
}
