//! Panel layout for marginalia.
//!
//! Pure layout arithmetic: called inside `terminal.draw()` on every render so
//! each frame reflects the current terminal size.
//!
//! The document fills the width; the comment sidebar takes a third of it
//! (at least [`SIDEBAR_MIN`] columns) when shown and the terminal is wide
//! enough. `Spacing::Overlap(1)` with `MergeStrategy::Fuzzy` lets adjacent
//! borders share a column.

use ratatui::{
    layout::{Constraint, Layout, Margin, Rect, Spacing},
    style::{Modifier, Style},
    symbols::merge::MergeStrategy,
    text::{Line, Span},
    widgets::{Block, BorderType, Paragraph},
    Frame,
};

use crate::app::{App, Mode, Status};
use crate::theme::Theme;

/// Narrowest useful sidebar.
pub const SIDEBAR_MIN: u16 = 28;

/// Below this width the sidebar is not drawn even when toggled on.
const SIDEBAR_BREAKPOINT: u16 = 70;

/// Returns `[document, sidebar, status_bar]` for the current frame.
pub fn compute_layout(frame: &Frame, show_sidebar: bool) -> [Rect; 3] {
    let area = frame.area();
    let [main_area, status_bar] =
        area.layout(&Layout::vertical([Constraint::Fill(1), Constraint::Length(1)]));

    let sidebar_width = if show_sidebar && area.width >= SIDEBAR_BREAKPOINT {
        (area.width / 3).max(SIDEBAR_MIN)
    } else {
        0
    };
    let [document, sidebar] = main_area.layout(
        &Layout::horizontal([Constraint::Fill(1), Constraint::Length(sidebar_width)])
            .spacing(Spacing::Overlap(1)),
    );
    [document, sidebar, status_bar]
}

/// The inner `Rect` of a panel after its 1-cell border.
pub fn inner_rect(area: Rect) -> Rect {
    area.inner(Margin {
        vertical: 1,
        horizontal: 1,
    })
}

/// Bordered block; thick when `is_focused`.
pub fn panel_block<'a>(title: String, is_focused: bool, theme: &Theme) -> Block<'a> {
    let border_style = if is_focused {
        Style::default().fg(theme.border_active)
    } else {
        Style::default().fg(theme.border_inactive)
    };
    let border_type = if is_focused {
        BorderType::Thick
    } else {
        BorderType::Plain
    };

    Block::bordered()
        .title(title)
        .border_type(border_type)
        .border_style(border_style)
        .merge_borders(MergeStrategy::Fuzzy)
}

/// Mode, page, comment count and the latest status message.
pub fn render_status_bar(frame: &mut Frame, area: Rect, app: &App, theme: &Theme) {
    let (mode_text, mode_fg) = match app.mode {
        Mode::Insert => (" INSERT ", theme.status_mode_insert),
        Mode::Normal | Mode::ConfirmQuit | Mode::HelpOverlay => {
            (" NORMAL ", theme.status_mode_normal)
        }
    };

    let mut spans = vec![
        Span::styled(
            mode_text,
            Style::default().fg(mode_fg).add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!(
            " {} ({}/{}) ",
            app.page().key,
            app.current + 1,
            app.pages.len()
        )),
    ];

    let permissions = app.session.permissions();
    let count = app.session.visible().len();
    spans.push(Span::raw(match (permissions.can_view, permissions.can_comment) {
        (false, _) => " comments hidden ".to_owned(),
        (true, false) => format!(" {count} comments, read only "),
        (true, true) => format!(" {count} comments "),
    }));
    if let Some(user) = app.user() {
        spans.push(Span::raw(format!(" {} ", user.name)));
    }

    match &app.status {
        Some(Status::Info(msg)) => spans.push(Span::raw(format!(" {msg}"))),
        Some(Status::Error(msg)) => spans.push(Span::styled(
            format!(" {msg}"),
            Style::default()
                .fg(theme.status_error)
                .add_modifier(Modifier::BOLD),
        )),
        None => {}
    }

    frame.render_widget(
        Paragraph::new(Line::from(spans))
            .style(Style::default().bg(theme.status_bar_bg).fg(theme.status_bar_fg)),
        area,
    );
}
