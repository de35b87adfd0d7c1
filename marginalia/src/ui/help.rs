//! Help overlay and quit-confirmation dialog.
//!
//! Both are drawn as centred modals over the panels inside the same
//! `terminal.draw()` closure: `Clear` erases the area first, then a bordered
//! `Paragraph` draws on top.

use ratatui::{
    layout::Constraint,
    style::Style,
    text::{Line, Text},
    widgets::{Block, Clear, Paragraph, Wrap},
    Frame,
};

use crate::theme::Theme;

/// Draws the keybinding reference, scrolled by `help_scroll` rows. Skipped on
/// terminals too narrow to fit it.
pub fn render_help_overlay(frame: &mut Frame, theme: &Theme, help_scroll: u16) {
    if frame.area().width < 60 {
        return;
    }

    let overlay_area = frame
        .area()
        .centered(Constraint::Percentage(80), Constraint::Percentage(80));
    frame.render_widget(Clear, overlay_area);

    let block = Block::bordered()
        .title(" Help  (j/k scroll, ? or Esc to close) ")
        .border_style(Style::default().fg(theme.border_active));

    frame.render_widget(
        Paragraph::new(build_help_text())
            .block(block)
            .wrap(Wrap { trim: false })
            .scroll((help_scroll, 0)),
        overlay_area,
    );
}

fn build_help_text() -> Text<'static> {
    Text::from(vec![
        Line::from("Reading"),
        Line::from("  j / k         Scroll down / up one line"),
        Line::from("  g / G         Jump to top / bottom"),
        Line::from("  Ctrl-d / u    Scroll half page down / up"),
        Line::from("  Ctrl-f / b    Scroll full page down / up"),
        Line::from("  n / p         Next / previous page"),
        Line::from("  R             Reload the page from disk"),
        Line::from(""),
        Line::from("Selecting"),
        Line::from("  drag          Select text or an image"),
        Line::from("  click         Focus the comment under the pointer"),
        Line::from("  Esc           Clear the selection and focus"),
        Line::from(""),
        Line::from("Comments"),
        Line::from("  c             Show / hide the comment sidebar"),
        Line::from("  a             Comment on the selection"),
        Line::from("  Tab / S-Tab   Focus next / previous comment"),
        Line::from("  r             Resolve the focused comment"),
        Line::from(""),
        Line::from("Writing a comment"),
        Line::from("  Enter         Save"),
        Line::from("  Esc           Discard the draft"),
        Line::from(""),
        Line::from("General"),
        Line::from("  ?             Open / close this help"),
        Line::from("  q             Quit (confirms if a draft has text)"),
    ])
}

/// Small centred y/n dialog shown while a draft would be lost.
pub fn render_confirm_quit(frame: &mut Frame, theme: &Theme) {
    let area = frame
        .area()
        .centered(Constraint::Length(44), Constraint::Length(5));
    frame.render_widget(Clear, area);

    let block = Block::bordered()
        .title(" Quit? ")
        .border_style(Style::default().fg(theme.status_error));
    frame.render_widget(
        Paragraph::new(vec![
            Line::from("The comment you are writing is not saved."),
            Line::from(""),
            Line::from("y quit    n keep writing"),
        ])
        .block(block)
        .centered(),
        area,
    );
}
