//! Comment sidebar renderer.
//!
//! Cards are drawn as text with box-drawing borders so the whole sidebar is
//! one column of lines that scrolls together with the document. Each frame
//! measures every card, records its height with the session, asks the
//! session for positions, then paints the cards at those rows.

use marginalia_core::{CardKey, Comment, CommentKind, Draft};
use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Paragraph, Wrap},
    Frame,
};

use crate::app::{App, Mode};
use crate::theme::Theme;
use crate::ui::layout::{inner_rect, panel_block};

/// Quoted anchor text is cut after this many lines.
const QUOTE_LINES: usize = 2;

pub fn render_sidebar(frame: &mut Frame, area: Rect, app: &mut App, theme: &Theme) {
    let count = app.session.visible().len();
    let block = panel_block(format!(" Comments ({count}) "), app.mode == Mode::Insert, theme);
    let inner = inner_rect(area);
    frame.render_widget(block, area);

    if !app.session.permissions().can_view {
        app.cards.clear();
        frame.render_widget(
            Paragraph::new("Comments are hidden on this page.")
                .style(Style::default().fg(theme.card_hint))
                .wrap(Wrap { trim: true }),
            inner,
        );
        return;
    }

    let width = usize::from(inner.width);
    let mut rendered: Vec<(CardKey, Vec<Line<'static>>)> = app
        .session
        .visible()
        .into_iter()
        .map(|c| {
            let focused = app.focused.as_deref() == Some(c.id.as_str());
            (CardKey::Comment(c.id.clone()), comment_card(c, width, focused, theme))
        })
        .collect();
    if let Some(draft) = app.session.draft() {
        let editing = app.mode == Mode::Insert;
        rendered.push((CardKey::Draft, draft_card(draft, width, editing, theme)));
    }
    for (key, lines) in &rendered {
        app.session.record_height(key.clone(), lines.len() as f64);
    }
    app.cards = app.session.positioned();

    let mut column: Vec<Line<'static>> = Vec::new();
    for card in &app.cards {
        let top = card.top.max(0.0).round() as usize;
        if column.len() < top {
            column.resize(top, Line::default());
        }
        if let Some(i) = rendered.iter().position(|(k, _)| *k == card.key) {
            let (_, lines) = rendered.swap_remove(i);
            column.extend(lines);
        }
    }

    let visible: Vec<Line<'static>> = column
        .into_iter()
        .skip(app.scroll)
        .take(usize::from(inner.height))
        .collect();
    frame.render_widget(Paragraph::new(visible), inner);
}

fn comment_card(comment: &Comment, width: usize, focused: bool, theme: &Theme) -> Vec<Line<'static>> {
    let border = Style::default().fg(if focused {
        theme.card_focused
    } else {
        theme.card_border
    });
    let inner = width.saturating_sub(4).max(1);
    let author = Style::default()
        .fg(theme.card_author)
        .add_modifier(Modifier::BOLD);

    let mut lines = vec![top_border(&comment.user, author, width, border)];
    let quote = Style::default()
        .fg(theme.card_quote)
        .add_modifier(Modifier::ITALIC);
    for l in quote_lines(comment.kind, comment.text(), inner) {
        lines.push(body_line(l, quote, inner, border));
    }
    for l in wrap(&comment.comment, inner) {
        lines.push(body_line(l, Style::default().fg(theme.text), inner, border));
    }
    lines.push(bottom_border(width, border));
    lines
}

fn draft_card(draft: &Draft, width: usize, editing: bool, theme: &Theme) -> Vec<Line<'static>> {
    let border = Style::default().fg(theme.card_draft);
    let inner = width.saturating_sub(4).max(1);
    let title = Style::default()
        .fg(theme.card_draft)
        .add_modifier(Modifier::BOLD);
    let hint = Style::default().fg(theme.card_hint);

    let mut lines = vec![top_border("new comment", title, width, border)];
    let quote = Style::default()
        .fg(theme.card_quote)
        .add_modifier(Modifier::ITALIC);
    for l in quote_lines(draft.kind, draft.anchor.text(), inner) {
        lines.push(body_line(l, quote, inner, border));
    }
    if draft.comment.is_empty() {
        let placeholder = if editing { "▏type your comment" } else { "(empty)" };
        lines.push(body_line(placeholder.to_owned(), hint, inner, border));
    } else {
        let mut body = draft.comment.clone();
        if editing {
            body.push('▏');
        }
        for l in wrap(&body, inner) {
            lines.push(body_line(l, Style::default().fg(theme.text), inner, border));
        }
    }
    let help = if editing { "⏎ save  esc cancel" } else { "saving…" };
    lines.push(body_line(help.to_owned(), hint, inner, border));
    lines.push(bottom_border(width, border));
    lines
}

fn quote_lines(kind: CommentKind, text: &str, width: usize) -> Vec<String> {
    let quoted = match kind {
        CommentKind::Text => format!("“{}”", text.split_whitespace().collect::<Vec<_>>().join(" ")),
        CommentKind::Image => format!("[image: {}]", text.trim()),
    };
    let mut lines = wrap(&quoted, width);
    if lines.len() > QUOTE_LINES {
        lines.truncate(QUOTE_LINES);
        if let Some(last) = lines.last_mut() {
            *last = truncate(last, width.saturating_sub(1));
            last.push('…');
        }
    }
    lines
}

fn top_border(label: &str, label_style: Style, width: usize, border: Style) -> Line<'static> {
    let label = truncate(label, width.saturating_sub(6));
    let used = 4 + label.chars().count();
    let fill = width.saturating_sub(used + 1);
    Line::from(vec![
        Span::styled("┌─ ", border),
        Span::styled(label, label_style),
        Span::styled(format!(" {}┐", "─".repeat(fill)), border),
    ])
}

fn body_line(text: String, style: Style, inner: usize, border: Style) -> Line<'static> {
    let text = truncate(&text, inner);
    let pad = inner.saturating_sub(text.chars().count());
    Line::from(vec![
        Span::styled("│ ", border),
        Span::styled(text, style),
        Span::styled(format!("{} │", " ".repeat(pad)), border),
    ])
}

fn bottom_border(width: usize, border: Style) -> Line<'static> {
    Line::from(Span::styled(
        format!("└{}┘", "─".repeat(width.saturating_sub(2))),
        border,
    ))
}

fn truncate(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

/// Greedy word wrap; words longer than `width` are split.
pub fn wrap(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut line = String::new();
        let mut len = 0;
        for word in paragraph.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();
            while word.len() > width {
                if len > 0 {
                    lines.push(std::mem::take(&mut line));
                    len = 0;
                }
                let rest = word.split_off(width);
                lines.push(word.into_iter().collect());
                word = rest;
            }
            let extra = usize::from(len > 0);
            if len + extra + word.len() > width {
                lines.push(std::mem::take(&mut line));
                len = 0;
            } else if len > 0 {
                line.push(' ');
                len += 1;
            }
            len += word.len();
            line.extend(word);
        }
        if len > 0 {
            lines.push(line);
        }
    }
    lines
}
