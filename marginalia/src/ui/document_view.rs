//! Document panel renderer.
//!
//! Draws the visible slice of the current page's [`Flow`](crate::page::Flow),
//! styling each segment by emphasis, comment marker state, and the live
//! mouse selection.

use marginalia_core::MarkerState;
use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

use crate::app::{App, Drag, Mode};
use crate::page::{Emphasis, Segment, SegmentKind};
use crate::theme::Theme;
use crate::ui::layout::{inner_rect, panel_block};

pub fn render_document(frame: &mut Frame, area: Rect, app: &App, theme: &Theme) {
    let page = app.page();
    let block = panel_block(format!(" {} ", page.title), app.mode != Mode::Insert, theme);
    let inner = inner_rect(area);
    frame.render_widget(block, area);

    let lines: Vec<Line> = (app.scroll..app.scroll + usize::from(inner.height))
        .map(|n| render_line(page.flow.line(n), n, app.drag.as_ref(), theme))
        .collect();
    frame.render_widget(Paragraph::new(lines), inner);
}

fn render_line<'a>(
    segments: &'a [Segment],
    line: usize,
    drag: Option<&Drag>,
    theme: &Theme,
) -> Line<'a> {
    let mut spans = Vec::with_capacity(segments.len() * 2);
    let mut col = 0;
    let mut prev_mark: Option<&str> = None;
    for seg in segments {
        if seg.col > col {
            // Gaps inside one marker keep its background.
            let gap_style = match (prev_mark, &seg.mark) {
                (Some(a), Some(m)) if a == m.id => mark_style(Style::default(), m.state, theme),
                _ => Style::default(),
            };
            spans.push(Span::styled(" ".repeat(seg.col - col), gap_style));
        }
        spans.push(Span::styled(seg.text.as_str(), segment_style(seg, line, drag, theme)));
        col = seg.end_col();
        prev_mark = seg.mark.as_ref().map(|m| m.id.as_str());
    }
    Line::from(spans)
}

fn segment_style(seg: &Segment, line: usize, drag: Option<&Drag>, theme: &Theme) -> Style {
    let mut style = match (seg.kind, seg.emphasis) {
        (SegmentKind::Image, _) => Style::default()
            .fg(theme.image)
            .add_modifier(Modifier::ITALIC),
        (SegmentKind::Decoration, _) => Style::default().fg(theme.border_inactive),
        (_, Emphasis::Heading) => Style::default()
            .fg(theme.heading)
            .add_modifier(Modifier::BOLD),
        (_, Emphasis::Code) => Style::default().fg(theme.code),
        (_, Emphasis::Link) => Style::default()
            .fg(theme.link)
            .add_modifier(Modifier::UNDERLINED),
        (_, Emphasis::Plain) => Style::default().fg(theme.text),
    };
    if let Some(mark) = &seg.mark {
        style = mark_style(style, mark.state, theme);
    }
    if let Some(drag) = drag {
        let (start, end) = drag.ordered();
        if (line, seg.end_col()) > start && (line, seg.col) < end {
            style = style.bg(theme.selection_bg);
        }
    }
    style
}

fn mark_style(style: Style, state: MarkerState, theme: &Theme) -> Style {
    match state {
        MarkerState::Idle => style.bg(theme.mark_bg),
        MarkerState::Hovered => style.bg(theme.mark_hovered_bg),
        MarkerState::Active => style
            .bg(theme.mark_active_bg)
            .add_modifier(Modifier::BOLD),
    }
}
