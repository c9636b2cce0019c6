//! Custom TUI widgets

use crate::keyboard::KeyEvent;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Widget},
};

/// Live capture panel: instructions, event count and the last record
pub struct LivePanel<'a> {
    events: &'a [KeyEvent],
    stop_key: &'a str,
}

impl<'a> LivePanel<'a> {
    pub fn new(events: &'a [KeyEvent], stop_key: &'a str) -> Self {
        Self { events, stop_key }
    }

    /// Text of the last-record line, if any event was recorded
    pub fn last_line(&self) -> Option<String> {
        self.events.last().map(|e| {
            format!(
                "Last: [{}] {} {} t={:.3}ms{}",
                e.seq,
                e.event_type,
                e.character,
                e.timestamp_ms,
                if e.is_repeat { " (repeat)" } else { "" }
            )
        })
    }
}

impl<'a> Widget for LivePanel<'a> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = Block::default()
            .title(" Keyboard Timing ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan));

        let inner = block.inner(area);
        block.render(area, buf);

        let label = Style::default().fg(Color::White).add_modifier(Modifier::BOLD);

        let mut lines = vec![
            Line::from(Span::styled("Press keys to record timing.", label)),
            Line::from(Span::styled(
                format!("Press {} to stop and save.", self.stop_key),
                label,
            )),
            Line::from(""),
            Line::from(vec![
                Span::styled("Events: ", label),
                Span::styled(self.events.len().to_string(), Style::default().fg(Color::Green)),
            ]),
        ];
        if let Some(last) = self.last_line() {
            lines.push(Line::from(Span::styled(last, Style::default().fg(Color::Yellow))));
        }

        for (offset, line) in lines.iter().enumerate() {
            let y = inner.y + offset as u16;
            if y >= inner.y + inner.height {
                break;
            }
            buf.set_line(inner.x + 1, y, line, inner.width.saturating_sub(1));
        }
    }
}
