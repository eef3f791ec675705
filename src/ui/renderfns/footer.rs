use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

/// Severity of a status line message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashKind {
  Info,
  Error,
}

/// Draw the footer: breadcrumb on the left, latest status message after it
pub fn draw_footer(frame: &mut Frame, area: Rect, breadcrumb: &str, flash: Option<(&str, FlashKind)>) {
  let mut spans = vec![
    Span::raw(" "),
    Span::styled(breadcrumb.to_string(), Style::default().fg(Color::Cyan).bold()),
  ];

  if let Some((message, kind)) = flash {
    let color = match kind {
      FlashKind::Info => Color::Green,
      FlashKind::Error => Color::Red,
    };
    spans.push(Span::styled("  │  ", Style::default().fg(Color::DarkGray)));
    spans.push(Span::styled(message.to_string(), Style::default().fg(color)));
  }

  let paragraph = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
  frame.render_widget(paragraph, area);
}
