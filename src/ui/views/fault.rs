use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};

/// Shown in place of a view that panicked while rendering or handling input.
pub struct FaultView {
  message: String,
}

impl FaultView {
  pub fn new(message: impl Into<String>) -> Self {
    Self {
      message: message.into(),
    }
  }
}

impl View for FaultView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match key.code {
      KeyCode::Char('r') => ViewAction::Reload,
      KeyCode::Char('q') | KeyCode::Esc => ViewAction::Quit,
      _ => ViewAction::None,
    }
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let block = Block::default()
      .title(" Error ")
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Red));

    let lines = vec![
      Line::styled("Something went wrong", Style::default().fg(Color::Red).bold()),
      Line::raw(""),
      Line::styled(self.message.as_str(), Style::default().fg(Color::Gray)),
      Line::raw(""),
      Line::styled(
        "Press r to reload or q to quit",
        Style::default().fg(Color::DarkGray),
      ),
    ];

    let paragraph = Paragraph::new(lines)
      .block(block)
      .wrap(Wrap { trim: false })
      .alignment(Alignment::Center);
    frame.render_widget(paragraph, area);
  }

  fn breadcrumb_label(&self) -> String {
    "Error".to_string()
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new("r", "reload").with_priority(10),
      ShortcutInfo::new("q", "quit").with_priority(90),
    ]
  }
}
