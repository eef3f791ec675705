use ratatui::prelude::*;

/// Truncate to at most `max_len` characters, ending in "..." when cut
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

/// Active/Inactive badge for an entity row
pub fn active_badge(is_active: bool) -> Span<'static> {
  if is_active {
    Span::styled(" Active ", Style::default().fg(Color::Black).bg(Color::Green))
  } else {
    Span::styled(
      "Inactive",
      Style::default().fg(Color::White).bg(Color::DarkGray),
    )
  }
}
