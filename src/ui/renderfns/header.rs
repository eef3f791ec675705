use crate::ui::view::ShortcutInfo;
use ratatui::prelude::*;
use ratatui::widgets::Paragraph;
use url::Url;

/// Draw the header bar with name, backend host, and the view's shortcuts
pub fn draw_header(frame: &mut Frame, area: Rect, api_url: &str, shortcuts: &[ShortcutInfo]) {
  let mut spans = vec![
    Span::styled(" codebook ", Style::default().fg(Color::Cyan).bold()),
    Span::styled("│", Style::default().fg(Color::DarkGray)),
    Span::styled(
      format!(" {} ", backend_host(api_url)),
      Style::default().fg(Color::White),
    ),
    Span::styled("│", Style::default().fg(Color::DarkGray)),
    Span::raw(" "),
  ];

  let mut sorted: Vec<&ShortcutInfo> = shortcuts.iter().collect();
  sorted.sort_by_key(|s| s.priority);
  for (i, shortcut) in sorted.into_iter().enumerate() {
    if i > 0 {
      spans.push(Span::raw("  "));
    }
    spans.push(Span::styled(
      format!("<{}>", shortcut.key),
      Style::default().fg(Color::Cyan),
    ));
    spans.push(Span::styled(
      format!(" {}", shortcut.label),
      Style::default().fg(Color::DarkGray),
    ));
  }

  let paragraph = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
  frame.render_widget(paragraph, area);
}

/// Host and port of the backend, or the raw string if it does not parse
fn backend_host(api_url: &str) -> String {
  match Url::parse(api_url) {
    Ok(url) => match (url.host_str(), url.port()) {
      (Some(host), Some(port)) => format!("{}:{}", host, port),
      (Some(host), None) => host.to_string(),
      _ => api_url.to_string(),
    },
    Err(_) => api_url.to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_backend_host() {
    assert_eq!(backend_host("http://localhost:8001/api"), "localhost:8001");
    assert_eq!(backend_host("https://expenses.example.com/api"), "expenses.example.com");
    assert_eq!(backend_host("not a url"), "not a url");
  }
}
