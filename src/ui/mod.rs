pub mod components;
pub mod renderfns;
pub mod view;
pub mod views;

use ratatui::prelude::*;
use ratatui::widgets::ListState;

use renderfns::{draw_footer, draw_header};
use view::View;

/// Main draw function
pub fn draw(frame: &mut Frame, view: &mut dyn View, api_url: &str) {
  let chunks = Layout::default()
    .direction(Direction::Vertical)
    .constraints([
      Constraint::Length(1), // Header
      Constraint::Min(1),    // Main content
      Constraint::Length(1), // Footer
    ])
    .split(frame.area());

  draw_header(frame, chunks[0], api_url, &view.shortcuts());
  view.render(frame, chunks[1]);
  draw_footer(frame, chunks[2], &view.breadcrumb_label(), view.flash());
}

/// Keep a list selection inside `0..len`, selecting the first row when
/// nothing is selected yet.
pub fn ensure_valid_selection(state: &mut ListState, len: usize) {
  if len == 0 {
    state.select(None);
    return;
  }
  match state.selected() {
    Some(i) if i >= len => state.select(Some(len - 1)),
    None => state.select(Some(0)),
    _ => {}
  }
}
