use crossterm::event::KeyEvent;
use ratatui::prelude::*;

use super::renderfns::FlashKind;

/// A keyboard shortcut hint for display in the header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortcutInfo {
  pub key: &'static str,
  pub label: &'static str,
  pub priority: u8, // Lower = shown first
}

impl ShortcutInfo {
  pub const fn new(key: &'static str, label: &'static str) -> Self {
    Self {
      key,
      label,
      priority: 100,
    }
  }

  pub const fn with_priority(mut self, priority: u8) -> Self {
    self.priority = priority;
    self
  }
}

/// Actions a view can request from the App
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewAction {
  None,
  Quit,
  /// Rebuild the view from a fresh cache
  Reload,
}

/// Trait for view behavior
///
/// Views own their local UI state and read server state from the query
/// cache on every render, so a redraw always reflects the latest cache value.
pub trait View {
  /// Handle a key event, returning an action for App to execute
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction;

  /// Render the view to the frame
  fn render(&mut self, frame: &mut Frame, area: Rect);

  /// Label shown in the footer
  fn breadcrumb_label(&self) -> String;

  /// Called on each tick to collect finished background work
  fn tick(&mut self) {}

  /// Latest status message, if any
  fn flash(&self) -> Option<(&str, FlashKind)> {
    None
  }

  /// Keyboard shortcuts to display in the header
  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![ShortcutInfo::new("q", "quit").with_priority(90)]
  }
}
