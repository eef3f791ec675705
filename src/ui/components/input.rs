use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// Result of handling a key event in a text input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputResult {
  /// The value changed
  Edited,
  /// Only the cursor moved
  Moved,
  /// Key not handled, pass to next handler
  NotHandled,
}

/// Single-line text input. The cursor counts characters, not bytes.
#[derive(Debug, Clone, Default)]
pub struct TextInput {
  chars: Vec<char>,
  cursor: usize,
}

impl TextInput {
  /// Input pre-filled with `value`, cursor at the end
  pub fn with_value(value: &str) -> Self {
    let chars: Vec<char> = value.chars().collect();
    let cursor = chars.len();
    Self { chars, cursor }
  }

  pub fn value(&self) -> String {
    self.chars.iter().collect()
  }

  pub fn handle_key(&mut self, key: KeyEvent) -> InputResult {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
      KeyCode::Backspace if self.cursor > 0 => {
        self.cursor -= 1;
        self.chars.remove(self.cursor);
        InputResult::Edited
      }
      KeyCode::Delete if self.cursor < self.chars.len() => {
        self.chars.remove(self.cursor);
        InputResult::Edited
      }
      KeyCode::Backspace | KeyCode::Delete => InputResult::Moved,
      KeyCode::Left => {
        self.cursor = self.cursor.saturating_sub(1);
        InputResult::Moved
      }
      KeyCode::Right => {
        self.cursor = (self.cursor + 1).min(self.chars.len());
        InputResult::Moved
      }
      KeyCode::Home => {
        self.cursor = 0;
        InputResult::Moved
      }
      KeyCode::End => {
        self.cursor = self.chars.len();
        InputResult::Moved
      }
      KeyCode::Char('a') if ctrl => {
        self.cursor = 0;
        InputResult::Moved
      }
      KeyCode::Char('e') if ctrl => {
        self.cursor = self.chars.len();
        InputResult::Moved
      }
      KeyCode::Char('u') if ctrl => {
        // Clear line before cursor
        self.chars.drain(..self.cursor);
        self.cursor = 0;
        InputResult::Edited
      }
      KeyCode::Char('w') if ctrl => {
        // Delete word before cursor
        let mut start = self.cursor;
        while start > 0 && self.chars[start - 1] == ' ' {
          start -= 1;
        }
        while start > 0 && self.chars[start - 1] != ' ' {
          start -= 1;
        }
        self.chars.drain(start..self.cursor);
        self.cursor = start;
        InputResult::Edited
      }
      KeyCode::Char(_) if ctrl => InputResult::NotHandled,
      KeyCode::Char(c) => {
        self.chars.insert(self.cursor, c);
        self.cursor += 1;
        InputResult::Edited
      }
      _ => InputResult::NotHandled,
    }
  }

  /// Cursor position in characters, for rendering
  pub fn cursor_position(&self) -> usize {
    self.cursor
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
  }

  fn ctrl_key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::CONTROL)
  }

  fn typed(text: &str) -> TextInput {
    let mut input = TextInput::default();
    for c in text.chars() {
      input.handle_key(key(KeyCode::Char(c)));
    }
    input
  }

  #[test]
  fn test_basic_input() {
    let input = typed("hi");
    assert_eq!(input.value(), "hi");
    assert_eq!(input.cursor_position(), 2);
  }

  #[test]
  fn test_multibyte_editing() {
    let mut input = typed("café");
    input.handle_key(key(KeyCode::Left));
    input.handle_key(key(KeyCode::Backspace));
    assert_eq!(input.value(), "caé");
    assert_eq!(input.cursor_position(), 2);
  }

  #[test]
  fn test_cursor_movement() {
    let mut input = typed("ac");
    input.handle_key(key(KeyCode::Left));
    input.handle_key(key(KeyCode::Char('b')));
    assert_eq!(input.value(), "abc");
  }

  #[test]
  fn test_with_value_places_cursor_at_end() {
    let mut input = TextInput::with_value("Travel");
    input.handle_key(key(KeyCode::Char('s')));
    assert_eq!(input.value(), "Travels");
  }

  #[test]
  fn test_ctrl_u_clear_before_cursor() {
    let mut input = typed("hello world");
    for _ in 0..5 {
      input.handle_key(key(KeyCode::Left));
    }
    input.handle_key(ctrl_key(KeyCode::Char('u')));
    assert_eq!(input.value(), "world");
  }

  #[test]
  fn test_ctrl_w_deletes_previous_word() {
    let mut input = typed("office supplies ");
    assert_eq!(input.handle_key(ctrl_key(KeyCode::Char('w'))), InputResult::Edited);
    assert_eq!(input.value(), "office ");
  }

  #[test]
  fn test_navigation_keys_pass_through() {
    let mut input = typed("x");
    assert_eq!(input.handle_key(key(KeyCode::Tab)), InputResult::NotHandled);
    assert_eq!(input.handle_key(key(KeyCode::Enter)), InputResult::NotHandled);
    assert_eq!(input.handle_key(key(KeyCode::Esc)), InputResult::NotHandled);
  }
}
