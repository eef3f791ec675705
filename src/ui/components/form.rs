use super::input::{InputResult, TextInput};
use super::KeyResult;
use crate::api::{Category, ExpenseCode};
use crate::mutation::Mutation;
use crate::validation::{self, Field, ValidationError};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear, Paragraph};

/// What a form creates or edits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormKind {
  CreateCategory,
  EditCategory(i64),
  /// New code under the given category
  CreateCode(i64),
  EditCode(i64),
}

/// Events emitted by the form that the parent view handles
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormEvent {
  Submit,
  Cancel,
}

#[derive(Debug, Clone)]
struct TextField {
  field: Field,
  label: &'static str,
  input: TextInput,
}

impl TextField {
  fn new(field: Field, label: &'static str, value: &str) -> Self {
    Self {
      field,
      label,
      input: TextInput::with_value(value),
    }
  }
}

/// Modal create/edit form
#[derive(Debug, Clone)]
pub struct FormModal {
  kind: FormKind,
  title: String,
  fields: Vec<TextField>,
  /// Active checkbox, only on edit forms
  active: Option<bool>,
  focus: usize,
  error: Option<String>,
  pending: bool,
}

impl FormModal {
  fn new(kind: FormKind, title: String, fields: Vec<TextField>, active: Option<bool>) -> Self {
    Self {
      kind,
      title,
      fields,
      active,
      focus: 0,
      error: None,
      pending: false,
    }
  }

  pub fn create_category() -> Self {
    Self::new(
      FormKind::CreateCategory,
      "New category".to_string(),
      vec![TextField::new(Field::Name, "Name", "")],
      None,
    )
  }

  pub fn edit_category(category: &Category) -> Self {
    Self::new(
      FormKind::EditCategory(category.id),
      format!("Edit category '{}'", category.name),
      vec![TextField::new(Field::Name, "Name", &category.name)],
      Some(category.is_active),
    )
  }

  pub fn create_code(category: &Category) -> Self {
    Self::new(
      FormKind::CreateCode(category.id),
      format!("New code in '{}'", category.name),
      vec![
        TextField::new(Field::Code, "Code", ""),
        TextField::new(Field::Description, "Description (optional)", ""),
      ],
      None,
    )
  }

  /// Codes keep their code string; only description and status are editable.
  pub fn edit_code(code: &ExpenseCode) -> Self {
    Self::new(
      FormKind::EditCode(code.id),
      format!("Edit code '{}'", code.code),
      vec![TextField::new(
        Field::Description,
        "Description (optional)",
        code.description.as_deref().unwrap_or(""),
      )],
      Some(code.is_active),
    )
  }

  #[cfg(test)]
  pub fn error(&self) -> Option<&str> {
    self.error.as_deref()
  }

  pub fn set_error(&mut self, message: impl Into<String>) {
    self.error = Some(message.into());
  }

  pub fn is_pending(&self) -> bool {
    self.pending
  }

  pub fn set_pending(&mut self, pending: bool) {
    self.pending = pending;
  }

  fn text(&self, field: Field) -> String {
    self
      .fields
      .iter()
      .find(|f| f.field == field)
      .map(|f| f.input.value())
      .unwrap_or_default()
  }

  /// Validate the current input into a mutation.
  pub fn mutation(&self) -> Result<Mutation, ValidationError> {
    let active = self.active.unwrap_or(true);
    match self.kind {
      FormKind::CreateCategory => {
        validation::create_category(&self.text(Field::Name)).map(Mutation::CreateCategory)
      }
      FormKind::EditCategory(id) => validation::update_category(&self.text(Field::Name), active)
        .map(|body| Mutation::UpdateCategory(id, body)),
      FormKind::CreateCode(category_id) => {
        validation::create_code(&self.text(Field::Code), &self.text(Field::Description))
          .map(|body| Mutation::CreateCode(category_id, body))
      }
      FormKind::EditCode(id) => validation::update_code(&self.text(Field::Description), active)
        .map(|body| Mutation::UpdateCode(id, body)),
    }
  }

  fn focus_count(&self) -> usize {
    self.fields.len() + usize::from(self.active.is_some())
  }

  fn on_toggle(&self) -> bool {
    self.active.is_some() && self.focus == self.fields.len()
  }

  pub fn handle_key(&mut self, key: KeyEvent) -> KeyResult<FormEvent> {
    if key.code == KeyCode::Esc {
      return KeyResult::Event(FormEvent::Cancel);
    }
    // Inputs are locked while the request is in flight
    if self.pending {
      return KeyResult::Handled;
    }

    match key.code {
      KeyCode::Enter => KeyResult::Event(FormEvent::Submit),
      KeyCode::Tab | KeyCode::Down => {
        self.focus = (self.focus + 1) % self.focus_count();
        KeyResult::Handled
      }
      KeyCode::BackTab | KeyCode::Up => {
        self.focus = (self.focus + self.focus_count() - 1) % self.focus_count();
        KeyResult::Handled
      }
      KeyCode::Char(' ') if self.on_toggle() => {
        self.active = self.active.map(|a| !a);
        KeyResult::Handled
      }
      _ => match self.fields.get_mut(self.focus) {
        Some(field) => match field.input.handle_key(key) {
          InputResult::Edited => {
            self.error = None;
            KeyResult::Handled
          }
          InputResult::Moved => KeyResult::Handled,
          InputResult::NotHandled => KeyResult::NotHandled,
        },
        None => KeyResult::NotHandled,
      },
    }
  }

  /// Render the form centered over `area`
  pub fn render_overlay(&self, frame: &mut Frame, area: Rect) {
    let width = area.width.saturating_sub(4).clamp(1, 64);
    let height = (self.fields.len() as u16 * 2 + u16::from(self.active.is_some()) + 4)
      .min(area.height.saturating_sub(2).max(1));

    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    let overlay_area = Rect::new(x, y, width, height);

    frame.render_widget(Clear, overlay_area);

    let block = Block::default()
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Yellow))
      .title(format!(" {} ", self.title));
    let inner = block.inner(overlay_area);
    frame.render_widget(block, overlay_area);

    if inner.height == 0 || inner.width < 4 {
      return;
    }

    let avail = inner.width.saturating_sub(3) as usize;
    let mut lines = Vec::new();
    let mut cursor = None;

    for (i, field) in self.fields.iter().enumerate() {
      let focused = i == self.focus;
      lines.push(Line::styled(field.label, label_style(focused)));

      let value: Vec<char> = field.input.value().chars().collect();
      let start = field.input.cursor_position().saturating_sub(avail);
      let shown: String = value.iter().skip(start).take(avail).collect();
      lines.push(Line::from(vec![marker(focused), Span::raw(shown)]));

      if focused {
        let dx = (field.input.cursor_position() - start) as u16;
        cursor = Some((inner.x + 2 + dx, inner.y + lines.len() as u16 - 1));
      }
    }

    if let Some(active) = self.active {
      let focused = self.on_toggle();
      lines.push(Line::from(vec![
        marker(focused),
        Span::styled(
          format!("[{}] Active", if active { "x" } else { " " }),
          label_style(focused),
        ),
      ]));
    }

    lines.push(match (&self.error, self.pending) {
      (_, true) => Line::styled("Saving...", Style::default().fg(Color::Yellow)),
      (Some(e), false) => Line::styled(e.as_str(), Style::default().fg(Color::Red)),
      (None, false) => Line::raw(""),
    });
    lines.push(Line::styled(
      "Enter save  Tab next  Space toggle  Esc cancel",
      Style::default().fg(Color::DarkGray),
    ));

    frame.render_widget(Paragraph::new(lines), inner);

    if let Some(position) = cursor.filter(|_| !self.pending) {
      frame.set_cursor_position(position);
    }
  }
}

fn marker(focused: bool) -> Span<'static> {
  if focused {
    Span::styled("> ", Style::default().fg(Color::Cyan))
  } else {
    Span::raw("  ")
  }
}

fn label_style(focused: bool) -> Style {
  if focused {
    Style::default().fg(Color::Cyan).bold()
  } else {
    Style::default().fg(Color::Gray)
  }
}
