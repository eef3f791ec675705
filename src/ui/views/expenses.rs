use crate::api::transport::{HttpTransport, Transport};
use crate::api::{ApiClient, ApiError, Category, ExpenseCode, Operation};
use crate::mutation::{Confirmed, Mutation, MutationCoordinator};
use crate::query::{QueryKey, QueryObserver, QueryState};
use crate::store::{loader_for, Resource};
use crate::ui::components::{FormEvent, FormModal, KeyResult};
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::{active_badge, truncate, FlashKind};
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap};
use tokio::sync::mpsc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pane {
  Categories,
  Codes,
}

/// A finished mutation, reported back to the view
struct Outcome {
  ticket: u64,
  operation: Operation,
  result: Result<Confirmed, ApiError>,
}

/// Categories on the left, the selected category's codes on the right.
pub struct ExpensesView<T: Transport + Clone = HttpTransport> {
  api: ApiClient<T>,
  coordinator: MutationCoordinator<T>,

  // Cache subscriptions
  categories: QueryObserver<QueryKey, Resource>,
  codes: Option<QueryObserver<QueryKey, Resource>>, // None = no category selected

  // UI state
  selected_category: Option<i64>,
  focus: Pane,
  category_list: ListState,
  code_list: ListState,
  form: Option<FormModal>,
  form_ticket: Option<u64>,
  flash: Option<(String, FlashKind)>,

  // Mutation results
  outcome_tx: mpsc::UnboundedSender<Outcome>,
  outcome_rx: mpsc::UnboundedReceiver<Outcome>,
  next_ticket: u64,
}

impl<T: Transport + Clone> ExpensesView<T> {
  pub fn new(coordinator: MutationCoordinator<T>, api: ApiClient<T>) -> Self {
    let categories = coordinator
      .cache()
      .observe(QueryKey::Categories, loader_for(&api, QueryKey::Categories));
    let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();

    Self {
      api,
      coordinator,
      categories,
      codes: None,
      selected_category: None,
      focus: Pane::Categories,
      category_list: ListState::default(),
      code_list: ListState::default(),
      form: None,
      form_ticket: None,
      flash: None,
      outcome_tx,
      outcome_rx,
      next_ticket: 0,
    }
  }

  fn cached_categories(&self) -> Vec<Category> {
    self
      .coordinator
      .cache()
      .data(&QueryKey::Categories)
      .and_then(|r| r.categories().map(<[Category]>::to_vec))
      .unwrap_or_default()
  }

  fn cached_codes(&self) -> Vec<ExpenseCode> {
    self
      .codes
      .as_ref()
      .and_then(|observer| self.coordinator.cache().data(observer.key()))
      .and_then(|r| r.codes().map(<[ExpenseCode]>::to_vec))
      .unwrap_or_default()
  }

  fn highlighted_category(&self) -> Option<Category> {
    let index = self.category_list.selected()?;
    self.cached_categories().into_iter().nth(index)
  }

  fn highlighted_code(&self) -> Option<ExpenseCode> {
    let index = self.code_list.selected()?;
    self.cached_codes().into_iter().nth(index)
  }

  fn selected_category(&self) -> Option<Category> {
    let id = self.selected_category?;
    self.cached_categories().into_iter().find(|c| c.id == id)
  }

  /// Show the codes of `id`, subscribing to its code list.
  fn select_category(&mut self, id: i64) {
    if self.selected_category != Some(id) {
      let key = QueryKey::ExpenseCodes(id);
      self.codes = Some(self.coordinator.cache().observe(key, loader_for(&self.api, key)));
      self.selected_category = Some(id);
      self.code_list = ListState::default();
      debug!(category = id, "Selected category");
    }
    self.focus = Pane::Codes;
  }

  /// Rows created locally have no server id to act on yet.
  fn flash_unsaved(&mut self, noun: &str) {
    debug!(noun, "Ignored action on unsaved row");
    self.flash = Some((
      format!("This {} is still being saved. Try again in a moment.", noun),
      FlashKind::Info,
    ));
  }

  fn open_form(&mut self, form: FormModal) {
    self.form = Some(form);
    self.form_ticket = None;
  }

  fn submit_form(&mut self) {
    let Some(form) = self.form.as_mut() else {
      return;
    };
    if form.is_pending() {
      return;
    }
    match form.mutation() {
      Err(e) => {
        debug!(field = %e.field, "Form rejected: {}", e);
        form.set_error(e.message);
      }
      Ok(mutation) => {
        form.set_pending(true);
        let ticket = self.dispatch(mutation);
        self.form_ticket = Some(ticket);
      }
    }
  }

  /// Apply `mutation` now and send it in the background; its outcome
  /// arrives on a later tick.
  fn dispatch(&mut self, mutation: Mutation) -> u64 {
    self.next_ticket += 1;
    let ticket = self.next_ticket;
    let operation = mutation.operation();
    let pending = self.coordinator.start(mutation);
    let tx = self.outcome_tx.clone();

    tokio::spawn(async move {
      let result = pending.await;
      let _ = tx.send(Outcome {
        ticket,
        operation,
        result,
      });
    });
    ticket
  }

  fn handle_outcome(&mut self, outcome: Outcome) {
    let for_open_form = self.form_ticket == Some(outcome.ticket);
    match outcome.result {
      Ok(confirmed) => {
        info!(operation = ?outcome.operation, "Saved {}", confirmed.summary());
        if for_open_form {
          self.form = None;
          self.form_ticket = None;
        }
        self.flash = Some((format!("Saved {}", confirmed.summary()), FlashKind::Info));
      }
      Err(e) => {
        let message = e.user_message(outcome.operation);
        match self.form.as_mut().filter(|_| for_open_form) {
          Some(form) => {
            form.set_pending(false);
            form.set_error(message);
          }
          None => self.flash = Some((message, FlashKind::Error)),
        }
      }
    }
  }

  fn refetch_focused(&mut self) {
    let observer = match self.focus {
      Pane::Categories => Some(&self.categories),
      Pane::Codes => self.codes.as_ref(),
    };
    if let Some(observer) = observer {
      debug!(key = %observer.key(), "Manual refetch");
      observer.refetch();
    }
  }

  fn move_selection(&mut self, down: bool) {
    let list = match self.focus {
      Pane::Categories => &mut self.category_list,
      Pane::Codes => &mut self.code_list,
    };
    if down {
      list.select_next();
    } else {
      list.select_previous();
    }
  }

  fn render_categories(&mut self, frame: &mut Frame, area: Rect) {
    let state = self.categories.state();
    let refreshing = self.categories.is_fetching() && state.is_success();
    let focused = self.focus == Pane::Categories;

    let title = match &state {
      QueryState::Success(r) => {
        let count = r.categories().map(<[Category]>::len).unwrap_or(0);
        pane_title("Categories", Some(count), refreshing)
      }
      _ => pane_title("Categories", None, false),
    };
    let block = pane_block(title, focused);

    let categories = match state {
      QueryState::Idle | QueryState::Loading => {
        render_message(frame, area, block, "Loading categories...", Color::DarkGray);
        return;
      }
      QueryState::Error(e) => {
        let message = format!(
          "{}. Press r to retry.",
          e.user_message(Operation::LoadCategories)
        );
        render_message(frame, area, block, &message, Color::Red);
        return;
      }
      QueryState::Success(r) => r.categories().map(<[Category]>::to_vec).unwrap_or_default(),
    };

    if categories.is_empty() {
      render_message(
        frame,
        area,
        block,
        "No categories yet. Press n to create one.",
        Color::DarkGray,
      );
      return;
    }

    ensure_valid_selection(&mut self.category_list, categories.len());
    let name_width = area.width.saturating_sub(16) as usize;
    let items: Vec<ListItem> = categories
      .iter()
      .map(|category| {
        let chosen = self.selected_category == Some(category.id);
        let name_style = if chosen {
          Style::default().fg(Color::Yellow).bold()
        } else {
          Style::default().fg(Color::White)
        };
        ListItem::new(Line::from(vec![
          active_badge(category.is_active),
          Span::raw(" "),
          Span::styled(truncate(&category.name, name_width), name_style),
        ]))
      })
      .collect();

    frame.render_stateful_widget(selectable_list(items, block), area, &mut self.category_list);
  }

  fn render_codes(&mut self, frame: &mut Frame, area: Rect) {
    let focused = self.focus == Pane::Codes;
    let name = self
      .selected_category()
      .map(|c| format!("Codes in {}", c.name))
      .unwrap_or_else(|| "Codes".to_string());

    let Some(observer) = self.codes.as_ref() else {
      let block = pane_block(pane_title(&name, None, false), focused);
      render_message(
        frame,
        area,
        block,
        "Select a category to see its codes.",
        Color::DarkGray,
      );
      return;
    };

    let state = observer.state();
    let refreshing = observer.is_fetching() && state.is_success();
    let count = state.data().and_then(Resource::codes).map(<[ExpenseCode]>::len);
    let block = pane_block(pane_title(&name, count, refreshing), focused);

    let codes = match state {
      QueryState::Idle | QueryState::Loading => {
        render_message(frame, area, block, "Loading codes...", Color::DarkGray);
        return;
      }
      QueryState::Error(e) => {
        let message = format!("{}. Press r to retry.", e.user_message(Operation::LoadCodes));
        render_message(frame, area, block, &message, Color::Red);
        return;
      }
      QueryState::Success(r) => r.codes().map(<[ExpenseCode]>::to_vec).unwrap_or_default(),
    };

    if codes.is_empty() {
      render_message(
        frame,
        area,
        block,
        "No codes in this category. Press n to add one.",
        Color::DarkGray,
      );
      return;
    }

    ensure_valid_selection(&mut self.code_list, codes.len());
    let description_width = area.width.saturating_sub(30) as usize;
    let items: Vec<ListItem> = codes
      .iter()
      .map(|code| {
        ListItem::new(Line::from(vec![
          active_badge(code.is_active),
          Span::raw(" "),
          Span::styled(
            format!("{:<14}", truncate(&code.code, 14)),
            Style::default().fg(Color::Cyan),
          ),
          Span::raw(" "),
          Span::styled(
            truncate(code.description.as_deref().unwrap_or("-"), description_width),
            Style::default().fg(Color::Gray),
          ),
        ]))
      })
      .collect();

    frame.render_stateful_widget(selectable_list(items, block), area, &mut self.code_list);
  }
}

impl<T: Transport + Clone> View for ExpensesView<T> {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    // An open form takes every key
    if let Some(form) = self.form.as_mut() {
      match form.handle_key(key) {
        KeyResult::Event(FormEvent::Cancel) => {
          self.form = None;
          self.form_ticket = None;
        }
        KeyResult::Event(FormEvent::Submit) => self.submit_form(),
        KeyResult::Handled | KeyResult::NotHandled => {}
      }
      return ViewAction::None;
    }

    match key.code {
      KeyCode::Char('q') => return ViewAction::Quit,
      KeyCode::Tab | KeyCode::Char('h') | KeyCode::Char('l') | KeyCode::Left | KeyCode::Right => {
        self.focus = match self.focus {
          Pane::Categories if self.codes.is_some() => Pane::Codes,
          _ => Pane::Categories,
        };
      }
      KeyCode::Char('j') | KeyCode::Down => self.move_selection(true),
      KeyCode::Char('k') | KeyCode::Up => self.move_selection(false),
      KeyCode::Enter if self.focus == Pane::Categories => {
        if let Some(category) = self.highlighted_category() {
          if self.coordinator.is_placeholder(category.id) {
            self.flash_unsaved("category");
          } else {
            self.select_category(category.id);
          }
        }
      }
      KeyCode::Char('n') => match self.focus {
        Pane::Categories => self.open_form(FormModal::create_category()),
        Pane::Codes => {
          if let Some(category) = self.selected_category() {
            self.open_form(FormModal::create_code(&category));
          }
        }
      },
      KeyCode::Char('e') => {
        let target = match self.focus {
          Pane::Categories => self
            .highlighted_category()
            .map(|c| (c.id, "category", FormModal::edit_category(&c))),
          Pane::Codes => self
            .highlighted_code()
            .map(|c| (c.id, "code", FormModal::edit_code(&c))),
        };
        match target {
          Some((id, noun, _)) if self.coordinator.is_placeholder(id) => self.flash_unsaved(noun),
          Some((_, _, form)) => self.open_form(form),
          None => {}
        }
      }
      KeyCode::Char('r') => self.refetch_focused(),
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let panes = Layout::default()
      .direction(Direction::Horizontal)
      .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
      .split(area);

    self.render_categories(frame, panes[0]);
    self.render_codes(frame, panes[1]);

    if let Some(form) = &self.form {
      form.render_overlay(frame, area);
    }
  }

  fn breadcrumb_label(&self) -> String {
    match self.selected_category() {
      Some(category) => format!("Categories > {}", category.name),
      None => "Categories".to_string(),
    }
  }

  fn tick(&mut self) {
    while let Ok(outcome) = self.outcome_rx.try_recv() {
      self.handle_outcome(outcome);
    }
  }

  fn flash(&self) -> Option<(&str, FlashKind)> {
    self.flash.as_ref().map(|(message, kind)| (message.as_str(), *kind))
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    if self.form.is_some() {
      return vec![
        ShortcutInfo::new("enter", "save").with_priority(10),
        ShortcutInfo::new("esc", "cancel").with_priority(20),
      ];
    }
    vec![
      ShortcutInfo::new("n", "new").with_priority(10),
      ShortcutInfo::new("e", "edit").with_priority(20),
      ShortcutInfo::new("enter", "codes").with_priority(30),
      ShortcutInfo::new("tab", "pane").with_priority(40),
      ShortcutInfo::new("r", "refresh").with_priority(50),
      ShortcutInfo::new("q", "quit").with_priority(90),
    ]
  }
}

fn pane_title(name: &str, count: Option<usize>, refreshing: bool) -> String {
  match (count, refreshing) {
    (Some(n), true) => format!(" {} ({}) refreshing... ", name, n),
    (Some(n), false) => format!(" {} ({}) ", name, n),
    (None, _) => format!(" {} ", name),
  }
}

fn pane_block(title: String, focused: bool) -> Block<'static> {
  let color = if focused { Color::Cyan } else { Color::Blue };
  Block::default()
    .title(title)
    .borders(Borders::ALL)
    .border_style(Style::default().fg(color))
}

fn render_message(frame: &mut Frame, area: Rect, block: Block, message: &str, color: Color) {
  let paragraph = Paragraph::new(message.to_string())
    .block(block)
    .wrap(Wrap { trim: true })
    .style(Style::default().fg(color));
  frame.render_widget(paragraph, area);
}

fn selectable_list<'a>(items: Vec<ListItem<'a>>, block: Block<'a>) -> List<'a> {
  List::new(items)
    .block(block)
    .highlight_style(
      Style::default()
        .bg(Color::DarkGray)
        .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("> ")
}
