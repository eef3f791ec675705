use crate::api::transport::{HttpTransport, Transport};
use crate::api::error::UNKNOWN_ERROR;
use crate::api::ApiClient;
use crate::config::Config;
use crate::event::{Event, EventHandler};
use crate::mutation::MutationCoordinator;
use crate::query::CacheOptions;
use crate::store::new_cache;
use crate::ui;
use crate::ui::view::{View, ViewAction};
use crate::ui::views::{ExpensesView, FaultView};
use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use ratatui::widgets::Clear;
use std::any::Any;
use std::io::stdout;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;
use tracing::{error, info};

/// Main application state
pub struct App<T: Transport + Clone = HttpTransport> {
  api: ApiClient<T>,
  cache_options: CacheOptions,

  /// Server origin shown in the header
  api_url: String,

  view: Box<dyn View>,
  should_quit: bool,
}

impl App<HttpTransport> {
  pub fn new(config: Config) -> Result<Self> {
    let api = ApiClient::new(&config.api)?;
    Ok(Self::with_client(api, config.cache.options(), config.api.url))
  }
}

impl<T: Transport + Clone> App<T> {
  pub fn with_client(api: ApiClient<T>, cache_options: CacheOptions, api_url: String) -> Self {
    let view = expenses_view(&api, cache_options);
    Self {
      api,
      cache_options,
      api_url,
      view,
      should_quit: false,
    }
  }

  pub async fn run(&mut self) -> Result<()> {
    let _terminal_guard = TerminalGuard::enter()?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    // Stderr belongs to the terminal UI; panics go to the log instead
    let previous_hook = panic::take_hook();
    panic::set_hook(Box::new(|info| {
      error!(%info, "Panic");
    }));

    let mut events = EventHandler::new(Duration::from_millis(250));
    let result = self.event_loop(&mut terminal, &mut events).await;

    panic::set_hook(previous_hook);
    result
  }

  async fn event_loop<B: Backend>(
    &mut self,
    terminal: &mut Terminal<B>,
    events: &mut EventHandler,
  ) -> Result<()> {
    info!(api = %self.api.base_url(), "Started");
    while !self.should_quit {
      self.draw(terminal)?;

      match events.next().await {
        Some(Event::Key(key)) => self.handle_key(key),
        Some(Event::Tick) => self.tick(),
        Some(Event::Resize) => {}
        None => break,
      }
    }
    info!("Quit");
    Ok(())
  }

  /// Draw the current view; a view that panics is replaced by the fault screen.
  fn draw<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<()> {
    let api_url = self.api_url.as_str();
    let view = &mut self.view;
    let drawn = panic::catch_unwind(AssertUnwindSafe(|| {
      terminal
        .draw(|frame| ui::draw(frame, view.as_mut(), api_url))
        .map(|_| ())
    }));

    match drawn {
      Ok(result) => result?,
      Err(payload) => {
        self.fault(payload);
        // The interrupted frame left partial content in the buffer
        let api_url = self.api_url.as_str();
        let view = &mut self.view;
        terminal.draw(|frame| {
          frame.render_widget(Clear, frame.area());
          ui::draw(frame, view.as_mut(), api_url);
        })?;
      }
    }
    Ok(())
  }

  fn handle_key(&mut self, key: KeyEvent) {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
      self.should_quit = true;
      return;
    }

    let view = &mut self.view;
    match panic::catch_unwind(AssertUnwindSafe(|| view.handle_key(key))) {
      Ok(action) => self.apply(action),
      Err(payload) => self.fault(payload),
    }
  }

  fn tick(&mut self) {
    let view = &mut self.view;
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| view.tick())) {
      self.fault(payload);
    }
  }

  fn apply(&mut self, action: ViewAction) {
    match action {
      ViewAction::None => {}
      ViewAction::Quit => self.should_quit = true,
      ViewAction::Reload => {
        info!("Reloading with a fresh cache");
        self.view = expenses_view(&self.api, self.cache_options);
      }
    }
  }

  fn fault(&mut self, payload: Box<dyn Any + Send>) {
    let message = panic_message(payload.as_ref());
    error!(%message, "View panicked, showing error screen");
    self.view = Box::new(FaultView::new(message));
  }
}

/// A fresh cache, coordinator and top-level view.
fn expenses_view<T: Transport + Clone>(api: &ApiClient<T>, options: CacheOptions) -> Box<dyn View> {
  let coordinator = MutationCoordinator::new(new_cache(options), api.clone());
  Box::new(ExpensesView::new(coordinator, api.clone()))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
  if let Some(message) = payload.downcast_ref::<&str>() {
    message.to_string()
  } else if let Some(message) = payload.downcast_ref::<String>() {
    message.clone()
  } else {
    UNKNOWN_ERROR.to_string()
  }
}

/// Raw mode and the alternate screen, restored on drop
struct TerminalGuard;

impl TerminalGuard {
  fn enter() -> Result<Self> {
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    Ok(Self)
  }
}

impl Drop for TerminalGuard {
  fn drop(&mut self) {
    let _ = disable_raw_mode();
    let _ = stdout().execute(LeaveAlternateScreen);
  }
}
