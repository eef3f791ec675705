use crossterm::event::{self, Event as CrosstermEvent, KeyEvent, KeyEventKind};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Application events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
  /// Terminal key press
  Key(KeyEvent),
  /// Terminal resized; a redraw is enough
  Resize,
  /// Periodic tick for cache polling and redraw
  Tick,
}

/// Merges terminal input and a tick timer into one stream.
pub struct EventHandler {
  rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
  pub fn new(tick_rate: Duration) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();

    // crossterm's poll/read block, so input gets its own thread
    let input_tx = tx.clone();
    tokio::task::spawn_blocking(move || loop {
      match event::poll(tick_rate) {
        Ok(true) => {}
        Ok(false) => {
          if input_tx.is_closed() {
            break;
          }
          continue;
        }
        Err(e) => {
          debug!(error = %e, "Terminal poll failed, stopping input reader");
          break;
        }
      }
      let forwarded = match event::read() {
        Ok(CrosstermEvent::Key(key)) if key.kind == KeyEventKind::Press => {
          input_tx.send(Event::Key(key))
        }
        Ok(CrosstermEvent::Resize(..)) => input_tx.send(Event::Resize),
        _ => Ok(()),
      };
      if forwarded.is_err() {
        break;
      }
    });

    tokio::spawn(async move {
      let mut ticks = tokio::time::interval(tick_rate);
      ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
      loop {
        ticks.tick().await;
        if tx.send(Event::Tick).is_err() {
          break;
        }
      }
    });

    Self { rx }
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }
}
