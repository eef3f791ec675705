//! Scripted transport for exercising the client without a server.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

use super::transport::{HttpRequest, HttpResponse, Transport, TransportError};

pub type Scripted = Result<HttpResponse, TransportError>;

enum Outcome {
  Ready(Scripted),
  /// Resolved later by the test, to hold a request in flight
  Gated(oneshot::Receiver<Scripted>),
}

/// Replays queued outcomes in order and records every request it sees.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
  outcomes: Arc<Mutex<VecDeque<Outcome>>>,
  requests: Arc<Mutex<Vec<HttpRequest>>>,
}

impl ScriptedTransport {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn push(&self, outcome: Scripted) {
    self
      .outcomes
      .lock()
      .unwrap()
      .push_back(Outcome::Ready(outcome));
  }

  /// Queue an outcome that stays pending until the returned sender fires.
  pub fn push_gated(&self) -> oneshot::Sender<Scripted> {
    let (tx, rx) = oneshot::channel();
    self.outcomes.lock().unwrap().push_back(Outcome::Gated(rx));
    tx
  }

  pub fn requests(&self) -> Vec<HttpRequest> {
    self.requests.lock().unwrap().clone()
  }

  pub fn request_count(&self) -> usize {
    self.requests.lock().unwrap().len()
  }
}

impl Transport for ScriptedTransport {
  async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
    self.requests.lock().unwrap().push(request.clone());
    let outcome = self.outcomes.lock().unwrap().pop_front();
    match outcome {
      Some(Outcome::Ready(scripted)) => scripted,
      Some(Outcome::Gated(rx)) => rx
        .await
        .unwrap_or_else(|_| Err(TransportError::Other("gate dropped".to_string()))),
      None => Err(TransportError::Other("no scripted response".to_string())),
    }
  }
}

pub fn json_response(status: u16, body: serde_json::Value) -> HttpResponse {
  HttpResponse {
    status,
    body: serde_json::to_vec(&body).unwrap(),
  }
}

/// A 4xx response carrying a structured detail.
pub fn detail_response(status: u16, code: &str, message: &str) -> HttpResponse {
  json_response(
    status,
    serde_json::json!({ "detail": { "code": code, "message": message } }),
  )
}
