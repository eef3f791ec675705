//! HTTP transport seam for the API client.

use std::future::Future;
use std::time::Duration;

use reqwest::Method;
use thiserror::Error;

/// A fully-resolved request ready to go over the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
  pub method: Method,
  pub url: String,
  pub body: Option<serde_json::Value>,
}

/// Raw response: status plus undecoded body bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
  pub status: u16,
  pub body: Vec<u8>,
}

impl HttpResponse {
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }
}

/// Failure below the HTTP layer (no response was received).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
  #[error("request timed out")]
  Timeout,
  #[error("connection failed: {0}")]
  Connect(String),
  #[error("{0}")]
  Other(String),
}

impl TransportError {
  /// Timeouts and connection failures are worth another attempt.
  pub fn is_transient(&self) -> bool {
    matches!(self, Self::Timeout | Self::Connect(_))
  }
}

/// Sends a single HTTP request. Implementations do not retry.
pub trait Transport: Send + Sync + 'static {
  fn send(
    &self,
    request: &HttpRequest,
  ) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send;
}

/// `reqwest`-backed transport with a per-request timeout.
#[derive(Clone)]
pub struct HttpTransport {
  client: reqwest::Client,
}

impl HttpTransport {
  pub fn new(timeout: Duration) -> Result<Self, TransportError> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| TransportError::Other(format!("Failed to build HTTP client: {}", e)))?;
    Ok(Self { client })
  }
}

impl Transport for HttpTransport {
  async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
    let mut builder = self
      .client
      .request(request.method.clone(), &request.url)
      .header(reqwest::header::CONTENT_TYPE, "application/json");
    if let Some(body) = &request.body {
      builder = builder.json(body);
    }

    let response = builder.send().await.map_err(classify)?;
    let status = response.status().as_u16();
    let body = response.bytes().await.map_err(classify)?;

    Ok(HttpResponse {
      status,
      body: body.to_vec(),
    })
  }
}

fn classify(err: reqwest::Error) -> TransportError {
  if err.is_timeout() {
    TransportError::Timeout
  } else if err.is_connect() || err.is_request() {
    TransportError::Connect(err.to_string())
  } else {
    TransportError::Other(err.to_string())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_transient_classification() {
    assert!(TransportError::Timeout.is_transient());
    assert!(TransportError::Connect("refused".to_string()).is_transient());
    assert!(!TransportError::Other("bad redirect".to_string()).is_transient());
  }

  #[test]
  fn test_success_range() {
    let ok = HttpResponse {
      status: 204,
      body: Vec::new(),
    };
    let not_found = HttpResponse {
      status: 404,
      body: Vec::new(),
    };
    assert!(ok.is_success());
    assert!(!not_found.is_success());
  }
}
