//! REST client with a fixed base path, timeout, and transient-failure retries.

use std::time::Duration;

use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::ApiConfig;

use super::error::{ApiError, ErrorDetail};
use super::transport::{HttpRequest, HttpResponse, HttpTransport, Transport, TransportError};

/// Zero-based attempt number. `Attempt::FIRST` is the initial request; every
/// retry gets the next value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Attempt(u32);

impl Attempt {
  pub const FIRST: Attempt = Attempt(0);

  pub fn next(self) -> Self {
    Attempt(self.0 + 1)
  }

  /// How many retries this attempt represents
  pub fn retries(self) -> u32 {
    self.0
  }
}

/// Linear backoff: retry `n` waits `n * base_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  pub max_retries: u32,
  pub base_delay: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_retries: 2,
      base_delay: Duration::from_millis(1000),
    }
  }
}

impl RetryPolicy {
  /// Delay to wait before making `attempt`, or `None` once retries are exhausted.
  pub fn delay_before(&self, attempt: Attempt) -> Option<Duration> {
    let n = attempt.retries();
    (n >= 1 && n <= self.max_retries).then(|| self.base_delay * n)
  }
}

/// Why a single attempt did not produce a usable response
#[derive(Debug)]
enum Failure {
  Transport(TransportError),
  Response(HttpResponse),
}

impl Failure {
  fn is_retryable(&self) -> bool {
    match self {
      Failure::Transport(e) => e.is_transient(),
      Failure::Response(r) => r.status >= 500,
    }
  }

  fn into_api_error(self) -> ApiError {
    match self {
      Failure::Transport(e) => ApiError::Network {
        message: e.to_string(),
      },
      Failure::Response(r) => match ErrorDetail::from_body(&r.body) {
        Some(detail) => ApiError::Api {
          status: r.status,
          detail,
        },
        None => ApiError::Status {
          status: r.status,
          body: String::from_utf8_lossy(&r.body).into_owned(),
        },
      },
    }
  }
}

/// Expenses API client
#[derive(Clone)]
pub struct ApiClient<T: Transport = HttpTransport> {
  transport: T,
  base_url: String,
  retry: RetryPolicy,
}

impl ApiClient<HttpTransport> {
  pub fn new(config: &ApiConfig) -> Result<Self> {
    let transport = HttpTransport::new(config.timeout())
      .map_err(|e| eyre!("Failed to create API client: {}", e))?;
    Ok(Self::with_transport(
      transport,
      config.base_url()?,
      config.retry_policy(),
    ))
  }
}

impl<T: Transport> ApiClient<T> {
  pub fn with_transport(transport: T, base_url: impl Into<String>, retry: RetryPolicy) -> Self {
    let base_url = base_url.into().trim_end_matches('/').to_string();
    Self {
      transport,
      base_url,
      retry,
    }
  }

  pub fn base_url(&self) -> &str {
    &self.base_url
  }

  pub async fn get<R: DeserializeOwned>(&self, path: &str) -> Result<R, ApiError> {
    self.request(Method::GET, path, None::<()>).await
  }

  pub async fn post<B: Serialize, R: DeserializeOwned>(
    &self,
    path: &str,
    body: &B,
  ) -> Result<R, ApiError> {
    self.request(Method::POST, path, Some(body)).await
  }

  pub async fn put<B: Serialize, R: DeserializeOwned>(
    &self,
    path: &str,
    body: &B,
  ) -> Result<R, ApiError> {
    self.request(Method::PUT, path, Some(body)).await
  }

  /// Issue a request and decode the JSON response body.
  pub async fn request<B: Serialize, R: DeserializeOwned>(
    &self,
    method: Method,
    path: &str,
    body: Option<B>,
  ) -> Result<R, ApiError> {
    let body = body
      .map(serde_json::to_value)
      .transpose()
      .map_err(|e| ApiError::Decode {
        message: format!("Failed to encode request body: {}", e),
      })?;

    let request = HttpRequest {
      method,
      url: format!("{}{}", self.base_url, path),
      body,
    };

    let response = self.send_with_retry(&request).await?;

    serde_json::from_slice(&response.body).map_err(|e| ApiError::Decode {
      message: format!("{} {}: {}", request.method, request.url, e),
    })
  }

  async fn send_with_retry(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
    let mut attempt = Attempt::FIRST;
    loop {
      let failure = match self.send_once(request, attempt).await {
        Ok(response) => return Ok(response),
        Err(failure) => failure,
      };

      let next = attempt.next();
      match self.retry.delay_before(next) {
        Some(delay) if failure.is_retryable() => {
          warn!(
            method = %request.method,
            url = %request.url,
            retry = next.retries(),
            delay_ms = delay.as_millis() as u64,
            "Retrying request after {:?}",
            failure
          );
          tokio::time::sleep(delay).await;
          attempt = next;
        }
        _ => return Err(failure.into_api_error()),
      }
    }
  }

  async fn send_once(&self, request: &HttpRequest, attempt: Attempt) -> Result<HttpResponse, Failure> {
    debug!(method = %request.method, url = %request.url, attempt = attempt.retries(), "Sending request");
    match self.transport.send(request).await {
      Ok(response) if response.is_success() => Ok(response),
      Ok(response) => Err(Failure::Response(response)),
      Err(e) => Err(Failure::Transport(e)),
    }
  }
}
