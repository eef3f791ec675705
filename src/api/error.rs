//! Error shapes produced by the API client.
//!
//! Every failure is narrowed into [`ApiError`] once, at the client boundary.
//! Consumers match on the variant instead of inspecting response bodies.

use serde::Deserialize;
use thiserror::Error;

/// One field-level problem reported by the backend's request validation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FieldError {
  #[serde(default)]
  pub loc: Vec<serde_json::Value>,
  pub msg: String,
  #[serde(rename = "type")]
  pub kind: String,
}

/// The structured `detail` object of a non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ErrorDetail {
  #[serde(default)]
  pub code: String,
  pub message: Option<String>,
  pub errors: Option<Vec<FieldError>>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
  detail: ErrorDetail,
}

impl ErrorDetail {
  /// Extract the `detail` object from a response body, if it has one.
  pub fn from_body(body: &[u8]) -> Option<Self> {
    serde_json::from_slice::<ErrorEnvelope>(body)
      .ok()
      .map(|envelope| envelope.detail)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
  /// Timeout or connection failure, after retries were exhausted
  #[error("network error: {message}")]
  Network { message: String },
  /// Non-2xx response carrying a structured detail
  #[error("request failed with status {status}: {}", .detail.code)]
  Api { status: u16, detail: ErrorDetail },
  /// Non-2xx response without a structured detail
  #[error("request failed with status code {status}")]
  Status { status: u16, body: String },
  /// 2xx response whose body did not match the expected shape
  #[error("failed to decode response: {message}")]
  Decode { message: String },
}

impl ApiError {
  #[cfg_attr(not(test), allow(dead_code))]
  pub fn status(&self) -> Option<u16> {
    match self {
      Self::Api { status, .. } | Self::Status { status, .. } => Some(*status),
      Self::Network { .. } | Self::Decode { .. } => None,
    }
  }

  pub fn detail(&self) -> Option<&ErrorDetail> {
    match self {
      Self::Api { detail, .. } => Some(detail),
      _ => None,
    }
  }

  /// Text to show the user: the backend's message when present, otherwise the
  /// fallback for the operation that failed.
  pub fn user_message(&self, operation: Operation) -> String {
    self
      .detail()
      .and_then(|d| d.message.clone())
      .unwrap_or_else(|| operation.fallback_message().to_string())
  }
}

/// Text for failures that belong to no known operation
pub const UNKNOWN_ERROR: &str = "An unknown error occurred";

/// Operations with their own fallback error text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
  LoadCategories,
  CreateCategory,
  UpdateCategory,
  LoadCodes,
  CreateCode,
  UpdateCode,
}

impl Operation {
  pub fn fallback_message(self) -> &'static str {
    match self {
      Self::LoadCategories => "Failed to load categories",
      Self::CreateCategory => "Failed to create category",
      Self::UpdateCategory => "Failed to update category",
      Self::LoadCodes => "Failed to load expense codes",
      Self::CreateCode => "Failed to create code",
      Self::UpdateCode => "Failed to update code",
    }
  }
}
