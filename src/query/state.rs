//! Observable state of a cached query.

use crate::api::ApiError;

/// The state of a query as seen by a reader
#[derive(Debug, Clone, PartialEq)]
pub enum QueryState<T> {
  /// Never fetched and nothing in flight
  Idle,
  /// First fetch in flight, no data yet
  Loading,
  /// Data available (possibly being revalidated in the background)
  Success(T),
  /// Last fetch failed
  Error(ApiError),
}

impl<T> QueryState<T> {
  pub fn is_success(&self) -> bool {
    matches!(self, QueryState::Success(_))
  }

  #[cfg(test)]
  pub fn is_error(&self) -> bool {
    matches!(self, QueryState::Error(_))
  }

  pub fn data(&self) -> Option<&T> {
    match self {
      QueryState::Success(data) => Some(data),
      _ => None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_accessors() {
    let state = QueryState::Success(vec![1, 2, 3]);
    assert!(state.is_success());
    assert_eq!(state.data(), Some(&vec![1, 2, 3]));
    assert!(!state.is_error());

    let state: QueryState<i32> = QueryState::Error(ApiError::Network {
      message: "down".to_string(),
    });
    assert!(state.is_error());
    assert!(state.data().is_none());
  }
}
