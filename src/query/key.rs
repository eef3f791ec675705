//! Cache keys for expenses queries.

use std::fmt;

/// Identity of a cached query.
///
/// Equality is structural: two keys are equal when their ordered components
/// (`["categories"]`, `["expense-codes", id]`) are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKey {
  /// All categories
  Categories,
  /// Codes of one category
  ExpenseCodes(i64),
}

impl QueryKey {
  /// Category whose code list this key holds, if any.
  pub fn code_list_category(&self) -> Option<i64> {
    match self {
      Self::ExpenseCodes(id) => Some(*id),
      Self::Categories => None,
    }
  }
}

impl fmt::Display for QueryKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Categories => write!(f, "[\"categories\"]"),
      Self::ExpenseCodes(id) => write!(f, "[\"expense-codes\", {}]", id),
    }
  }
}
