//! Entities and request bodies exchanged with the expenses backend.

use serde::{Deserialize, Serialize};

/// Expense category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
  pub id: i64,
  pub name: String,
  pub is_active: bool,
}

impl Category {
  /// Shallow-merge a partial update into this category.
  pub fn merged(&self, update: &UpdateCategory) -> Self {
    Self {
      id: self.id,
      name: update.name.clone().unwrap_or_else(|| self.name.clone()),
      is_active: update.is_active.unwrap_or(self.is_active),
    }
  }
}

/// Expense code belonging to a single category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseCode {
  pub id: i64,
  pub category_id: i64,
  pub code: String,
  pub description: Option<String>,
  pub is_active: bool,
}

impl ExpenseCode {
  /// Shallow-merge a partial update into this code.
  ///
  /// `code` and `category_id` are immutable after creation.
  pub fn merged(&self, update: &UpdateExpenseCode) -> Self {
    Self {
      description: update
        .description
        .clone()
        .or_else(|| self.description.clone()),
      is_active: update.is_active.unwrap_or(self.is_active),
      ..self.clone()
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateCategory {
  pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateCategory {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub is_active: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateExpenseCode {
  pub code: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateExpenseCode {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub is_active: Option<bool>,
}
