//! Expense code endpoints.

use super::client::ApiClient;
use super::error::ApiError;
use super::transport::Transport;
use super::types::{CreateExpenseCode, ExpenseCode, UpdateExpenseCode};

impl<T: Transport> ApiClient<T> {
  /// List the codes of one category
  pub async fn list_codes(&self, category_id: i64) -> Result<Vec<ExpenseCode>, ApiError> {
    self
      .get(&format!("/categories/{}/codes", category_id))
      .await
  }

  pub async fn create_code(
    &self,
    category_id: i64,
    body: &CreateExpenseCode,
  ) -> Result<ExpenseCode, ApiError> {
    self
      .post(&format!("/categories/{}/codes", category_id), body)
      .await
  }

  /// Update a code by id alone; the owning category is whatever the server says.
  pub async fn update_code(
    &self,
    code_id: i64,
    body: &UpdateExpenseCode,
  ) -> Result<ExpenseCode, ApiError> {
    self.put(&format!("/codes/{}", code_id), body).await
  }
}
