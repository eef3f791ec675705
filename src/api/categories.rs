//! Category endpoints.

use super::client::ApiClient;
use super::error::ApiError;
use super::transport::Transport;
use super::types::{Category, CreateCategory, UpdateCategory};

impl<T: Transport> ApiClient<T> {
  /// List all categories
  pub async fn list_categories(&self) -> Result<Vec<Category>, ApiError> {
    self.get("/categories").await
  }

  pub async fn create_category(&self, body: &CreateCategory) -> Result<Category, ApiError> {
    self.post("/categories", body).await
  }

  /// Partially update a category
  pub async fn update_category(
    &self,
    id: i64,
    body: &UpdateCategory,
  ) -> Result<Category, ApiError> {
    self.put(&format!("/categories/{}", id), body).await
  }
}
