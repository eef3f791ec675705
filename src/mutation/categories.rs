use crate::api::transport::Transport;
use crate::api::{ApiError, Category, CreateCategory, Operation, UpdateCategory};
use crate::query::{patch, QueryKey};
use crate::store::Resource;

use super::{MutationCoordinator, OptimisticUpdate};

impl<T: Transport + Clone> MutationCoordinator<T> {
  /// Append a placeholder category, then create it for real.
  #[cfg_attr(not(test), allow(dead_code))]
  pub async fn create_category(&self, body: CreateCategory) -> Result<Category, ApiError> {
    let update = self.apply_create_category(&body);
    self.send_create_category(update, &body).await
  }

  /// Merge `body` into the cached category, then update it for real.
  ///
  /// Success invalidates the category list and the category's code list.
  #[cfg_attr(not(test), allow(dead_code))]
  pub async fn update_category(
    &self,
    id: i64,
    body: UpdateCategory,
  ) -> Result<Category, ApiError> {
    let update = self.apply_update_category(id, &body);
    self.send_update_category(update, id, &body).await
  }

  pub(super) fn apply_create_category(&self, body: &CreateCategory) -> OptimisticUpdate {
    let mut update = self.begin(Operation::CreateCategory);
    let placeholder = Category {
      id: self.temp_ids.next(),
      name: body.name.clone(),
      is_active: true,
    };
    update.apply(
      QueryKey::Categories,
      patch(move |old: Option<&Resource>| {
        let mut list = old
          .and_then(Resource::categories)
          .map(<[Category]>::to_vec)
          .unwrap_or_default();
        list.push(placeholder.clone());
        Some(Resource::Categories(list))
      }),
    );
    update
  }

  pub(super) async fn send_create_category(
    &self,
    update: OptimisticUpdate,
    body: &CreateCategory,
  ) -> Result<Category, ApiError> {
    let result = self.api.create_category(body).await;
    self.settle(update, result, |_| vec![QueryKey::Categories])
  }

  pub(super) fn apply_update_category(&self, id: i64, body: &UpdateCategory) -> OptimisticUpdate {
    let mut update = self.begin(Operation::UpdateCategory);
    let changes = body.clone();
    update.apply(
      QueryKey::Categories,
      patch(move |old: Option<&Resource>| {
        let list = old.and_then(Resource::categories)?;
        Some(Resource::Categories(
          list
            .iter()
            .map(|c| if c.id == id { c.merged(&changes) } else { c.clone() })
            .collect(),
        ))
      }),
    );
    update
  }

  pub(super) async fn send_update_category(
    &self,
    update: OptimisticUpdate,
    id: i64,
    body: &UpdateCategory,
  ) -> Result<Category, ApiError> {
    let result = self.api.update_category(id, body).await;
    self.settle(update, result, |_| {
      vec![QueryKey::Categories, QueryKey::ExpenseCodes(id)]
    })
  }
}
