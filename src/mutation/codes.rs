use crate::api::transport::Transport;
use crate::api::{ApiError, CreateExpenseCode, ExpenseCode, Operation, UpdateExpenseCode};
use crate::query::{patch, QueryKey};
use crate::store::Resource;

use super::{MutationCoordinator, OptimisticUpdate};

impl<T: Transport + Clone> MutationCoordinator<T> {
  /// Append a placeholder code to its category's list, then create it.
  #[cfg_attr(not(test), allow(dead_code))]
  pub async fn create_code(
    &self,
    category_id: i64,
    body: CreateExpenseCode,
  ) -> Result<ExpenseCode, ApiError> {
    let update = self.apply_create_code(category_id, &body);
    self.send_create_code(update, category_id, &body).await
  }

  /// Update a code known only by id.
  ///
  /// Every cached code list containing the id is patched. On success the list
  /// of the category the server reports is invalidated, which may differ from
  /// where the code was cached.
  #[cfg_attr(not(test), allow(dead_code))]
  pub async fn update_code(
    &self,
    code_id: i64,
    body: UpdateExpenseCode,
  ) -> Result<ExpenseCode, ApiError> {
    let update = self.apply_update_code(code_id, &body);
    self.send_update_code(update, code_id, &body).await
  }

  pub(super) fn apply_create_code(
    &self,
    category_id: i64,
    body: &CreateExpenseCode,
  ) -> OptimisticUpdate {
    let mut update = self.begin(Operation::CreateCode);
    let placeholder = ExpenseCode {
      id: self.temp_ids.next(),
      category_id,
      code: body.code.clone(),
      description: body.description.clone().filter(|d| !d.is_empty()),
      is_active: true,
    };
    update.apply(
      QueryKey::ExpenseCodes(category_id),
      patch(move |old: Option<&Resource>| {
        let mut list = old
          .and_then(Resource::codes)
          .map(<[ExpenseCode]>::to_vec)
          .unwrap_or_default();
        list.push(placeholder.clone());
        Some(Resource::Codes(list))
      }),
    );
    update
  }

  pub(super) async fn send_create_code(
    &self,
    update: OptimisticUpdate,
    category_id: i64,
    body: &CreateExpenseCode,
  ) -> Result<ExpenseCode, ApiError> {
    let result = self.api.create_code(category_id, body).await;
    self.settle(update, result, |_| vec![QueryKey::ExpenseCodes(category_id)])
  }

  pub(super) fn apply_update_code(&self, code_id: i64, body: &UpdateExpenseCode) -> OptimisticUpdate {
    let mut update = self.begin(Operation::UpdateCode);
    // Scans every cached code list; fine while the cache holds a handful
    let holders = self.cache.find_keys(|key, data| {
      key.code_list_category().is_some()
        && data
          .codes()
          .is_some_and(|codes| codes.iter().any(|c| c.id == code_id))
    });
    for key in holders {
      let changes = body.clone();
      update.apply(
        key,
        patch(move |old: Option<&Resource>| {
          let list = old.and_then(Resource::codes)?;
          Some(Resource::Codes(
            list
              .iter()
              .map(|c| if c.id == code_id { c.merged(&changes) } else { c.clone() })
              .collect(),
          ))
        }),
      );
    }
    update
  }

  pub(super) async fn send_update_code(
    &self,
    update: OptimisticUpdate,
    code_id: i64,
    body: &UpdateExpenseCode,
  ) -> Result<ExpenseCode, ApiError> {
    let result = self.api.update_code(code_id, body).await;
    self.settle(update, result, |code| {
      vec![QueryKey::ExpenseCodes(code.category_id)]
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::testing::{detail_response, json_response};
  use crate::mutation::test_support::Harness;
  use crate::store::ExpensesCache;
  use serde_json::json;

  fn code(id: i64, category_id: i64, name: &str) -> ExpenseCode {
    ExpenseCode {
      id,
      category_id,
      code: name.to_string(),
      description: None,
      is_active: true,
    }
  }

  fn codes(cache: &ExpensesCache, category_id: i64) -> Vec<ExpenseCode> {
    cache
      .data(&QueryKey::ExpenseCodes(category_id))
      .and_then(|r| r.codes().map(<[ExpenseCode]>::to_vec))
      .unwrap_or_default()
  }

  fn seed(h: &Harness, category_id: i64, list: Vec<ExpenseCode>) {
    h.cache.write(&QueryKey::ExpenseCodes(category_id), |_| {
      Some(Resource::Codes(list))
    });
  }

  fn lunch() -> UpdateExpenseCode {
    UpdateExpenseCode {
      description: Some("lunch".to_string()),
      is_active: None,
    }
  }

  #[tokio::test]
  async fn test_update_code_invalidates_only_its_category() {
    let h = Harness::new();
    seed(&h, 3, vec![code(5, 3, "MEAL")]);
    seed(&h, 4, vec![code(6, 4, "TAXI")]);
    let _codes_3 = h.observe(QueryKey::ExpenseCodes(3));
    let _codes_4 = h.observe(QueryKey::ExpenseCodes(4));
    h.transport.push(Ok(json_response(
      200,
      json!({"id": 5, "category_id": 3, "code": "MEAL", "description": "lunch", "is_active": true}),
    )));

    let updated = h.coordinator.update_code(5, lunch()).await.unwrap();

    assert_eq!(updated.description.as_deref(), Some("lunch"));
    assert_eq!(codes(&h.cache, 3)[0].description.as_deref(), Some("lunch"));
    assert!(h.cache.is_fetching(&QueryKey::ExpenseCodes(3)));
    assert!(!h.cache.is_fetching(&QueryKey::ExpenseCodes(4)));
    assert_eq!(codes(&h.cache, 4), vec![code(6, 4, "TAXI")]);
  }

  #[tokio::test]
  async fn test_update_code_invalidates_category_reported_by_server() {
    let h = Harness::new();
    seed(&h, 3, vec![code(5, 3, "MEAL")]);
    seed(&h, 8, Vec::new());
    let _codes_3 = h.observe(QueryKey::ExpenseCodes(3));
    let _codes_8 = h.observe(QueryKey::ExpenseCodes(8));
    h.transport.push(Ok(json_response(
      200,
      json!({"id": 5, "category_id": 8, "code": "MEAL", "description": "lunch", "is_active": true}),
    )));

    h.coordinator.update_code(5, lunch()).await.unwrap();

    assert!(h.cache.is_fetching(&QueryKey::ExpenseCodes(8)));
    assert!(!h.cache.is_fetching(&QueryKey::ExpenseCodes(3)));
  }

  #[tokio::test]
  async fn test_failed_code_update_restores_every_matching_list() {
    let h = Harness::new();
    seed(&h, 3, vec![code(5, 3, "MEAL"), code(7, 3, "HOTEL")]);
    seed(&h, 9, vec![code(5, 3, "MEAL")]);
    seed(&h, 4, vec![code(6, 4, "TAXI")]);
    let gate = h.transport.push_gated();

    let mut update = Box::pin(h.coordinator.update_code(
      5,
      UpdateExpenseCode {
        description: None,
        is_active: Some(false),
      },
    ));
    assert!(futures::poll!(&mut update).is_pending());
    assert!(!codes(&h.cache, 3)[0].is_active);
    assert!(!codes(&h.cache, 9)[0].is_active);
    assert_eq!(h.cache.pending_layers(&QueryKey::ExpenseCodes(4)), 0);

    gate
      .send(Ok(detail_response(404, "not_found", "Expense code not found.")))
      .unwrap();
    let err = update.await.unwrap_err();

    assert_eq!(
      err.user_message(Operation::UpdateCode),
      "Expense code not found."
    );
    assert_eq!(
      codes(&h.cache, 3),
      vec![code(5, 3, "MEAL"), code(7, 3, "HOTEL")]
    );
    assert_eq!(codes(&h.cache, 9), vec![code(5, 3, "MEAL")]);
  }

  #[tokio::test]
  async fn test_update_of_uncached_code_still_sends() {
    let h = Harness::new();
    h.transport.push(Ok(json_response(
      200,
      json!({"id": 5, "category_id": 3, "code": "MEAL", "description": "lunch", "is_active": true}),
    )));

    let updated = h.coordinator.update_code(5, lunch()).await.unwrap();

    assert_eq!(updated.category_id, 3);
    assert_eq!(h.transport.request_count(), 1);
    assert_eq!(h.cache.data(&QueryKey::ExpenseCodes(3)), None);
  }

  #[tokio::test]
  async fn test_create_code_placeholder_drops_empty_description() {
    let h = Harness::new();
    seed(&h, 3, vec![code(5, 3, "MEAL")]);
    let gate = h.transport.push_gated();

    let mut create = Box::pin(h.coordinator.create_code(
      3,
      CreateExpenseCode {
        code: "TAXI".to_string(),
        description: Some(String::new()),
      },
    ));
    assert!(futures::poll!(&mut create).is_pending());

    let shown = codes(&h.cache, 3);
    assert_eq!(shown.len(), 2);
    assert_eq!(shown[1].code, "TAXI");
    assert_eq!(shown[1].category_id, 3);
    assert_eq!(shown[1].description, None);
    assert!(shown[1].is_active);

    gate
      .send(Ok(json_response(
        201,
        json!({"id": 11, "category_id": 3, "code": "TAXI", "description": null, "is_active": true}),
      )))
      .unwrap();
    create.await.unwrap();
    assert_eq!(h.cache.pending_layers(&QueryKey::ExpenseCodes(3)), 0);
  }

  #[tokio::test]
  async fn test_failed_create_code_touches_only_its_category() {
    let h = Harness::new();
    seed(&h, 3, vec![code(5, 3, "MEAL")]);
    seed(&h, 4, vec![code(6, 4, "TAXI")]);
    h.transport.push(Ok(detail_response(
      400,
      "duplicate_code",
      "Code must be unique within category.",
    )));

    let err = h
      .coordinator
      .create_code(
        3,
        CreateExpenseCode {
          code: "MEAL".to_string(),
          description: None,
        },
      )
      .await
      .unwrap_err();

    assert_eq!(err.detail().map(|d| d.code.as_str()), Some("duplicate_code"));
    assert_eq!(codes(&h.cache, 3), vec![code(5, 3, "MEAL")]);
    assert_eq!(codes(&h.cache, 4), vec![code(6, 4, "TAXI")]);
  }
}
