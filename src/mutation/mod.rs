//! Optimistic writes against the query cache.
//!
//! Every mutation follows the same protocol: cancel fetches for the keys it
//! touches, apply a locally synthesized value, send the request, then either
//! confirm the optimistic value and invalidate whatever may now be stale, or
//! roll back every key it touched and hand the error to the caller.

mod categories;
mod codes;

use std::future::Future;
use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use tracing::{info, warn};

use crate::api::transport::{HttpTransport, Transport};
use crate::api::{
  ApiClient, ApiError, Category, CreateCategory, CreateExpenseCode, ExpenseCode, Operation,
  UpdateCategory, UpdateExpenseCode,
};
use crate::query::{MutationId, Patch, QueryKey};
use crate::store::{ExpensesCache, Resource};

/// A validated write, ready to dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
  CreateCategory(CreateCategory),
  UpdateCategory(i64, UpdateCategory),
  CreateCode(i64, CreateExpenseCode),
  UpdateCode(i64, UpdateExpenseCode),
}

impl Mutation {
  pub fn operation(&self) -> Operation {
    match self {
      Self::CreateCategory(_) => Operation::CreateCategory,
      Self::UpdateCategory(..) => Operation::UpdateCategory,
      Self::CreateCode(..) => Operation::CreateCode,
      Self::UpdateCode(..) => Operation::UpdateCode,
    }
  }
}

/// Server-confirmed result of a [`Mutation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmed {
  Category(Category),
  Code(ExpenseCode),
}

impl Confirmed {
  /// Short description for status messages
  pub fn summary(&self) -> String {
    match self {
      Self::Category(c) => format!("category '{}'", c.name),
      Self::Code(c) => format!("code '{}'", c.code),
    }
  }
}

/// Runs create/update operations with apply-before-confirm semantics.
#[derive(Clone)]
pub struct MutationCoordinator<T: Transport = HttpTransport> {
  cache: ExpensesCache,
  api: ApiClient<T>,
  temp_ids: TempIds,
}

impl<T: Transport + Clone> MutationCoordinator<T> {
  pub fn new(cache: ExpensesCache, api: ApiClient<T>) -> Self {
    Self {
      cache,
      api,
      temp_ids: TempIds::default(),
    }
  }

  pub fn cache(&self) -> &ExpensesCache {
    &self.cache
  }

  /// Whether `id` names an entity created locally that the server has not
  /// assigned an id to yet.
  pub fn is_placeholder(&self, id: i64) -> bool {
    self.temp_ids.contains(id)
  }

  /// Apply the optimistic value now and return the request still to be sent.
  ///
  /// The cache shows the new value as soon as this returns, before the
  /// returned future is first polled.
  pub fn start(
    &self,
    mutation: Mutation,
  ) -> impl Future<Output = Result<Confirmed, ApiError>> + Send + 'static {
    let update = match &mutation {
      Mutation::CreateCategory(body) => self.apply_create_category(body),
      Mutation::UpdateCategory(id, body) => self.apply_update_category(*id, body),
      Mutation::CreateCode(category_id, body) => self.apply_create_code(*category_id, body),
      Mutation::UpdateCode(id, body) => self.apply_update_code(*id, body),
    };
    let this = self.clone();

    async move {
      match mutation {
        Mutation::CreateCategory(body) => this
          .send_create_category(update, &body)
          .await
          .map(Confirmed::Category),
        Mutation::UpdateCategory(id, body) => this
          .send_update_category(update, id, &body)
          .await
          .map(Confirmed::Category),
        Mutation::CreateCode(category_id, body) => this
          .send_create_code(update, category_id, &body)
          .await
          .map(Confirmed::Code),
        Mutation::UpdateCode(id, body) => this
          .send_update_code(update, id, &body)
          .await
          .map(Confirmed::Code),
      }
    }
  }

  /// Start an optimistic update owned by one mutation invocation.
  fn begin(&self, operation: Operation) -> OptimisticUpdate {
    OptimisticUpdate {
      cache: self.cache.clone(),
      mutation: self.cache.begin_mutation(),
      operation,
      touched: Vec::new(),
      settled: false,
    }
  }

  /// Resolve a mutation: confirm and invalidate `stale(value)` on success,
  /// roll back on failure.
  fn settle<R, F>(
    &self,
    update: OptimisticUpdate,
    result: Result<R, ApiError>,
    stale: F,
  ) -> Result<R, ApiError>
  where
    F: FnOnce(&R) -> Vec<QueryKey>,
  {
    let operation = update.operation;
    match result {
      Ok(value) => {
        update.commit();
        let keys = stale(&value);
        for key in &keys {
          self.cache.invalidate(key);
        }
        info!(?operation, invalidated = keys.len(), "Mutation succeeded");
        Ok(value)
      }
      Err(e) => {
        update.rollback();
        warn!(?operation, error = %e, "Mutation failed");
        Err(e)
      }
    }
  }
}

/// Optimistic layers written by one mutation invocation.
///
/// Dropping an unsettled update rolls it back, so an abandoned mutation
/// leaves no phantom values behind.
struct OptimisticUpdate {
  cache: ExpensesCache,
  mutation: MutationId,
  operation: Operation,
  touched: Vec<QueryKey>,
  settled: bool,
}

impl OptimisticUpdate {
  /// Cancel fetches for `key`, snapshot it, and apply `patch`.
  fn apply(&mut self, key: QueryKey, patch: Patch<Resource>) {
    self.cache.apply_optimistic(&key, self.mutation, patch);
    self.touched.push(key);
  }

  fn commit(mut self) {
    for key in &self.touched {
      self.cache.commit_optimistic(key, self.mutation);
    }
    self.settled = true;
  }

  fn rollback(mut self) {
    self.undo();
    self.settled = true;
  }

  fn undo(&self) {
    for key in self.touched.iter().rev() {
      self.cache.rollback_optimistic(key, self.mutation);
    }
  }
}

impl Drop for OptimisticUpdate {
  fn drop(&mut self) {
    if !self.settled {
      self.undo();
    }
  }
}

/// Session-unique placeholder ids for optimistically created entities.
///
/// Derived from the wall clock in milliseconds and strictly increasing even
/// when two are taken within the same millisecond. Issued ids are remembered
/// for the session.
#[derive(Debug, Clone, Default)]
struct TempIds {
  last: Arc<AtomicI64>,
  issued: Arc<Mutex<HashSet<i64>>>,
}

impl TempIds {
  fn next(&self) -> i64 {
    let now = Utc::now().timestamp_millis();
    let previous = self
      .last
      .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
        Some(now.max(last + 1))
      })
      .unwrap_or(now);
    let id = now.max(previous + 1);
    self
      .issued
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .insert(id);
    id
  }

  fn contains(&self, id: i64) -> bool {
    self
      .issued
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .contains(&id)
  }
}
