//! What the query cache holds for the expenses domain, and how each key loads.

use crate::api::transport::Transport;
use crate::api::{ApiClient, Category, ExpenseCode};
use crate::query::{loader, CacheOptions, Loader, QueryCache, QueryKey};

/// Value stored under a [`QueryKey`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
  Categories(Vec<Category>),
  Codes(Vec<ExpenseCode>),
}

impl Resource {
  pub fn categories(&self) -> Option<&[Category]> {
    match self {
      Self::Categories(list) => Some(list),
      Self::Codes(_) => None,
    }
  }

  pub fn codes(&self) -> Option<&[ExpenseCode]> {
    match self {
      Self::Codes(list) => Some(list),
      Self::Categories(_) => None,
    }
  }
}

/// The process-wide cache, passed explicitly to whoever needs it.
pub type ExpensesCache = QueryCache<QueryKey, Resource>;

pub fn new_cache(options: CacheOptions) -> ExpensesCache {
  QueryCache::new(options)
}

/// Loader for the list behind `key`.
pub fn loader_for<T: Transport + Clone>(api: &ApiClient<T>, key: QueryKey) -> Loader<Resource> {
  let api = api.clone();
  loader(move || {
    let api = api.clone();
    async move {
      match key {
        QueryKey::Categories => api.list_categories().await.map(Resource::Categories),
        QueryKey::ExpenseCodes(id) => api.list_codes(id).await.map(Resource::Codes),
      }
    }
  })
}
