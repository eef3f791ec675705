use super::cache::{CacheKey, CacheValue, Fetch, QueryCache};
use super::state::QueryState;

/// An active reader of one cache key.
///
/// While alive, invalidating the key triggers an immediate background refetch.
/// Dropping the observer unregisters it.
pub struct QueryObserver<K: CacheKey, V: CacheValue> {
  cache: QueryCache<K, V>,
  key: K,
}

impl<K: CacheKey, V: CacheValue> QueryObserver<K, V> {
  pub(super) fn new(cache: QueryCache<K, V>, key: K) -> Self {
    Self { cache, key }
  }

  pub fn key(&self) -> &K {
    &self.key
  }

  /// Current state, revalidating in the background when stale.
  pub fn state(&self) -> QueryState<V> {
    self.cache.read(&self.key)
  }

  /// Whether a fetch is in flight, including background revalidation.
  pub fn is_fetching(&self) -> bool {
    self.cache.is_fetching(&self.key)
  }

  /// Force a new fetch, e.g. after an error.
  pub fn refetch(&self) -> Option<Fetch<V>> {
    self.cache.refetch(&self.key)
  }
}

impl<K: CacheKey, V: CacheValue> Drop for QueryObserver<K, V> {
  fn drop(&mut self) {
    self.cache.release(&self.key);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::query::cache::{loader, CacheOptions};
  use crate::query::QueryKey;

  #[tokio::test]
  async fn test_drop_releases_observer() {
    let cache: QueryCache<QueryKey, u32> = QueryCache::new(CacheOptions::default());
    let first = cache.observe(QueryKey::Categories, loader(|| async { Ok(1) }));
    let second = cache.observe(QueryKey::Categories, loader(|| async { Ok(1) }));
    assert_eq!(cache.observer_count(&QueryKey::Categories), 2);

    drop(first);
    assert_eq!(cache.observer_count(&QueryKey::Categories), 1);
    assert_eq!(second.key(), &QueryKey::Categories);
    drop(second);
    assert_eq!(cache.observer_count(&QueryKey::Categories), 0);
  }

  #[tokio::test]
  async fn test_refetch_after_error_recovers() {
    let cache: QueryCache<QueryKey, u32> = QueryCache::new(CacheOptions {
      retry: 0,
      ..CacheOptions::default()
    });
    let failed = cache
      .fetch(
        &QueryKey::Categories,
        loader(|| async {
          Err(crate::api::ApiError::Network {
            message: "down".to_string(),
          })
        }),
      )
      .await;
    assert!(failed.is_err());

    let observer = cache.observe(QueryKey::Categories, loader(|| async { Ok(3) }));
    assert!(observer.state().is_error());

    observer.refetch().unwrap().await.unwrap();
    assert_eq!(observer.state(), QueryState::Success(3));
    assert!(!observer.is_fetching());
  }
}
