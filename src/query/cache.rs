//! In-memory query cache.
//!
//! Holds server-derived state per key and coordinates every way it can change:
//! - `fetch` runs a loader, sharing one in-flight request among all callers
//! - `read` serves cached data and revalidates it in the background once stale
//! - `write` replaces data synchronously
//! - `invalidate` marks data stale and refetches it for active observers
//! - `cancel` makes an in-flight result ignorable on arrival
//! - optimistic layers record per-mutation snapshots so a failed write can be
//!   undone without disturbing other pending writes
//!
//! The lock is never held across an `.await`, so each operation is atomic with
//! respect to other tasks.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::api::ApiError;

use super::observer::QueryObserver;
use super::state::QueryState;

pub trait CacheKey: Clone + Eq + Hash + fmt::Display + Send + Sync + 'static {}
impl<T: Clone + Eq + Hash + fmt::Display + Send + Sync + 'static> CacheKey for T {}

pub trait CacheValue: Clone + Send + Sync + 'static {}
impl<T: Clone + Send + Sync + 'static> CacheValue for T {}

pub type LoaderResult<V> = Result<V, ApiError>;

/// Factory producing one network fetch per call
pub type Loader<V> = Arc<dyn Fn() -> BoxFuture<'static, LoaderResult<V>> + Send + Sync>;

/// Handle to an in-flight fetch; every clone resolves to the same result.
pub type Fetch<V> = Shared<BoxFuture<'static, LoaderResult<V>>>;

/// Optimistic transformation of a cached value. Returning `None` leaves the
/// value untouched.
pub type Patch<V> = Arc<dyn Fn(Option<&V>) -> Option<V> + Send + Sync>;

/// Wrap an async closure as a [`Loader`].
pub fn loader<V, F, Fut>(f: F) -> Loader<V>
where
  F: Fn() -> Fut + Send + Sync + 'static,
  Fut: Future<Output = LoaderResult<V>> + Send + 'static,
{
  Arc::new(move || f().boxed())
}

/// Wrap a closure as a [`Patch`].
pub fn patch<V, F>(f: F) -> Patch<V>
where
  F: Fn(Option<&V>) -> Option<V> + Send + Sync + 'static,
{
  Arc::new(f)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheOptions {
  /// How long successfully fetched data is served without revalidation
  pub stale_time: Duration,
  /// Extra loader runs before a failure is stored
  pub retry: u32,
  pub retry_delay: Duration,
}

impl Default for CacheOptions {
  fn default() -> Self {
    Self {
      stale_time: Duration::from_secs(5 * 60),
      retry: 1,
      retry_delay: Duration::from_secs(1),
    }
  }
}

/// Tags the optimistic layers written by one mutation invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MutationId(u64);

impl fmt::Display for MutationId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "m{}", self.0)
  }
}

/// Value and error of an entry at one point in time.
#[derive(Clone)]
struct Snapshot<V> {
  data: Option<V>,
  error: Option<ApiError>,
}

struct OptimisticLayer<V> {
  mutation: MutationId,
  /// Entry state immediately before this layer was applied
  before: Snapshot<V>,
  patch: Patch<V>,
}

struct InFlight<V> {
  id: u64,
  fetch: Fetch<V>,
}

struct Entry<V> {
  data: Option<V>,
  error: Option<ApiError>,
  updated_at: Option<Instant>,
  invalidated: bool,
  in_flight: Option<InFlight<V>>,
  loader: Option<Loader<V>>,
  observers: usize,
  /// Pending optimistic writes in application order
  layers: Vec<OptimisticLayer<V>>,
}

impl<V> Default for Entry<V> {
  fn default() -> Self {
    Self {
      data: None,
      error: None,
      updated_at: None,
      invalidated: false,
      in_flight: None,
      loader: None,
      observers: 0,
      layers: Vec::new(),
    }
  }
}

impl<V: CacheValue> Entry<V> {
  fn state(&self) -> QueryState<V> {
    if let Some(error) = &self.error {
      QueryState::Error(error.clone())
    } else if let Some(data) = &self.data {
      QueryState::Success(data.clone())
    } else if self.in_flight.is_some() {
      QueryState::Loading
    } else {
      QueryState::Idle
    }
  }

  fn is_stale(&self, now: Instant, stale_time: Duration) -> bool {
    self.invalidated
      || self
        .updated_at
        .map(|t| now.duration_since(t) >= stale_time)
        .unwrap_or(true)
  }

  /// Whether a plain read should start a fetch on its own.
  fn wants_fetch(&self, now: Instant, stale_time: Duration) -> bool {
    self.loader.is_some()
      && self.in_flight.is_none()
      && self.error.is_none()
      && self.layers.is_empty()
      && (self.data.is_none() || self.is_stale(now, stale_time))
  }

  fn snapshot(&self) -> Snapshot<V> {
    Snapshot {
      data: self.data.clone(),
      error: self.error.clone(),
    }
  }

  fn restore(&mut self, snapshot: Snapshot<V>) {
    self.data = snapshot.data;
    self.error = snapshot.error;
  }

  /// Re-apply pending layers on top of `base`, starting at layer `from`.
  fn replay(&mut self, mut value: Snapshot<V>, from: usize) {
    for layer in &mut self.layers[from..] {
      layer.before = value.clone();
      if let Some(next) = (layer.patch)(value.data.as_ref()) {
        value = Snapshot {
          data: Some(next),
          error: None,
        };
      }
    }
    self.restore(value);
  }
}

struct Inner<K, V> {
  entries: HashMap<K, Entry<V>>,
  next_fetch_id: u64,
  next_mutation_id: u64,
}

/// Shared query cache handle. Clones refer to the same store.
pub struct QueryCache<K, V> {
  inner: Arc<Mutex<Inner<K, V>>>,
  options: CacheOptions,
}

impl<K, V> Clone for QueryCache<K, V> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
      options: self.options,
    }
  }
}

impl<K: CacheKey, V: CacheValue> QueryCache<K, V> {
  pub fn new(options: CacheOptions) -> Self {
    Self {
      inner: Arc::new(Mutex::new(Inner {
        entries: HashMap::new(),
        next_fetch_id: 0,
        next_mutation_id: 0,
      })),
      options,
    }
  }

  fn lock(&self) -> MutexGuard<'_, Inner<K, V>> {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Current data for `key`, without side effects.
  pub fn data(&self, key: &K) -> Option<V> {
    self.lock().entries.get(key).and_then(|e| e.data.clone())
  }

  /// Current state for `key`, without side effects.
  #[cfg_attr(not(test), allow(dead_code))]
  pub fn state(&self, key: &K) -> QueryState<V> {
    self
      .lock()
      .entries
      .get(key)
      .map(Entry::state)
      .unwrap_or(QueryState::Idle)
  }

  /// Read-through with stale-while-revalidate.
  ///
  /// Returns the cached state immediately. If the entry has a registered
  /// loader and its data is missing or stale, a background fetch starts.
  pub fn read(&self, key: &K) -> QueryState<V> {
    let mut inner = self.lock();
    let now = Instant::now();
    let loader = match inner.entries.get(key) {
      Some(entry) if entry.wants_fetch(now, self.options.stale_time) => entry.loader.clone(),
      Some(entry) => return entry.state(),
      None => return QueryState::Idle,
    };
    if let Some(loader) = loader {
      debug!(%key, "Revalidating on read");
      self.revalidate(&mut inner, key.clone(), loader);
    }
    inner
      .entries
      .get(key)
      .map(Entry::state)
      .unwrap_or(QueryState::Idle)
  }

  /// Whether a fetch for `key` is in flight.
  pub fn is_fetching(&self, key: &K) -> bool {
    self
      .lock()
      .entries
      .get(key)
      .map(|e| e.in_flight.is_some())
      .unwrap_or(false)
  }

  /// The fetch currently in flight for `key`, if any.
  #[cfg(test)]
  pub fn in_flight(&self, key: &K) -> Option<Fetch<V>> {
    self
      .lock()
      .entries
      .get(key)
      .and_then(|e| e.in_flight.as_ref().map(|f| f.fetch.clone()))
  }

  /// Fetch `key` with `loader`, joining a fetch already in flight.
  ///
  /// The fetch is driven by its own task, so it completes and settles into
  /// the cache even if the returned handle is dropped.
  #[cfg_attr(not(test), allow(dead_code))]
  pub fn fetch(&self, key: &K, loader: Loader<V>) -> Fetch<V> {
    let mut inner = self.lock();
    let entry = inner.entries.entry(key.clone()).or_default();
    entry.loader = Some(loader.clone());
    if let Some(in_flight) = &entry.in_flight {
      debug!(%key, "Joining in-flight fetch");
      return in_flight.fetch.clone();
    }
    self.start_fetch(&mut inner, key.clone(), loader)
  }

  /// Start a new fetch with the registered loader, superseding one in flight.
  pub fn refetch(&self, key: &K) -> Option<Fetch<V>> {
    let mut inner = self.lock();
    let loader = inner.entries.get(key).and_then(|e| e.loader.clone())?;
    Some(self.start_fetch(&mut inner, key.clone(), loader))
  }

  /// Start a fetch that only its spawned task waits on.
  fn revalidate(&self, inner: &mut Inner<K, V>, key: K, loader: Loader<V>) {
    drop(self.start_fetch(inner, key, loader));
  }

  fn start_fetch(&self, inner: &mut Inner<K, V>, key: K, loader: Loader<V>) -> Fetch<V> {
    inner.next_fetch_id += 1;
    let id = inner.next_fetch_id;
    let store = Arc::downgrade(&self.inner);
    let options = self.options;
    let settle_key = key.clone();

    let fetch = async move {
      let result = run_loader(&loader, options).await;
      settle(&store, options, &settle_key, id, &result);
      result
    }
    .boxed()
    .shared();

    let entry = inner.entries.entry(key.clone()).or_default();
    if entry.in_flight.is_some() {
      debug!(%key, fetch = id, "Superseding in-flight fetch");
    }
    entry.in_flight = Some(InFlight {
      id,
      fetch: fetch.clone(),
    });
    debug!(%key, fetch = id, "Fetch started");

    tokio::spawn(fetch.clone());
    fetch
  }

  /// Replace the data for `key` synchronously.
  ///
  /// `updater` receives the current data; returning `None` leaves it as is.
  #[cfg_attr(not(test), allow(dead_code))]
  pub fn write<F>(&self, key: &K, updater: F)
  where
    F: FnOnce(Option<&V>) -> Option<V>,
  {
    let mut inner = self.lock();
    let entry = inner.entries.entry(key.clone()).or_default();
    if let Some(next) = updater(entry.data.as_ref()) {
      entry.data = Some(next);
      entry.error = None;
      entry.updated_at = Some(Instant::now());
    }
  }

  /// Mark `key` stale. Observed keys are refetched in the background.
  pub fn invalidate(&self, key: &K) {
    let mut inner = self.lock();
    let Some(entry) = inner.entries.get_mut(key) else {
      return;
    };
    entry.invalidated = true;
    let loader = if entry.observers > 0 {
      entry.loader.clone()
    } else {
      None
    };
    match loader {
      Some(loader) => {
        debug!(%key, "Invalidated, refetching for active observers");
        self.revalidate(&mut inner, key.clone(), loader);
      }
      None => debug!(%key, "Invalidated"),
    }
  }

  /// Make the in-flight fetch for `key` ignorable. Returns whether one existed.
  ///
  /// The request itself keeps running; its result is simply not stored.
  #[cfg_attr(not(test), allow(dead_code))]
  pub fn cancel(&self, key: &K) -> bool {
    let mut inner = self.lock();
    let cancelled = inner
      .entries
      .get_mut(key)
      .and_then(|e| e.in_flight.take())
      .is_some();
    if cancelled {
      debug!(%key, "Cancelled in-flight fetch");
    }
    cancelled
  }

  /// Keys holding data for which `predicate` holds.
  pub fn find_keys<P>(&self, predicate: P) -> Vec<K>
  where
    P: Fn(&K, &V) -> bool,
  {
    self
      .lock()
      .entries
      .iter()
      .filter_map(|(key, entry)| match &entry.data {
        Some(data) if predicate(key, data) => Some(key.clone()),
        _ => None,
      })
      .collect()
  }

  /// Register an active reader of `key`.
  pub fn observe(&self, key: K, loader: Loader<V>) -> QueryObserver<K, V> {
    {
      let mut inner = self.lock();
      let entry = inner.entries.entry(key.clone()).or_default();
      entry.loader = Some(loader);
      entry.observers += 1;
    }
    QueryObserver::new(self.clone(), key)
  }

  pub(super) fn release(&self, key: &K) {
    if let Some(entry) = self.lock().entries.get_mut(key) {
      entry.observers = entry.observers.saturating_sub(1);
    }
  }

  /// Number of active observers of `key`.
  #[cfg(test)]
  pub fn observer_count(&self, key: &K) -> usize {
    self.lock().entries.get(key).map(|e| e.observers).unwrap_or(0)
  }

  /// Allocate the tag for one mutation invocation.
  pub fn begin_mutation(&self) -> MutationId {
    let mut inner = self.lock();
    inner.next_mutation_id += 1;
    MutationId(inner.next_mutation_id)
  }

  /// Cancel any in-flight fetch, snapshot the entry, and apply `patch`, all
  /// under one lock acquisition.
  pub fn apply_optimistic(&self, key: &K, mutation: MutationId, patch: Patch<V>) {
    let mut inner = self.lock();
    let entry = inner.entries.entry(key.clone()).or_default();
    if entry.in_flight.take().is_some() {
      debug!(%key, %mutation, "Cancelled in-flight fetch before optimistic write");
    }
    let before = entry.snapshot();
    if let Some(next) = patch(entry.data.as_ref()) {
      entry.data = Some(next);
      entry.error = None;
    }
    entry.layers.push(OptimisticLayer {
      mutation,
      before,
      patch,
    });
    debug!(%key, %mutation, pending = entry.layers.len(), "Applied optimistic write");
  }

  /// Undo the layer `mutation` wrote to `key`.
  ///
  /// The entry goes back to the layer's snapshot, then any later pending
  /// layers are re-applied on top. If the layer is the most recent one the
  /// entry ends up exactly at its snapshot. A fetch error recorded while the
  /// layer was pending is kept, and the entry is left stale.
  pub fn rollback_optimistic(&self, key: &K, mutation: MutationId) {
    let mut inner = self.lock();
    let Some(entry) = inner.entries.get_mut(key) else {
      return;
    };
    let Some(index) = entry.layers.iter().position(|l| l.mutation == mutation) else {
      return;
    };
    let layer = entry.layers.remove(index);
    let reapplied = entry.layers.len() - index;
    let failed_fetch = entry.error.take();
    entry.replay(layer.before, index);
    if let Some(error) = failed_fetch {
      entry.error = Some(error);
      entry.invalidated = true;
    }
    warn!(%key, %mutation, reapplied, "Rolled back optimistic write");
  }

  /// Drop the snapshot for `mutation` on `key`, keeping the current value.
  pub fn commit_optimistic(&self, key: &K, mutation: MutationId) {
    let mut inner = self.lock();
    if let Some(entry) = inner.entries.get_mut(key) {
      entry.layers.retain(|l| l.mutation != mutation);
    }
  }

  /// Number of optimistic layers pending on `key`.
  #[cfg(test)]
  pub fn pending_layers(&self, key: &K) -> usize {
    self.lock().entries.get(key).map(|e| e.layers.len()).unwrap_or(0)
  }
}

async fn run_loader<V>(loader: &Loader<V>, options: CacheOptions) -> LoaderResult<V> {
  let mut failures = 0;
  loop {
    match loader().await {
      Ok(data) => return Ok(data),
      Err(e) if failures < options.retry => {
        failures += 1;
        warn!(error = %e, failures, "Query failed, retrying");
        tokio::time::sleep(options.retry_delay).await;
      }
      Err(e) => return Err(e),
    }
  }
}

/// Store a fetch result unless the fetch was cancelled or superseded.
fn settle<K: CacheKey, V: CacheValue>(
  store: &Weak<Mutex<Inner<K, V>>>,
  options: CacheOptions,
  key: &K,
  id: u64,
  result: &LoaderResult<V>,
) {
  let Some(inner) = store.upgrade() else {
    return;
  };
  let cache = QueryCache { inner, options };
  let mut inner = cache.lock();
  let Some(entry) = inner.entries.get_mut(key) else {
    return;
  };
  if entry.in_flight.as_ref().map(|f| f.id) != Some(id) {
    debug!(%key, fetch = id, "Ignoring result of cancelled fetch");
    return;
  }
  entry.in_flight = None;

  match result {
    Ok(data) => {
      entry.replay(
        Snapshot {
          data: Some(data.clone()),
          error: None,
        },
        0,
      );
      entry.updated_at = Some(Instant::now());
      entry.invalidated = false;
      debug!(%key, fetch = id, pending = entry.layers.len(), "Fetch succeeded");
    }
    Err(e) => {
      entry.error = Some(e.clone());
      warn!(%key, fetch = id, error = %e, "Fetch failed");
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::query::QueryKey;
  use std::sync::atomic::{AtomicUsize, Ordering};

  const CODES_1: QueryKey = QueryKey::ExpenseCodes(1);
  const CODES_2: QueryKey = QueryKey::ExpenseCodes(2);

  fn options() -> CacheOptions {
    CacheOptions {
      retry: 0,
      ..CacheOptions::default()
    }
  }

  fn cache() -> QueryCache<QueryKey, Vec<i32>> {
    QueryCache::new(options())
  }

  /// Loader that counts its calls and resolves after a short delay.
  fn counting(calls: &Arc<AtomicUsize>, value: Vec<i32>) -> Loader<Vec<i32>> {
    let calls = calls.clone();
    loader(move || {
      let calls = calls.clone();
      let value = value.clone();
      async move {
        calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(value)
      }
    })
  }

  fn failing(calls: &Arc<AtomicUsize>) -> Loader<Vec<i32>> {
    let calls = calls.clone();
    loader(move || {
      let calls = calls.clone();
      async move {
        calls.fetch_add(1, Ordering::SeqCst);
        Err(ApiError::Status {
          status: 500,
          body: String::new(),
        })
      }
    })
  }

  fn append(n: i32) -> Patch<Vec<i32>> {
    patch(move |old: Option<&Vec<i32>>| {
      let mut next = old.cloned().unwrap_or_default();
      next.push(n);
      Some(next)
    })
  }

  #[tokio::test(start_paused = true)]
  async fn test_concurrent_fetches_share_one_request() {
    let cache = cache();
    let calls = Arc::new(AtomicUsize::new(0));

    let fetches: Vec<_> = (0..5)
      .map(|_| cache.fetch(&QueryKey::Categories, counting(&calls, vec![1, 2])))
      .collect();
    let results = futures::future::join_all(fetches).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    for result in results {
      assert_eq!(result.unwrap(), vec![1, 2]);
    }
    assert_eq!(cache.data(&QueryKey::Categories), Some(vec![1, 2]));
  }

  #[tokio::test(start_paused = true)]
  async fn test_fresh_reread_makes_no_request() {
    let cache = cache();
    let calls = Arc::new(AtomicUsize::new(0));
    let observer = cache.observe(QueryKey::Categories, counting(&calls, vec![7]));

    assert_eq!(observer.state(), QueryState::Loading);
    cache.in_flight(&QueryKey::Categories).unwrap().await.unwrap();

    let first = observer.state();
    let second = observer.state();
    assert_eq!(first, QueryState::Success(vec![7]));
    assert_eq!(first, second);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!cache.is_fetching(&QueryKey::Categories));
  }

  #[tokio::test(start_paused = true)]
  async fn test_read_just_before_stale_time_makes_no_request() {
    let cache = cache();
    let calls = Arc::new(AtomicUsize::new(0));
    let observer = cache.observe(QueryKey::Categories, counting(&calls, vec![3]));
    observer.state();
    cache.in_flight(&QueryKey::Categories).unwrap().await.unwrap();

    tokio::time::advance(Duration::from_secs(5 * 60 - 1)).await;

    assert_eq!(observer.state(), QueryState::Success(vec![3]));
    assert!(!cache.is_fetching(&QueryKey::Categories));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_stale_read_serves_cache_and_revalidates() {
    let cache = cache();
    let calls = Arc::new(AtomicUsize::new(0));
    let observer = cache.observe(QueryKey::Categories, counting(&calls, vec![1]));
    observer.state();
    cache.in_flight(&QueryKey::Categories).unwrap().await.unwrap();

    tokio::time::advance(Duration::from_secs(5 * 60 + 1)).await;

    assert_eq!(observer.state(), QueryState::Success(vec![1]));
    assert!(cache.is_fetching(&QueryKey::Categories));
    // A second stale read joins the same revalidation
    observer.state();
    cache.in_flight(&QueryKey::Categories).unwrap().await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_failed_fetch_surfaces_error_until_success() {
    let cache = cache();
    let calls = Arc::new(AtomicUsize::new(0));

    let result = cache.fetch(&QueryKey::Categories, failing(&calls)).await;
    assert!(result.is_err());
    let observer = cache.observe(QueryKey::Categories, failing(&calls));
    assert!(observer.state().is_error());
    // Errored entries are not refetched by reads
    assert!(observer.state().is_error());
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    cache
      .fetch(&QueryKey::Categories, counting(&calls, vec![4]))
      .await
      .unwrap();
    assert_eq!(observer.state(), QueryState::Success(vec![4]));
  }

  #[tokio::test(start_paused = true)]
  async fn test_query_retry_runs_loader_again() {
    let cache: QueryCache<QueryKey, Vec<i32>> = QueryCache::new(CacheOptions::default());
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let flaky = loader(move || {
      let counter = counter.clone();
      async move {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
          Err(ApiError::Network {
            message: "reset".to_string(),
          })
        } else {
          Ok(vec![9])
        }
      }
    });

    let result = cache.fetch(&QueryKey::Categories, flaky).await;
    assert_eq!(result.unwrap(), vec![9]);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_cancelled_fetch_does_not_overwrite() {
    let cache = cache();
    let calls = Arc::new(AtomicUsize::new(0));
    cache.write(&CODES_1, |_| Some(vec![1]));

    let fetch = cache.fetch(&CODES_1, counting(&calls, vec![99]));
    assert!(cache.cancel(&CODES_1));
    // The caller still receives the result; the cache ignores it
    assert_eq!(fetch.await.unwrap(), vec![99]);
    assert_eq!(cache.data(&CODES_1), Some(vec![1]));
    assert!(!cache.cancel(&CODES_1));
  }

  #[tokio::test(start_paused = true)]
  async fn test_invalidate_refetches_observed_key_only() {
    let cache = cache();
    let calls_1 = Arc::new(AtomicUsize::new(0));
    let calls_2 = Arc::new(AtomicUsize::new(0));
    let observer_1 = cache.observe(CODES_1, counting(&calls_1, vec![1]));
    let observer_2 = cache.observe(CODES_2, counting(&calls_2, vec![2]));
    observer_1.state();
    observer_2.state();
    cache.in_flight(&CODES_1).unwrap().await.unwrap();
    cache.in_flight(&CODES_2).unwrap().await.unwrap();

    cache.invalidate(&CODES_1);

    assert!(cache.is_fetching(&CODES_1));
    assert!(!cache.is_fetching(&CODES_2));
    cache.in_flight(&CODES_1).unwrap().await.unwrap();
    assert_eq!(calls_1.load(Ordering::SeqCst), 2);
    assert_eq!(calls_2.load(Ordering::SeqCst), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_invalidate_unobserved_key_defers_to_next_read() {
    let cache = cache();
    let calls = Arc::new(AtomicUsize::new(0));
    {
      let observer = cache.observe(CODES_1, counting(&calls, vec![1]));
      observer.state();
      cache.in_flight(&CODES_1).unwrap().await.unwrap();
    }
    assert_eq!(cache.observer_count(&CODES_1), 0);

    cache.invalidate(&CODES_1);
    assert!(!cache.is_fetching(&CODES_1));

    // Stale data is still served, and the read revalidates
    assert_eq!(cache.read(&CODES_1), QueryState::Success(vec![1]));
    assert!(cache.is_fetching(&CODES_1));
  }

  #[tokio::test]
  async fn test_rollback_restores_exact_snapshot() {
    let cache = cache();
    cache.write(&CODES_1, |_| Some(vec![1, 2]));
    cache.write(&CODES_2, |_| Some(vec![5]));

    let mutation = cache.begin_mutation();
    cache.apply_optimistic(&CODES_1, mutation, append(3));
    assert_eq!(cache.data(&CODES_1), Some(vec![1, 2, 3]));

    cache.rollback_optimistic(&CODES_1, mutation);
    assert_eq!(cache.data(&CODES_1), Some(vec![1, 2]));
    assert_eq!(cache.data(&CODES_2), Some(vec![5]));
    assert_eq!(cache.pending_layers(&CODES_1), 0);
  }

  #[tokio::test]
  async fn test_rollback_of_absent_entry_leaves_it_absent() {
    let cache = cache();
    let mutation = cache.begin_mutation();
    cache.apply_optimistic(&QueryKey::Categories, mutation, append(1));
    assert_eq!(cache.data(&QueryKey::Categories), Some(vec![1]));

    cache.rollback_optimistic(&QueryKey::Categories, mutation);
    assert_eq!(cache.data(&QueryKey::Categories), None);
    assert_eq!(cache.state(&QueryKey::Categories), QueryState::Idle);
  }

  #[tokio::test]
  async fn test_earlier_rollback_keeps_later_layer() {
    let cache = cache();
    cache.write(&CODES_1, |_| Some(vec![0]));

    let first = cache.begin_mutation();
    let second = cache.begin_mutation();
    cache.apply_optimistic(&CODES_1, first, append(1));
    cache.apply_optimistic(&CODES_1, second, append(2));
    assert_eq!(cache.data(&CODES_1), Some(vec![0, 1, 2]));

    cache.rollback_optimistic(&CODES_1, first);
    assert_eq!(cache.data(&CODES_1), Some(vec![0, 2]));

    // The surviving layer now rolls back to the rebased snapshot
    cache.rollback_optimistic(&CODES_1, second);
    assert_eq!(cache.data(&CODES_1), Some(vec![0]));
  }

  #[tokio::test]
  async fn test_later_rollback_restores_state_before_it() {
    let cache = cache();
    cache.write(&CODES_1, |_| Some(vec![0]));

    let first = cache.begin_mutation();
    let second = cache.begin_mutation();
    cache.apply_optimistic(&CODES_1, first, append(1));
    cache.apply_optimistic(&CODES_1, second, append(2));

    cache.rollback_optimistic(&CODES_1, second);
    assert_eq!(cache.data(&CODES_1), Some(vec![0, 1]));
    cache.commit_optimistic(&CODES_1, first);
    assert_eq!(cache.data(&CODES_1), Some(vec![0, 1]));
    assert_eq!(cache.pending_layers(&CODES_1), 0);
  }

  #[tokio::test(start_paused = true)]
  async fn test_optimistic_write_cancels_in_flight_fetch() {
    let cache = cache();
    let calls = Arc::new(AtomicUsize::new(0));
    let fetch = cache.fetch(&CODES_1, counting(&calls, vec![10]));

    let mutation = cache.begin_mutation();
    cache.apply_optimistic(&CODES_1, mutation, append(1));
    fetch.await.unwrap();

    assert_eq!(cache.data(&CODES_1), Some(vec![1]));
  }

  #[tokio::test(start_paused = true)]
  async fn test_refetch_during_pending_layer_keeps_optimistic_value() {
    let cache = cache();
    let calls = Arc::new(AtomicUsize::new(0));
    cache.write(&CODES_1, |_| Some(vec![0]));
    let mutation = cache.begin_mutation();
    cache.apply_optimistic(&CODES_1, mutation, append(1));

    cache
      .fetch(&CODES_1, counting(&calls, vec![0, 5]))
      .await
      .unwrap();
    assert_eq!(cache.data(&CODES_1), Some(vec![0, 5, 1]));

    cache.rollback_optimistic(&CODES_1, mutation);
    assert_eq!(cache.data(&CODES_1), Some(vec![0, 5]));
  }

  #[tokio::test(start_paused = true)]
  async fn test_rollback_keeps_error_from_later_fetch() {
    let cache = cache();
    let calls = Arc::new(AtomicUsize::new(0));
    cache.write(&CODES_1, |_| Some(vec![0]));
    let mutation = cache.begin_mutation();
    cache.apply_optimistic(&CODES_1, mutation, append(1));

    let result = cache.fetch(&CODES_1, failing(&calls)).await;
    assert!(result.is_err());
    assert!(cache.state(&CODES_1).is_error());

    cache.rollback_optimistic(&CODES_1, mutation);
    assert!(cache.state(&CODES_1).is_error());
    assert_eq!(cache.data(&CODES_1), Some(vec![0]));
    assert_eq!(cache.pending_layers(&CODES_1), 0);
  }

  #[tokio::test]
  async fn test_find_keys_only_sees_populated_entries() {
    let cache = cache();
    cache.write(&CODES_1, |_| Some(vec![1, 5]));
    cache.write(&CODES_2, |_| Some(vec![2]));
    cache.write(&QueryKey::Categories, |_| None);

    let mut keys = cache.find_keys(|_, data| data.contains(&5));
    keys.sort_by_key(|k| k.code_list_category());
    assert_eq!(keys, vec![CODES_1]);
  }
}
