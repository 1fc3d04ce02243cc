//! Cache layer that orchestrates caching logic with network fetching.

use chrono::{DateTime, TimeDelta, Utc};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use super::storage::PersistentStore;
use super::traits::{CacheResult, InvalidationPolicy, Record};
use crate::api::RemoteError;
use crate::error::{CacheError, Result};

/// Read-through cache over a persistent store.
///
/// Holds no state of its own beyond the shared store handle, so it is safe to
/// clone and to rebuild after a restart.
pub struct CacheLayer<S: PersistentStore> {
  storage: Arc<S>,
  policy: InvalidationPolicy,
}

impl<S: PersistentStore> CacheLayer<S> {
  /// Create a new cache layer with the given storage backend.
  pub fn new(storage: Arc<S>) -> Self {
    Self {
      storage,
      policy: InvalidationPolicy::NeverInvalidate,
    }
  }

  pub fn with_policy(mut self, policy: InvalidationPolicy) -> Self {
    self.policy = policy;
    self
  }

  pub fn policy(&self) -> InvalidationPolicy {
    self.policy
  }

  /// Whether a populated partition must be refetched under the current policy.
  fn is_stale(&self, cached_at: Option<DateTime<Utc>>) -> bool {
    match self.policy {
      InvalidationPolicy::NeverInvalidate => false,
      InvalidationPolicy::MaxAge(max_age) => match cached_at {
        // Populated but never backfilled (e.g. only locally created records)
        None => true,
        Some(at) => TimeDelta::from_std(max_age).map_or(false, |max| Utc::now() - at > max),
      },
    }
  }

  /// Fetch a whole collection.
  ///
  /// 1. If the store holds any record of the collection, return it (no network)
  /// 2. Otherwise fetch from network and backfill the store
  /// 3. Network failure on a miss propagates as `RemoteUnavailable`
  pub async fn fetch_collection<T, F, Fut>(&self, fetcher: F) -> Result<CacheResult<Vec<T>>>
  where
    T: Record,
    F: FnOnce() -> Fut,
    Fut: Future<Output = std::result::Result<Vec<T>, RemoteError>>,
  {
    let cached = self.load(T::collection(), || self.storage.get_all::<T>());
    self.read_through(None, cached, fetcher).await
  }

  /// Fetch the records of one parent, looked up through the collection's
  /// secondary index. Same hit/miss policy as `fetch_collection`.
  pub async fn fetch_by_parent<T, F, Fut>(
    &self,
    parent_id: &str,
    fetcher: F,
  ) -> Result<CacheResult<Vec<T>>>
  where
    T: Record,
    F: FnOnce() -> Fut,
    Fut: Future<Output = std::result::Result<Vec<T>, RemoteError>>,
  {
    let index = T::parent_index().ok_or_else(|| CacheError::UnknownIndex {
      collection: T::collection().to_string(),
      index: "parent".to_string(),
    })?;

    let cached = self.load(T::collection(), || {
      self.storage.get_all_by_index::<T>(index, parent_id)
    });
    self.read_through(Some(parent_id), cached, fetcher).await
  }

  /// Storage read failures are treated as a miss, never surfaced.
  fn load<T>(&self, collection: &str, read: impl FnOnce() -> Result<Vec<T>>) -> Vec<T> {
    match read() {
      Ok(records) => records,
      Err(e) => {
        warn!(collection, error = %e, "Cache read failed, treating as miss");
        Vec::new()
      }
    }
  }

  async fn read_through<T, F, Fut>(
    &self,
    scope: Option<&str>,
    cached: Vec<T>,
    fetcher: F,
  ) -> Result<CacheResult<Vec<T>>>
  where
    T: Record,
    F: FnOnce() -> Fut,
    Fut: Future<Output = std::result::Result<Vec<T>, RemoteError>>,
  {
    let collection = T::collection();

    if cached.is_empty() {
      debug!(collection, ?scope, "Cache miss");
      let data = fetcher().await?;
      self.backfill(scope, &data);
      return Ok(CacheResult::from_network(data));
    }

    let cached_at = self
      .storage
      .backfilled_at(collection, scope)
      .unwrap_or_else(|e| {
        warn!(collection, error = %e, "Failed to read backfill time");
        None
      });

    if !self.is_stale(cached_at) {
      debug!(collection, ?scope, count = cached.len(), "Cache hit");
      return Ok(CacheResult::from_cache(cached, cached_at));
    }

    // Stale under a max-age policy: try to refresh, fall back to what we have
    match fetcher().await {
      Ok(data) => {
        self.backfill(scope, &data);
        Ok(CacheResult::from_network(data))
      }
      Err(e) => {
        warn!(collection, ?scope, error = %e, "Refetch failed, serving stale cache");
        Ok(CacheResult::offline(cached, cached_at))
      }
    }
  }

  /// Write fetched records into the store. Failures only degrade caching.
  fn backfill<T: Record>(&self, scope: Option<&str>, data: &[T]) {
    if data.is_empty() {
      return;
    }

    let collection = T::collection();
    let stored = self
      .storage
      .put_many(data)
      .and_then(|()| self.storage.mark_backfilled(collection, scope));

    match stored {
      Ok(()) => debug!(collection, ?scope, count = data.len(), "Backfilled cache"),
      Err(e) => warn!(collection, error = %e, "Backfill failed, continuing uncached"),
    }
  }
}

impl<S: PersistentStore> Clone for CacheLayer<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      policy: self.policy,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::types::{Restaurant, Review};
  use crate::api::RemoteClient;
  use crate::cache::storage::{NoopStorage, SqliteStorage};
  use crate::cache::CacheSource;
  use crate::db::schema::STORE;
  use crate::testing::{restaurant, review, FakeRemote};
  use std::time::Duration;

  fn sqlite() -> Arc<SqliteStorage> {
    Arc::new(SqliteStorage::open_in_memory(&STORE).unwrap())
  }

  fn remote() -> FakeRemote {
    FakeRemote::new()
      .with(vec![
        restaurant(1, "Mission Chinese Food", "Manhattan", "Asian"),
        restaurant(2, "Emily", "Brooklyn", "Pizza"),
      ])
      .with(vec![review(1, 1, "Steve"), review(2, 2, "Morgan")])
  }

  #[tokio::test]
  async fn test_second_fetch_is_served_from_cache() {
    let cache = CacheLayer::new(sqlite());
    let remote = remote();

    let first = cache
      .fetch_collection(|| remote.fetch_collection::<Restaurant>())
      .await
      .unwrap();
    assert_eq!(first.source, CacheSource::Network);

    let second = cache
      .fetch_collection(|| remote.fetch_collection::<Restaurant>())
      .await
      .unwrap();
    assert_eq!(second.source, CacheSource::Cache);
    assert_eq!(second.data, first.data);
    assert!(second.cached_at.is_some());
    assert_eq!(remote.fetch_count(), 1);
  }

  #[tokio::test]
  async fn test_miss_with_remote_down_fails_without_caching() {
    let storage = sqlite();
    let cache = CacheLayer::new(Arc::clone(&storage));
    let remote = remote();
    remote.set_offline(true);

    let err = cache
      .fetch_collection(|| remote.fetch_collection::<Restaurant>())
      .await
      .unwrap_err();
    assert!(err.is_remote_unavailable());
    assert!(storage.get_all::<Restaurant>().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_fetch_by_parent_uses_index_and_scoped_endpoint() {
    let cache = CacheLayer::new(sqlite());
    let remote = remote();

    let first = cache
      .fetch_by_parent("1", || remote.fetch_by_parent::<Review>("1"))
      .await
      .unwrap();
    assert_eq!(first.source, CacheSource::Network);
    assert_eq!(first.data.len(), 1);

    let again = cache
      .fetch_by_parent("1", || remote.fetch_by_parent::<Review>("1"))
      .await
      .unwrap();
    assert_eq!(again.source, CacheSource::Cache);
    assert_eq!(again.data, first.data);

    // A different parent is a separate miss
    let other = cache
      .fetch_by_parent("2", || remote.fetch_by_parent::<Review>("2"))
      .await
      .unwrap();
    assert_eq!(other.source, CacheSource::Network);
    assert_eq!(other.data[0].name, "Morgan");
    assert_eq!(remote.fetch_count(), 2);
  }

  #[tokio::test]
  async fn test_degraded_mode_always_uses_network() {
    let cache = CacheLayer::new(Arc::new(NoopStorage));
    let remote = remote();

    for _ in 0..2 {
      let result = cache
        .fetch_collection(|| remote.fetch_collection::<Restaurant>())
        .await
        .unwrap();
      assert_eq!(result.source, CacheSource::Network);
      assert_eq!(result.data.len(), 2);
    }
    assert_eq!(remote.fetch_count(), 2);
  }

  #[tokio::test]
  async fn test_max_age_refetches_and_serves_stale_when_offline() {
    let cache = CacheLayer::new(sqlite()).with_policy(InvalidationPolicy::MaxAge(Duration::ZERO));
    assert_eq!(cache.policy(), InvalidationPolicy::MaxAge(Duration::ZERO));
    let remote = remote();

    cache
      .fetch_collection(|| remote.fetch_collection::<Restaurant>())
      .await
      .unwrap();

    // With zero max age, the populated partition is immediately stale
    tokio::time::sleep(Duration::from_millis(5)).await;
    let refreshed = cache
      .fetch_collection(|| remote.fetch_collection::<Restaurant>())
      .await
      .unwrap();
    assert_eq!(refreshed.source, CacheSource::Network);
    assert_eq!(remote.fetch_count(), 2);

    remote.set_offline(true);
    let stale = cache
      .fetch_collection(|| remote.fetch_collection::<Restaurant>())
      .await
      .unwrap();
    assert_eq!(stale.source, CacheSource::Offline);
    assert_eq!(stale.data.len(), 2);
  }

  #[tokio::test]
  async fn test_concurrent_cold_fetches_converge() {
    let storage = sqlite();
    let cache = CacheLayer::new(Arc::clone(&storage));
    let remote = remote();

    let (a, b) = tokio::join!(
      cache.fetch_collection(|| remote.fetch_collection::<Restaurant>()),
      cache.fetch_collection(|| remote.fetch_collection::<Restaurant>()),
    );
    assert_eq!(a.unwrap().data.len(), 2);
    assert_eq!(b.unwrap().data.len(), 2);
    assert_eq!(storage.get_all::<Restaurant>().unwrap().len(), 2);
  }
}
