//! Reviews API client with transparent caching and offline writes.

use std::sync::Arc;

use crate::cache::views::{self, ALL};
use crate::cache::{
  CacheLayer, InvalidationPolicy, OfflineQueue, PendingWrite, PersistentStore, ReconcileReport,
  Store, SubmitOutcome,
};
use crate::config::Config;
use crate::db::schema::STORE;
use crate::error::Result;

use super::client::HttpClient;
use super::types::{Restaurant, Review};
use super::RemoteClient;

/// Application-facing entry point.
///
/// Wraps a remote client and a persistent store, constructed once and passed
/// around explicitly. Every operation returns either data or an error, never both.
pub struct CachedClient<R: RemoteClient, S: PersistentStore> {
  remote: R,
  storage: Arc<S>,
  cache: CacheLayer<S>,
  queue: OfflineQueue<S>,
}

impl CachedClient<HttpClient, Store> {
  /// Build the HTTP-backed client described by the configuration.
  ///
  /// An unusable store degrades to uncached mode rather than failing.
  pub fn from_config(config: &Config) -> Result<Self> {
    let remote = HttpClient::new(&config.api)?;
    let storage = if config.cache.enabled {
      Store::open_or_degrade(config.cache.path.as_deref(), &STORE)
    } else {
      Store::Noop(Default::default())
    };

    Ok(Self::new(remote, storage, config.cache.policy()))
  }
}

impl<R: RemoteClient, S: PersistentStore> CachedClient<R, S> {
  pub fn new(remote: R, storage: S, policy: InvalidationPolicy) -> Self {
    let storage = Arc::new(storage);
    Self {
      remote,
      cache: CacheLayer::new(Arc::clone(&storage)).with_policy(policy),
      queue: OfflineQueue::new(Arc::clone(&storage)),
      storage,
    }
  }

  /// Whether reads and offline writes survive a restart.
  pub fn is_caching(&self) -> bool {
    self.storage.is_persistent()
  }

  // ===== Restaurants =====

  pub async fn restaurants(&self) -> Result<Vec<Restaurant>> {
    let result = self
      .cache
      .fetch_collection(|| self.remote.fetch_collection::<Restaurant>())
      .await?;
    Ok(result.data)
  }

  pub async fn restaurant(&self, id: u64) -> Result<Restaurant> {
    views::by_id(&self.restaurants().await?, &id.to_string())
  }

  pub async fn restaurants_by_cuisine(&self, cuisine: &str) -> Result<Vec<Restaurant>> {
    Ok(views::by_field(self.restaurants().await?, "cuisine_type", cuisine))
  }

  pub async fn restaurants_by_neighborhood(&self, neighborhood: &str) -> Result<Vec<Restaurant>> {
    Ok(views::by_field(self.restaurants().await?, "neighborhood", neighborhood))
  }

  /// Both filters accept `"all"` to skip filtering on that field.
  pub async fn restaurants_by_cuisine_and_neighborhood(
    &self,
    cuisine: &str,
    neighborhood: &str,
  ) -> Result<Vec<Restaurant>> {
    Ok(views::by_two_fields(
      self.restaurants().await?,
      ("cuisine_type", cuisine),
      ("neighborhood", neighborhood),
    ))
  }

  /// Distinct neighborhoods, in first-seen order.
  pub async fn neighborhoods(&self) -> Result<Vec<String>> {
    Ok(views::distinct_values_of(&self.restaurants().await?, "neighborhood"))
  }

  /// Distinct cuisines, in first-seen order.
  pub async fn cuisines(&self) -> Result<Vec<String>> {
    Ok(views::distinct_values_of(&self.restaurants().await?, "cuisine_type"))
  }

  // ===== Reviews =====

  pub async fn reviews_for(&self, restaurant_id: u64) -> Result<Vec<Review>> {
    let parent = restaurant_id.to_string();
    let result = self
      .cache
      .fetch_by_parent(&parent, || self.remote.fetch_by_parent::<Review>(&parent))
      .await?;
    Ok(result.data)
  }

  pub async fn reviews(&self) -> Result<Vec<Review>> {
    let result = self
      .cache
      .fetch_collection(|| self.remote.fetch_collection::<Review>())
      .await?;
    Ok(result.data)
  }

  pub async fn review(&self, id: u64) -> Result<Review> {
    views::by_id(&self.reviews().await?, &id.to_string())
  }

  /// Submit a review, queuing it locally if the API can't be reached.
  pub async fn submit_review(&self, review: Review) -> Result<SubmitOutcome<Review>> {
    self
      .queue
      .submit(review, |r: Review| async move { self.remote.create(&r).await })
      .await
  }

  /// Reviews waiting in the offline queue, oldest first.
  pub fn pending_reviews(&self) -> Result<Vec<PendingWrite<Review>>> {
    self.queue.pending()
  }

  /// Replay queued reviews against the API.
  pub async fn reconcile_reviews(&self) -> Result<ReconcileReport> {
    self
      .queue
      .reconcile(|r: Review| async move { self.remote.create(&r).await })
      .await
  }

  /// Restaurants filtered for list display; `None` means no filter.
  pub async fn find_restaurants(
    &self,
    cuisine: Option<&str>,
    neighborhood: Option<&str>,
  ) -> Result<Vec<Restaurant>> {
    self
      .restaurants_by_cuisine_and_neighborhood(cuisine.unwrap_or(ALL), neighborhood.unwrap_or(ALL))
      .await
  }
}
