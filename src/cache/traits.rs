//! Core traits and types for the caching system.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::time::Duration;

/// A domain record that lives in one collection of the store.
///
/// Records are immutable value snapshots: storing a record with an existing id
/// replaces the stored value wholesale.
pub trait Record: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
  /// Server-assigned identifier, `None` until the server has created the record.
  fn record_id(&self) -> Option<String>;

  /// Collection (store partition and API resource) this record belongs to.
  fn collection() -> &'static str;

  /// Name of the secondary index over the parent foreign key, if any.
  fn parent_index() -> Option<&'static str> {
    None
  }

  /// Value of the parent foreign key for this record.
  fn parent_id(&self) -> Option<String> {
    None
  }

  /// Stamp client-side `createdAt`/`updatedAt` before queuing an offline write.
  fn stamp(&mut self, _at: DateTime<Utc>) {}

  /// Attribute lookup by serialized field name, used by the query views.
  ///
  /// Strings compare by content; numbers and booleans by their JSON text.
  fn field(&self, name: &str) -> Option<String> {
    let value = serde_json::to_value(self).ok()?;
    match value.get(name)? {
      Value::Null => None,
      Value::String(s) => Some(s.clone()),
      other => Some(other.to_string()),
    }
  }
}

/// When a populated partition stops being authoritative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InvalidationPolicy {
  /// A partition that has ever been populated is served forever.
  #[default]
  NeverInvalidate,
  /// Refetch once the last backfill is older than the given age, serving the
  /// stale copy if the refetch fails.
  MaxAge(Duration),
}

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  pub fn from_cache(data: T, cached_at: Option<DateTime<Utc>>) -> Self {
    Self {
      data,
      source: CacheSource::Cache,
      cached_at,
    }
  }

  /// Stale cached data served because the refetch failed.
  pub fn offline(data: T, cached_at: Option<DateTime<Utc>>) -> Self {
    Self {
      data,
      source: CacheSource::Offline,
      cached_at,
    }
  }
}

/// Indicates where returned data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fetched from the remote API on this call
  Network,
  /// Served from the local store
  Cache,
  /// Remote unreachable, serving a stale local copy
  Offline,
}
