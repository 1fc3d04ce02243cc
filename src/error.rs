//! Error taxonomy shared by the store, the cache layer and the offline queue.

use thiserror::Error;

use crate::api::RemoteError;

pub type Result<T, E = CacheError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum CacheError {
  /// No persistent storage could be opened. Callers degrade to uncached mode.
  #[error("Persistent storage unavailable: {0}")]
  StorageUnavailable(String),

  #[error("Remote API unavailable: {0}")]
  RemoteUnavailable(#[source] RemoteError),

  #[error("No {collection} record with id {id}")]
  NotFound { collection: &'static str, id: String },

  #[error("Storage error: {0}")]
  Storage(#[from] rusqlite::Error),

  #[error("Failed to (de)serialize record: {0}")]
  Serialization(#[from] serde_json::Error),

  #[error("Collection '{0}' is not registered in the store schema")]
  UnknownCollection(String),

  #[error("Collection '{collection}' has no index named '{index}'")]
  UnknownIndex { collection: String, index: String },

  #[error("Cannot store a {0} record without an id")]
  MissingId(&'static str),

  #[error("Migration to schema version {version} failed: {source}")]
  Migration {
    version: u32,
    #[source]
    source: rusqlite::Error,
  },

  #[error("Lock poisoned: {0}")]
  LockPoisoned(String),
}

impl CacheError {
  pub fn not_found(collection: &'static str, id: impl Into<String>) -> Self {
    CacheError::NotFound {
      collection,
      id: id.into(),
    }
  }

  pub fn is_remote_unavailable(&self) -> bool {
    matches!(self, CacheError::RemoteUnavailable(_))
  }

  pub fn is_not_found(&self) -> bool {
    matches!(self, CacheError::NotFound { .. })
  }

  pub fn is_storage_unavailable(&self) -> bool {
    matches!(self, CacheError::StorageUnavailable(_))
  }
}

impl From<RemoteError> for CacheError {
  fn from(e: RemoteError) -> Self {
    match e {
      RemoteError::NoParentEndpoint(collection) => CacheError::UnknownIndex {
        collection: collection.to_string(),
        index: "parent".to_string(),
      },
      e => CacheError::RemoteUnavailable(e),
    }
  }
}

impl<T> From<std::sync::PoisonError<T>> for CacheError {
  fn from(e: std::sync::PoisonError<T>) -> Self {
    CacheError::LockPoisoned(e.to_string())
  }
}
