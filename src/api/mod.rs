//! Remote reviews API: the client contract, its HTTP implementation, and the
//! cached facade the application talks to.

mod cache;
pub mod cached_client;
pub mod client;
pub mod error;
pub mod types;

use async_trait::async_trait;

use crate::cache::Record;

pub use cached_client::CachedClient;
pub use client::HttpClient;
pub use error::RemoteError;

/// Network collaborator used by the cache layer and the offline queue.
///
/// Collections are addressed by `Record::collection()`.
#[async_trait]
pub trait RemoteClient: Send + Sync {
  /// `GET /{collection}`
  async fn fetch_collection<T: Record>(&self) -> Result<Vec<T>, RemoteError>;

  /// `GET /{collection}?{parent_index}={parent_id}`
  async fn fetch_by_parent<T: Record>(&self, parent_id: &str) -> Result<Vec<T>, RemoteError>;

  /// `POST /{collection}`; returns the record with server-assigned fields.
  async fn create<T: Record>(&self, record: &T) -> Result<T, RemoteError>;
}
