//! Read-through local cache and offline write queue for a restaurant reviews API.
//!
//! Reads are served from a local SQLite store when it holds the requested
//! collection, otherwise fetched from the API and backfilled. Writes that
//! cannot reach the API are queued durably and replayed on `reconcile`.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{CachedClient, HttpClient, RemoteClient, RemoteError};
pub use error::{CacheError, Result};
