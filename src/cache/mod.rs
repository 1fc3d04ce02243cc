//! Local caching layer for offline data access.
//!
//! This module provides a record-agnostic caching mechanism that:
//! - Persists records per collection in a versioned SQLite store
//! - Serves reads from the store when populated, else fetches and backfills
//! - Queues writes durably when the remote API is unreachable, for later replay
//! - Derives filtered views and facet lists from the cached records
//! - Degrades to uncached pass-through when no persistent storage exists

mod layer;
mod offline;
mod storage;
mod traits;
pub mod views;

pub use layer::CacheLayer;
pub use offline::{OfflineQueue, PendingWrite, ReconcileReport, SubmitOutcome};
pub use storage::{NoopStorage, PersistentStore, SqliteStorage, Store};
pub use traits::{CacheResult, CacheSource, InvalidationPolicy, Record};
