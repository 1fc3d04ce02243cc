//! Durable queue for writes that could not reach the remote API.
//!
//! Queued writes live in their own store partition and are invisible to
//! normal reads until `reconcile` replays them.

use chrono::{DateTime, SubsecRound, Utc};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use super::storage::PersistentStore;
use super::traits::Record;
use crate::api::RemoteError;
use crate::error::Result;

/// A record whose create call failed, waiting for replay.
#[derive(Debug, Clone, Serialize)]
pub struct PendingWrite<T> {
  /// Generated per write; two writes in the same instant never collide
  pub id: String,
  pub record: T,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  /// Failed replay attempts so far
  pub attempts: u32,
  pub last_error: Option<String>,
}

impl<T: Record> PendingWrite<T> {
  /// Stamp the record with the current time and give it a fresh key.
  pub fn new(mut record: T) -> Self {
    // Microseconds, matching what the store persists
    let now = Utc::now().trunc_subsecs(6);
    record.stamp(now);
    Self {
      id: Uuid::new_v4().to_string(),
      record,
      created_at: now,
      updated_at: now,
      attempts: 0,
      last_error: None,
    }
  }
}

/// What happened to a submitted write.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", content = "record", rename_all = "snake_case")]
pub enum SubmitOutcome<T> {
  /// Accepted by the server; the returned record is cached and readable.
  Created(T),
  /// Server unreachable; stored in the pending partition for later replay.
  Queued(PendingWrite<T>),
  /// Server unreachable and no persistent storage to queue into.
  Discarded(T),
}

impl<T> SubmitOutcome<T> {
  pub fn is_created(&self) -> bool {
    matches!(self, SubmitOutcome::Created(_))
  }

  pub fn is_queued(&self) -> bool {
    matches!(self, SubmitOutcome::Queued(_))
  }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
  /// Writes accepted by the server and removed from the queue
  pub replayed: usize,
  /// Writes whose replay failed. A rejected write is skipped; an unreachable
  /// server stops the drain.
  pub failed: usize,
  /// Writes still queued afterwards
  pub remaining: usize,
}

/// Offline write queue over a persistent store.
pub struct OfflineQueue<S: PersistentStore> {
  storage: Arc<S>,
  /// Serializes reconcile runs so a write is never replayed twice at once
  draining: Mutex<()>,
}

impl<S: PersistentStore> OfflineQueue<S> {
  pub fn new(storage: Arc<S>) -> Self {
    Self {
      storage,
      draining: Mutex::new(()),
    }
  }

  /// Try to create `record` remotely, queuing it locally if that fails.
  ///
  /// Only a failure to queue locally is reported as an error.
  pub async fn submit<T, F, Fut>(&self, record: T, create: F) -> Result<SubmitOutcome<T>>
  where
    T: Record,
    F: FnOnce(T) -> Fut,
    Fut: Future<Output = std::result::Result<T, RemoteError>>,
  {
    let collection = T::collection();

    match create(record.clone()).await {
      Ok(created) => {
        if let Err(e) = self.storage.put(&created) {
          warn!(collection, error = %e, "Failed to cache created record");
        }
        info!(collection, id = ?created.record_id(), "Record created remotely");
        Ok(SubmitOutcome::Created(created))
      }
      Err(e) => {
        if !self.storage.is_persistent() {
          warn!(collection, error = %e, "Remote create failed and no storage to queue into");
          return Ok(SubmitOutcome::Discarded(record));
        }

        let pending = PendingWrite::new(record);
        self.storage.put_pending(&pending)?;
        info!(collection, id = %pending.id, error = %e, "Remote create failed, queued offline");
        Ok(SubmitOutcome::Queued(pending))
      }
    }
  }

  /// Pending writes of a collection, oldest first.
  pub fn pending<T: Record>(&self) -> Result<Vec<PendingWrite<T>>> {
    self.storage.get_pending()
  }

  /// Replay queued writes in submission order.
  ///
  /// Each accepted write is removed from the queue and its server copy cached.
  /// Failures are recorded on the write, which stays queued. A rejection moves
  /// on to the next write; an unavailable server ends the drain.
  pub async fn reconcile<T, F, Fut>(&self, create: F) -> Result<ReconcileReport>
  where
    T: Record,
    F: Fn(T) -> Fut,
    Fut: Future<Output = std::result::Result<T, RemoteError>>,
  {
    let _guard = self.draining.lock().await;
    let collection = T::collection();
    let mut report = ReconcileReport::default();

    for write in self.storage.get_pending::<T>()? {
      match create(write.record.clone()).await {
        Ok(created) => {
          // Dequeue first: a failed cache write must not cause a second replay
          if let Err(e) = self.storage.delete_pending(&write.id) {
            warn!(collection, id = %write.id, error = %e, "Failed to dequeue replayed write");
          }
          if let Err(e) = self.storage.put(&created) {
            warn!(collection, error = %e, "Failed to cache replayed record");
          }
          report.replayed += 1;
        }
        Err(e) => {
          if let Err(store_err) = self.storage.record_pending_failure(&write.id, &e.to_string()) {
            warn!(collection, id = %write.id, error = %store_err, "Failed to record replay failure");
          }
          report.failed += 1;

          if e.is_unavailable() {
            warn!(collection, id = %write.id, error = %e, "Remote unavailable, stopping drain");
            break;
          }
          warn!(collection, id = %write.id, error = %e, "Replay rejected, keeping write queued");
        }
      }
    }

    report.remaining = self.storage.get_pending::<T>()?.len();
    info!(
      collection,
      replayed = report.replayed,
      remaining = report.remaining,
      "Reconciled offline writes"
    );
    Ok(report)
  }
}
