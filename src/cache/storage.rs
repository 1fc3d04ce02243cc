//! Persistent store trait and its SQLite / no-op implementations.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, warn};

use super::offline::PendingWrite;
use super::traits::Record;
use crate::db::{self, Schema};
use crate::error::{CacheError, Result};

/// Scope value used in `partition_meta` for whole-collection backfills.
const WHOLE_COLLECTION: &str = "";

/// Trait for persistent store backends.
///
/// Every call is its own transaction; partial writes are never observable.
pub trait PersistentStore: Send + Sync {
  /// Whether writes survive a restart. `false` means degraded (no cache) mode.
  fn is_persistent(&self) -> bool;

  /// Upsert one record into its collection.
  fn put<T: Record>(&self, record: &T) -> Result<()>;

  /// Upsert many records atomically.
  fn put_many<T: Record>(&self, records: &[T]) -> Result<()>;

  /// All records of a collection, in first-insert order.
  fn get_all<T: Record>(&self) -> Result<Vec<T>>;

  /// Records whose indexed field equals `value`.
  fn get_all_by_index<T: Record>(&self, index: &str, value: &str) -> Result<Vec<T>>;

  /// Remember when a collection (or one parent scope of it) was backfilled.
  fn mark_backfilled(&self, collection: &str, scope: Option<&str>) -> Result<()>;

  fn backfilled_at(&self, collection: &str, scope: Option<&str>)
    -> Result<Option<DateTime<Utc>>>;

  fn put_pending<T: Record>(&self, write: &PendingWrite<T>) -> Result<()>;

  /// Pending writes of a collection, oldest first.
  fn get_pending<T: Record>(&self) -> Result<Vec<PendingWrite<T>>>;

  fn delete_pending(&self, id: &str) -> Result<()>;

  /// Bump the attempt counter of a pending write and keep the last error.
  fn record_pending_failure(&self, id: &str, error: &str) -> Result<()>;
}

/// Storage implementation that doesn't cache anything.
/// Used when no persistent storage is available - all operations are no-ops.
#[derive(Debug, Default)]
pub struct NoopStorage;

impl PersistentStore for NoopStorage {
  fn is_persistent(&self) -> bool {
    false
  }

  fn put<T: Record>(&self, _record: &T) -> Result<()> {
    Ok(()) // Discard
  }

  fn put_many<T: Record>(&self, _records: &[T]) -> Result<()> {
    Ok(()) // Discard
  }

  fn get_all<T: Record>(&self) -> Result<Vec<T>> {
    Ok(Vec::new()) // Always miss
  }

  fn get_all_by_index<T: Record>(&self, _index: &str, _value: &str) -> Result<Vec<T>> {
    Ok(Vec::new()) // Always miss
  }

  fn mark_backfilled(&self, _collection: &str, _scope: Option<&str>) -> Result<()> {
    Ok(())
  }

  fn backfilled_at(
    &self,
    _collection: &str,
    _scope: Option<&str>,
  ) -> Result<Option<DateTime<Utc>>> {
    Ok(None)
  }

  fn put_pending<T: Record>(&self, _write: &PendingWrite<T>) -> Result<()> {
    Ok(()) // Discard
  }

  fn get_pending<T: Record>(&self) -> Result<Vec<PendingWrite<T>>> {
    Ok(Vec::new())
  }

  fn delete_pending(&self, _id: &str) -> Result<()> {
    Ok(())
  }

  fn record_pending_failure(&self, _id: &str, _error: &str) -> Result<()> {
    Ok(())
  }
}

/// SQLite-based store implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open (creating and migrating as needed) a store file.
  pub fn open(path: &Path, schema: &Schema) -> Result<Self> {
    let conn = db::open(path)?;
    debug!(path = %path.display(), "Opened cache database");
    Self::with_connection(conn, schema)
  }

  /// Open the store at the default data directory location.
  pub fn open_default(schema: &Schema) -> Result<Self> {
    let path = db::default_path(schema.name)?;
    Self::open(&path, schema)
  }

  /// Non-persistent SQLite store, mainly for tests.
  pub fn open_in_memory(schema: &Schema) -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| CacheError::StorageUnavailable(e.to_string()))?;
    Self::with_connection(conn, schema)
  }

  fn with_connection(mut conn: Connection, schema: &Schema) -> Result<Self> {
    db::migrate(&mut conn, schema)?;
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }
}

/// Look up a registered collection's index name.
fn registered_index(conn: &Connection, collection: &str) -> Result<Option<String>> {
  conn
    .query_row(
      "SELECT index_name FROM collections WHERE name = ?",
      params![collection],
      |row| row.get::<_, Option<String>>(0),
    )
    .optional()?
    .ok_or_else(|| CacheError::UnknownCollection(collection.to_string()))
}

/// Upsert a record, keeping its original row position on replace.
fn upsert<T: Record>(conn: &Connection, index: Option<&str>, record: &T) -> Result<()> {
  let id = record
    .record_id()
    .ok_or(CacheError::MissingId(T::collection()))?;
  let index_value = index.and_then(|field| record.field(field));
  let data = serde_json::to_vec(record)?;

  conn.execute(
    "INSERT INTO records (collection, id, index_value, data) VALUES (?, ?, ?, ?)
     ON CONFLICT(collection, id) DO UPDATE SET
       index_value = excluded.index_value,
       data = excluded.data",
    params![T::collection(), id, index_value, data],
  )?;
  Ok(())
}

fn decode_all<T: Record>(
  rows: impl Iterator<Item = rusqlite::Result<Vec<u8>>>,
) -> Result<Vec<T>> {
  rows
    .map(|data| -> Result<T> { Ok(serde_json::from_slice(&data?)?) })
    .collect()
}

impl PersistentStore for SqliteStorage {
  fn is_persistent(&self) -> bool {
    true
  }

  fn put<T: Record>(&self, record: &T) -> Result<()> {
    let conn = self.conn.lock()?;
    let index = registered_index(&conn, T::collection())?;
    upsert(&conn, index.as_deref(), record)
  }

  fn put_many<T: Record>(&self, records: &[T]) -> Result<()> {
    let mut conn = self.conn.lock()?;
    let index = registered_index(&conn, T::collection())?;

    // Dropping the transaction on an early return rolls it back
    let tx = conn.transaction()?;
    for record in records {
      upsert(&tx, index.as_deref(), record)?;
    }
    tx.commit()?;

    debug!(collection = T::collection(), count = records.len(), "Stored records");
    Ok(())
  }

  fn get_all<T: Record>(&self) -> Result<Vec<T>> {
    let conn = self.conn.lock()?;
    registered_index(&conn, T::collection())?;

    let mut stmt = conn.prepare("SELECT data FROM records WHERE collection = ? ORDER BY rowid")?;
    let rows = stmt.query_map(params![T::collection()], |row| {
      row.get::<_, Vec<u8>>(0)
    })?;
    decode_all(rows)
  }

  fn get_all_by_index<T: Record>(&self, index: &str, value: &str) -> Result<Vec<T>> {
    let conn = self.conn.lock()?;
    if registered_index(&conn, T::collection())?.as_deref() != Some(index) {
      return Err(CacheError::UnknownIndex {
        collection: T::collection().to_string(),
        index: index.to_string(),
      });
    }

    let mut stmt = conn.prepare(
      "SELECT data FROM records
       WHERE collection = ? AND index_value = ?
       ORDER BY rowid",
    )?;
    let rows = stmt.query_map(params![T::collection(), value], |row| {
      row.get::<_, Vec<u8>>(0)
    })?;
    decode_all(rows)
  }

  fn mark_backfilled(&self, collection: &str, scope: Option<&str>) -> Result<()> {
    let conn = self.conn.lock()?;
    conn.execute(
      "INSERT OR REPLACE INTO partition_meta (collection, scope, cached_at) VALUES (?, ?, ?)",
      params![
        collection,
        scope.unwrap_or(WHOLE_COLLECTION),
        format_datetime(Utc::now())
      ],
    )?;
    Ok(())
  }

  fn backfilled_at(
    &self,
    collection: &str,
    scope: Option<&str>,
  ) -> Result<Option<DateTime<Utc>>> {
    let conn = self.conn.lock()?;
    let cached_at: Option<String> = conn
      .query_row(
        "SELECT cached_at FROM partition_meta WHERE collection = ? AND scope = ?",
        params![collection, scope.unwrap_or(WHOLE_COLLECTION)],
        |row| row.get(0),
      )
      .optional()?;

    cached_at.as_deref().map(parse_datetime).transpose()
  }

  fn put_pending<T: Record>(&self, write: &PendingWrite<T>) -> Result<()> {
    let conn = self.conn.lock()?;
    let data = serde_json::to_vec(&write.record)?;

    conn.execute(
      "INSERT INTO pending_writes (id, collection, data, created_at, updated_at, attempts, last_error)
       VALUES (?, ?, ?, ?, ?, ?, ?)",
      params![
        write.id,
        T::collection(),
        data,
        format_datetime(write.created_at),
        format_datetime(write.updated_at),
        write.attempts,
        write.last_error,
      ],
    )?;
    Ok(())
  }

  fn get_pending<T: Record>(&self) -> Result<Vec<PendingWrite<T>>> {
    let conn = self.conn.lock()?;
    let mut stmt = conn.prepare(
      "SELECT id, data, created_at, updated_at, attempts, last_error FROM pending_writes
       WHERE collection = ?
       ORDER BY created_at, rowid",
    )?;

    let rows = stmt.query_map(params![T::collection()], |row| {
      Ok((
        row.get::<_, String>(0)?,
        row.get::<_, Vec<u8>>(1)?,
        row.get::<_, String>(2)?,
        row.get::<_, String>(3)?,
        row.get::<_, u32>(4)?,
        row.get::<_, Option<String>>(5)?,
      ))
    })?;

    let pending = rows
      .map(|row| -> Result<PendingWrite<T>> {
        let (id, data, created_at, updated_at, attempts, last_error) = row?;
        Ok(PendingWrite {
          id,
          record: serde_json::from_slice(&data)?,
          created_at: parse_datetime(&created_at)?,
          updated_at: parse_datetime(&updated_at)?,
          attempts,
          last_error,
        })
      })
      .collect::<Result<Vec<_>>>()?;
    Ok(pending)
  }

  fn delete_pending(&self, id: &str) -> Result<()> {
    let conn = self.conn.lock()?;
    let removed = conn.execute("DELETE FROM pending_writes WHERE id = ?", params![id])?;
    if removed == 0 {
      warn!(id, "Pending write already removed");
    }
    Ok(())
  }

  fn record_pending_failure(&self, id: &str, error: &str) -> Result<()> {
    let conn = self.conn.lock()?;
    conn.execute(
      "UPDATE pending_writes
       SET attempts = attempts + 1, last_error = ?, updated_at = ?
       WHERE id = ?",
      params![error, format_datetime(Utc::now()), id],
    )?;
    Ok(())
  }
}

/// Store handle picked at startup: SQLite when it opens, otherwise no-op.
pub enum Store {
  Sqlite(SqliteStorage),
  Noop(NoopStorage),
}

impl Store {
  /// Open the store, degrading to uncached mode instead of failing.
  pub fn open_or_degrade(path: Option<&Path>, schema: &Schema) -> Self {
    let opened = match path {
      Some(path) => SqliteStorage::open(path, schema),
      None => SqliteStorage::open_default(schema),
    };

    match opened {
      Ok(storage) => Store::Sqlite(storage),
      Err(e) => {
        warn!(error = %e, "Persistent storage unavailable, running without cache");
        Store::Noop(NoopStorage)
      }
    }
  }
}

macro_rules! dispatch {
  ($store:expr, $inner:ident => $call:expr) => {
    match $store {
      Store::Sqlite($inner) => $call,
      Store::Noop($inner) => $call,
    }
  };
}

impl PersistentStore for Store {
  fn is_persistent(&self) -> bool {
    dispatch!(self, s => s.is_persistent())
  }

  fn put<T: Record>(&self, record: &T) -> Result<()> {
    dispatch!(self, s => s.put(record))
  }

  fn put_many<T: Record>(&self, records: &[T]) -> Result<()> {
    dispatch!(self, s => s.put_many(records))
  }

  fn get_all<T: Record>(&self) -> Result<Vec<T>> {
    dispatch!(self, s => s.get_all())
  }

  fn get_all_by_index<T: Record>(&self, index: &str, value: &str) -> Result<Vec<T>> {
    dispatch!(self, s => s.get_all_by_index(index, value))
  }

  fn mark_backfilled(&self, collection: &str, scope: Option<&str>) -> Result<()> {
    dispatch!(self, s => s.mark_backfilled(collection, scope))
  }

  fn backfilled_at(
    &self,
    collection: &str,
    scope: Option<&str>,
  ) -> Result<Option<DateTime<Utc>>> {
    dispatch!(self, s => s.backfilled_at(collection, scope))
  }

  fn put_pending<T: Record>(&self, write: &PendingWrite<T>) -> Result<()> {
    dispatch!(self, s => s.put_pending(write))
  }

  fn get_pending<T: Record>(&self) -> Result<Vec<PendingWrite<T>>> {
    dispatch!(self, s => s.get_pending())
  }

  fn delete_pending(&self, id: &str) -> Result<()> {
    dispatch!(self, s => s.delete_pending(id))
  }

  fn record_pending_failure(&self, id: &str, error: &str) -> Result<()> {
    dispatch!(self, s => s.record_pending_failure(id, error))
  }
}

/// Fixed-width RFC 3339 so stored timestamps sort lexicographically.
fn format_datetime(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| {
      CacheError::Storage(rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        Box::new(e),
      ))
    })
}

#[cfg(test)]
impl SqliteStorage {
  /// Run raw SQL against the store, for setting up failure cases.
  pub(crate) fn execute_batch(&self, sql: &str) -> Result<()> {
    self.conn.lock()?.execute_batch(sql)?;
    Ok(())
  }
}
