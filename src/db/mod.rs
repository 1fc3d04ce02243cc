//! SQLite connection handling and versioned schema migrations.

pub mod schema;

use rusqlite::Connection;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{CacheError, Result};

/// One schema step. `sql` must leave the store consistent if re-run after a
/// rollback, so prefer `IF NOT EXISTS` / `OR IGNORE` forms.
#[derive(Debug)]
pub struct Migration {
  pub version: u32,
  pub sql: &'static str,
}

/// A named, versioned store layout.
#[derive(Debug)]
pub struct Schema {
  pub name: &'static str,
  pub version: u32,
  pub migrations: &'static [Migration],
}

/// Get the default database path for a store name
pub fn default_path(name: &str) -> Result<PathBuf> {
  let data_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| CacheError::StorageUnavailable("Could not determine data directory".into()))?;

  Ok(data_dir.join("tablecache").join(format!("{}.db", name)))
}

/// Open or create the database file, creating its parent directory.
///
/// Any failure here means there is no usable persistent storage.
pub fn open(path: &Path) -> Result<Connection> {
  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent).map_err(|e| {
      CacheError::StorageUnavailable(format!(
        "Failed to create cache directory {}: {}",
        parent.display(),
        e
      ))
    })?;
  }

  Connection::open(path).map_err(|e| {
    CacheError::StorageUnavailable(format!(
      "Failed to open cache database at {}: {}",
      path.display(),
      e
    ))
  })
}

/// Read the on-disk schema version.
pub fn user_version(conn: &Connection) -> Result<u32> {
  Ok(conn.query_row("PRAGMA user_version", [], |row| row.get(0))?)
}

/// Bring the store up to `schema.version`.
///
/// Each pending migration runs in its own transaction together with the
/// version bump, so an interrupted run leaves the store at a whole version.
/// Returns the version found on disk before migrating.
pub fn migrate(conn: &mut Connection, schema: &Schema) -> Result<u32> {
  let found = user_version(conn)?;
  if found >= schema.version {
    debug!(store = schema.name, version = found, "Schema up to date");
    return Ok(found);
  }

  for migration in schema
    .migrations
    .iter()
    .filter(|m| m.version > found && m.version <= schema.version)
  {
    let version = migration.version;
    let step = |conn: &mut Connection| -> rusqlite::Result<()> {
      let tx = conn.transaction()?;
      tx.execute_batch(migration.sql)?;
      tx.pragma_update(None, "user_version", version)?;
      tx.commit()
    };
    step(&mut *conn).map_err(|source| CacheError::Migration { version, source })?;
    info!(store = schema.name, version, "Applied schema migration");
  }

  Ok(found)
}

#[cfg(test)]
mod tests {
  use super::*;

  static STEPS: &[Migration] = &[
    Migration {
      version: 1,
      sql: "CREATE TABLE IF NOT EXISTS a (x INTEGER);",
    },
    Migration {
      version: 2,
      sql: "CREATE TABLE IF NOT EXISTS b (y INTEGER);",
    },
    Migration {
      version: 3,
      sql: "CREATE TABLE c (z INTEGER); THIS IS NOT SQL;",
    },
  ];

  fn schema(version: u32) -> Schema {
    Schema {
      name: "test",
      version,
      migrations: STEPS,
    }
  }

  fn table_exists(conn: &Connection, name: &str) -> bool {
    conn
      .query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
        [name],
        |row| row.get::<_, i64>(0),
      )
      .map(|n| n == 1)
      .unwrap_or(false)
  }

  #[test]
  fn test_migrate_runs_pending_steps_once() {
    let mut conn = Connection::open_in_memory().unwrap();

    assert_eq!(migrate(&mut conn, &schema(1)).unwrap(), 0);
    assert_eq!(user_version(&conn).unwrap(), 1);
    assert!(table_exists(&conn, "a"));
    assert!(!table_exists(&conn, "b"));

    assert_eq!(migrate(&mut conn, &schema(2)).unwrap(), 1);
    assert_eq!(user_version(&conn).unwrap(), 2);
    assert!(table_exists(&conn, "b"));

    // Already current: nothing to do
    assert_eq!(migrate(&mut conn, &schema(2)).unwrap(), 2);
  }

  #[test]
  fn test_failed_migration_rolls_back_to_previous_version() {
    let mut conn = Connection::open_in_memory().unwrap();

    let err = migrate(&mut conn, &schema(3)).unwrap_err();
    assert!(matches!(err, CacheError::Migration { version: 3, .. }));

    assert_eq!(user_version(&conn).unwrap(), 2);
    assert!(table_exists(&conn, "b"));
    assert!(!table_exists(&conn, "c"));
  }
}
