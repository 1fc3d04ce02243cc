//! Store layout: one partition per collection plus the pending-write partition.

use super::{Migration, Schema};

pub const STORE_NAME: &str = "tablecache";

pub static STORE: Schema = Schema {
  name: STORE_NAME,
  version: 2,
  migrations: MIGRATIONS,
};

static MIGRATIONS: &[Migration] = &[
  Migration {
    version: 1,
    sql: r#"
-- Registered partitions; records may only be written to these
CREATE TABLE IF NOT EXISTS collections (
    name TEXT PRIMARY KEY,
    index_name TEXT
);

INSERT OR IGNORE INTO collections (name, index_name) VALUES ('restaurants', NULL);
INSERT OR IGNORE INTO collections (name, index_name) VALUES ('reviews', 'restaurant_id');

-- Record snapshots (serialized JSON), keyed by collection + id
CREATE TABLE IF NOT EXISTS records (
    collection TEXT NOT NULL,
    id TEXT NOT NULL,
    index_value TEXT,
    data BLOB NOT NULL,
    PRIMARY KEY (collection, id),
    FOREIGN KEY (collection) REFERENCES collections(name)
);

CREATE INDEX IF NOT EXISTS idx_records_index
    ON records(collection, index_value);

-- Last backfill per collection ('' scope) or per parent id
CREATE TABLE IF NOT EXISTS partition_meta (
    collection TEXT NOT NULL,
    scope TEXT NOT NULL,
    cached_at TEXT NOT NULL,
    PRIMARY KEY (collection, scope)
);

-- Writes that could not reach the remote API
CREATE TABLE IF NOT EXISTS pending_writes (
    id TEXT PRIMARY KEY,
    collection TEXT NOT NULL,
    data BLOB NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_pending_writes_collection
    ON pending_writes(collection, created_at);
"#,
  },
  Migration {
    version: 2,
    sql: r#"
ALTER TABLE pending_writes ADD COLUMN attempts INTEGER NOT NULL DEFAULT 0;
ALTER TABLE pending_writes ADD COLUMN last_error TEXT;
"#,
  },
];
