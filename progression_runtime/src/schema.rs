//! Schema versions and additive migrations.
//!
//! The persisted layout version lives in SQLite's `user_version`
//! pragma. Opening at a higher version runs every missing step inside
//! one transaction. Steps only ever create tables and indexes; no step
//! drops or rewrites stored rows.

use rusqlite::Connection;
use tracing::info;

use crate::error::StorageError;

/// Latest layout this build can open.
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

/// Key of the confirmation stamp written to `meta` after every open.
pub const SCHEMA_VERSION_KEY: &str = "schemaVersion";

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial_stores",
        sql: "
            CREATE TABLE IF NOT EXISTS events (
                id TEXT PRIMARY KEY,
                timestamp INTEGER NOT NULL,
                rule_id TEXT NOT NULL,
                payload_json TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp);
            CREATE INDEX IF NOT EXISTS idx_events_rule_id ON events(rule_id);

            CREATE TABLE IF NOT EXISTS snapshots (
                id TEXT PRIMARY KEY,
                timestamp INTEGER NOT NULL,
                event_id TEXT NOT NULL,
                payload_json TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_snapshots_timestamp ON snapshots(timestamp);
            CREATE INDEX IF NOT EXISTS idx_snapshots_event_id ON snapshots(event_id);

            CREATE TABLE IF NOT EXISTS rule_sets (
                id TEXT PRIMARY KEY,
                version INTEGER NOT NULL,
                payload_json TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_rule_sets_version ON rule_sets(version);

            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
        ",
    },
    Migration {
        version: 2,
        name: "compound_lookups",
        sql: "
            CREATE INDEX IF NOT EXISTS idx_events_rule_timestamp ON events(rule_id, timestamp);
            CREATE INDEX IF NOT EXISTS idx_snapshots_event_timestamp ON snapshots(event_id, timestamp);
        ",
    },
];

/// Layout version currently persisted (0 for a brand-new database).
pub fn persisted_version(conn: &Connection) -> Result<u32, StorageError> {
    let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(u32::try_from(version).unwrap_or(0))
}

/// Bring the layout up to `requested`. Returns the version now in force.
pub fn migrate(conn: &mut Connection, requested: u32) -> Result<u32, StorageError> {
    if requested == 0 || requested > CURRENT_SCHEMA_VERSION {
        return Err(StorageError::UnsupportedSchemaVersion {
            requested,
            supported: CURRENT_SCHEMA_VERSION,
        });
    }

    let persisted = persisted_version(conn)?;
    if persisted > requested {
        return Err(StorageError::SchemaDowngrade {
            persisted,
            requested,
        });
    }
    if persisted == requested {
        return Ok(requested);
    }

    let tx = conn.transaction()?;
    for step in MIGRATIONS
        .iter()
        .filter(|m| m.version > persisted && m.version <= requested)
    {
        info!(version = step.version, name = step.name, "applying schema migration");
        tx.execute_batch(step.sql)?;
    }
    tx.pragma_update(None, "user_version", requested)?;
    tx.commit()?;

    Ok(requested)
}
