//! Durable, schema-versioned storage for the four record kinds.
//!
//! Stores: `events`, `snapshots`, `rule_sets`, `meta`. Each record is
//! kept as its JSON payload next to the key and index columns used for
//! lookups.
//!
//! Rules:
//!   - Full reads return rows in insertion order (rowid), no pagination
//!   - Events and snapshots are insert-only; only `clear_all_data` removes them
//!   - `clear_all_data` runs in one transaction: all four stores or none
//!   - Failures propagate as `StorageError`; nothing is retried
//!
//! SQLite is synchronous, so every call runs on the blocking pool while
//! holding the connection mutex.

use std::sync::Arc;

use rusqlite::{params, Connection, OptionalExtension, Params};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info};

use progression_kernel::{XpEvent, XpRuleSet};

use crate::config::StorageLocation;
use crate::error::StorageError;
use crate::schema::{self, SCHEMA_VERSION_KEY};
use crate::snapshot::Snapshot;

/// Free-form key/value row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaEntry {
    pub key: String,
    pub value: Value,
}

pub struct ProgressStore {
    conn: Arc<Mutex<Connection>>,
    schema_version: u32,
}

impl ProgressStore {
    /// Open or create the store, migrating up to `requested_version`,
    /// then stamp `meta["schemaVersion"]`.
    pub async fn open(
        location: &StorageLocation,
        requested_version: u32,
    ) -> Result<Self, StorageError> {
        if let StorageLocation::Path(path) = location {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
            info!(path = %path.display(), requested_version, "opening progress store");
        } else {
            info!(requested_version, "opening in-memory progress store");
        }

        let location = location.clone();
        let (conn, schema_version) =
            tokio::task::spawn_blocking(move || -> Result<(Connection, u32), StorageError> {
                let mut conn = match &location {
                    StorageLocation::Memory => Connection::open_in_memory()?,
                    StorageLocation::Path(path) => {
                        let conn = Connection::open(path)?;
                        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
                        conn.pragma_update(None, "synchronous", "NORMAL")?;
                        conn
                    }
                };
                let version = schema::migrate(&mut conn, requested_version)?;
                put_meta(&conn, SCHEMA_VERSION_KEY, &Value::from(version))?;
                Ok((conn, version))
            })
            .await??;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            schema_version,
        })
    }

    /// Layout version in force for this handle.
    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    /// Release the connection.
    pub async fn close(self) -> Result<(), StorageError> {
        let Ok(mutex) = Arc::try_unwrap(self.conn) else {
            // A blocking task still holds a clone; it closes on drop.
            debug!("progress store still referenced, deferring close");
            return Ok(());
        };
        let conn = mutex.into_inner();
        tokio::task::spawn_blocking(move || conn.close().map_err(|(_, e)| StorageError::from(e)))
            .await??;
        info!("progress store closed");
        Ok(())
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StorageError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.blocking_lock();
            f(&mut *guard)
        })
        .await?
    }

    // ── events ────────────────────────────────────────────────────

    pub async fn add_event(&self, event: &XpEvent) -> Result<(), StorageError> {
        let event = event.clone();
        self.with_conn(move |conn| insert_event(conn, &event)).await
    }

    pub async fn get_all_events(&self) -> Result<Vec<XpEvent>, StorageError> {
        self.with_conn(|conn| {
            load_payloads(conn, "SELECT payload_json FROM events ORDER BY rowid", [])
        })
        .await
    }

    /// Events for one rule, oldest first.
    pub async fn events_by_rule(&self, rule_id: &str) -> Result<Vec<XpEvent>, StorageError> {
        let rule_id = rule_id.to_string();
        self.with_conn(move |conn| {
            load_payloads(
                conn,
                "SELECT payload_json FROM events WHERE rule_id = ?1 ORDER BY timestamp, rowid",
                params![rule_id],
            )
        })
        .await
    }

    /// Events with `from <= timestamp <= to`, oldest first.
    pub async fn events_between(&self, from: i64, to: i64) -> Result<Vec<XpEvent>, StorageError> {
        self.with_conn(move |conn| {
            load_payloads(
                conn,
                "SELECT payload_json FROM events WHERE timestamp BETWEEN ?1 AND ?2 ORDER BY timestamp, rowid",
                params![from, to],
            )
        })
        .await
    }

    pub async fn event_count(&self) -> Result<usize, StorageError> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
            Ok(usize::try_from(n).unwrap_or(0))
        })
        .await
    }

    // ── snapshots ─────────────────────────────────────────────────

    pub async fn add_snapshot(&self, snapshot: &Snapshot) -> Result<(), StorageError> {
        let snapshot = snapshot.clone();
        self.with_conn(move |conn| insert_snapshot(conn, &snapshot)).await
    }

    /// Insert an event and the snapshot taken after it in one
    /// transaction. Either both rows land or neither does.
    pub async fn append_event_with_snapshot(
        &self,
        event: &XpEvent,
        snapshot: &Snapshot,
    ) -> Result<(), StorageError> {
        let event = event.clone();
        let snapshot = snapshot.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            insert_event(&tx, &event)?;
            insert_snapshot(&tx, &snapshot)?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    pub async fn get_all_snapshots(&self) -> Result<Vec<Snapshot>, StorageError> {
        self.with_conn(|conn| {
            load_payloads(conn, "SELECT payload_json FROM snapshots ORDER BY rowid", [])
        })
        .await
    }

    /// Snapshots with `from <= timestamp <= to`, oldest first.
    pub async fn snapshots_between(&self, from: i64, to: i64) -> Result<Vec<Snapshot>, StorageError> {
        self.with_conn(move |conn| {
            load_payloads(
                conn,
                "SELECT payload_json FROM snapshots WHERE timestamp BETWEEN ?1 AND ?2 ORDER BY timestamp, rowid",
                params![from, to],
            )
        })
        .await
    }

    pub async fn snapshots_for_event(&self, event_id: &str) -> Result<Vec<Snapshot>, StorageError> {
        let event_id = event_id.to_string();
        self.with_conn(move |conn| {
            load_payloads(
                conn,
                "SELECT payload_json FROM snapshots WHERE event_id = ?1 ORDER BY timestamp, rowid",
                params![event_id],
            )
        })
        .await
    }

    // ── rule sets ─────────────────────────────────────────────────

    pub async fn add_rule_set(&self, rule_set: &XpRuleSet) -> Result<(), StorageError> {
        let rule_set = rule_set.clone();
        self.with_conn(move |conn| insert_rule_set(conn, &rule_set)).await
    }

    pub async fn get_all_rule_sets(&self) -> Result<Vec<XpRuleSet>, StorageError> {
        self.with_conn(|conn| {
            load_payloads(conn, "SELECT payload_json FROM rule_sets ORDER BY rowid", [])
        })
        .await
    }

    pub async fn rule_set_by_version(&self, version: u32) -> Result<Option<XpRuleSet>, StorageError> {
        self.with_conn(move |conn| {
            load_one(
                conn,
                "SELECT payload_json FROM rule_sets WHERE version = ?1 ORDER BY rowid LIMIT 1",
                params![version],
            )
        })
        .await
    }

    /// Rule set with the highest version, if any.
    pub async fn latest_rule_set(&self) -> Result<Option<XpRuleSet>, StorageError> {
        self.with_conn(|conn| {
            load_one(
                conn,
                "SELECT payload_json FROM rule_sets ORDER BY version DESC, rowid DESC LIMIT 1",
                [],
            )
        })
        .await
    }

    // ── meta ──────────────────────────────────────────────────────

    pub async fn set_meta(&self, key: &str, value: &Value) -> Result<(), StorageError> {
        let key = key.to_string();
        let value = value.clone();
        self.with_conn(move |conn| put_meta(conn, &key, &value)).await
    }

    pub async fn get_meta(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            let raw: Option<String> = conn
                .query_row("SELECT value FROM meta WHERE key = ?1", params![key], |row| {
                    row.get(0)
                })
                .optional()?;
            Ok(raw.map(|s| serde_json::from_str(&s)).transpose()?)
        })
        .await
    }

    pub async fn get_all_meta(&self) -> Result<Vec<MetaEntry>, StorageError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT key, value FROM meta ORDER BY rowid")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            let mut out = Vec::new();
            for row in rows {
                let (key, raw) = row?;
                out.push(MetaEntry {
                    key,
                    value: serde_json::from_str(&raw)?,
                });
            }
            Ok(out)
        })
        .await
    }

    // ── bulk ──────────────────────────────────────────────────────

    /// Insert rule sets then events in one transaction, preserving order.
    ///
    /// A non-empty `rule_sets` replaces every stored rule set.
    pub async fn import_records(
        &self,
        rule_sets: Vec<XpRuleSet>,
        events: Vec<XpEvent>,
    ) -> Result<(), StorageError> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            if !rule_sets.is_empty() {
                tx.execute("DELETE FROM rule_sets", [])?;
            }
            for rule_set in &rule_sets {
                insert_rule_set(&tx, rule_set)?;
            }
            for event in &events {
                insert_event(&tx, event)?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    /// Empty all four stores atomically.
    pub async fn clear_all_data(&self) -> Result<(), StorageError> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            tx.execute_batch(
                "DELETE FROM events;
                 DELETE FROM snapshots;
                 DELETE FROM rule_sets;
                 DELETE FROM meta;",
            )?;
            tx.commit()?;
            Ok(())
        })
        .await?;
        info!("progress store cleared");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Row helpers (run on the blocking pool)
// ---------------------------------------------------------------------------

fn insert_event(conn: &Connection, event: &XpEvent) -> Result<(), StorageError> {
    let payload = serde_json::to_string(event)?;
    conn.execute(
        "INSERT INTO events (id, timestamp, rule_id, payload_json) VALUES (?1, ?2, ?3, ?4)",
        params![event.id, event.timestamp, event.rule_id, payload],
    )?;
    Ok(())
}

fn insert_snapshot(conn: &Connection, snapshot: &Snapshot) -> Result<(), StorageError> {
    let payload = serde_json::to_string(snapshot)?;
    conn.execute(
        "INSERT INTO snapshots (id, timestamp, event_id, payload_json) VALUES (?1, ?2, ?3, ?4)",
        params![snapshot.id, snapshot.timestamp, snapshot.event_id, payload],
    )?;
    Ok(())
}

fn insert_rule_set(conn: &Connection, rule_set: &XpRuleSet) -> Result<(), StorageError> {
    let payload = serde_json::to_string(rule_set)?;
    conn.execute(
        "INSERT INTO rule_sets (id, version, payload_json) VALUES (?1, ?2, ?3)",
        params![rule_set.id, rule_set.version, payload],
    )?;
    Ok(())
}

fn put_meta(conn: &Connection, key: &str, value: &Value) -> Result<(), StorageError> {
    conn.execute(
        "INSERT INTO meta (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value.to_string()],
    )?;
    Ok(())
}

fn load_payloads<T: DeserializeOwned, P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<Vec<T>, StorageError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |row| row.get::<_, String>(0))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(serde_json::from_str(&row?)?);
    }
    Ok(out)
}

fn load_one<T: DeserializeOwned, P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<Option<T>, StorageError> {
    let raw: Option<String> = conn.query_row(sql, params, |row| row.get(0)).optional()?;
    Ok(raw.map(|s| serde_json::from_str(&s)).transpose()?)
}
