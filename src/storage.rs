// 💾 Key/Value Persistence - SQLite-backed snapshot store
//
// Every value is a whole JSON snapshot under a fixed key. Writers replace the
// entire value. Read-modify-write cycles go through `update_json`, which holds
// the connection lock and an immediate transaction for the whole cycle.
//
// The `*_json` helpers implement the "storage degrades silently" policy:
// a failed or corrupt read is logged and treated as empty state, a failed
// write is logged and dropped. Callers that need the error use the raw API.

use crate::error::StorageError;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

// ============================================================================
// STORAGE KEYS
// ============================================================================

/// All library entries, one JSON array
pub const KEY_LIBRARY: &str = "tierlist_all_tiers";

/// Current editor snapshot `{ rows, typeLabels }`
pub const KEY_EDITOR_STATE: &str = "tierlist_state";

/// Pseudonymous viewer id
pub const KEY_USER_ID: &str = "userId";

/// Display author name
pub const KEY_USER_NAME: &str = "userName";

pub type Result<T> = std::result::Result<T, StorageError>;

// ============================================================================
// STORE
// ============================================================================

/// Cloneable handle to one SQLite key/value database
#[derive(Debug, Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (or create) a file-backed store
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Volatile store, used by tests and `--ephemeral` runs
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        setup_database(&conn)?;
        Ok(Store {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::Poisoned)
    }

    // ========================================================================
    // RAW ACCESS
    // ========================================================================

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.lock()?;
        select_value(&conn, key)
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.lock()?;
        upsert_value(&conn, key, value)
    }

    /// Delete a key; deleting a missing key is fine
    pub fn remove(&self, key: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM kv_store WHERE key = ?1", params![key])?;
        Ok(())
    }

    pub fn keys(&self) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT key FROM kv_store ORDER BY key")?;
        let keys = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(keys)
    }

    // ========================================================================
    // JSON SNAPSHOTS (degrading)
    // ========================================================================

    /// Read and decode a snapshot. Missing, unreadable or corrupt → `None`.
    pub fn read_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::error!(key, error = %e, "storage read failed; treating as empty");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(key, error = %e, "stored snapshot is corrupt; treating as empty");
                None
            }
        }
    }

    /// Encode and write a snapshot. Failures are logged and dropped.
    /// Returns whether the write landed.
    pub fn write_json<T: Serialize>(&self, key: &str, value: &T) -> bool {
        let encoded = match serde_json::to_string(value) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(key, error = %e, "snapshot encoding failed; write dropped");
                return false;
            }
        };

        match self.set(key, &encoded) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(key, error = %e, "storage write failed; write dropped");
                false
            }
        }
    }

    /// Read-modify-write one snapshot without letting another writer in
    /// between. `apply` gets the decoded value (missing or corrupt reads as
    /// `T::default()`) and returns its result plus whether to write back.
    ///
    /// `None` means the value could not be read at all and `apply` never ran.
    /// A failed write is logged and dropped; the result is still returned.
    pub fn update_json<T, R, F>(&self, key: &str, apply: F) -> Option<R>
    where
        T: Serialize + DeserializeOwned + Default,
        F: FnOnce(&mut T) -> (R, bool),
    {
        let mut conn = match self.lock() {
            Ok(conn) => conn,
            Err(e) => {
                tracing::error!(key, error = %e, "storage update skipped");
                return None;
            }
        };

        let tx = match conn.transaction_with_behavior(TransactionBehavior::Immediate) {
            Ok(tx) => tx,
            Err(e) => {
                tracing::error!(key, error = %e, "storage update skipped");
                return None;
            }
        };

        let mut value: T = match select_value(&tx, key) {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::error!(key, error = %e, "stored snapshot is corrupt; treating as empty");
                T::default()
            }),
            Ok(None) => T::default(),
            Err(e) => {
                tracing::error!(key, error = %e, "storage read failed; update skipped");
                return None;
            }
        };

        let (result, changed) = apply(&mut value);
        if changed {
            if let Err(e) = commit_json(tx, key, &value) {
                tracing::error!(key, error = %e, "storage write failed; write dropped");
            }
        }
        Some(result)
    }
}

fn select_value(conn: &Connection, key: &str) -> Result<Option<String>> {
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM kv_store WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value)
}

fn commit_json<T: Serialize>(tx: Transaction<'_>, key: &str, value: &T) -> Result<()> {
    let encoded = serde_json::to_string(value)?;
    upsert_value(&tx, key, &encoded)?;
    tx.commit()?;
    Ok(())
}

fn upsert_value(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        params![key, value, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS kv_store (
            key TEXT PRIMARY KEY NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;

    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
