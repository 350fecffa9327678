//! Persistent key-value store
//!
//! The engine persists its collections as JSON documents in a small
//! key-value store with change notification. Notifications fire for every
//! changed key regardless of origin, including the writer's own set calls,
//! so consumers must apply them idempotently. Completion order is
//! per-call; superseding writes are last-write-wins.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use tokio::sync::{broadcast, Mutex};
use tracing::debug;

use crate::error::Result;

/// Stored key for the position ledger (accounts or flat positions).
pub const KEY_ACCOUNTS: &str = "accounts";
/// Stored key for the currency conversion table.
pub const KEY_CURRENCIES: &str = "currencies";
/// Stored key for the symbol-category mapping table.
pub const KEY_MAPPINGS: &str = "mappings";
/// Legacy key: `{base, conversions}` object from the dashboard-era format.
pub const KEY_CURRENCY_LEGACY: &str = "currency";

const CHANGE_FEED_CAPACITY: usize = 64;

/// Old and new value of one changed key. `None` means absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyChange {
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
}

/// All keys that changed in one write.
pub type ChangeSet = HashMap<String, KeyChange>;

/// Async key-value store with a change feed.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetch stored values. Missing keys are simply absent from the map;
    /// callers default to empty containers.
    async fn get(&self, keys: &[&str]) -> Result<HashMap<String, Value>>;

    /// Persist values. Keys whose stored value actually changed are
    /// broadcast on the change feed after the write completes.
    async fn set(&self, entries: HashMap<String, Value>) -> Result<()>;

    /// Subscribe to the change feed.
    fn subscribe(&self) -> broadcast::Receiver<ChangeSet>;
}

/// SQLite-backed store: one row per key, JSON value column.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    changes: broadcast::Sender<ChangeSet>,
    path: PathBuf,
}

impl SqliteStore {
    /// Open (and initialize if needed) the store at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create data directory {:?}", parent))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open store at {:?}", path))?;
        conn.execute_batch(include_str!("schema.sql"))
            .context("failed to initialize store schema")?;
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Ok(Self {
            conn: Mutex::new(conn),
            changes,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, keys: &[&str]) -> Result<HashMap<String, Value>> {
        let conn = self.conn.lock().await;
        let mut result = HashMap::new();
        let mut stmt = conn.prepare("SELECT value FROM kv WHERE key = ?1")?;
        for key in keys {
            let stored: Option<String> = stmt
                .query_row(params![key], |row| row.get(0))
                .optional()
                .with_context(|| format!("failed to read key '{key}'"))?;
            if let Some(json) = stored {
                let value: Value = serde_json::from_str(&json)
                    .with_context(|| format!("stored value for '{key}' is not valid JSON"))?;
                result.insert(key.to_string(), value);
            }
        }
        Ok(result)
    }

    async fn set(&self, entries: HashMap<String, Value>) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let mut change_set = ChangeSet::new();
        let tx = conn.transaction()?;
        for (key, new_value) in entries {
            let old_json: Option<String> = tx
                .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                    row.get(0)
                })
                .optional()?;
            let old_value = old_json.as_deref().and_then(|j| serde_json::from_str(j).ok());
            if old_value.as_ref() == Some(&new_value) {
                continue;
            }
            tx.execute(
                "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
                params![key, serde_json::to_string(&new_value)?],
            )
            .with_context(|| format!("failed to write key '{key}'"))?;
            change_set.insert(
                key,
                KeyChange {
                    old_value,
                    new_value: Some(new_value),
                },
            );
        }
        tx.commit()?;
        drop(conn);

        if !change_set.is_empty() {
            debug!(keys = ?change_set.keys().collect::<Vec<_>>(), "store changed");
            // nobody listening is fine
            let _ = self.changes.send(change_set);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeSet> {
        self.changes.subscribe()
    }
}

/// In-memory store for tests and ephemeral sessions. Same notification
/// semantics as the SQLite store.
pub struct MemoryStore {
    data: std::sync::Mutex<HashMap<String, Value>>,
    changes: broadcast::Sender<ChangeSet>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            data: std::sync::Mutex::new(HashMap::new()),
            changes,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, keys: &[&str]) -> Result<HashMap<String, Value>> {
        let data = self.data.lock().expect("store mutex poisoned");
        Ok(keys
            .iter()
            .filter_map(|k| data.get(*k).map(|v| (k.to_string(), v.clone())))
            .collect())
    }

    async fn set(&self, entries: HashMap<String, Value>) -> Result<()> {
        let mut change_set = ChangeSet::new();
        {
            let mut data = self.data.lock().expect("store mutex poisoned");
            for (key, new_value) in entries {
                let old_value = data.get(&key).cloned();
                if old_value.as_ref() == Some(&new_value) {
                    continue;
                }
                data.insert(key.clone(), new_value.clone());
                change_set.insert(
                    key,
                    KeyChange {
                        old_value,
                        new_value: Some(new_value),
                    },
                );
            }
        }
        if !change_set.is_empty() {
            let _ = self.changes.send(change_set);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeSet> {
        self.changes.subscribe()
    }
}
