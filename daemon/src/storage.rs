use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::errors::{TabdashError, TabdashResult};

/// Key-value persistence, the only storage primitive the daemon relies on
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> TabdashResult<Option<Value>>;

    /// Replace the value under `key` in one write
    async fn set(&self, key: &str, value: &Value) -> TabdashResult<()>;

    async fn remove(&self, key: &str) -> TabdashResult<()>;
}

pub type SharedStore = Arc<dyn KeyValueStore>;

/// SQLite-backed store holding one JSON document per key
pub struct SqliteStore {
    connection: Mutex<Connection>,
    db_path: PathBuf,
}

impl SqliteStore {
    pub async fn open(db_path: &Path) -> TabdashResult<Self> {
        // Ensure data directory exists
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| TabdashError::Storage {
                    operation: format!("create data directory {:?}", parent),
                    message: e.to_string(),
                })?;
        }

        let connection = Connection::open(db_path)?;
        Self::configure_connection(&connection)?;

        let store = Self {
            connection: Mutex::new(connection),
            db_path: db_path.to_path_buf(),
        };
        store.run_migrations()?;
        info!("Key-value store opened at {:?}", store.db_path);

        Ok(store)
    }

    /// Configure a SQLite connection for a single-writer daemon
    fn configure_connection(connection: &Connection) -> TabdashResult<()> {
        connection.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 30000;",
        )?;
        Ok(())
    }

    fn run_migrations(&self) -> TabdashResult<()> {
        let conn = self.connection.lock();
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> TabdashResult<Option<Value>> {
        let raw: Option<String> = {
            let conn = self.connection.lock();
            conn.query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?
        };

        match raw {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &Value) -> TabdashResult<()> {
        let text = serde_json::to_string(value)?;
        let conn = self.connection.lock();
        conn.execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, text, chrono::Utc::now().timestamp()],
        )?;
        debug!("Stored key '{}' ({} bytes)", key, text.len());
        Ok(())
    }

    async fn remove(&self, key: &str) -> TabdashResult<()> {
        let conn = self.connection.lock();
        conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }
}

/// In-process store, used by tests and `--ephemeral` runs
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self {
            entries: Mutex::new(entries.into_iter().collect()),
        }
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.lock().keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> TabdashResult<Option<Value>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &Value) -> TabdashResult<()> {
        self.entries.lock().insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn remove(&self, key: &str) -> TabdashResult<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// Store whose next `stalls` reads hold the value they read for `delay` before
/// returning it, so tests can interleave read-modify-write sequences.
#[cfg(test)]
pub(crate) struct StalledStore {
    pub inner: MemoryStore,
    stalls: std::sync::atomic::AtomicUsize,
    delay: std::time::Duration,
}

#[cfg(test)]
impl StalledStore {
    pub fn new(inner: MemoryStore, stalls: usize, delay: std::time::Duration) -> Self {
        Self {
            inner,
            stalls: std::sync::atomic::AtomicUsize::new(stalls),
            delay,
        }
    }
}

#[cfg(test)]
#[async_trait]
impl KeyValueStore for StalledStore {
    async fn get(&self, key: &str) -> TabdashResult<Option<Value>> {
        use std::sync::atomic::Ordering;

        let value = self.inner.get(key).await?;
        if self
            .stalls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            tokio::time::sleep(self.delay).await;
        }
        Ok(value)
    }

    async fn set(&self, key: &str, value: &Value) -> TabdashResult<()> {
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> TabdashResult<()> {
        self.inner.remove(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_sqlite_set_get_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("nested").join("kv.db"))
            .await
            .unwrap();

        assert_eq!(store.get("missing").await.unwrap(), None);

        store.set("local:appConfig", &json!({"a": 1})).await.unwrap();
        store.set("local:appConfig", &json!({"a": 2})).await.unwrap();
        assert_eq!(
            store.get("local:appConfig").await.unwrap(),
            Some(json!({"a": 2}))
        );

        store.remove("local:appConfig").await.unwrap();
        assert_eq!(store.get("local:appConfig").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_sqlite_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.db");
        {
            let store = SqliteStore::open(&path).await.unwrap();
            store.set("k", &json!(["x"])).await.unwrap();
        }
        let store = SqliteStore::open(&path).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(json!(["x"])));
    }

    #[tokio::test]
    async fn test_sqlite_corrupt_value_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("kv.db")).await.unwrap();
        {
            let conn = store.connection.lock();
            conn.execute(
                "INSERT INTO kv (key, value, updated_at) VALUES ('bad', '{oops', 0)",
                [],
            )
            .unwrap();
        }
        assert!(store.get("bad").await.is_err());
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryStore::with_entries([("a".to_string(), json!(1))]);
        store.set("b", &json!(2)).await.unwrap();
        assert_eq!(store.keys(), vec!["a".to_string(), "b".to_string()]);
        store.remove("a").await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), None);
    }
}
