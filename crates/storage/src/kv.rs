//! The local persistence collaborator: a durable, asynchronous key-value
//! interface storing serialized documents and small scalar markers.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use crate::errors::Result;

/// Asynchronous key-value persistence. Exactly two logical documents live
/// behind this interface (the snapshot and the queue), plus scalar markers
/// such as the last-sync watermark.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get_item(&self, key: &str) -> Result<Option<String>>;
    async fn set_item(&self, key: &str, value: &str) -> Result<()>;
    async fn remove_item(&self, key: &str) -> Result<()>;
}

/// SQLite-backed store: a single `kv` table in one database file. Blocking
/// database work runs on the tokio blocking pool.
pub struct SqliteKeyValueStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteKeyValueStore {
    /// Open (or create) the store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Ephemeral in-memory variant, useful for tooling.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
            [],
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

#[async_trait]
impl KeyValueStore for SqliteKeyValueStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        let conn = Arc::clone(&self.conn);
        let key = key.to_string();
        tokio::task::spawn_blocking(move || -> Result<Option<String>> {
            let conn = conn.lock().unwrap();
            let value = conn
                .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                    row.get(0)
                })
                .optional()?;
            Ok(value)
        })
        .await?
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let conn = Arc::clone(&self.conn);
        let key = key.to_string();
        let value = value.to_string();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let conn = conn.lock().unwrap();
            conn.execute(
                "INSERT INTO kv (key, value) VALUES (?1, ?2) \
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )?;
            Ok(())
        })
        .await?
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        let conn = Arc::clone(&self.conn);
        let key = key.to_string();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let conn = conn.lock().unwrap();
            conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
            Ok(())
        })
        .await?
    }
}

/// In-memory store for tests and previews. Not durable.
#[derive(Default)]
pub struct MemoryKeyValueStore {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.items.lock().unwrap().get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.items
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        self.items.lock().unwrap().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sqlite_store_round_trips_and_survives_reopen() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("fieldsync.db");

        let store = SqliteKeyValueStore::open(&path).expect("open store");
        store.set_item("marker", "42").await.expect("set");
        assert_eq!(
            store.get_item("marker").await.expect("get"),
            Some("42".to_string())
        );
        store.set_item("marker", "43").await.expect("overwrite");
        drop(store);

        let reopened = SqliteKeyValueStore::open(&path).expect("reopen store");
        assert_eq!(
            reopened.get_item("marker").await.expect("get"),
            Some("43".to_string())
        );
        reopened.remove_item("marker").await.expect("remove");
        assert_eq!(reopened.get_item("marker").await.expect("get"), None);
    }

    #[tokio::test]
    async fn memory_store_round_trips() {
        let store = MemoryKeyValueStore::new();
        assert_eq!(store.get_item("missing").await.expect("get"), None);
        store.set_item("k", "v").await.expect("set");
        assert_eq!(
            store.get_item("k").await.expect("get"),
            Some("v".to_string())
        );
        store.remove_item("k").await.expect("remove");
        assert_eq!(store.get_item("k").await.expect("get"), None);
    }
}
