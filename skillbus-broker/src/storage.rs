//! Key-value storage backends for subscription persistence
//!
//! The broker persists exactly one value: the subscription array, as a
//! JSON string under table `aace.localSkillService`, key `subscriptions`.
//! The [`KeyValueStore`] trait is that string table; the broker does not
//! care what sits behind it.
//!
//! Two backends are provided: [`SledStore`] (durable, one sled tree per
//! table) and [`MemoryStore`] (process-local, used by unit tests and by
//! deployments that explicitly opt out of durability).

use async_trait::async_trait;
use skillbus_core::{Error, Result};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

/// A table/key/value string store
///
/// Implementations must be internally thread-safe; the handle is shared
/// across the broker's worker tasks.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, table: &str, key: &str) -> Result<Option<String>>;
    async fn put(&self, table: &str, key: &str, value: &str) -> Result<()>;
}

/// Durable store backed by a sled database
///
/// Each table maps to a sled tree; writes are flushed before `put`
/// returns so a crash after a successful persist cannot lose the
/// subscription list.
pub struct SledStore {
    db: sled::Db,
}

impl SledStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path).map_err(|e| Error::Storage(format!("failed to open database: {e}")))?;
        Ok(Self { db })
    }

    fn tree(&self, table: &str) -> Result<sled::Tree> {
        self.db
            .open_tree(table)
            .map_err(|e| Error::Storage(format!("failed to open table {table}: {e}")))
    }
}

#[async_trait]
impl KeyValueStore for SledStore {
    async fn get(&self, table: &str, key: &str) -> Result<Option<String>> {
        let tree = self.tree(table)?;
        let value = tree
            .get(key.as_bytes())
            .map_err(|e| Error::Storage(format!("failed to read {table}/{key}: {e}")))?;
        match value {
            Some(bytes) => {
                let text = String::from_utf8(bytes.to_vec())
                    .map_err(|e| Error::Storage(format!("non-utf8 value at {table}/{key}: {e}")))?;
                Ok(Some(text))
            }
            None => Ok(None),
        }
    }

    async fn put(&self, table: &str, key: &str, value: &str) -> Result<()> {
        let tree = self.tree(table)?;
        tree.insert(key.as_bytes(), value.as_bytes())
            .map_err(|e| Error::Storage(format!("failed to write {table}/{key}: {e}")))?;
        tree.flush_async()
            .await
            .map_err(|e| Error::Storage(format!("failed to flush {table}: {e}")))?;
        Ok(())
    }
}

/// In-memory store for tests and non-durable deployments
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<(String, String), String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, table: &str, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().expect("memory store lock poisoned");
        Ok(entries.get(&(table.to_string(), key.to_string())).cloned())
    }

    async fn put(&self, table: &str, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().expect("memory store lock poisoned");
        entries.insert((table.to_string(), key.to_string()), value.to_string());
        Ok(())
    }
}
