//! State store backends
//! Sled for persistent checkpoints, a hash map for tests and ephemeral runs

use super::{StateStore, StoredEntry};
use crate::utils::current_timestamp_millis;
use anyhow::Result;
use async_trait::async_trait;
use sled::Db;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const CHECKPOINT_TREE: &str = "agent_state";

/// Persistent store backed by sled
#[derive(Clone)]
pub struct SledStateStore {
    db: Arc<Db>,
}

impl SledStateStore {
    /// Create or open a store at the default location
    pub fn new() -> Result<Self> {
        let path = Self::default_path()?;
        Self::open(path)
    }

    /// Open a store at a specific path
    pub fn open(path: PathBuf) -> Result<Self> {
        let db = sled::open(&path)?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Get the default database path
    pub fn default_path() -> Result<PathBuf> {
        let mut path =
            dirs::config_dir().ok_or_else(|| anyhow::anyhow!("No config directory found"))?;
        path.push("codeflow");
        path.push("state.db");

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        Ok(path)
    }

    fn read_entry(db: &Db, key: &str) -> Result<Option<StoredEntry>> {
        let tree = db.open_tree(CHECKPOINT_TREE)?;
        let Some(bytes) = tree.get(key.as_bytes())? else {
            return Ok(None);
        };
        let entry: StoredEntry = serde_json::from_slice(&bytes)?;
        if entry.is_expired(current_timestamp_millis()) {
            tree.remove(key.as_bytes())?;
            return Ok(None);
        }
        Ok(Some(entry))
    }

    fn write_entry(db: &Db, key: &str, entry: &StoredEntry) -> Result<()> {
        let tree = db.open_tree(CHECKPOINT_TREE)?;
        tree.insert(key.as_bytes(), serde_json::to_vec(entry)?)?;
        tree.flush()?;
        Ok(())
    }

    /// List live keys
    pub fn list_keys(&self) -> Result<Vec<String>> {
        let tree = self.db.open_tree(CHECKPOINT_TREE)?;
        let now = current_timestamp_millis();
        let keys = tree
            .iter()
            .filter_map(|kv| kv.ok())
            .filter(|(_, v)| {
                serde_json::from_slice::<StoredEntry>(v)
                    .map(|e| !e.is_expired(now))
                    .unwrap_or(false)
            })
            .filter_map(|(k, _)| String::from_utf8(k.to_vec()).ok())
            .collect();
        Ok(keys)
    }
}

#[async_trait]
impl StateStore for SledStateStore {
    // sled reads and flushes block, so they run on the blocking pool
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let db = Arc::clone(&self.db);
        let key = key.to_string();
        let entry = tokio::task::spawn_blocking(move || Self::read_entry(&db, &key))
            .await
            .map_err(|e| anyhow::anyhow!("state read task failed: {}", e))??;
        Ok(entry.map(|e| e.value))
    }

    async fn set(&self, key: &str, value: serde_json::Value, ttl: Option<Duration>) -> Result<()> {
        let db = Arc::clone(&self.db);
        let key = key.to_string();
        let entry = StoredEntry::new(value, ttl, current_timestamp_millis());
        tokio::task::spawn_blocking(move || Self::write_entry(&db, &key, &entry))
            .await
            .map_err(|e| anyhow::anyhow!("state write task failed: {}", e))?
    }
}

/// Volatile store; same TTL semantics as the sled backend
#[derive(Default, Clone)]
pub struct InMemoryStateStore {
    entries: Arc<Mutex<HashMap<String, StoredEntry>>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        let now = current_timestamp_millis();
        self.entries
            .lock()
            .map(|m| m.values().filter(|e| !e.is_expired(now)).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &str) -> bool {
        let now = current_timestamp_millis();
        self.entries
            .lock()
            .map(|m| m.get(key).is_some_and(|e| !e.is_expired(now)))
            .unwrap_or(false)
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("state store lock poisoned"))?;
        let now = current_timestamp_millis();
        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: serde_json::Value, ttl: Option<Duration>) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("state store lock poisoned"))?;
        entries.insert(key.to_string(), StoredEntry::new(value, ttl, current_timestamp_millis()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_sled_store_operations() {
        let dir = tempdir().unwrap();
        let store = SledStateStore::open(dir.path().join("test.db")).unwrap();

        store.set("agent:a:learning", json!({"xp": 3}), None).await.unwrap();
        let value = store.get("agent:a:learning").await.unwrap();
        assert_eq!(value, Some(json!({"xp": 3})));
        assert_eq!(store.list_keys().unwrap(), vec!["agent:a:learning".to_string()]);

        store.set("agent:a:learning", json!({"xp": 4}), None).await.unwrap();
        assert_eq!(store.get("agent:a:learning").await.unwrap(), Some(json!({"xp": 4})));
        assert_eq!(store.get("agent:b:learning").await.unwrap(), None);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_sled_concurrent_writes_on_single_thread() {
        let dir = tempdir().unwrap();
        let store = SledStateStore::open(dir.path().join("busy.db")).unwrap();

        let writes = (0..20).map(|i| {
            let store = store.clone();
            async move { store.set(&format!("agent:{}", i), json!(i), None).await }
        });
        for result in futures::future::join_all(writes).await {
            result.unwrap();
        }

        assert_eq!(store.get("agent:7").await.unwrap(), Some(json!(7)));
        assert_eq!(store.list_keys().unwrap().len(), 20);
    }

    #[tokio::test]
    async fn test_sled_ttl_expiry() {
        let dir = tempdir().unwrap();
        let store = SledStateStore::open(dir.path().join("ttl.db")).unwrap();

        store.set("k", json!(1), Some(Duration::from_millis(0))).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.list_keys().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_in_memory_last_write_wins() {
        let store = InMemoryStateStore::new();
        store.set("k", json!("a"), None).await.unwrap();
        store.set("k", json!("b"), Some(Duration::from_secs(60))).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(json!("b")));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_in_memory_expired_reads_absent() {
        let store = InMemoryStateStore::new();
        store.set("k", json!(true), Some(Duration::ZERO)).await.unwrap();
        assert!(!store.contains("k"));
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_entry_expiry() {
        let entry = StoredEntry::new(json!(null), Some(Duration::from_millis(100)), 1_000);
        assert!(!entry.is_expired(1_099));
        assert!(entry.is_expired(1_100));
        assert!(!StoredEntry::new(json!(null), None, 0).is_expired(u64::MAX));
    }
}
