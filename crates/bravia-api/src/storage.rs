//! Key-value persistence seam.
//!
//! The profile store talks to a [`KvStore`] rather than the filesystem so
//! tests can swap in [`MemoryStore`]. Values are raw JSON; interpretation
//! belongs to the caller.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::Result;

#[async_trait]
pub trait KvStore: Send + Sync {
    /// Fetch the requested keys. Keys with no stored value are absent from
    /// the returned map, not mapped to null.
    async fn get(&self, keys: &[&str]) -> Result<HashMap<String, Value>>;

    /// Merge the given entries over the stored ones.
    async fn set(&self, entries: HashMap<String, Value>) -> Result<()>;
}

// ── File-backed store ─────────────────────────────────────────────────────────

/// All keys live in one JSON object in a single file under the data dir.
pub struct FileStore {
    path: PathBuf,
    // serializes the read-merge-write in `set` against concurrent callers
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    pub fn default_path() -> PathBuf {
        crate::platform::data_dir().join("profiles.json")
    }

    async fn read_all(&self) -> HashMap<String, Value> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(map) => map,
                Err(e) => {
                    warn!("ignoring unreadable store file {}: {e}", self.path.display());
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        }
    }
}

#[async_trait]
impl KvStore for FileStore {
    async fn get(&self, keys: &[&str]) -> Result<HashMap<String, Value>> {
        let _guard = self.lock.lock().await;
        let mut all = self.read_all().await;
        let mut out = HashMap::new();
        for key in keys {
            if let Some(value) = all.remove(*key) {
                out.insert((*key).to_string(), value);
            }
        }
        Ok(out)
    }

    async fn set(&self, entries: HashMap<String, Value>) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut all = self.read_all().await;
        all.extend(entries);

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(&all)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}

// ── In-memory store ───────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, keys: &[&str]) -> Result<HashMap<String, Value>> {
        let entries = self.entries.lock().await;
        let mut out = HashMap::new();
        for key in keys {
            if let Some(value) = entries.get(*key) {
                out.insert((*key).to_string(), value.clone());
            }
        }
        Ok(out)
    }

    async fn set(&self, entries: HashMap<String, Value>) -> Result<()> {
        self.entries.lock().await.extend(entries);
        Ok(())
    }
}
