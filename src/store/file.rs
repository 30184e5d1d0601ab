use super::KeyValueStore;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::Mutex;

type Collections = BTreeMap<String, BTreeMap<String, Value>>;

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// One write lock per store file, shared by every `JsonFileStore` in the
/// process that points at it.
fn file_lock(path: &Path) -> Arc<Mutex<()>> {
    static LOCKS: OnceLock<std::sync::Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> = OnceLock::new();
    let key = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut locks = match LOCKS.get_or_init(Default::default).lock() {
        Ok(l) => l,
        Err(poisoned) => poisoned.into_inner(),
    };
    locks.entry(key).or_default().clone()
}

/// Whole-document JSON store on local disk.
///
/// The file is the source of truth: every operation re-reads it, and every
/// mutation is applied to the fresh document and written back through a
/// unique temp file and a rename. Instances sharing a path (several tabs,
/// several runs) therefore see and keep each other's writes.
pub struct JsonFileStore {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl JsonFileStore {
    /// Open (or lazily create) the store at `path`. Fails on an unreadable
    /// or corrupt document.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let collections = read_document(&path).await?;
        tracing::debug!(path = %path.display(), collections = collections.len(), "store opened");
        Ok(Self {
            lock: file_lock(&path),
            path,
        })
    }

    async fn load(&self) -> Result<Collections> {
        read_document(&self.path).await
    }

    async fn flush(&self, collections: &Collections) -> Result<()> {
        let body = serde_json::to_string_pretty(collections)?;
        let tmp = self.path.with_extension(format!(
            "{}.{}.tmp",
            std::process::id(),
            TMP_SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        tokio::fs::write(&tmp, body)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e).with_context(|| format!("Failed to replace {}", self.path.display()));
        }
        Ok(())
    }
}

async fn read_document(path: &Path) -> Result<Collections> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) if content.trim().is_empty() => Ok(Collections::new()),
        Ok(content) => serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse store file: {}", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Collections::new()),
        Err(e) => Err(e).with_context(|| format!("Failed to read store file: {}", path.display())),
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>> {
        let collections = self.load().await?;
        Ok(collections
            .get(collection)
            .and_then(|c| c.get(key))
            .cloned())
    }

    async fn set(&self, collection: &str, key: &str, value: Value) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut collections = self.load().await?;
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(key.to_string(), value);
        self.flush(&collections).await
    }

    async fn remove(&self, collection: &str, key: &str) -> Result<bool> {
        let _guard = self.lock.lock().await;
        let mut collections = self.load().await?;
        let removed = collections
            .get_mut(collection)
            .and_then(|c| c.remove(key))
            .is_some();
        if removed {
            self.flush(&collections).await?;
        }
        Ok(removed)
    }

    async fn keys(&self, collection: &str) -> Result<Vec<String>> {
        let collections = self.load().await?;
        Ok(collections
            .get(collection)
            .map(|c| c.keys().cloned().collect())
            .unwrap_or_default())
    }
}
