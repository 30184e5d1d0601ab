use super::KeyValueStore;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

type Collections = HashMap<String, HashMap<String, Value>>;

/// Process-local store. Two `DedupStore`s sharing one `Arc<MemoryStore>`
/// see each other's writes, which is how tests model multiple tabs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: Mutex<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Collections>> {
        self.collections
            .lock()
            .map_err(|e| anyhow!("memory store lock poisoned: {}", e))
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>> {
        let collections = self.lock()?;
        Ok(collections
            .get(collection)
            .and_then(|c| c.get(key))
            .cloned())
    }

    async fn set(&self, collection: &str, key: &str, value: Value) -> Result<()> {
        let mut collections = self.lock()?;
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, collection: &str, key: &str) -> Result<bool> {
        let mut collections = self.lock()?;
        Ok(collections
            .get_mut(collection)
            .and_then(|c| c.remove(key))
            .is_some())
    }

    async fn keys(&self, collection: &str) -> Result<Vec<String>> {
        let collections = self.lock()?;
        Ok(collections
            .get(collection)
            .map(|c| c.keys().cloned().collect())
            .unwrap_or_default())
    }
}
