use crate::core::store::KeyValueCollection;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::Mutex;
use tracing::debug;

/// In-memory collection, ordered by key
#[derive(Default)]
pub struct MemoryCollection {
    inner: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryCollection {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueCollection for MemoryCollection {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let entries = self.inner.lock().await;
        Ok(entries.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let mut entries = self.inner.lock().await;
        debug!("PUT {}", key);
        entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn range(&self, from: &str, to: &str) -> Result<Vec<(String, Vec<u8>)>> {
        // BTreeMap::range panics on inverted bounds
        if from > to {
            return Ok(vec![]);
        }
        let entries = self.inner.lock().await;
        Ok(entries
            .range(from.to_string()..=to.to_string())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        let entries = self.inner.lock().await;
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn replace_all(&self, entries: Vec<(String, Vec<u8>)>) -> Result<()> {
        let mut current = self.inner.lock().await;
        *current = entries.into_iter().collect();
        debug!("REPLACE {} entries", current.len());
        Ok(())
    }
}
