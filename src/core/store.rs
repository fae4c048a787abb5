//! Storage abstractions

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// An ordered collection of raw values keyed by string.
#[async_trait]
pub trait KeyValueCollection: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()>;

    /// Entries with `from <= key <= to`, ascending by key.
    async fn range(&self, from: &str, to: &str) -> Result<Vec<(String, Vec<u8>)>>;

    /// Entries whose key starts with `prefix`, ascending by key.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>>;

    /// Makes `entries` the whole content of the collection in one atomic step.
    async fn replace_all(&self, entries: Vec<(String, Vec<u8>)>) -> Result<()>;
}

pub trait Store: Send + Sync {
    /// Opens a named collection, creating it when missing.
    fn get_collection(&self, name: &str) -> Result<Arc<dyn KeyValueCollection>>;
}
