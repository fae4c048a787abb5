use crate::core::store::KeyValueCollection;
use anyhow::Result;
use async_trait::async_trait;
use fjall::{Keyspace, PartitionHandle, PersistMode};
use std::collections::HashSet;
use tracing::debug;

/// A collection backed by one fjall partition.
pub struct DiskCollection {
    keyspace: Keyspace,
    partition: PartitionHandle,
}

impl DiskCollection {
    pub fn new(keyspace: Keyspace, partition: PartitionHandle) -> Self {
        Self {
            keyspace,
            partition,
        }
    }

    fn sync(&self) -> Result<()> {
        self.keyspace.persist(PersistMode::SyncAll)?;
        Ok(())
    }
}

fn decode_entry(entry: fjall::Result<(fjall::Slice, fjall::Slice)>) -> Result<(String, Vec<u8>)> {
    let (key, value) = entry?;
    Ok((String::from_utf8(key.to_vec())?, value.to_vec()))
}

#[async_trait]
impl KeyValueCollection for DiskCollection {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.partition.get(key)?.map(|value| value.to_vec()))
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.partition.insert(key, value)?;
        debug!("PUT {}", key);
        self.sync()
    }

    async fn range(&self, from: &str, to: &str) -> Result<Vec<(String, Vec<u8>)>> {
        if from > to {
            return Ok(vec![]);
        }
        self.partition.range(from..=to).map(decode_entry).collect()
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        self.partition.prefix(prefix).map(decode_entry).collect()
    }

    async fn replace_all(&self, entries: Vec<(String, Vec<u8>)>) -> Result<()> {
        let mut batch = self.keyspace.batch();
        let mut keep = HashSet::with_capacity(entries.len());
        for (key, value) in entries {
            batch.insert(&self.partition, key.as_bytes(), value);
            keep.insert(key.into_bytes());
        }
        let mut stale = 0;
        for key in self.partition.keys() {
            let key = key?;
            if !keep.contains(&key.to_vec()) {
                batch.remove(&self.partition, key);
                stale += 1;
            }
        }
        debug!("REPLACE {} entries, {} removed", keep.len(), stale);
        batch.commit()?;
        self.sync()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fjall::PartitionCreateOptions;
    use tempfile::tempdir;

    fn open(path: &std::path::Path) -> DiskCollection {
        let keyspace = fjall::Config::new(path).open().unwrap();
        let partition = keyspace
            .open_partition("test", PartitionCreateOptions::default())
            .unwrap();
        DiskCollection::new(keyspace, partition)
    }

    #[tokio::test]
    async fn test_get_put() {
        let dir = tempdir().unwrap();
        let collection = open(dir.path());

        assert!(collection.get("key1").await.unwrap().is_none());
        collection.put("key1", b"123".to_vec()).await.unwrap();
        assert_eq!(collection.get("key1").await.unwrap(), Some(b"123".to_vec()));
        collection.put("key1", b"456".to_vec()).await.unwrap();
        assert_eq!(collection.get("key1").await.unwrap(), Some(b"456".to_vec()));
    }

    #[tokio::test]
    async fn test_range_and_prefix() {
        let dir = tempdir().unwrap();
        let collection = open(dir.path());
        for key in ["2024-05-03", "2024-05-01", "2024-05-02"] {
            collection.put(key, vec![0]).await.unwrap();
        }

        let keys: Vec<String> = collection
            .range("2024-05-01", "2024-05-02")
            .await
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec!["2024-05-01", "2024-05-02"]);
        assert_eq!(collection.scan_prefix("2024-05").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_replace_all_drops_missing_keys() {
        let dir = tempdir().unwrap();
        {
            let collection = open(dir.path());
            collection.put("Bank/CASH:EUR", vec![1]).await.unwrap();
            collection.put("Broker/AAPL", vec![2]).await.unwrap();
            collection
                .replace_all(vec![
                    ("Broker/AAPL".to_string(), vec![3]),
                    ("Broker/VWCE".to_string(), vec![4]),
                ])
                .await
                .unwrap();
        }
        let collection = open(dir.path());
        assert_eq!(
            collection.scan_prefix("").await.unwrap(),
            vec![
                ("Broker/AAPL".to_string(), vec![3]),
                ("Broker/VWCE".to_string(), vec![4]),
            ]
        );

        collection.replace_all(vec![]).await.unwrap();
        assert!(collection.scan_prefix("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_values_survive_reopen() {
        let dir = tempdir().unwrap();
        {
            let collection = open(dir.path());
            collection.put("policy", b"{}".to_vec()).await.unwrap();
        }
        let collection = open(dir.path());
        assert_eq!(collection.get("policy").await.unwrap(), Some(b"{}".to_vec()));
    }
}
