//! Storage contract handed to backends, and the in-memory implementation.

use crate::error::StorageError;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single stored value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageEntry {
    /// Entry key.
    pub key: String,
    /// Raw value bytes.
    pub value: Vec<u8>,
    /// Whether the entry asked for seal wrapping.
    #[serde(default)]
    pub seal_wrap: bool,
}

impl StorageEntry {
    /// Create an entry.
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            seal_wrap: false,
        }
    }
}

/// Key/value storage available to a backend.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Keys starting with `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    /// Fetch an entry, `None` when absent.
    async fn get(&self, key: &str) -> Result<Option<StorageEntry>, StorageError>;

    /// Insert or replace an entry.
    async fn put(&self, entry: StorageEntry) -> Result<(), StorageError>;

    /// Remove an entry. Removing a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// Thread-safe in-memory [`Storage`].
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    entries: RwLock<HashMap<String, StorageEntry>>,
}

impl InMemoryStorage {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let mut keys: Vec<String> = self
            .entries
            .read()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn get(&self, key: &str) -> Result<Option<StorageEntry>, StorageError> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn put(&self, entry: StorageEntry) -> Result<(), StorageError> {
        self.entries.write().insert(entry.key.clone(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.entries.write().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_put_and_get() {
        let storage = InMemoryStorage::new();
        storage.put(StorageEntry::new("config/root", b"value".to_vec())).await.unwrap();

        let entry = storage.get("config/root").await.unwrap().unwrap();
        assert_eq!(entry.key, "config/root");
        assert_eq!(entry.value, b"value");
        assert_eq!(storage.len(), 1);
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let storage = InMemoryStorage::new();
        assert!(storage.get("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let storage = InMemoryStorage::new();
        storage.put(StorageEntry::new("k", "one")).await.unwrap();
        storage.put(StorageEntry::new("k", "two")).await.unwrap();

        assert_eq!(storage.get("k").await.unwrap().unwrap().value, b"two");
        assert_eq!(storage.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let storage = InMemoryStorage::new();
        storage.put(StorageEntry::new("k", "v")).await.unwrap();
        storage.delete("k").await.unwrap();
        storage.delete("k").await.unwrap();
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn test_list_filters_by_prefix_sorted() {
        let storage = InMemoryStorage::new();
        for key in ["roles/b", "roles/a", "config", "roles/c/x"] {
            storage.put(StorageEntry::new(key, "v")).await.unwrap();
        }

        assert_eq!(
            storage.list("roles/").await.unwrap(),
            vec!["roles/a", "roles/b", "roles/c/x"]
        );
        assert_eq!(storage.list("").await.unwrap().len(), 4);
        assert!(storage.list("missing/").await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers() {
        let storage = Arc::new(InMemoryStorage::new());
        let mut handles = Vec::new();
        for i in 0..50 {
            let storage = storage.clone();
            handles.push(tokio::spawn(async move {
                storage
                    .put(StorageEntry::new(format!("key/{i}"), i.to_string()))
                    .await
                    .unwrap();
                storage.get(&format!("key/{i}")).await.unwrap()
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_some());
        }
        assert_eq!(storage.list("key/").await.unwrap().len(), 50);
    }

    proptest! {
        #[test]
        fn prop_list_matches_prefix_filter(
            keys in prop::collection::btree_set("[ab]{0,3}(/[ab]{1,2})?", 0..20),
            prefix in "[ab/]{0,3}",
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let listed = runtime.block_on(async {
                let storage = InMemoryStorage::new();
                for key in &keys {
                    storage.put(StorageEntry::new(key.clone(), "v")).await.unwrap();
                }
                storage.list(&prefix).await.unwrap()
            });

            let expected: Vec<String> = keys
                .iter()
                .filter(|k| k.starts_with(prefix.as_str()))
                .cloned()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            prop_assert_eq!(listed, expected);
        }
    }
}
