// In-memory implementation of the moderation key/value store.
//
// Nothing survives a restart. Used by tests and handy for trying out a
// chain configuration without a database file.

use crate::core::moderation::{KvStore, ModerationError, StoreProvider};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

/// One namespace.
///
/// **DashMap:** concurrent map, so filters scoring different users at the
/// same time never wait on a shared lock.
#[derive(Default)]
pub struct InMemoryKvStore {
    data: DashMap<Vec<u8>, Vec<u8>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, ModerationError> {
        Ok(self.data.get(key).map(|v| v.value().clone()))
    }

    async fn set(&self, key: &[u8], value: &[u8]) -> Result<(), ModerationError> {
        self.data.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &[u8]) -> Result<(), ModerationError> {
        self.data.remove(key);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<Vec<u8>>, ModerationError> {
        let mut keys: Vec<Vec<u8>> = self.data.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        Ok(keys)
    }
}

/// Hands out one shared `InMemoryKvStore` per namespace.
#[derive(Default)]
pub struct InMemoryStoreProvider {
    namespaces: DashMap<String, Arc<InMemoryKvStore>>,
}

impl InMemoryStoreProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StoreProvider for InMemoryStoreProvider {
    fn open(&self, namespace: &str) -> Arc<dyn KvStore> {
        let store = self
            .namespaces
            .entry(namespace.to_string())
            .or_insert_with(|| Arc::new(InMemoryKvStore::new()))
            .clone();
        store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = InMemoryKvStore::new();
        store.set(b"a", b"1").await.unwrap();
        store.set(b"a", b"2").await.unwrap();

        assert_eq!(store.get(b"a").await.unwrap(), Some(b"2".to_vec()));
        store.delete(b"a").await.unwrap();
        store.delete(b"a").await.unwrap();
        assert_eq!(store.get(b"a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_same_namespace_shares_data() {
        let provider = InMemoryStoreProvider::new();
        provider.open("banned_db").set(b"k", b"1").await.unwrap();

        assert!(provider.open("banned_db").get(b"k").await.unwrap().is_some());
        assert!(provider.open("other").get(b"k").await.unwrap().is_none());
    }
}
