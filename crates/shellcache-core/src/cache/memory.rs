use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::CacheStore;
use crate::error::StoreError;
use crate::models::{RequestKey, Response, StoredEntry};

type Generation = HashMap<RequestKey, StoredEntry>;

/// Process-local cache store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    stores: RwLock<BTreeMap<String, Generation>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn open(&self, name: &str) -> Result<(), StoreError> {
        self.stores
            .write()
            .await
            .entry(name.to_string())
            .or_default();
        Ok(())
    }

    async fn get(&self, name: &str, key: &RequestKey) -> Result<Option<Response>, StoreError> {
        let stores = self.stores.read().await;
        Ok(stores
            .get(name)
            .and_then(|generation| generation.get(key))
            .map(|entry| entry.response.clone()))
    }

    async fn put(
        &self,
        name: &str,
        key: &RequestKey,
        response: &Response,
    ) -> Result<(), StoreError> {
        self.stores
            .write()
            .await
            .entry(name.to_string())
            .or_default()
            .insert(key.clone(), StoredEntry::new(key.clone(), response.clone()));
        Ok(())
    }

    async fn delete(&self, name: &str, key: &RequestKey) -> Result<bool, StoreError> {
        let mut stores = self.stores.write().await;
        Ok(stores
            .get_mut(name)
            .map(|generation| generation.remove(key).is_some())
            .unwrap_or(false))
    }

    async fn delete_store(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.stores.write().await.remove(name).is_some())
    }

    async fn store_names(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.stores.read().await.keys().cloned().collect())
    }

    async fn entries(&self, name: &str) -> Result<Vec<StoredEntry>, StoreError> {
        let stores = self.stores.read().await;
        let mut entries: Vec<StoredEntry> = stores
            .get(name)
            .map(|generation| generation.values().cloned().collect())
            .unwrap_or_default();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }
}
