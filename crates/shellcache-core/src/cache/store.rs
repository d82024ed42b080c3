use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{RequestKey, Response, StoredEntry};

/// Backend for named cache stores.
///
/// Implementations must tolerate concurrent reads and writes. A single `put`
/// is atomic; concurrent writes to the same key are last-write-wins.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Create the named store if it does not exist yet.
    async fn open(&self, name: &str) -> Result<(), StoreError>;

    /// Look up a key in one store. Missing stores are a miss.
    async fn get(&self, name: &str, key: &RequestKey) -> Result<Option<Response>, StoreError>;

    /// Store a response, creating the store if needed.
    async fn put(&self, name: &str, key: &RequestKey, response: &Response)
        -> Result<(), StoreError>;

    /// Remove one entry. Returns whether it existed.
    async fn delete(&self, name: &str, key: &RequestKey) -> Result<bool, StoreError>;

    /// Remove a store and everything in it. Returns whether it existed.
    async fn delete_store(&self, name: &str) -> Result<bool, StoreError>;

    /// Names of all existing stores, sorted.
    async fn store_names(&self) -> Result<Vec<String>, StoreError>;

    /// All entries of one store, sorted by key.
    async fn entries(&self, name: &str) -> Result<Vec<StoredEntry>, StoreError>;

    async fn keys(&self, name: &str) -> Result<Vec<RequestKey>, StoreError> {
        Ok(self
            .entries(name)
            .await?
            .into_iter()
            .map(|entry| entry.key)
            .collect())
    }

    /// First hit for `key` across every store, in name order.
    async fn match_any(&self, key: &RequestKey) -> Result<Option<Response>, StoreError> {
        for name in self.store_names().await? {
            if let Some(response) = self.get(&name, key).await? {
                return Ok(Some(response));
            }
        }
        Ok(None)
    }
}
