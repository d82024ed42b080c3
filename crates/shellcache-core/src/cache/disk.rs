use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, warn};

use super::CacheStore;
use crate::error::StoreError;
use crate::models::{RequestKey, Response, StoredEntry};

/// Extension of committed entry files. Anything else in a store directory
/// (temp files from interrupted writes) is ignored.
const ENTRY_EXTENSION: &str = "json";

/// Distinguishes temp files of concurrent writers within one process.
static WRITE_SEQ: AtomicU64 = AtomicU64::new(0);

/// File-backed cache store.
///
/// Layout: `<root>/<store name>/<sha256(key)>.json`, each file holding one
/// serialized `StoredEntry`.
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    pub fn new(root: PathBuf) -> Result<Self, StoreError> {
        std::fs::create_dir_all(&root).map_err(|e| StoreError::io(&root, e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn store_dir(&self, name: &str) -> Result<PathBuf, StoreError> {
        if !is_valid_store_name(name) {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(name))
    }

    fn entry_path(&self, name: &str, key: &RequestKey) -> Result<PathBuf, StoreError> {
        let digest = Sha256::digest(key.as_str().as_bytes());
        Ok(self
            .store_dir(name)?
            .join(format!("{}.{}", hex::encode(digest), ENTRY_EXTENSION)))
    }

    /// Read one entry file. Missing files are `None`; corrupt files are
    /// logged and also treated as `None`.
    async fn load(path: &Path) -> Result<Option<StoredEntry>, StoreError> {
        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(path, e)),
        };

        match serde_json::from_slice::<StoredEntry>(&bytes) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable cache entry");
                Ok(None)
            }
        }
    }
}

/// Store names become directory names, so they must stay a single path
/// component.
pub(crate) fn is_valid_store_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\', '\0'])
}

#[async_trait]
impl CacheStore for DiskStore {
    async fn open(&self, name: &str) -> Result<(), StoreError> {
        let dir = self.store_dir(name)?;
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| StoreError::io(&dir, e))
    }

    async fn get(&self, name: &str, key: &RequestKey) -> Result<Option<Response>, StoreError> {
        let path = self.entry_path(name, key)?;
        Ok(Self::load(&path).await?.map(|entry| entry.response))
    }

    async fn put(
        &self,
        name: &str,
        key: &RequestKey,
        response: &Response,
    ) -> Result<(), StoreError> {
        self.open(name).await?;

        let path = self.entry_path(name, key)?;
        let entry = StoredEntry::new(key.clone(), response.clone());
        let contents = serde_json::to_vec(&entry)?;

        let seq = WRITE_SEQ.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("tmp-{}-{}", std::process::id(), seq));
        fs::write(&tmp, contents)
            .await
            .map_err(|e| StoreError::io(&tmp, e))?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(StoreError::io(&path, e));
        }

        debug!(store = name, key = %key, "Cache entry written");
        Ok(())
    }

    async fn delete(&self, name: &str, key: &RequestKey) -> Result<bool, StoreError> {
        let path = self.entry_path(name, key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }

    async fn delete_store(&self, name: &str) -> Result<bool, StoreError> {
        let dir = self.store_dir(name)?;
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::io(&dir, e)),
        }
    }

    async fn store_names(&self) -> Result<Vec<String>, StoreError> {
        let mut dir = fs::read_dir(&self.root)
            .await
            .map_err(|e| StoreError::io(&self.root, e))?;

        let mut names = Vec::new();
        while let Some(item) = dir
            .next_entry()
            .await
            .map_err(|e| StoreError::io(&self.root, e))?
        {
            let is_dir = item
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            if !is_dir {
                continue;
            }
            if let Some(name) = item.file_name().to_str() {
                if is_valid_store_name(name) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    async fn entries(&self, name: &str) -> Result<Vec<StoredEntry>, StoreError> {
        let store_dir = self.store_dir(name)?;
        let mut dir = match fs::read_dir(&store_dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&store_dir, e)),
        };

        let mut entries = Vec::new();
        while let Some(item) = dir
            .next_entry()
            .await
            .map_err(|e| StoreError::io(&store_dir, e))?
        {
            let path = item.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            if let Some(entry) = Self::load(&path).await? {
                entries.push(entry);
            }
        }
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }
}
