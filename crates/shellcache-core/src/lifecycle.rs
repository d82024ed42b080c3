//! Generation lifecycle: exactly one live store per class group per build.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cache::CacheStore;
use crate::error::StoreError;

/// Generation names of the current build. Both must change across builds
/// for reconciliation to purge the previous ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Generations {
    pub shell: String,
    pub image: String,
}

impl Default for Generations {
    fn default() -> Self {
        Self {
            shell: "spice-affair-shell-v1".to_string(),
            image: "spice-affair-images-v1".to_string(),
        }
    }
}

impl Generations {
    pub fn live_names(&self) -> BTreeSet<String> {
        [self.shell.clone(), self.image.clone()].into_iter().collect()
    }
}

/// Delete every store whose name is not in `live`. Returns the names that
/// were deleted. Running it again with the same set deletes nothing.
pub async fn reconcile(
    store: &dyn CacheStore,
    live: &BTreeSet<String>,
) -> Result<Vec<String>, StoreError> {
    let mut deleted = Vec::new();
    for name in store.store_names().await? {
        if live.contains(&name) {
            continue;
        }
        if store.delete_store(&name).await? {
            info!(store = %name, "Deleted stale cache generation");
            deleted.push(name);
        }
    }
    Ok(deleted)
}
