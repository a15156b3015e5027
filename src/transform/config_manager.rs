use crate::cache::ConfigCache;
use crate::config::TransformConfig;
use crate::error::{TransformError, TransformResult};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A named, stored transform configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformConfigEntry {
    pub id: String,
    pub name: String,
    pub source_entity: String,
    pub target_entity: String,
    pub config: TransformConfig,
    #[serde(default)]
    pub disabled: bool,
}

impl TransformConfigEntry {
    pub fn new(
        id: &str,
        name: &str,
        source_entity: &str,
        target_entity: &str,
        config: TransformConfig,
    ) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            source_entity: source_entity.to_string(),
            target_entity: target_entity.to_string(),
            config,
            disabled: false,
        }
    }
}

/// Stores transform configurations and serves them through a read-through
/// cache. Entries handed out are shared and immutable.
#[derive(Clone)]
pub struct TransformConfigManager {
    tree: sled::Tree,
    cache: Arc<dyn ConfigCache<Arc<TransformConfigEntry>>>,
}

fn cache_key(id: &str) -> String {
    format!("TransformConfig-{}", id)
}

impl TransformConfigManager {
    pub fn new(tree: sled::Tree, cache: Arc<dyn ConfigCache<Arc<TransformConfigEntry>>>) -> Self {
        Self { tree, cache }
    }

    /// Writes `entry` and drops any cached copy of it.
    pub fn save(&self, entry: &TransformConfigEntry) -> TransformResult<()> {
        if entry.id.trim().is_empty() {
            return Err(TransformError::Configuration(
                "Transform config id cannot be empty".to_string(),
            ));
        }
        self.tree
            .insert(entry.id.as_bytes(), serde_json::to_vec(entry)?)?;
        self.tree.flush()?;
        self.clean(&entry.id);
        info!("Saved transform config {} ({})", entry.id, entry.name);
        Ok(())
    }

    /// Looks up an entry, loading it from storage on a cache miss.
    pub fn get(&self, id: &str) -> TransformResult<Option<Arc<TransformConfigEntry>>> {
        let key = cache_key(id);
        if let Some(entry) = self.cache.get(&key) {
            return Ok(Some(entry));
        }

        let bytes = match self.tree.get(id.as_bytes())? {
            Some(bytes) => bytes,
            None => return Ok(None),
        };
        let entry: TransformConfigEntry = serde_json::from_slice(&bytes).map_err(|e| {
            TransformError::Configuration(format!("Stored transform config {} is invalid: {}", id, e))
        })?;
        let entry = Arc::new(entry);
        self.cache.put(&key, Arc::clone(&entry));
        // A save or delete between the read above and the put has already
        // evicted, so the copy just cached may be stale.
        if self.tree.get(id.as_bytes())?.as_deref() != Some(&bytes[..]) {
            self.clean(id);
            debug!("Transform config {} changed while loading; not cached", id);
        } else {
            debug!("Loaded transform config {} into cache", id);
        }
        Ok(Some(entry))
    }

    /// Drops the cached copy of an entry.
    pub fn clean(&self, id: &str) {
        self.cache.evict(&cache_key(id));
    }

    /// Removes an entry. Returns whether it existed.
    pub fn delete(&self, id: &str) -> TransformResult<bool> {
        let existed = self.tree.remove(id.as_bytes())?.is_some();
        self.tree.flush()?;
        self.clean(id);
        Ok(existed)
    }

    /// Ids of all stored entries.
    pub fn list(&self) -> TransformResult<Vec<String>> {
        let mut ids = Vec::new();
        for key in self.tree.iter().keys() {
            ids.push(String::from_utf8_lossy(&key?).into_owned());
        }
        Ok(ids)
    }
}
