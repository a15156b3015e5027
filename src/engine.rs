use crate::cache::LruConfigCache;
use crate::config::{EngineConfig, TransformConfig};
use crate::constants::{SCHEMAS_TREE, TRANSFORM_CONFIGS_TREE};
use crate::error::{TransformError, TransformResult};
use crate::filter::{FilterGate, RecordFilterChecker};
use crate::schema::{SchemaCatalog, SchemaRegistry};
use crate::service::{EntityService, PersistenceService};
use crate::store::RecordStore;
use crate::transform::{
    RecordTransformer, TransformConfigEntry, TransformConfigManager, TransformContext,
};
use log::info;
use std::sync::Arc;

/// Owns the store, schema registry, persistence service, filter gate and
/// config cache, and builds [`RecordTransformer`]s over them.
///
/// The engine is cheap to share behind an `Arc`; transformers it builds can
/// run on separate threads.
pub struct TransformEngine {
    db: sled::Db,
    store: RecordStore,
    registry: Arc<SchemaRegistry>,
    persistence: Arc<dyn PersistenceService>,
    filter_gate: Arc<dyn FilterGate>,
    configs: TransformConfigManager,
}

impl TransformEngine {
    /// Opens (or creates) the engine database at `config.storage_path` and
    /// registers the schemas found in `config.schemas_dir`.
    pub fn open(config: &EngineConfig) -> TransformResult<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.storage_path).map_err(|e| {
            TransformError::Persistence(format!(
                "Failed to create storage directory {}: {}",
                config.storage_path.display(),
                e
            ))
        })?;
        let db = sled::open(&config.storage_path)?;
        let engine = Self::with_db(db, config.config_cache_capacity)?;

        if let Some(dir) = &config.schemas_dir {
            let count = engine.registry.load_from_dir(dir)?;
            info!("Registered {} schemas from {}", count, dir.display());
        }
        info!("Transform engine opened at {}", config.storage_path.display());
        Ok(engine)
    }

    /// Opens a throwaway in-memory engine.
    pub fn temporary() -> TransformResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::with_db(db, crate::constants::DEFAULT_CONFIG_CACHE_CAPACITY)
    }

    /// Builds the engine over an already opened database.
    pub fn with_db(db: sled::Db, cache_capacity: usize) -> TransformResult<Self> {
        let store = RecordStore::open(&db)?;
        let registry = Arc::new(SchemaRegistry::with_tree(db.open_tree(SCHEMAS_TREE)?)?);
        let catalog: Arc<dyn SchemaCatalog> = registry.clone();
        let persistence: Arc<dyn PersistenceService> = Arc::new(EntityService::new(catalog.clone()));
        let filter_gate: Arc<dyn FilterGate> =
            Arc::new(RecordFilterChecker::new(catalog, store.clone()));
        let cache: Arc<LruConfigCache<Arc<TransformConfigEntry>>> =
            Arc::new(LruConfigCache::new(cache_capacity)?);
        let configs = TransformConfigManager::new(db.open_tree(TRANSFORM_CONFIGS_TREE)?, cache);

        Ok(Self {
            db,
            store,
            registry,
            persistence,
            filter_gate,
            configs,
        })
    }

    /// Replaces the persistence service transformers write through.
    pub fn with_persistence(mut self, persistence: Arc<dyn PersistenceService>) -> Self {
        self.persistence = persistence;
        self
    }

    /// Replaces the filter gate transformers consult.
    pub fn with_filter_gate(mut self, filter_gate: Arc<dyn FilterGate>) -> Self {
        self.filter_gate = filter_gate;
        self
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn persistence(&self) -> Arc<dyn PersistenceService> {
        Arc::clone(&self.persistence)
    }

    pub fn configs(&self) -> &TransformConfigManager {
        &self.configs
    }

    pub fn context(&self) -> TransformContext {
        TransformContext {
            store: self.store.clone(),
            catalog: self.registry.clone(),
            persistence: Arc::clone(&self.persistence),
            filter_gate: Arc::clone(&self.filter_gate),
        }
    }

    /// Builds a transformer from an ad-hoc configuration.
    pub fn transformer(
        &self,
        target_entity: &str,
        config: TransformConfig,
        actor: &str,
    ) -> TransformResult<RecordTransformer> {
        RecordTransformer::new(self.context(), target_entity, config, actor)
    }

    /// Builds a transformer from a stored configuration. Records passed to it
    /// must belong to the entry's source entity.
    pub fn transformer_for(&self, config_id: &str, actor: &str) -> TransformResult<RecordTransformer> {
        let entry = self.configs.get(config_id)?.ok_or_else(|| {
            TransformError::Configuration(format!("No transform config with id {}", config_id))
        })?;
        if entry.disabled {
            return Err(TransformError::Configuration(format!(
                "Transform config {} is disabled",
                config_id
            )));
        }
        self.build_for_entry(&entry, actor)
    }

    /// Checks an entry against the registered schemas and stores it.
    pub fn save_config(&self, entry: &TransformConfigEntry) -> TransformResult<()> {
        self.build_for_entry(entry, crate::constants::SYSTEM_ACTOR)?;
        self.configs.save(entry)
    }

    fn build_for_entry(
        &self,
        entry: &TransformConfigEntry,
        actor: &str,
    ) -> TransformResult<RecordTransformer> {
        self.registry.entity(&entry.source_entity)?;
        Ok(self
            .transformer(&entry.target_entity, entry.config.clone(), actor)?
            .with_expected_source(&entry.source_entity))
    }

    /// Flushes all trees to disk.
    pub fn flush(&self) -> TransformResult<()> {
        self.db.flush()?;
        Ok(())
    }
}
