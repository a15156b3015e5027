use super::catalog::{unknown_code, unknown_entity, SchemaCatalog};
use super::loader::load_schemas_from_dir;
use super::types::EntitySchema;
use crate::error::{TransformError, TransformResult};
use log::{debug, info};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

fn lock_error() -> TransformError {
    TransformError::Persistence("Failed to acquire schema lock".to_string())
}

/// Thread-safe catalog of registered entity schemas.
///
/// Schemas are kept in memory and, when the registry is opened over a sled
/// tree, written through to it so they survive a restart.
pub struct SchemaRegistry {
    by_name: RwLock<HashMap<String, Arc<EntitySchema>>>,
    by_code: RwLock<HashMap<u16, String>>,
    tree: Option<sled::Tree>,
}

impl SchemaRegistry {
    /// Creates an empty, memory-only registry.
    pub fn new() -> Self {
        Self {
            by_name: RwLock::new(HashMap::new()),
            by_code: RwLock::new(HashMap::new()),
            tree: None,
        }
    }

    /// Opens a registry backed by `tree`, loading every schema stored in it.
    pub fn with_tree(tree: sled::Tree) -> TransformResult<Self> {
        let mut registry = Self::new();
        let mut stored = Vec::new();
        for item in tree.iter() {
            let (_, bytes) = item?;
            stored.push(serde_json::from_slice::<EntitySchema>(&bytes)?);
        }
        for schema in stored {
            registry.insert(schema)?;
        }
        registry.tree = Some(tree);
        info!(
            "Schema registry opened with {} stored entities",
            registry.list()?.len()
        );
        Ok(registry)
    }

    /// Registers or replaces a schema. Codes must stay unique across names.
    pub fn register(&self, schema: EntitySchema) -> TransformResult<Arc<EntitySchema>> {
        let schema = self.insert(schema)?;
        if let Some(tree) = &self.tree {
            tree.insert(schema.name.as_bytes(), serde_json::to_vec(schema.as_ref())?)?;
            tree.flush()?;
        }
        info!("Registered entity {} (code {:03})", schema.name, schema.code);
        Ok(schema)
    }

    /// Registers every schema file found in `dir`.
    pub fn load_from_dir<P: AsRef<Path>>(&self, dir: P) -> TransformResult<usize> {
        let schemas = load_schemas_from_dir(dir)?;
        let count = schemas.len();
        for schema in schemas {
            self.register(schema)?;
        }
        Ok(count)
    }

    /// Names of all registered entities, sorted.
    pub fn list(&self) -> TransformResult<Vec<String>> {
        let by_name = self.by_name.read().map_err(|_| lock_error())?;
        let mut names: Vec<String> = by_name.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn insert(&self, mut schema: EntitySchema) -> TransformResult<Arc<EntitySchema>> {
        schema.normalize()?;
        let mut by_name = self.by_name.write().map_err(|_| lock_error())?;
        let mut by_code = self.by_code.write().map_err(|_| lock_error())?;

        if let Some(owner) = by_code.get(&schema.code) {
            if owner != &schema.name {
                return Err(TransformError::Configuration(format!(
                    "Entity code {:03} is already used by {}",
                    schema.code, owner
                )));
            }
        }
        if let Some(previous) = by_name.get(&schema.name) {
            if previous.code != schema.code {
                by_code.remove(&previous.code);
            }
        }

        debug!("Caching schema {} with {} fields", schema.name, schema.fields.len());
        let schema = Arc::new(schema);
        by_code.insert(schema.code, schema.name.clone());
        by_name.insert(schema.name.clone(), Arc::clone(&schema));
        Ok(schema)
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaCatalog for SchemaRegistry {
    fn entity(&self, name: &str) -> TransformResult<Arc<EntitySchema>> {
        let by_name = self.by_name.read().map_err(|_| lock_error())?;
        by_name.get(name).cloned().ok_or_else(|| unknown_entity(name))
    }

    fn entity_by_code(&self, code: u16) -> TransformResult<Arc<EntitySchema>> {
        let name = {
            let by_code = self.by_code.read().map_err(|_| lock_error())?;
            by_code.get(&code).cloned().ok_or_else(|| unknown_code(code))?
        };
        self.entity(&name)
    }
}
