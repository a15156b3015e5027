use crate::constants::DEFAULT_CONFIG_CACHE_CAPACITY;
use crate::error::{TransformError, TransformResult};
use crate::logging::LogConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for a [`TransformEngine`](crate::engine::TransformEngine).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Path where the engine stores its sled database
    #[serde(default = "default_storage_path")]
    pub storage_path: PathBuf,
    /// Directory of entity schema JSON files registered on startup
    #[serde(default)]
    pub schemas_dir: Option<PathBuf>,
    /// Number of transform configs kept in the read-through cache
    #[serde(default = "default_cache_capacity")]
    pub config_cache_capacity: usize,
    #[serde(default)]
    pub logging: Option<LogConfig>,
}

fn default_storage_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("fold_transform"))
        .unwrap_or_else(|| PathBuf::from("data"))
}

fn default_cache_capacity() -> usize {
    DEFAULT_CONFIG_CACHE_CAPACITY
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            storage_path: default_storage_path(),
            schemas_dir: None,
            config_cache_capacity: default_cache_capacity(),
            logging: None,
        }
    }
}

impl EngineConfig {
    /// Create a configuration with the specified storage path
    pub fn new(storage_path: PathBuf) -> Self {
        Self {
            storage_path,
            ..Default::default()
        }
    }

    pub fn with_schemas_dir(mut self, dir: PathBuf) -> Self {
        self.schemas_dir = Some(dir);
        self
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.config_cache_capacity = capacity;
        self
    }

    pub fn validate(&self) -> TransformResult<()> {
        if self.config_cache_capacity == 0 {
            return Err(TransformError::Configuration(
                "config_cache_capacity must be at least 1".to_string(),
            ));
        }
        if let Some(logging) = &self.logging {
            logging
                .validate()
                .map_err(|e| TransformError::Configuration(e.to_string()))?;
        }
        Ok(())
    }

    fn parse(path: &Path, contents: &str) -> TransformResult<Self> {
        let is_toml = path.extension().map(|e| e == "toml").unwrap_or(false);
        let parsed = if is_toml {
            toml::from_str::<EngineConfig>(contents).map_err(|e| e.to_string())
        } else {
            serde_json::from_str::<EngineConfig>(contents).map_err(|e| e.to_string())
        };
        parsed.map_err(|e| {
            TransformError::Configuration(format!(
                "Failed to parse engine configuration {}: {}",
                path.display(),
                e
            ))
        })
    }
}

/// Load an engine configuration from the given path or from the
/// `FOLD_TRANSFORM_CONFIG` environment variable.
///
/// `.toml` files are read as TOML, anything else as JSON. If the file does not
/// exist a default [`EngineConfig`] is returned.
pub fn load_engine_config(path: Option<&str>) -> TransformResult<EngineConfig> {
    let config_path = path
        .map(PathBuf::from)
        .or_else(|| std::env::var("FOLD_TRANSFORM_CONFIG").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("config/engine_config.json"));

    let config = match std::fs::read_to_string(&config_path) {
        Ok(contents) => EngineConfig::parse(&config_path, &contents)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::info!(
                "No engine configuration at {}; using defaults",
                config_path.display()
            );
            EngineConfig::default()
        }
        Err(e) => {
            return Err(TransformError::Configuration(format!(
                "Failed to read engine configuration {}: {}",
                config_path.display(),
                e
            )))
        }
    };
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nonexistent.json");
        let config = load_engine_config(path.to_str()).unwrap();
        assert_eq!(config.config_cache_capacity, DEFAULT_CONFIG_CACHE_CAPACITY);
        assert!(config.schemas_dir.is_none());
    }

    #[test]
    fn test_json_and_toml_files() {
        let dir = tempdir().unwrap();
        let json_path = dir.path().join("engine.json");
        std::fs::write(
            &json_path,
            r#"{"storage_path": "/tmp/ft", "config_cache_capacity": 8}"#,
        )
        .unwrap();
        let config = load_engine_config(json_path.to_str()).unwrap();
        assert_eq!(config.storage_path, PathBuf::from("/tmp/ft"));
        assert_eq!(config.config_cache_capacity, 8);

        let toml_path = dir.path().join("engine.toml");
        std::fs::write(
            &toml_path,
            "storage_path = \"/tmp/ft\"\nschemas_dir = \"schemas\"\n\n[logging.general]\ndefault_level = \"DEBUG\"\n",
        )
        .unwrap();
        let config = load_engine_config(toml_path.to_str()).unwrap();
        assert_eq!(config.schemas_dir, Some(PathBuf::from("schemas")));
        assert_eq!(
            config.logging.unwrap().general.default_level,
            "DEBUG".to_string()
        );
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{"config_cache_capacity": 0}"#).unwrap();
        assert!(matches!(
            load_engine_config(path.to_str()),
            Err(TransformError::Configuration(_))
        ));
    }
}
