use super::types::EntitySchema;
use crate::error::{TransformError, TransformResult};
use log::{debug, info};
use std::fs;
use std::path::Path;

/// Loads a single entity schema from a JSON file.
///
/// # Arguments
///
/// * `path` - Path to the schema file
///
/// # Returns
///
/// The parsed schema. It is not normalized until it is registered.
pub fn load_schema_from_file<P: AsRef<Path>>(path: P) -> TransformResult<EntitySchema> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|e| {
        TransformError::Configuration(format!(
            "Failed to read schema file {}: {}",
            path.display(),
            e
        ))
    })?;
    serde_json::from_str(&contents).map_err(|e| {
        TransformError::Configuration(format!(
            "Invalid schema file {}: {}",
            path.display(),
            e
        ))
    })
}

/// Loads every `*.json` schema in `dir`, in file name order.
pub fn load_schemas_from_dir<P: AsRef<Path>>(dir: P) -> TransformResult<Vec<EntitySchema>> {
    let dir = dir.as_ref();
    let entries = fs::read_dir(dir).map_err(|e| {
        TransformError::Configuration(format!(
            "Failed to read schema directory {}: {}",
            dir.display(),
            e
        ))
    })?;

    let mut paths: Vec<_> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.extension().map(|e| e == "json").unwrap_or(false))
        .collect();
    paths.sort();

    let mut schemas = Vec::with_capacity(paths.len());
    for path in paths {
        debug!("Loading schema file {}", path.display());
        schemas.push(load_schema_from_file(&path)?);
    }
    info!("Loaded {} schema files from {}", schemas.len(), dir.display());
    Ok(schemas)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_schemas_from_dir_skips_other_files() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(
            dir.path().join("order.json"),
            r#"{"name":"Order","code":901,"fields":{"total":{"type":"NUMBER"}}}"#,
        )?;
        fs::write(dir.path().join("notes.txt"), "not a schema")?;

        let schemas = load_schemas_from_dir(dir.path())?;
        assert_eq!(schemas.len(), 1);
        assert_eq!(schemas[0].name, "Order");
        assert!(schemas[0].has_field("total"));
        Ok(())
    }

    #[test]
    fn test_invalid_schema_file_is_configuration_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("broken.json");
        fs::write(&path, r#"{"name":"Broken"}"#)?;
        assert!(matches!(
            load_schema_from_file(&path),
            Err(TransformError::Configuration(_))
        ));
        Ok(())
    }
}
