use super::types::EntitySchema;
use crate::error::{TransformError, TransformResult};
use crate::transform::TransformWarning;
use log::warn;
use std::sync::Arc;

/// Read-only view of the entity schemas the transformer works against.
pub trait SchemaCatalog: Send + Sync {
    /// Resolves an entity by name.
    fn entity(&self, name: &str) -> TransformResult<Arc<EntitySchema>>;

    /// Resolves an entity from the numeric tag embedded in its record ids.
    fn entity_by_code(&self, code: u16) -> TransformResult<Arc<EntitySchema>>;

    /// Detail entity of a main entity, if it declares one.
    fn detail_entity(&self, schema: &EntitySchema) -> TransformResult<Option<Arc<EntitySchema>>> {
        match &schema.detail_entity {
            Some(name) => self.entity(name).map(Some),
            None => Ok(None),
        }
    }

    /// Field on a detail entity that holds the id of its parent record.
    fn parent_link_field(&self, detail: &EntitySchema) -> TransformResult<String> {
        detail.parent_link_field()
    }

    /// Checks that `field` exists on `schema`. A miss is not an error: it is
    /// logged and recorded in `warnings`.
    fn field_exists(
        &self,
        schema: &EntitySchema,
        field: &str,
        warnings: &mut Vec<TransformWarning>,
    ) -> bool {
        if schema.has_field(field) {
            return true;
        }
        warn!(
            "Field '{}' does not exist on entity {}; skipping it",
            field, schema.name
        );
        warnings.push(TransformWarning::UnknownSourceField {
            entity: schema.name.clone(),
            field: field.to_string(),
        });
        false
    }
}

/// Builds the error raised for an unknown entity name.
pub(crate) fn unknown_entity(name: &str) -> TransformError {
    TransformError::SchemaResolution(format!("Entity '{}' is not registered", name))
}

/// Builds the error raised for an unknown entity code.
pub(crate) fn unknown_code(code: u16) -> TransformError {
    TransformError::SchemaResolution(format!("No entity registered with code {:03}", code))
}
