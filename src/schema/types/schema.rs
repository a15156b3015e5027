use super::fields::{FieldDef, FieldDescriptor, FieldType};
use crate::constants::{FIELD_CREATED_BY, FIELD_CREATED_ON, FIELD_MODIFIED_BY, FIELD_MODIFIED_ON};
use crate::error::{TransformError, TransformResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Schema of one business entity as known to the catalog.
///
/// Main entities may point at a detail entity; detail entities point back at
/// their main entity through a link field holding the parent's record id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySchema {
    pub name: String,
    /// Numeric tag embedded in every record id of this entity
    pub code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_field: Option<String>,
    #[serde(default)]
    pub fields: HashMap<String, FieldDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail_entity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_entity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_link_field: Option<String>,
}

impl EntitySchema {
    #[must_use]
    pub fn new(name: &str, code: u16) -> Self {
        Self {
            name: name.to_string(),
            code,
            primary_field: None,
            fields: HashMap::new(),
            detail_entity: None,
            main_entity: None,
            main_link_field: None,
        }
    }

    pub fn with_field(mut self, name: &str, field_type: FieldType) -> Self {
        self.fields.insert(name.to_string(), FieldDef::new(field_type));
        self
    }

    pub fn with_detail(mut self, detail_entity: &str) -> Self {
        self.detail_entity = Some(detail_entity.to_string());
        self
    }

    /// Marks this entity as the detail of `main_entity`. The link field may be
    /// left to inference when exactly one reference field points at the main.
    pub fn detail_of(mut self, main_entity: &str, link_field: Option<&str>) -> Self {
        self.main_entity = Some(main_entity.to_string());
        self.main_link_field = link_field.map(str::to_string);
        self
    }

    pub fn add_field(&mut self, name: &str, def: FieldDef) {
        self.fields.insert(name.to_string(), def);
    }

    /// Name of the field holding the record's own id.
    pub fn primary_field(&self) -> String {
        self.primary_field
            .clone()
            .unwrap_or_else(|| format!("{}Id", self.name))
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.get(name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Looks up a field and pairs it with this entity for coercion.
    pub fn descriptor<'a>(&'a self, name: &'a str) -> TransformResult<FieldDescriptor<'a>> {
        let def = self.fields.get(name).ok_or_else(|| {
            TransformError::SchemaResolution(format!(
                "Field '{}' does not exist on entity {}",
                name, self.name
            ))
        })?;
        Ok(FieldDescriptor {
            entity: &self.name,
            name,
            field_type: &def.field_type,
        })
    }

    /// Field on this detail entity that links rows to their main record.
    pub fn parent_link_field(&self) -> TransformResult<String> {
        let main = self.main_entity.as_deref().ok_or_else(|| {
            TransformError::SchemaResolution(format!(
                "Entity {} is not a detail of any main entity",
                self.name
            ))
        })?;

        if let Some(link) = &self.main_link_field {
            return match self.fields.get(link) {
                Some(def) if matches!(&def.field_type, FieldType::Reference { entity } if entity == main) => {
                    Ok(link.clone())
                }
                Some(_) => Err(TransformError::SchemaResolution(format!(
                    "Link field {}.{} is not a reference to {}",
                    self.name, link, main
                ))),
                None => Err(TransformError::SchemaResolution(format!(
                    "Link field {}.{} does not exist",
                    self.name, link
                ))),
            };
        }

        let mut candidates = self.fields.iter().filter_map(|(name, def)| match &def.field_type {
            FieldType::Reference { entity } if entity == main => Some(name.clone()),
            _ => None,
        });
        match (candidates.next(), candidates.next()) {
            (Some(link), None) => Ok(link),
            (None, _) => Err(TransformError::SchemaResolution(format!(
                "Detail entity {} has no field referencing {}",
                self.name, main
            ))),
            (Some(_), Some(_)) => Err(TransformError::SchemaResolution(format!(
                "Detail entity {} has several fields referencing {}; set main_link_field",
                self.name, main
            ))),
        }
    }

    /// Adds the primary and audit fields and checks the declared field types.
    pub(crate) fn normalize(&mut self) -> TransformResult<()> {
        if self.name.trim().is_empty() {
            return Err(TransformError::Configuration(
                "Entity name cannot be empty".to_string(),
            ));
        }
        for (name, def) in &self.fields {
            def.field_type
                .validate(&format!("{}.{}", self.name, name))?;
        }

        let primary = self.primary_field();
        self.fields.insert(
            primary,
            FieldDef::new(FieldType::Reference {
                entity: self.name.clone(),
            }),
        );
        for audit in [FIELD_CREATED_BY, FIELD_MODIFIED_BY] {
            self.fields
                .entry(audit.to_string())
                .or_insert_with(|| FieldDef::new(FieldType::Text));
        }
        for audit in [FIELD_CREATED_ON, FIELD_MODIFIED_ON] {
            self.fields
                .entry(audit.to_string())
                .or_insert_with(|| FieldDef::new(FieldType::Datetime));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invoice_line() -> EntitySchema {
        EntitySchema::new("InvoiceLine", 904)
            .with_field("invoice", FieldType::Reference { entity: "Invoice".to_string() })
            .with_field("qty", FieldType::Number)
            .detail_of("Invoice", None)
    }

    #[test]
    fn test_primary_field_defaults_to_name_id() {
        let schema = EntitySchema::new("Order", 901);
        assert_eq!(schema.primary_field(), "OrderId");
    }

    #[test]
    fn test_normalize_adds_system_fields() {
        let mut schema = EntitySchema::new("Order", 901).with_field("total", FieldType::Number);
        schema.normalize().unwrap();
        assert!(schema.has_field("OrderId"));
        assert!(schema.has_field(FIELD_CREATED_BY));
        assert_eq!(
            schema.field(FIELD_MODIFIED_ON).unwrap().field_type,
            FieldType::Datetime
        );
    }

    #[test]
    fn test_link_field_inferred_from_reference() {
        assert_eq!(invoice_line().parent_link_field().unwrap(), "invoice");
    }

    #[test]
    fn test_ambiguous_link_field_is_rejected() {
        let schema = invoice_line().with_field(
            "original",
            FieldType::Reference { entity: "Invoice".to_string() },
        );
        assert!(matches!(
            schema.parent_link_field(),
            Err(TransformError::SchemaResolution(_))
        ));

        let explicit = schema.detail_of("Invoice", Some("invoice"));
        assert_eq!(explicit.parent_link_field().unwrap(), "invoice");
    }

    #[test]
    fn test_main_entity_has_no_link_field() {
        let schema = EntitySchema::new("Invoice", 903);
        assert!(schema.parent_link_field().is_err());
    }
}
