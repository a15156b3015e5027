//! In-memory records and their identifiers.

pub mod id;

pub use id::RecordId;

use serde_json::{Map, Value};

/// A record under construction or about to be updated.
///
/// Target records are built field by field by the transformer and handed to a
/// [`PersistenceService`](crate::service::PersistenceService); the acting user
/// travels with the record so the service can stamp audit fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    entity: String,
    id: Option<RecordId>,
    actor: String,
    values: Map<String, Value>,
}

impl Record {
    /// Creates an empty record that will be assigned an id on create.
    #[must_use]
    pub fn for_new(entity: &str, actor: &str) -> Self {
        Self {
            entity: entity.to_string(),
            id: None,
            actor: actor.to_string(),
            values: Map::new(),
        }
    }

    /// Creates an update record for an existing id. Only the fields set on it
    /// are written.
    #[must_use]
    pub fn for_update(id: RecordId, entity: &str, actor: &str) -> Self {
        Self {
            entity: entity.to_string(),
            id: Some(id),
            actor: actor.to_string(),
            values: Map::new(),
        }
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn id(&self) -> Option<RecordId> {
        self.id
    }

    pub fn set_id(&mut self, id: RecordId) {
        self.id = Some(id);
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }

    pub fn set(&mut self, field: &str, value: Value) {
        self.values.insert(field.to_string(), value);
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.values.contains_key(field)
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn into_values(self) -> Map<String, Value> {
        self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_for_new_has_no_id() {
        let record = Record::for_new("Invoice", "alice");
        assert_eq!(record.entity(), "Invoice");
        assert_eq!(record.actor(), "alice");
        assert!(record.id().is_none());
        assert!(record.values().is_empty());
    }

    #[test]
    fn test_set_keeps_insertion_order() {
        let mut record = Record::for_new("Invoice", "alice");
        record.set("name", json!("Ann"));
        record.set("amount", json!(100));
        let keys: Vec<&String> = record.values().keys().collect();
        assert_eq!(keys, vec!["name", "amount"]);
        assert!(record.contains("amount"));
        assert_eq!(record.get("name"), Some(&json!("Ann")));
    }
}
