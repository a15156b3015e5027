//! Record persistence through a caller-supplied transaction.

use crate::constants::{
    DATETIME_FORMAT, FIELD_CREATED_BY, FIELD_CREATED_ON, FIELD_MODIFIED_BY, FIELD_MODIFIED_ON,
};
use crate::error::{TransformError, TransformResult};
use crate::record::{Record, RecordId};
use crate::schema::{EntitySchema, SchemaCatalog};
use crate::store::StoreTransaction;
use chrono::Utc;
use log::debug;
use serde_json::Value;
use std::sync::Arc;

/// Creates and updates records inside a transaction owned by the caller.
pub trait PersistenceService: Send + Sync {
    /// Persists a new record and returns it with its assigned id.
    fn create(&self, tx: &mut StoreTransaction, record: Record) -> TransformResult<Record>;

    /// Writes the fields set on `record` over an existing record.
    fn update(&self, tx: &mut StoreTransaction, record: Record) -> TransformResult<Record>;
}

/// Default persistence service: checks fields against the catalog and stamps
/// audit metadata.
#[derive(Clone)]
pub struct EntityService {
    catalog: Arc<dyn SchemaCatalog>,
}

impl EntityService {
    pub fn new(catalog: Arc<dyn SchemaCatalog>) -> Self {
        Self { catalog }
    }

    fn check_fields(schema: &EntitySchema, record: &Record) -> TransformResult<()> {
        for field in record.values().keys() {
            if !schema.has_field(field) {
                return Err(TransformError::SchemaResolution(format!(
                    "Cannot write unknown field {}.{}",
                    schema.name, field
                )));
            }
        }
        Ok(())
    }

    fn now() -> Value {
        Value::String(Utc::now().format(DATETIME_FORMAT).to_string())
    }
}

impl PersistenceService for EntityService {
    fn create(&self, tx: &mut StoreTransaction, mut record: Record) -> TransformResult<Record> {
        let schema = self.catalog.entity(record.entity())?;
        Self::check_fields(&schema, &record)?;

        let id = RecordId::new(schema.code);
        let now = Self::now();
        let actor = Value::String(record.actor().to_string());
        record.set_id(id);
        record.set(&schema.primary_field(), Value::String(id.to_string()));
        record.set(FIELD_CREATED_BY, actor.clone());
        record.set(FIELD_CREATED_ON, now.clone());
        record.set(FIELD_MODIFIED_BY, actor);
        record.set(FIELD_MODIFIED_ON, now);

        tx.put_document(&schema.name, &id, record.values())?;
        debug!("Created {} record {}", schema.name, id);
        Ok(record)
    }

    fn update(&self, tx: &mut StoreTransaction, mut record: Record) -> TransformResult<Record> {
        let schema = self.catalog.entity(record.entity())?;
        Self::check_fields(&schema, &record)?;

        let id = record.id().ok_or_else(|| {
            TransformError::Persistence(format!(
                "Cannot update a {} record without an id",
                schema.name
            ))
        })?;
        let mut document = tx.get_document(&schema.name, &id)?.ok_or_else(|| {
            TransformError::Persistence(format!("Cannot update missing record {}", id))
        })?;

        let actor = Value::String(record.actor().to_string());
        record.set(FIELD_MODIFIED_BY, actor);
        record.set(FIELD_MODIFIED_ON, Self::now());
        for (field, value) in record.values() {
            document.insert(field.clone(), value.clone());
        }

        tx.put_document(&schema.name, &id, &document)?;
        debug!("Updated {} record {}", schema.name, id);
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldType, SchemaRegistry};
    use crate::store::RecordStore;
    use serde_json::json;

    fn setup() -> (EntityService, RecordStore) {
        let registry = SchemaRegistry::new();
        registry
            .register(crate::schema::EntitySchema::new("Invoice", 903).with_field("amount", FieldType::Number))
            .unwrap();
        let db = sled::Config::new().temporary(true).open().unwrap();
        (
            EntityService::new(Arc::new(registry)),
            RecordStore::open(&db).unwrap(),
        )
    }

    #[test]
    fn test_create_assigns_id_and_audit_fields() {
        let (service, store) = setup();
        let mut tx = store.begin();
        let mut record = Record::for_new("Invoice", "alice");
        record.set("amount", json!(100));
        let created = service.create(&mut tx, record).unwrap();
        tx.commit().unwrap();

        let id = created.id().unwrap();
        assert_eq!(id.entity_code(), 903);
        let doc = store.get_document("Invoice", &id).unwrap().unwrap();
        assert_eq!(doc["amount"], json!(100));
        assert_eq!(doc["InvoiceId"], json!(id.to_string()));
        assert_eq!(doc[FIELD_CREATED_BY], json!("alice"));
        assert!(doc[FIELD_CREATED_ON].is_string());
    }

    #[test]
    fn test_create_rejects_unknown_field() {
        let (service, store) = setup();
        let mut tx = store.begin();
        let mut record = Record::for_new("Invoice", "alice");
        record.set("legacyCode", json!("X"));
        assert!(matches!(
            service.create(&mut tx, record),
            Err(TransformError::SchemaResolution(_))
        ));
    }

    #[test]
    fn test_update_merges_fields() {
        let (service, store) = setup();
        let mut tx = store.begin();
        let mut record = Record::for_new("Invoice", "alice");
        record.set("amount", json!(1));
        let id = service.create(&mut tx, record).unwrap().id().unwrap();

        let mut update = Record::for_update(id, "Invoice", "bob");
        update.set("amount", json!(2));
        service.update(&mut tx, update).unwrap();
        tx.commit().unwrap();

        let doc = store.get_document("Invoice", &id).unwrap().unwrap();
        assert_eq!(doc["amount"], json!(2));
        assert_eq!(doc[FIELD_CREATED_BY], json!("alice"));
        assert_eq!(doc[FIELD_MODIFIED_BY], json!("bob"));
    }

    #[test]
    fn test_update_of_missing_record_fails() {
        let (service, store) = setup();
        let mut tx = store.begin();
        let update = Record::for_update(RecordId::new(903), "Invoice", "bob");
        assert!(matches!(
            service.update(&mut tx, update),
            Err(TransformError::Persistence(_))
        ));
    }
}
