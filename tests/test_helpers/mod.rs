#![allow(dead_code)]

use fold_transform::{
    EntitySchema, FieldType, PersistenceService, PickOption, Record, RecordId, TransformEngine,
};
use serde_json::{json, Map, Value};

pub const TEST_ACTOR: &str = "alice";

/// Entities every test store knows about, in dependency order.
pub const ENTITIES: [&str; 6] = [
    "Customer",
    "Order",
    "OrderLine",
    "Invoice",
    "InvoiceLine",
    "Quote",
];

pub fn status_options(open_key: &str, closed_key: &str) -> Vec<PickOption> {
    vec![
        PickOption::new(open_key, "Open"),
        PickOption::new(closed_key, "Closed"),
    ]
}

/// Registers the order/invoice schema family used across integration tests.
pub fn register_schemas(engine: &TransformEngine) {
    let registry = engine.registry();
    registry
        .register(EntitySchema::new("Customer", 910).with_field("name", FieldType::Text))
        .expect("Failed to register Customer");
    registry
        .register(
            EntitySchema::new("Order", 901)
                .with_field("fullName", FieldType::Text)
                .with_field("total", FieldType::Number)
                .with_field("placedOn", FieldType::Datetime)
                .with_field(
                    "status",
                    FieldType::Picklist {
                        options: status_options("open", "closed"),
                    },
                )
                .with_field(
                    "invoice",
                    FieldType::Reference {
                        entity: "Invoice".to_string(),
                    },
                )
                .with_field("invoiceNo", FieldType::Text)
                .with_field(
                    "customer",
                    FieldType::Reference {
                        entity: "Customer".to_string(),
                    },
                )
                .with_detail("OrderLine"),
        )
        .expect("Failed to register Order");
    registry
        .register(
            EntitySchema::new("OrderLine", 902)
                .with_field(
                    "order",
                    FieldType::Reference {
                        entity: "Order".to_string(),
                    },
                )
                .with_field("product", FieldType::Text)
                .with_field("quantity", FieldType::Number)
                .with_field("price", FieldType::Decimal { scale: 2 })
                .detail_of("Order", None),
        )
        .expect("Failed to register OrderLine");
    registry
        .register(
            EntitySchema::new("Invoice", 903)
                .with_field("name", FieldType::Text)
                .with_field("amount", FieldType::Decimal { scale: 2 })
                .with_field("issuedOn", FieldType::Date)
                .with_field(
                    "status",
                    FieldType::Picklist {
                        options: status_options("O", "C"),
                    },
                )
                .with_field(
                    "sourceOrder",
                    FieldType::Reference {
                        entity: "Order".to_string(),
                    },
                )
                .with_detail("InvoiceLine"),
        )
        .expect("Failed to register Invoice");
    registry
        .register(
            EntitySchema::new("InvoiceLine", 904)
                .with_field(
                    "invoice",
                    FieldType::Reference {
                        entity: "Invoice".to_string(),
                    },
                )
                .with_field("description", FieldType::Text)
                .with_field("qty", FieldType::Number)
                .with_field("unitPrice", FieldType::Decimal { scale: 2 })
                .detail_of("Invoice", Some("invoice")),
        )
        .expect("Failed to register InvoiceLine");
    registry
        .register(
            EntitySchema::new("Quote", 905)
                .with_field("title", FieldType::Text)
                .with_field("fullName", FieldType::Text)
                .with_field("total", FieldType::Text),
        )
        .expect("Failed to register Quote");
}

/// Fresh in-memory engine with the test schemas registered.
pub fn setup_engine() -> TransformEngine {
    let engine = TransformEngine::temporary().expect("Failed to open temporary engine");
    register_schemas(&engine);
    engine
}

/// Creates one record through the engine's persistence service and commits it.
pub fn seed(engine: &TransformEngine, entity: &str, values: Value) -> RecordId {
    let mut record = Record::for_new(entity, TEST_ACTOR);
    if let Value::Object(map) = values {
        for (field, value) in map {
            record.set(&field, value);
        }
    }
    let mut tx = engine.store().begin();
    let created = engine
        .persistence()
        .create(&mut tx, record)
        .expect("Failed to seed record");
    tx.commit().expect("Failed to commit seed");
    created.id().expect("Seeded record has no id")
}

pub fn seed_order(engine: &TransformEngine, full_name: &str, total: i64) -> RecordId {
    seed(
        engine,
        "Order",
        json!({
            "fullName": full_name,
            "total": total,
            "placedOn": "2026-03-01 10:30:00",
            "status": "open",
        }),
    )
}

/// Seeds `count` lines under `order`.
pub fn seed_order_lines(engine: &TransformEngine, order: RecordId, count: usize) -> Vec<RecordId> {
    (1..=count)
        .map(|n| {
            seed(
                engine,
                "OrderLine",
                json!({
                    "order": order.to_string(),
                    "product": format!("Widget {}", n),
                    "quantity": n,
                    "price": "12.50",
                }),
            )
        })
        .collect()
}

pub fn document(engine: &TransformEngine, entity: &str, id: &RecordId) -> Map<String, Value> {
    engine
        .store()
        .get_document(entity, id)
        .expect("Failed to read document")
        .unwrap_or_else(|| panic!("{} {} not found", entity, id))
}

/// Record counts per entity, in [`ENTITIES`] order.
pub fn record_counts(engine: &TransformEngine) -> Vec<usize> {
    ENTITIES
        .iter()
        .map(|entity| engine.store().count(entity))
        .collect()
}
