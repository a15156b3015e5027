//! # fold_transform
//!
//! Schema-driven record transformation over a sled store.
//!
//! Given a source record, a target entity and a field-mapping configuration,
//! the engine creates a new record of the target entity, optionally cascades
//! to the source's detail rows and writes the new id back onto the source.
//! All writes of one transform commit together or not at all.
//!
//! ## Core Components
//!
//! * `schema` - Entity schemas and the catalog that resolves them
//! * `store` - Record storage, row queries and the unit-of-work transaction
//! * `service` - Record persistence with audit stamping
//! * `filter` - Advanced filters gating whether a transform may run
//! * `transform` - Value coercion, the record transformer and stored configs
//! * `engine` - Composition root wiring the above together
//! * `config` - Engine and transform configuration
//! * `logging` - `env_logger` setup for the `log` facade

pub mod cache;
pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod filter;
pub mod logging;
pub mod record;
pub mod schema;
pub mod service;
pub mod store;
pub mod transform;

// Re-export main types for convenience
pub use config::{load_engine_config, EngineConfig, FieldMapping, TransformConfig};
pub use engine::TransformEngine;
pub use error::{ErrorCategory, TransformError, TransformResult};
pub use filter::{FilterDefinition, FilterGate, FilterItem, FilterOp, RecordFilterChecker};
pub use record::{Record, RecordId};
pub use schema::{EntitySchema, FieldDef, FieldType, PickOption, SchemaCatalog, SchemaRegistry};
pub use service::{EntityService, PersistenceService};
pub use store::{CommitOutcome, RecordStore, Row, RowQuery, RowReader, StoreTransaction};
pub use transform::{
    FieldValueConversion, RecordTransformer, TransformConfigEntry, TransformConfigManager,
    TransformContext, TransformReport, TransformWarning,
};
