//! Entity schemas and the catalog that resolves them.
//!
//! Schemas describe the fields of each business entity, the numeric code
//! embedded in its record ids and its main/detail relationships.

pub mod catalog;
pub mod loader;
pub mod registry;
pub mod types;

pub use catalog::SchemaCatalog;
pub use loader::{load_schema_from_file, load_schemas_from_dir};
pub use registry::SchemaRegistry;
pub use types::{EntitySchema, FieldDef, FieldDescriptor, FieldType, PickOption};
