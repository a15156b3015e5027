pub mod fields;
pub mod schema;

pub use fields::{FieldDef, FieldDescriptor, FieldType, PickOption};
pub use schema::EntitySchema;
