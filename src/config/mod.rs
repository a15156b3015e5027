//! Engine and transform configuration.

pub mod engine_config;
pub mod transform_config;

pub use engine_config::{load_engine_config, EngineConfig};
pub use transform_config::{FieldMapping, MappingPair, TransformConfig};
