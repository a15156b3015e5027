/// Common constants used across the transform engine.
///
/// These defaults are used for configuration when explicit values are not
/// provided and for the system fields every entity carries.
pub const FIELD_CREATED_BY: &str = "createdBy";
pub const FIELD_CREATED_ON: &str = "createdOn";
pub const FIELD_MODIFIED_BY: &str = "modifiedBy";
pub const FIELD_MODIFIED_ON: &str = "modifiedOn";

/// Storage formats for temporal values
pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// sled tree names
pub const RECORDS_TREE: &str = "records";
pub const SCHEMAS_TREE: &str = "schemas";
pub const TRANSFORM_CONFIGS_TREE: &str = "transform_configs";

pub const DEFAULT_DECIMAL_SCALE: u32 = 2;
pub const MAX_DECIMAL_SCALE: u32 = 28;
pub const DEFAULT_CONFIG_CACHE_CAPACITY: usize = 256;

/// Times a transform is run before a commit conflict on the source is fatal
pub const MAX_COMMIT_ATTEMPTS: u32 = 3;

/// Actor recorded when the CLI runs a transform without an explicit user
pub const SYSTEM_ACTOR: &str = "system";
