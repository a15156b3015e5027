use crate::record::RecordId;
use thiserror::Error;

/// Unified error type for record transformation.
///
/// Every fatal condition raised while validating a configuration, resolving
/// schemas, coercing values or writing records is one of these variants. The
/// transformer rolls back its transaction and hands the error back unchanged,
/// so callers can rely on the variant to decide who has to act on it (see
/// [`TransformError::category`]).
#[derive(Debug, Error)]
pub enum TransformError {
    /// Missing or malformed transform configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An entity, detail entity or field could not be resolved
    #[error("Schema resolution error: {0}")]
    SchemaResolution(String),

    /// A source value cannot be represented by the target field
    #[error("Incompatible field types {source_field} -> {target_field}: {reason}")]
    IncompatibleType {
        source_field: String,
        target_field: String,
        reason: String,
    },

    /// The underlying store rejected a read or write
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// The source record disappeared before it could be read
    #[error("Source record not found: {0}")]
    SourceNotFound(RecordId),

    /// A record id string could not be parsed
    #[error("Invalid record id: {0}")]
    InvalidRecordId(String),
}

/// Who is expected to act on an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Setup or configuration problem, actionable by an administrator
    Setup,
    /// Problem with the records themselves, actionable by the data owner
    Data,
}

impl TransformError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) | Self::SchemaResolution(_) => ErrorCategory::Setup,
            Self::IncompatibleType { .. }
            | Self::Persistence(_)
            | Self::SourceNotFound(_)
            | Self::InvalidRecordId(_) => ErrorCategory::Data,
        }
    }

    /// Shorthand used by the coercion layer.
    pub fn incompatible(
        source_field: impl Into<String>,
        target_field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::IncompatibleType {
            source_field: source_field.into(),
            target_field: target_field.into(),
            reason: reason.into(),
        }
    }
}

/// Conversion from sled::Error to TransformError
impl From<sled::Error> for TransformError {
    fn from(error: sled::Error) -> Self {
        TransformError::Persistence(format!("Storage failure: {}", error))
    }
}

/// Conversion from serde_json::Error to TransformError
impl From<serde_json::Error> for TransformError {
    fn from(error: serde_json::Error) -> Self {
        TransformError::Persistence(format!("Serialization failure: {}", error))
    }
}

/// Result type alias for operations that can result in a TransformError
pub type TransformResult<T> = Result<T, TransformError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_errors_are_for_administrators() {
        let config = TransformError::Configuration("empty mapping".to_string());
        let schema = TransformError::SchemaResolution("no entity 42".to_string());
        assert_eq!(config.category(), ErrorCategory::Setup);
        assert_eq!(schema.category(), ErrorCategory::Setup);
    }

    #[test]
    fn test_data_errors_are_for_data_owners() {
        let incompatible = TransformError::incompatible("Order.total", "Invoice.amount", "x");
        let persistence = TransformError::Persistence("disk full".to_string());
        assert_eq!(incompatible.category(), ErrorCategory::Data);
        assert_eq!(persistence.category(), ErrorCategory::Data);
    }

    #[test]
    fn test_incompatible_message_names_both_fields() {
        let err = TransformError::incompatible("Order.total", "Invoice.amount", "not a number");
        let message = err.to_string();
        assert!(message.contains("Order.total"));
        assert!(message.contains("Invoice.amount"));
    }

    #[test]
    fn test_sled_error_maps_to_persistence() {
        let err: TransformError = sled::Error::Unsupported("test".to_string()).into();
        assert!(matches!(err, TransformError::Persistence(_)));
    }
}
