use crate::constants::{DEFAULT_DECIMAL_SCALE, MAX_DECIMAL_SCALE};
use crate::error::{TransformError, TransformResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// One choice of a picklist or multi-select field.
///
/// The key is what gets stored; the label is what users see and what the
/// coercion layer matches on when two fields do not share keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickOption {
    pub key: String,
    pub label: String,
}

impl PickOption {
    pub fn new(key: &str, label: &str) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
        }
    }
}

fn default_scale() -> u32 {
    DEFAULT_DECIMAL_SCALE
}

/// Declared type of a field, which decides how its values are stored and how
/// they can be coerced into other fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldType {
    Text,
    Ntext,
    Email,
    Phone,
    Url,
    /// Whole numbers
    Number,
    Decimal {
        #[serde(default = "default_scale")]
        scale: u32,
    },
    Date,
    Datetime,
    Bool,
    Picklist {
        options: Vec<PickOption>,
    },
    Multiselect {
        options: Vec<PickOption>,
    },
    Reference {
        entity: String,
    },
}

impl FieldType {
    /// Text-like types stored as plain strings.
    pub fn is_text(&self) -> bool {
        matches!(
            self,
            FieldType::Text | FieldType::Ntext | FieldType::Email | FieldType::Phone | FieldType::Url
        )
    }

    pub fn options(&self) -> Option<&[PickOption]> {
        match self {
            FieldType::Picklist { options } | FieldType::Multiselect { options } => Some(options),
            _ => None,
        }
    }

    pub(crate) fn validate(&self, owner: &str) -> TransformResult<()> {
        match self {
            FieldType::Decimal { scale } if *scale > MAX_DECIMAL_SCALE => {
                Err(TransformError::Configuration(format!(
                    "Field {} declares decimal scale {} (max {})",
                    owner, scale, MAX_DECIMAL_SCALE
                )))
            }
            FieldType::Picklist { options } | FieldType::Multiselect { options } => {
                let mut seen = HashSet::new();
                for option in options {
                    if option.key.trim().is_empty() {
                        return Err(TransformError::Configuration(format!(
                            "Field {} has an option with an empty key",
                            owner
                        )));
                    }
                    if !seen.insert(option.key.as_str()) {
                        return Err(TransformError::Configuration(format!(
                            "Field {} declares option '{}' twice",
                            owner, option.key
                        )));
                    }
                }
                Ok(())
            }
            FieldType::Reference { entity } if entity.trim().is_empty() => {
                Err(TransformError::Configuration(format!(
                    "Reference field {} does not name an entity",
                    owner
                )))
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Text => write!(f, "TEXT"),
            FieldType::Ntext => write!(f, "NTEXT"),
            FieldType::Email => write!(f, "EMAIL"),
            FieldType::Phone => write!(f, "PHONE"),
            FieldType::Url => write!(f, "URL"),
            FieldType::Number => write!(f, "NUMBER"),
            FieldType::Decimal { scale } => write!(f, "DECIMAL({})", scale),
            FieldType::Date => write!(f, "DATE"),
            FieldType::Datetime => write!(f, "DATETIME"),
            FieldType::Bool => write!(f, "BOOL"),
            FieldType::Picklist { .. } => write!(f, "PICKLIST"),
            FieldType::Multiselect { .. } => write!(f, "MULTISELECT"),
            FieldType::Reference { entity } => write!(f, "REFERENCE({})", entity),
        }
    }
}

/// Defines a single field within an entity schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    #[serde(flatten)]
    pub field_type: FieldType,
    /// Display label, informational only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl FieldDef {
    #[must_use]
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            label: None,
        }
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }
}

/// A field together with the entity that owns it, as handed to the coercion
/// layer so errors can name both sides.
#[derive(Debug, Clone, Copy)]
pub struct FieldDescriptor<'a> {
    pub entity: &'a str,
    pub name: &'a str,
    pub field_type: &'a FieldType,
}

impl fmt::Display for FieldDescriptor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.entity, self.name)
    }
}
