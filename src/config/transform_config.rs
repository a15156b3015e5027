use crate::error::{TransformError, TransformResult};
use crate::filter::FilterDefinition;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// One `target <- source` pair of a field mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingPair {
    pub target: String,
    pub source: String,
}

/// Ordered mapping from target field names to source field names.
///
/// In JSON this is an object whose keys are target fields; the object order
/// is kept. Target fields are unique.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMapping(Vec<MappingPair>);

impl FieldMapping {
    /// Builds a mapping from `(target, source)` pairs.
    pub fn from_pairs<I, T, S>(pairs: I) -> TransformResult<Self>
    where
        I: IntoIterator<Item = (T, S)>,
        T: Into<String>,
        S: Into<String>,
    {
        let mut mapping = FieldMapping::default();
        for (target, source) in pairs {
            mapping
                .push(target.into(), source.into())
                .map_err(TransformError::Configuration)?;
        }
        Ok(mapping)
    }

    fn push(&mut self, target: String, source: String) -> Result<(), String> {
        let target = target.trim().to_string();
        let source = source.trim().to_string();
        if target.is_empty() || source.is_empty() {
            return Err("mapping field names cannot be blank".to_string());
        }
        if self.0.iter().any(|pair| pair.target == target) {
            return Err(format!("target field '{}' is mapped twice", target));
        }
        self.0.push(MappingPair { target, source });
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &MappingPair> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|pair| pair.target.as_str())
    }

    /// Distinct source fields, in mapping order.
    pub fn sources(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.0
            .iter()
            .map(|pair| pair.source.as_str())
            .filter(|source| seen.insert(*source))
            .collect()
    }
}

impl Serialize for FieldMapping {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for pair in &self.0 {
            map.serialize_entry(&pair.target, &pair.source)?;
        }
        map.end()
    }
}

struct FieldMappingVisitor;

impl<'de> Visitor<'de> for FieldMappingVisitor {
    type Value = FieldMapping;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("an object of target field -> source field")
    }

    fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut mapping = FieldMapping::default();
        while let Some((target, source)) = access.next_entry::<String, Value>()? {
            let source = match source {
                Value::String(s) => s,
                other => {
                    return Err(serde::de::Error::custom(format!(
                        "source of '{}' must be a field name, got {}",
                        target, other
                    )))
                }
            };
            mapping.push(target, source).map_err(serde::de::Error::custom)?;
        }
        Ok(mapping)
    }
}

impl<'de> Deserialize<'de> for FieldMapping {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(FieldMappingVisitor)
    }
}

/// Wire form of [`TransformConfig`] before validation.
#[doc(hidden)]
#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawTransformConfig {
    #[serde(default)]
    use_filter: Option<FilterDefinition>,
    #[serde(default)]
    fields_mapping: Option<FieldMapping>,
    #[serde(default)]
    fields_mapping_detail: Option<FieldMapping>,
    #[serde(default)]
    fillback_field: Option<String>,
}

/// Validated transform configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawTransformConfig")]
pub struct TransformConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    use_filter: Option<FilterDefinition>,
    fields_mapping: FieldMapping,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields_mapping_detail: Option<FieldMapping>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fillback_field: Option<String>,
}

impl TryFrom<RawTransformConfig> for TransformConfig {
    type Error = TransformError;

    fn try_from(raw: RawTransformConfig) -> Result<Self, Self::Error> {
        let fields_mapping = raw
            .fields_mapping
            .filter(|mapping| !mapping.is_empty())
            .ok_or_else(|| {
                TransformError::Configuration(
                    "fieldsMapping is required and cannot be empty".to_string(),
                )
            })?;
        let config = Self {
            use_filter: raw.use_filter.filter(|f| !f.is_empty()),
            fields_mapping,
            fields_mapping_detail: raw.fields_mapping_detail.filter(|m| !m.is_empty()),
            fillback_field: raw
                .fillback_field
                .map(|f| f.trim().to_string())
                .filter(|f| !f.is_empty()),
        };
        if let Some(filter) = &config.use_filter {
            filter.compile()?;
        }
        Ok(config)
    }
}

impl TransformConfig {
    /// Creates a configuration with only a main mapping.
    pub fn new(fields_mapping: FieldMapping) -> TransformResult<Self> {
        if fields_mapping.is_empty() {
            return Err(TransformError::Configuration(
                "fieldsMapping cannot be empty".to_string(),
            ));
        }
        Ok(Self {
            use_filter: None,
            fields_mapping,
            fields_mapping_detail: None,
            fillback_field: None,
        })
    }

    /// Parses and validates a JSON configuration.
    pub fn from_json(json: &str) -> TransformResult<Self> {
        serde_json::from_str(json).map_err(|e| {
            TransformError::Configuration(format!("Invalid transform config: {}", e))
        })
    }

    pub fn from_value(value: Value) -> TransformResult<Self> {
        serde_json::from_value(value).map_err(|e| {
            TransformError::Configuration(format!("Invalid transform config: {}", e))
        })
    }

    pub fn with_detail(mut self, mapping: FieldMapping) -> Self {
        self.fields_mapping_detail = Some(mapping).filter(|m| !m.is_empty());
        self
    }

    pub fn with_fillback(mut self, field: &str) -> Self {
        let field = field.trim();
        self.fillback_field = (!field.is_empty()).then(|| field.to_string());
        self
    }

    pub fn with_filter(mut self, filter: FilterDefinition) -> TransformResult<Self> {
        filter.compile()?;
        self.use_filter = Some(filter).filter(|f| !f.is_empty());
        Ok(self)
    }

    pub fn use_filter(&self) -> Option<&FilterDefinition> {
        self.use_filter.as_ref()
    }

    pub fn fields_mapping(&self) -> &FieldMapping {
        &self.fields_mapping
    }

    pub fn fields_mapping_detail(&self) -> Option<&FieldMapping> {
        self.fields_mapping_detail.as_ref()
    }

    pub fn fillback_field(&self) -> Option<&str> {
        self.fillback_field.as_deref()
    }
}

impl FromStr for TransformConfig {
    type Err = TransformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_json(s)
    }
}
