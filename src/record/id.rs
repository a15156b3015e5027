use crate::error::TransformError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifier of a persisted record.
///
/// The numeric entity code is embedded in the id so the owning entity can be
/// resolved from the id alone. The textual form is `"{code:03}-{uuid}"` with
/// the uuid in simple (hyphen-less) notation, e.g. `901-0f3c5e...`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId {
    entity_code: u16,
    key: Uuid,
}

impl RecordId {
    /// Generates a fresh id for a record of the given entity.
    #[must_use]
    pub fn new(entity_code: u16) -> Self {
        Self {
            entity_code,
            key: Uuid::new_v4(),
        }
    }

    pub fn from_parts(entity_code: u16, key: Uuid) -> Self {
        Self { entity_code, key }
    }

    pub fn entity_code(&self) -> u16 {
        self.entity_code
    }

    pub fn key(&self) -> &Uuid {
        &self.key
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}-{}", self.entity_code, self.key.simple())
    }
}

impl FromStr for RecordId {
    type Err = TransformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (code, key) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| TransformError::InvalidRecordId(s.to_string()))?;
        let entity_code = code
            .parse::<u16>()
            .map_err(|_| TransformError::InvalidRecordId(s.to_string()))?;
        let key = Uuid::parse_str(key).map_err(|_| TransformError::InvalidRecordId(s.to_string()))?;
        Ok(Self { entity_code, key })
    }
}

impl Serialize for RecordId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
