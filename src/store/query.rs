use crate::record::RecordId;
use serde_json::{Map, Value};

/// Typed row predicate. Values are compared structurally, never spliced into
/// a query string.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Record whose id equals the given id
    PrimaryKey(RecordId),
    /// Records whose stored field equals the given value
    FieldEq { field: String, value: Value },
}

impl Predicate {
    pub(crate) fn matches(&self, id: &RecordId, document: &Map<String, Value>) -> bool {
        match self {
            Predicate::PrimaryKey(expected) => expected == id,
            Predicate::FieldEq { field, value } => document.get(field) == Some(value),
        }
    }
}

/// Read-only projection over one entity's records.
#[derive(Debug, Clone, PartialEq)]
pub struct RowQuery {
    entity: String,
    fields: Vec<String>,
    predicate: Option<Predicate>,
}

impl RowQuery {
    /// Selects `fields` of `entity`.
    pub fn select<I, S>(entity: &str, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entity: entity.to_string(),
            fields: fields.into_iter().map(Into::into).collect(),
            predicate: None,
        }
    }

    pub fn where_id(mut self, id: RecordId) -> Self {
        self.predicate = Some(Predicate::PrimaryKey(id));
        self
    }

    pub fn where_eq(mut self, field: &str, value: Value) -> Self {
        self.predicate = Some(Predicate::FieldEq {
            field: field.to_string(),
            value,
        });
        self
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn predicate(&self) -> Option<&Predicate> {
        self.predicate.as_ref()
    }

    /// Applies the predicate and projection to one stored document.
    pub(crate) fn apply(&self, id: RecordId, document: &Map<String, Value>) -> Option<Row> {
        if let Some(predicate) = &self.predicate {
            if !predicate.matches(&id, document) {
                return None;
            }
        }
        let mut values = Map::new();
        for field in &self.fields {
            if let Some(value) = document.get(field) {
                values.insert(field.clone(), value.clone());
            }
        }
        Some(Row { id, values })
    }
}

/// One row returned by a [`RowQuery`]. Projected fields missing from the
/// stored document are simply absent.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    id: RecordId,
    values: Map<String, Value>,
}

impl Row {
    pub fn id(&self) -> RecordId {
        self.id
    }

    /// Value of `field`, with JSON null reported as absent.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field).filter(|value| !value.is_null())
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }
}
