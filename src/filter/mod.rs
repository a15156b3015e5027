//! Record filters that gate whether a transform may run.

pub mod checker;
pub mod equation;

pub use checker::RecordFilterChecker;
pub use equation::Equation;

use crate::error::{TransformError, TransformResult};
use crate::record::RecordId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Comparison applied by one filter item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FilterOp {
    Eq,
    Neq,
    Gt,
    Lt,
    Ge,
    Le,
    /// Contains
    Lk,
    /// Does not contain
    Nlk,
    /// One of `|`-separated values
    In,
    Nin,
    /// Is null
    Nl,
    /// Is not null
    Nt,
    /// Between `value` and `value2`, inclusive
    Bw,
}

impl FilterOp {
    fn needs_value(self) -> bool {
        !matches!(self, FilterOp::Nl | FilterOp::Nt)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterItem {
    pub field: String,
    pub op: FilterOp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value2: Option<Value>,
}

impl FilterItem {
    pub fn new(field: &str, op: FilterOp, value: Option<Value>) -> Self {
        Self {
            field: field.to_string(),
            op,
            value,
            value2: None,
        }
    }

    fn validate(&self, position: usize) -> TransformResult<()> {
        let missing = |what: &str| {
            TransformError::Configuration(format!(
                "Filter item {} ({} {:?}) has no {}",
                position, self.field, self.op, what
            ))
        };
        if self.op.needs_value() && self.value.as_ref().map_or(true, Value::is_null) {
            return Err(missing("value"));
        }
        if self.op == FilterOp::Bw && self.value2.as_ref().map_or(true, Value::is_null) {
            return Err(missing("upper bound"));
        }
        Ok(())
    }
}

/// Advanced filter attached to a transform configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterDefinition {
    /// Entity the filter was written for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equation: Option<String>,
    #[serde(default)]
    pub items: Vec<FilterItem>,
}

impl FilterDefinition {
    /// A filter without items permits everything.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Validates the items and compiles the equation.
    pub fn compile(&self) -> TransformResult<Equation> {
        for (i, item) in self.items.iter().enumerate() {
            item.validate(i + 1)?;
        }
        let count = self.items.len();
        match self.equation.as_deref().map(str::trim) {
            None | Some("") => Ok(Equation::all(count)),
            Some(eq) if eq.eq_ignore_ascii_case("AND") => Ok(Equation::all(count)),
            Some(eq) if eq.eq_ignore_ascii_case("OR") => Ok(Equation::any(count)),
            Some(eq) => Equation::parse(eq, count),
        }
    }
}

/// Decides whether a candidate record passes a filter.
pub trait FilterGate: Send + Sync {
    /// Absent or empty filters permit every candidate.
    fn evaluate(&self, filter: Option<&FilterDefinition>, candidate: &RecordId) -> TransformResult<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_definition_json_shape() {
        let filter: FilterDefinition = serde_json::from_value(json!({
            "entity": "Order",
            "equation": "1 OR 2",
            "items": [
                {"field": "total", "op": "GT", "value": 50},
                {"field": "status", "op": "IN", "value": "open|done"},
                {"field": "note", "op": "NL"}
            ]
        }))
        .unwrap();
        assert_eq!(filter.items.len(), 3);
        assert_eq!(filter.items[2].op, FilterOp::Nl);
        assert!(filter.compile().is_ok());
    }

    #[test]
    fn test_default_equation_is_and() {
        let filter = FilterDefinition {
            items: vec![
                FilterItem::new("a", FilterOp::Nt, None),
                FilterItem::new("b", FilterOp::Nt, None),
            ],
            ..Default::default()
        };
        assert_eq!(filter.compile().unwrap(), Equation::all(2));
    }

    #[test]
    fn test_between_requires_upper_bound() {
        let filter = FilterDefinition {
            items: vec![FilterItem::new("total", FilterOp::Bw, Some(json!(1)))],
            ..Default::default()
        };
        assert!(matches!(
            filter.compile(),
            Err(TransformError::Configuration(_))
        ));
    }

    #[test]
    fn test_unknown_operator_rejected() {
        let parsed = serde_json::from_value::<FilterItem>(json!({"field": "a", "op": "SOUNDS_LIKE"}));
        assert!(parsed.is_err());
    }
}
