use super::{FilterDefinition, FilterGate, FilterItem, FilterOp};
use crate::error::{TransformError, TransformResult};
use crate::record::RecordId;
use crate::schema::{EntitySchema, FieldType, SchemaCatalog};
use crate::store::{RecordStore, Row, RowQuery, RowReader};
use log::debug;
use rust_decimal::Decimal;
use serde_json::Value;
use std::cmp::Ordering;
use std::str::FromStr;
use std::sync::Arc;

/// Evaluates advanced filters against committed records.
#[derive(Clone)]
pub struct RecordFilterChecker {
    catalog: Arc<dyn SchemaCatalog>,
    store: RecordStore,
}

impl RecordFilterChecker {
    pub fn new(catalog: Arc<dyn SchemaCatalog>, store: RecordStore) -> Self {
        Self { catalog, store }
    }

    fn check_fields(schema: &EntitySchema, filter: &FilterDefinition) -> TransformResult<()> {
        for item in &filter.items {
            if !schema.has_field(&item.field) {
                return Err(TransformError::Configuration(format!(
                    "Filter refers to unknown field {}.{}",
                    schema.name, item.field
                )));
            }
        }
        Ok(())
    }
}

impl FilterGate for RecordFilterChecker {
    fn evaluate(&self, filter: Option<&FilterDefinition>, candidate: &RecordId) -> TransformResult<bool> {
        let filter = match filter {
            Some(filter) if !filter.is_empty() => filter,
            _ => return Ok(true),
        };

        let schema = self.catalog.entity_by_code(candidate.entity_code())?;
        if let Some(entity) = &filter.entity {
            if entity != &schema.name {
                debug!(
                    "Filter written for {} applied to a {} record",
                    entity, schema.name
                );
            }
        }
        Self::check_fields(&schema, filter)?;
        let equation = filter.compile()?;

        let fields: Vec<&str> = filter.items.iter().map(|i| i.field.as_str()).collect();
        let query = RowQuery::select(&schema.name, fields).where_id(*candidate);
        let row = match self.store.query_one(&query)? {
            Some(row) => row,
            None => {
                debug!("Filter candidate {} does not exist", candidate);
                return Ok(false);
            }
        };

        let results: Vec<bool> = filter
            .items
            .iter()
            .map(|item| matches_item(&schema, &row, item))
            .collect();
        let verdict = equation.evaluate(&results);
        debug!("Filter on {} evaluated to {} ({:?})", candidate, verdict, results);
        Ok(verdict)
    }
}

/// Textual forms a stored value can be compared by. Choice fields match by
/// key and by label.
fn comparable_texts(field_type: Option<&FieldType>, value: &Value) -> Vec<String> {
    let keys: Vec<String> = match value {
        Value::Array(items) => items.iter().map(value_text).collect(),
        other => vec![value_text(other)],
    };
    match field_type.and_then(FieldType::options) {
        Some(options) => keys
            .into_iter()
            .flat_map(|key| {
                let label = options
                    .iter()
                    .find(|o| o.key == key)
                    .map(|o| o.label.clone());
                std::iter::once(key).chain(label)
            })
            .collect(),
        None => keys,
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn compare(actual: &str, expected: &str) -> Ordering {
    match (Decimal::from_str(actual.trim()), Decimal::from_str(expected.trim())) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => actual.cmp(expected),
    }
}

fn matches_item(schema: &EntitySchema, row: &Row, item: &FilterItem) -> bool {
    let actual = row
        .get(&item.field)
        .filter(|v| !matches!(v, Value::String(s) if s.is_empty()))
        .filter(|v| !matches!(v, Value::Array(a) if a.is_empty()));

    match item.op {
        FilterOp::Nl => return actual.is_none(),
        FilterOp::Nt => return actual.is_some(),
        _ => {}
    }
    let actual = match actual {
        Some(value) => value,
        None => return false,
    };
    let field_type = schema.field(&item.field).map(|f| &f.field_type);
    let texts = comparable_texts(field_type, actual);
    let expected = item.value.as_ref().map(value_text).unwrap_or_default();
    let primary = texts.first().map(String::as_str).unwrap_or_default();

    match item.op {
        FilterOp::Eq => texts.iter().any(|t| compare(t, &expected) == Ordering::Equal),
        FilterOp::Neq => texts.iter().all(|t| compare(t, &expected) != Ordering::Equal),
        FilterOp::Gt => compare(primary, &expected) == Ordering::Greater,
        FilterOp::Lt => compare(primary, &expected) == Ordering::Less,
        FilterOp::Ge => compare(primary, &expected) != Ordering::Less,
        FilterOp::Le => compare(primary, &expected) != Ordering::Greater,
        FilterOp::Lk | FilterOp::Nlk => {
            let needle = expected.to_lowercase();
            let found = texts.iter().any(|t| t.to_lowercase().contains(&needle));
            found == (item.op == FilterOp::Lk)
        }
        FilterOp::In | FilterOp::Nin => {
            let found = expected.split('|').map(str::trim).any(|candidate| {
                texts.iter().any(|t| compare(t, candidate) == Ordering::Equal)
            });
            found == (item.op == FilterOp::In)
        }
        FilterOp::Bw => {
            let upper = item.value2.as_ref().map(value_text).unwrap_or_default();
            compare(primary, &expected) != Ordering::Less && compare(primary, &upper) != Ordering::Greater
        }
        FilterOp::Nl | FilterOp::Nt => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{PickOption, SchemaRegistry};
    use crate::store::RecordStore;
    use serde_json::{json, Map};

    struct Fixture {
        checker: RecordFilterChecker,
        order: RecordId,
    }

    fn fixture() -> Fixture {
        let registry = SchemaRegistry::new();
        registry
            .register(
                EntitySchema::new("Order", 901)
                    .with_field("total", FieldType::Number)
                    .with_field("customer", FieldType::Text)
                    .with_field("placedOn", FieldType::Date)
                    .with_field("note", FieldType::Text)
                    .with_field(
                        "status",
                        FieldType::Picklist {
                            options: vec![PickOption::new("open", "Open"), PickOption::new("done", "Done")],
                        },
                    ),
            )
            .unwrap();
        let db = sled::Config::new().temporary(true).open().unwrap();
        let store = RecordStore::open(&db).unwrap();

        let order = RecordId::new(901);
        let mut doc = Map::new();
        doc.insert("total".to_string(), json!(100));
        doc.insert("customer".to_string(), json!("Ann Smith"));
        doc.insert("placedOn".to_string(), json!("2024-03-01"));
        doc.insert("status".to_string(), json!("open"));
        let mut tx = store.begin();
        tx.put_document("Order", &order, &doc).unwrap();
        tx.commit().unwrap();

        Fixture {
            checker: RecordFilterChecker::new(Arc::new(registry), store),
            order,
        }
    }

    fn filter(equation: Option<&str>, items: Vec<FilterItem>) -> FilterDefinition {
        FilterDefinition {
            entity: Some("Order".to_string()),
            equation: equation.map(str::to_string),
            items,
        }
    }

    #[test]
    fn test_absent_or_empty_filter_permits() {
        let f = fixture();
        assert!(f.checker.evaluate(None, &f.order).unwrap());
        assert!(f
            .checker
            .evaluate(Some(&FilterDefinition::default()), &f.order)
            .unwrap());
    }

    #[test]
    fn test_numeric_comparison() {
        let f = fixture();
        let gt = filter(None, vec![FilterItem::new("total", FilterOp::Gt, Some(json!(50)))]);
        assert!(f.checker.evaluate(Some(&gt), &f.order).unwrap());
        let lt = filter(None, vec![FilterItem::new("total", FilterOp::Lt, Some(json!("50")))]);
        assert!(!f.checker.evaluate(Some(&lt), &f.order).unwrap());
    }

    #[test]
    fn test_picklist_matches_label() {
        let f = fixture();
        let eq = filter(None, vec![FilterItem::new("status", FilterOp::Eq, Some(json!("Open")))]);
        assert!(f.checker.evaluate(Some(&eq), &f.order).unwrap());
        let nin = filter(None, vec![FilterItem::new("status", FilterOp::Nin, Some(json!("done|Closed")))]);
        assert!(f.checker.evaluate(Some(&nin), &f.order).unwrap());
    }

    #[test]
    fn test_like_null_and_between() {
        let f = fixture();
        let mut between = FilterItem::new("placedOn", FilterOp::Bw, Some(json!("2024-01-01")));
        between.value2 = Some(json!("2024-12-31"));
        let definition = filter(
            None,
            vec![
                FilterItem::new("customer", FilterOp::Lk, Some(json!("smith"))),
                FilterItem::new("note", FilterOp::Nl, None),
                between,
            ],
        );
        assert!(f.checker.evaluate(Some(&definition), &f.order).unwrap());
    }

    #[test]
    fn test_equation_or() {
        let f = fixture();
        let definition = filter(
            Some("OR"),
            vec![
                FilterItem::new("total", FilterOp::Eq, Some(json!(1))),
                FilterItem::new("customer", FilterOp::Nt, None),
            ],
        );
        assert!(f.checker.evaluate(Some(&definition), &f.order).unwrap());

        let strict = filter(Some("1 AND 2"), definition.items.clone());
        assert!(!f.checker.evaluate(Some(&strict), &f.order).unwrap());
    }

    #[test]
    fn test_unknown_field_is_configuration_error() {
        let f = fixture();
        let definition = filter(None, vec![FilterItem::new("legacyCode", FilterOp::Nt, None)]);
        assert!(matches!(
            f.checker.evaluate(Some(&definition), &f.order),
            Err(TransformError::Configuration(_))
        ));
    }

    #[test]
    fn test_missing_candidate_is_denied() {
        let f = fixture();
        let definition = filter(None, vec![FilterItem::new("total", FilterOp::Nt, None)]);
        assert!(!f
            .checker
            .evaluate(Some(&definition), &RecordId::new(901))
            .unwrap());
    }
}
