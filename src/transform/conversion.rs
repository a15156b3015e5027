//! Coercion of a stored value from one field type into another.
//!
//! Conversion happens in two steps. The raw JSON value is first read into a
//! [`Canonical`] value according to the *source* field type, so a value that
//! does not match its own field is rejected early. The canonical value is
//! then written for the *target* field type.

use crate::constants::{DATETIME_FORMAT, DATE_FORMAT};
use crate::error::{TransformError, TransformResult};
use crate::record::RecordId;
use crate::schema::{FieldDescriptor, FieldType, PickOption, SchemaCatalog};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
});
static PHONE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?[0-9][0-9()\-. ]{3,30}$").expect("phone pattern is valid"));
static URL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^https?://[^\s/$.?#][^\s]*$").expect("url pattern is valid"));

/// Type-independent form of a stored value.
#[derive(Debug, Clone, PartialEq)]
enum Canonical {
    Text(String),
    Integer(i64),
    Decimal(Decimal),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Bool(bool),
    Choice(PickOption),
    Choices(Vec<PickOption>),
    Reference { entity: String, id: RecordId },
}

impl Canonical {
    fn kind(&self) -> &'static str {
        match self {
            Canonical::Text(_) => "text",
            Canonical::Integer(_) => "number",
            Canonical::Decimal(_) => "decimal",
            Canonical::Date(_) => "date",
            Canonical::DateTime(_) => "datetime",
            Canonical::Bool(_) => "bool",
            Canonical::Choice(_) => "picklist",
            Canonical::Choices(_) => "multiselect",
            Canonical::Reference { .. } => "reference",
        }
    }
}

/// Converts values of one source field into values acceptable by one target
/// field.
pub struct FieldValueConversion<'a> {
    source: FieldDescriptor<'a>,
    target: FieldDescriptor<'a>,
    catalog: &'a dyn SchemaCatalog,
}

impl<'a> FieldValueConversion<'a> {
    pub fn new(
        source: FieldDescriptor<'a>,
        target: FieldDescriptor<'a>,
        catalog: &'a dyn SchemaCatalog,
    ) -> Self {
        Self {
            source,
            target,
            catalog,
        }
    }

    /// Converts `value`. JSON null stays null.
    pub fn convert(&self, value: &Value) -> TransformResult<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        let canonical = self.read(value)?;
        self.write(canonical)
    }

    fn fail(&self, reason: impl Into<String>) -> TransformError {
        TransformError::incompatible(self.source.to_string(), self.target.to_string(), reason)
    }

    fn unsupported(&self, canonical: &Canonical) -> TransformError {
        self.fail(format!(
            "cannot convert {} value to {}",
            canonical.kind(),
            self.target.field_type
        ))
    }

    fn read(&self, value: &Value) -> TransformResult<Canonical> {
        let mismatch = || {
            self.fail(format!(
                "stored value {} does not match source type {}",
                value, self.source.field_type
            ))
        };
        let text = || value.as_str().ok_or_else(mismatch);

        match self.source.field_type {
            t if t.is_text() => Ok(Canonical::Text(text()?.to_string())),
            FieldType::Number => value.as_i64().map(Canonical::Integer).ok_or_else(mismatch),
            FieldType::Decimal { .. } => match value {
                Value::Number(n) => parse_decimal(&n.to_string()).map(Canonical::Decimal),
                Value::String(s) => parse_decimal(s).map(Canonical::Decimal),
                _ => None,
            }
            .ok_or_else(mismatch),
            FieldType::Date => NaiveDate::parse_from_str(text()?, DATE_FORMAT)
                .map(Canonical::Date)
                .map_err(|_| mismatch()),
            FieldType::Datetime => parse_datetime(text()?)
                .map(Canonical::DateTime)
                .ok_or_else(mismatch),
            FieldType::Bool => value.as_bool().map(Canonical::Bool).ok_or_else(mismatch),
            FieldType::Picklist { options } => {
                let key = text()?;
                option_by_key(options, key)
                    .map(Canonical::Choice)
                    .ok_or_else(mismatch)
            }
            FieldType::Multiselect { options } => {
                let keys = value.as_array().ok_or_else(mismatch)?;
                let mut chosen = Vec::with_capacity(keys.len());
                for key in keys {
                    let option = key
                        .as_str()
                        .and_then(|k| option_by_key(options, k))
                        .ok_or_else(mismatch)?;
                    chosen.push(option);
                }
                Ok(Canonical::Choices(chosen))
            }
            FieldType::Reference { entity } => {
                let id: RecordId = text()?.parse().map_err(|_| mismatch())?;
                Ok(Canonical::Reference {
                    entity: entity.clone(),
                    id,
                })
            }
            _ => Err(mismatch()),
        }
    }

    fn write(&self, canonical: Canonical) -> TransformResult<Value> {
        match self.target.field_type {
            FieldType::Text | FieldType::Ntext => Ok(Value::String(render_text(canonical))),
            FieldType::Email => self.pattern_text(canonical, &EMAIL_PATTERN, "email address"),
            FieldType::Phone => self.pattern_text(canonical, &PHONE_PATTERN, "phone number"),
            FieldType::Url => self.pattern_text(canonical, &URL_PATTERN, "URL"),
            FieldType::Number => self.write_integer(canonical),
            FieldType::Decimal { scale } => self.write_decimal(canonical, *scale),
            FieldType::Date => {
                let date = match canonical {
                    Canonical::Text(s) => parse_date_lenient(&s).ok_or_else(|| {
                        self.fail(format!("'{}' is not a date", s))
                    })?,
                    Canonical::Date(d) => d,
                    Canonical::DateTime(dt) => dt.date(),
                    other => return Err(self.unsupported(&other)),
                };
                Ok(Value::String(date.format(DATE_FORMAT).to_string()))
            }
            FieldType::Datetime => {
                let datetime = match canonical {
                    Canonical::Text(s) => parse_datetime(&s)
                        .or_else(|| parse_date_lenient(&s).map(|d| d.and_time(NaiveTime::MIN)))
                        .ok_or_else(|| self.fail(format!("'{}' is not a date/time", s)))?,
                    Canonical::Date(d) => d.and_time(NaiveTime::MIN),
                    Canonical::DateTime(dt) => dt,
                    other => return Err(self.unsupported(&other)),
                };
                Ok(Value::String(datetime.format(DATETIME_FORMAT).to_string()))
            }
            FieldType::Bool => match canonical {
                Canonical::Bool(b) => Ok(Value::Bool(b)),
                Canonical::Integer(0) => Ok(Value::Bool(false)),
                Canonical::Integer(1) => Ok(Value::Bool(true)),
                Canonical::Text(s) => parse_bool(&s)
                    .map(Value::Bool)
                    .ok_or_else(|| self.fail(format!("'{}' is not a boolean", s))),
                other => Err(self.unsupported(&other)),
            },
            FieldType::Picklist { options } => {
                let option = match canonical {
                    Canonical::Text(s) => match_option(options, &s, &s),
                    Canonical::Choice(c) => match_option(options, &c.key, &c.label),
                    Canonical::Choices(mut cs) if cs.len() == 1 => {
                        let c = cs.remove(0);
                        match_option(options, &c.key, &c.label)
                    }
                    Canonical::Choices(cs) => {
                        return Err(self.fail(format!(
                            "{} selected options cannot fit a single choice",
                            cs.len()
                        )))
                    }
                    other => return Err(self.unsupported(&other)),
                };
                option
                    .map(|o| Value::String(o.key))
                    .ok_or_else(|| self.fail("no matching option on target field"))
            }
            FieldType::Multiselect { options } => {
                let wanted: Vec<(String, String)> = match canonical {
                    Canonical::Text(s) => s
                        .split(',')
                        .map(str::trim)
                        .filter(|part| !part.is_empty())
                        .map(|part| (part.to_string(), part.to_string()))
                        .collect(),
                    Canonical::Choice(c) => vec![(c.key, c.label)],
                    Canonical::Choices(cs) => cs.into_iter().map(|c| (c.key, c.label)).collect(),
                    other => return Err(self.unsupported(&other)),
                };
                let mut keys = Vec::with_capacity(wanted.len());
                for (key, label) in wanted {
                    let option = match_option(options, &key, &label).ok_or_else(|| {
                        self.fail(format!("no option matching '{}' on target field", label))
                    })?;
                    keys.push(Value::String(option.key));
                }
                Ok(Value::Array(keys))
            }
            FieldType::Reference { entity } => match canonical {
                Canonical::Text(s) => {
                    let id: RecordId = s
                        .parse()
                        .map_err(|_| self.fail(format!("'{}' is not a record id", s)))?;
                    let expected = self.catalog.entity(entity)?;
                    if id.entity_code() != expected.code {
                        return Err(self.fail(format!("record {} is not a {}", id, entity)));
                    }
                    Ok(Value::String(id.to_string()))
                }
                Canonical::Reference { entity: source_entity, id } if &source_entity == entity => {
                    Ok(Value::String(id.to_string()))
                }
                Canonical::Reference { entity: source_entity, .. } => Err(self.fail(format!(
                    "reference to {} cannot point at {}",
                    source_entity, entity
                ))),
                other => Err(self.unsupported(&other)),
            },
        }
    }

    fn pattern_text(&self, canonical: Canonical, pattern: &Regex, what: &str) -> TransformResult<Value> {
        match canonical {
            Canonical::Text(s) if pattern.is_match(s.trim()) => Ok(Value::String(s.trim().to_string())),
            Canonical::Text(s) => Err(self.fail(format!("'{}' is not a valid {}", s, what))),
            other => Err(self.unsupported(&other)),
        }
    }

    fn write_integer(&self, canonical: Canonical) -> TransformResult<Value> {
        let decimal = match canonical {
            Canonical::Integer(n) => return Ok(Value::from(n)),
            Canonical::Decimal(d) => d,
            Canonical::Text(s) => parse_decimal(&s)
                .ok_or_else(|| self.fail(format!("'{}' is not a number", s)))?,
            other => return Err(self.unsupported(&other)),
        };
        if !decimal.fract().is_zero() {
            return Err(self.fail(format!("{} has fractional digits", decimal)));
        }
        decimal
            .to_i64()
            .map(Value::from)
            .ok_or_else(|| self.fail(format!("{} is out of range", decimal)))
    }

    fn write_decimal(&self, canonical: Canonical, scale: u32) -> TransformResult<Value> {
        let decimal = match canonical {
            Canonical::Integer(n) => Decimal::from(n),
            Canonical::Decimal(d) => d,
            Canonical::Text(s) => parse_decimal(&s)
                .ok_or_else(|| self.fail(format!("'{}' is not a number", s)))?,
            other => return Err(self.unsupported(&other)),
        };
        let normalized = decimal.normalize();
        if normalized.scale() > scale {
            return Err(self.fail(format!(
                "{} has more than {} decimal places",
                normalized, scale
            )));
        }
        Ok(decimal_to_json(normalized))
    }
}

fn render_text(canonical: Canonical) -> String {
    match canonical {
        Canonical::Text(s) => s,
        Canonical::Integer(n) => n.to_string(),
        Canonical::Decimal(d) => d.normalize().to_string(),
        Canonical::Date(d) => d.format(DATE_FORMAT).to_string(),
        Canonical::DateTime(dt) => dt.format(DATETIME_FORMAT).to_string(),
        Canonical::Bool(b) => b.to_string(),
        Canonical::Choice(c) => c.label,
        Canonical::Choices(cs) => cs
            .into_iter()
            .map(|c| c.label)
            .collect::<Vec<_>>()
            .join(", "),
        Canonical::Reference { id, .. } => id.to_string(),
    }
}

fn option_by_key(options: &[PickOption], key: &str) -> Option<PickOption> {
    options.iter().find(|o| o.key == key).cloned()
}

/// Matches by key first, then by label.
fn match_option(options: &[PickOption], key: &str, label: &str) -> Option<PickOption> {
    option_by_key(options, key).or_else(|| options.iter().find(|o| o.label == label).cloned())
}

fn parse_decimal(s: &str) -> Option<Decimal> {
    let s = s.trim();
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .ok()
}

/// JSON number when the value survives the trip through `f64` unchanged,
/// otherwise the exact decimal text.
fn decimal_to_json(d: Decimal) -> Value {
    if d.fract().is_zero() {
        if let Some(n) = d.to_i64() {
            return Value::from(n);
        }
    }
    let exact_number = d
        .to_f64()
        .and_then(serde_json::Number::from_f64)
        .filter(|n| parse_decimal(&n.to_string()) == Some(d));
    match exact_number {
        Some(n) => Value::Number(n),
        None => Value::String(d.to_string()),
    }
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").ok())
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.naive_utc()))
}

fn parse_date_lenient(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
        .ok()
        .or_else(|| parse_datetime(s).map(|dt| dt.date()))
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Some(true),
        "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EntitySchema, SchemaRegistry};
    use serde_json::json;

    fn registry() -> SchemaRegistry {
        let registry = SchemaRegistry::new();
        registry.register(EntitySchema::new("Customer", 910)).unwrap();
        registry.register(EntitySchema::new("Supplier", 911)).unwrap();
        registry
    }

    fn convert(source: FieldType, target: FieldType, value: Value) -> TransformResult<Value> {
        let registry = registry();
        let src = FieldDescriptor {
            entity: "Order",
            name: "src",
            field_type: &source,
        };
        let tgt = FieldDescriptor {
            entity: "Invoice",
            name: "tgt",
            field_type: &target,
        };
        FieldValueConversion::new(src, tgt, &registry).convert(&value)
    }

    fn status_options() -> Vec<PickOption> {
        vec![PickOption::new("open", "Open"), PickOption::new("done", "Done")]
    }

    #[test]
    fn test_same_type_copies() {
        assert_eq!(convert(FieldType::Text, FieldType::Text, json!("Ann")).unwrap(), json!("Ann"));
        assert_eq!(convert(FieldType::Number, FieldType::Number, json!(100)).unwrap(), json!(100));
    }

    #[test]
    fn test_number_to_text_and_back() {
        assert_eq!(convert(FieldType::Number, FieldType::Text, json!(42)).unwrap(), json!("42"));
        assert_eq!(convert(FieldType::Text, FieldType::Number, json!(" 42 ")).unwrap(), json!(42));
        assert!(convert(FieldType::Text, FieldType::Number, json!("4.5")).is_err());
    }

    #[test]
    fn test_decimal_scale_is_never_truncated() {
        let to_two = FieldType::Decimal { scale: 2 };
        assert_eq!(
            convert(FieldType::Decimal { scale: 4 }, to_two.clone(), json!(1.5)).unwrap(),
            json!(1.5)
        );
        let err = convert(FieldType::Decimal { scale: 4 }, to_two, json!("1.2345")).unwrap_err();
        assert!(matches!(err, TransformError::IncompatibleType { .. }));
    }

    #[test]
    fn test_high_precision_decimal_keeps_every_digit() {
        let precise = FieldType::Decimal { scale: 10 };
        assert_eq!(
            convert(FieldType::Text, precise.clone(), json!("1234567890.1234567891")).unwrap(),
            json!("1234567890.1234567891")
        );
        assert_eq!(
            convert(precise.clone(), precise.clone(), json!("1234567890.1234567891")).unwrap(),
            json!("1234567890.1234567891")
        );
        assert_eq!(
            convert(precise, FieldType::Text, json!("1234567890.1234567891")).unwrap(),
            json!("1234567890.1234567891")
        );
        assert!(convert(
            FieldType::Text,
            FieldType::Decimal { scale: 2 },
            json!("1234567890.1234567891")
        )
        .is_err());
    }

    #[test]
    fn test_short_decimals_stay_numbers() {
        let to_two = FieldType::Decimal { scale: 2 };
        assert_eq!(convert(FieldType::Text, to_two.clone(), json!("12.50")).unwrap(), json!(12.5));
        assert_eq!(convert(FieldType::Text, to_two, json!("100")).unwrap(), json!(100));
    }

    #[test]
    fn test_decimal_to_number_requires_integral_value() {
        let decimal = FieldType::Decimal { scale: 2 };
        assert_eq!(convert(decimal.clone(), FieldType::Number, json!(7.0)).unwrap(), json!(7));
        assert!(convert(decimal, FieldType::Number, json!(7.25)).is_err());
    }

    #[test]
    fn test_number_widens_to_decimal() {
        assert_eq!(
            convert(FieldType::Number, FieldType::Decimal { scale: 2 }, json!(100)).unwrap(),
            json!(100)
        );
    }

    #[test]
    fn test_datetime_narrows_to_date() {
        assert_eq!(
            convert(FieldType::Datetime, FieldType::Date, json!("2024-03-01 10:30:00")).unwrap(),
            json!("2024-03-01")
        );
        assert_eq!(
            convert(FieldType::Date, FieldType::Datetime, json!("2024-03-01")).unwrap(),
            json!("2024-03-01 00:00:00")
        );
    }

    #[test]
    fn test_date_cannot_become_number() {
        let err = convert(FieldType::Date, FieldType::Number, json!("2024-03-01")).unwrap_err();
        match err {
            TransformError::IncompatibleType {
                source_field,
                target_field,
                ..
            } => {
                assert_eq!(source_field, "Order.src");
                assert_eq!(target_field, "Invoice.tgt");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_bool_from_text_and_number() {
        assert_eq!(convert(FieldType::Text, FieldType::Bool, json!("Yes")).unwrap(), json!(true));
        assert_eq!(convert(FieldType::Number, FieldType::Bool, json!(0)).unwrap(), json!(false));
        assert!(convert(FieldType::Number, FieldType::Bool, json!(2)).is_err());
    }

    #[test]
    fn test_picklist_matches_by_label_across_fields() {
        let source = FieldType::Picklist {
            options: vec![PickOption::new("s1", "Open")],
        };
        let target = FieldType::Picklist {
            options: status_options(),
        };
        assert_eq!(convert(source, target, json!("s1")).unwrap(), json!("open"));
    }

    #[test]
    fn test_picklist_to_text_uses_label() {
        let source = FieldType::Picklist {
            options: status_options(),
        };
        assert_eq!(convert(source, FieldType::Text, json!("done")).unwrap(), json!("Done"));
    }

    #[test]
    fn test_multiselect_conversions() {
        let multi = FieldType::Multiselect {
            options: status_options(),
        };
        assert_eq!(
            convert(multi.clone(), FieldType::Text, json!(["open", "done"])).unwrap(),
            json!("Open, Done")
        );
        assert_eq!(
            convert(FieldType::Text, multi.clone(), json!("Open, done")).unwrap(),
            json!(["open", "done"])
        );
        let single = FieldType::Picklist {
            options: status_options(),
        };
        assert!(convert(multi, single, json!(["open", "done"])).is_err());
    }

    #[test]
    fn test_email_is_validated() {
        assert_eq!(
            convert(FieldType::Text, FieldType::Email, json!("ann@example.com")).unwrap(),
            json!("ann@example.com")
        );
        assert!(convert(FieldType::Text, FieldType::Email, json!("not-an-email")).is_err());
    }

    #[test]
    fn test_reference_requires_same_entity() {
        let customer_id = RecordId::new(910).to_string();
        let to_customer = FieldType::Reference {
            entity: "Customer".to_string(),
        };
        let to_supplier = FieldType::Reference {
            entity: "Supplier".to_string(),
        };
        assert_eq!(
            convert(to_customer.clone(), to_customer.clone(), json!(customer_id)).unwrap(),
            json!(customer_id)
        );
        assert!(convert(to_customer.clone(), to_supplier.clone(), json!(customer_id)).is_err());
        assert!(convert(FieldType::Text, to_supplier, json!(customer_id)).is_err());
        assert_eq!(
            convert(to_customer, FieldType::Text, json!(customer_id)).unwrap(),
            json!(customer_id)
        );
    }

    #[test]
    fn test_value_not_matching_source_type_is_rejected() {
        assert!(convert(FieldType::Number, FieldType::Text, json!("abc")).is_err());
    }

    #[test]
    fn test_null_passes_through() {
        assert_eq!(convert(FieldType::Date, FieldType::Number, Value::Null).unwrap(), Value::Null);
    }
}
