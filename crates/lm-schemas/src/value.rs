//! Scalar values carried by flat records.
//!
//! The Denester emits loosely typed values (whatever JSON delivered); the
//! Resource Mapper coerces them to the [`FieldType`] declared by the kind's
//! shape. Serialization is lossless: decimals travel as strings and timestamps
//! as RFC 3339.

use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Upstream timestamp layouts, with and without sub-second precision.
pub const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.fZ", "%Y-%m-%dT%H:%M:%SZ"];

/// Postgres-style timestamps occasionally returned by the exchange ledger.
const OFFSET_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f%#z";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Null,
    Bool(bool),
    Integer(i64),
    Number(Decimal),
    Text(String),
    Timestamp(DateTime<Utc>),
    Document(Value),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Null,
    Bool,
    Integer,
    Number,
    Text,
    Timestamp,
    Document,
}

impl ValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Null => "null",
            ValueKind::Bool => "bool",
            ValueKind::Integer => "integer",
            ValueKind::Number => "number",
            ValueKind::Text => "text",
            ValueKind::Timestamp => "timestamp",
            ValueKind::Document => "document",
        }
    }
}

/// Declared column type of a shape field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Text,
    Numeric,
    Integer,
    Boolean,
    Timestamp,
    Document,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Numeric => "numeric",
            FieldType::Integer => "integer",
            FieldType::Boolean => "boolean",
            FieldType::Timestamp => "timestamp",
            FieldType::Document => "document",
        }
    }

    /// Postgres type used for casts when binding this field.
    pub fn sql_type(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Numeric => "numeric",
            FieldType::Integer => "bigint",
            FieldType::Boolean => "boolean",
            FieldType::Timestamp => "timestamptz",
            FieldType::Document => "jsonb",
        }
    }
}

impl FieldValue {
    /// Lift a JSON scalar into a field value. Objects and arrays become
    /// documents; callers that must reject them check before calling.
    pub fn from_json(v: &Value) -> FieldValue {
        match v {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    FieldValue::Integer(i)
                } else {
                    let s = n.to_string();
                    match parse_decimal(&s) {
                        Some(d) => FieldValue::Number(d),
                        None => FieldValue::Text(s),
                    }
                }
            }
            Value::String(s) => FieldValue::Text(s.clone()),
            Value::Array(_) | Value::Object(_) => FieldValue::Document(v.clone()),
        }
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            FieldValue::Null => ValueKind::Null,
            FieldValue::Bool(_) => ValueKind::Bool,
            FieldValue::Integer(_) => ValueKind::Integer,
            FieldValue::Number(_) => ValueKind::Number,
            FieldValue::Text(_) => ValueKind::Text,
            FieldValue::Timestamp(_) => ValueKind::Timestamp,
            FieldValue::Document(_) => ValueKind::Document,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// String rendering used for record keys and last-resort comparison.
    pub fn render(&self) -> String {
        match self {
            FieldValue::Null => String::new(),
            FieldValue::Bool(b) => b.to_string(),
            FieldValue::Integer(i) => i.to_string(),
            FieldValue::Number(d) => d.to_string(),
            FieldValue::Text(s) => s.clone(),
            FieldValue::Timestamp(ts) => ts.to_rfc3339_opts(chrono::SecondsFormat::AutoSi, true),
            FieldValue::Document(v) => v.to_string(),
        }
    }

    /// JSON form stored in the exception table's value columns.
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::Bool(b) => Value::Bool(*b),
            FieldValue::Integer(i) => Value::from(*i),
            FieldValue::Number(d) => Value::String(d.to_string()),
            FieldValue::Text(s) => Value::String(s.clone()),
            FieldValue::Timestamp(_) => Value::String(self.render()),
            FieldValue::Document(v) => v.clone(),
        }
    }

    /// Coerce to the declared column type. Null passes through every type.
    pub fn coerce(self, ty: FieldType) -> Result<FieldValue, String> {
        if self.is_null() {
            return Ok(self);
        }
        match (ty, self) {
            (FieldType::Text, FieldValue::Text(s)) => Ok(FieldValue::Text(s)),
            (FieldType::Text, FieldValue::Document(_)) => {
                Err("nested document for text field".to_string())
            }
            (FieldType::Text, other) => Ok(FieldValue::Text(other.render())),

            (FieldType::Numeric, FieldValue::Number(d)) => Ok(FieldValue::Number(d)),
            (FieldType::Numeric, FieldValue::Integer(i)) => Ok(FieldValue::Number(Decimal::from(i))),
            (FieldType::Numeric, FieldValue::Text(s)) => parse_decimal(&s)
                .map(FieldValue::Number)
                .ok_or_else(|| format!("not a decimal: {s:?}")),

            (FieldType::Integer, FieldValue::Integer(i)) => Ok(FieldValue::Integer(i)),
            (FieldType::Integer, FieldValue::Number(d)) if d.fract().is_zero() => d
                .to_i64()
                .map(FieldValue::Integer)
                .ok_or_else(|| format!("integer out of range: {d}")),
            (FieldType::Integer, FieldValue::Text(s)) => s
                .trim()
                .parse::<i64>()
                .map(FieldValue::Integer)
                .map_err(|_| format!("not an integer: {s:?}")),

            (FieldType::Boolean, FieldValue::Bool(b)) => Ok(FieldValue::Bool(b)),
            (FieldType::Boolean, FieldValue::Text(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(FieldValue::Bool(true)),
                "false" => Ok(FieldValue::Bool(false)),
                _ => Err(format!("not a boolean: {s:?}")),
            },

            (FieldType::Timestamp, FieldValue::Timestamp(ts)) => Ok(FieldValue::Timestamp(ts)),
            (FieldType::Timestamp, FieldValue::Text(s)) => parse_timestamp(&s)
                .map(FieldValue::Timestamp)
                .ok_or_else(|| format!("not a timestamp: {s:?}")),

            (FieldType::Document, FieldValue::Document(v)) => Ok(FieldValue::Document(v)),
            (FieldType::Document, other) => Ok(FieldValue::Document(other.to_json())),

            (ty, other) => Err(format!(
                "cannot coerce {} to {}",
                other.kind().as_str(),
                ty.as_str()
            )),
        }
    }
}

/// Parse an upstream timestamp string into a UTC instant.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let t = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(t) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in TIMESTAMP_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(t, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    DateTime::parse_from_str(t, OFFSET_TIMESTAMP_FORMAT)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse a decimal amount, accepting scientific notation as a fallback.
pub fn parse_decimal(s: &str) -> Option<Decimal> {
    let t = s.trim();
    Decimal::from_str(t)
        .or_else(|_| Decimal::from_scientific(t))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn both_upstream_timestamp_layouts_parse_to_same_instant() {
        let a = parse_timestamp("2020-01-01T00:00:00Z").unwrap();
        let b = parse_timestamp("2020-01-01T00:00:00.000Z").unwrap();
        assert_eq!(a, b);
        let c = parse_timestamp("2020-01-01 00:00:00.000000+00").unwrap();
        assert_eq!(a, c);
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn from_json_splits_integers_and_decimals() {
        assert_eq!(FieldValue::from_json(&json!(7)), FieldValue::Integer(7));
        assert_eq!(
            FieldValue::from_json(&json!(1.5)),
            FieldValue::Number(Decimal::new(15, 1))
        );
        assert_eq!(FieldValue::from_json(&json!(null)), FieldValue::Null);
    }

    #[test]
    fn coerce_text_to_numeric_and_timestamp() {
        let n = FieldValue::Text("1.00".into()).coerce(FieldType::Numeric).unwrap();
        assert_eq!(n, FieldValue::Number(Decimal::new(100, 2)));

        let ts = FieldValue::Text("2020-01-01T00:00:00Z".into())
            .coerce(FieldType::Timestamp)
            .unwrap();
        assert_eq!(ts.kind(), ValueKind::Timestamp);

        assert!(FieldValue::Text("abc".into())
            .coerce(FieldType::Numeric)
            .is_err());
        assert!(FieldValue::Document(json!({"a": 1}))
            .coerce(FieldType::Text)
            .is_err());
    }

    #[test]
    fn null_survives_every_coercion() {
        for ty in [
            FieldType::Text,
            FieldType::Numeric,
            FieldType::Integer,
            FieldType::Boolean,
            FieldType::Timestamp,
            FieldType::Document,
        ] {
            assert_eq!(FieldValue::Null.coerce(ty).unwrap(), FieldValue::Null);
        }
    }

    #[test]
    fn serialized_decimal_keeps_scale() {
        let v = FieldValue::Number(Decimal::new(100, 2));
        let s = serde_json::to_string(&v).unwrap();
        assert_eq!(s, r#"{"kind":"number","value":"1.00"}"#);
        let back: FieldValue = serde_json::from_str(&s).unwrap();
        assert_eq!(back, v);
    }
}
