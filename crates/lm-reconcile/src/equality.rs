//! Type-aware equality between a stored value and a freshly fetched one.
//!
//! Order of rules:
//! 1. identical values are equal
//! 2. two documents are equal when their structural diff is empty
//! 3. null against non-null is a difference
//! 4. a timestamp on either side: compare instants after parsing the other
//! 5. a numeric on either side: compare decimal values, not renderings
//! 6. otherwise compare string renderings

use std::collections::BTreeSet;

use lm_schemas::{parse_decimal, parse_timestamp, FieldValue};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;

pub fn values_equal(stored: &FieldValue, incoming: &FieldValue) -> bool {
    if stored == incoming {
        return true;
    }

    match (stored, incoming) {
        (FieldValue::Document(a), FieldValue::Document(b)) => document_diff(a, b).is_empty(),
        (FieldValue::Null, _) | (_, FieldValue::Null) => false,
        (FieldValue::Timestamp(a), other) | (other, FieldValue::Timestamp(a)) => {
            match as_instant(other) {
                Some(b) => *a == b,
                None => false,
            }
        }
        (a, b) if is_numeric(a) || is_numeric(b) => match (as_decimal(a), as_decimal(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
        (a, b) => a.render() == b.render(),
    }
}

fn is_numeric(v: &FieldValue) -> bool {
    matches!(v, FieldValue::Number(_) | FieldValue::Integer(_))
}

fn as_decimal(v: &FieldValue) -> Option<Decimal> {
    match v {
        FieldValue::Number(d) => Some(*d),
        FieldValue::Integer(i) => Some(Decimal::from(*i)),
        FieldValue::Text(s) => parse_decimal(s),
        _ => None,
    }
}

fn as_instant(v: &FieldValue) -> Option<chrono::DateTime<chrono::Utc>> {
    match v {
        FieldValue::Timestamp(ts) => Some(*ts),
        FieldValue::Text(s) => parse_timestamp(s),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Structural document diff
// ---------------------------------------------------------------------------

/// Key-level difference between two documents (incoming relative to stored).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DocumentDiff {
    pub added: BTreeSet<String>,
    pub removed: BTreeSet<String>,
    pub changed: BTreeSet<String>,
}

impl DocumentDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// Top-level key diff. Non-object documents that differ report `$` as changed.
pub fn document_diff(stored: &Value, incoming: &Value) -> DocumentDiff {
    let mut diff = DocumentDiff::default();
    match (stored, incoming) {
        (Value::Object(old), Value::Object(new)) => {
            for (k, v) in new {
                match old.get(k) {
                    None => {
                        diff.added.insert(k.clone());
                    }
                    Some(prev) if !json_equivalent(prev, v) => {
                        diff.changed.insert(k.clone());
                    }
                    Some(_) => {}
                }
            }
            for k in old.keys() {
                if !new.contains_key(k) {
                    diff.removed.insert(k.clone());
                }
            }
        }
        (a, b) => {
            if !json_equivalent(a, b) {
                diff.changed.insert("$".to_string());
            }
        }
    }
    diff
}

/// Deep equality that ignores key order and numeric scale.
fn json_equivalent(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(k, v)| y.get(k).is_some_and(|w| json_equivalent(v, w)))
        }
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(v, w)| json_equivalent(v, w))
        }
        (Value::Number(x), Value::Number(y)) => {
            match (parse_decimal(&x.to_string()), parse_decimal(&y.to_string())) {
                (Some(p), Some(q)) => p == q,
                _ => x == y,
            }
        }
        (x, y) => x == y,
    }
}
