//! Flat records, natural keys, and the Resource Mapper.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::kind::ResourceKind;
use crate::shape::DOCUMENT_FIELD;
use crate::value::{FieldType, FieldValue, ValueKind};

/// Separator used when rendering a composite natural key.
pub const KEY_SEPARATOR: &str = "|";

/// One denested row: field values plus the raw upstream object it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatRecord {
    pub kind: ResourceKind,
    pub fields: BTreeMap<String, FieldValue>,
    pub raw: Value,
}

impl FlatRecord {
    pub fn new(kind: ResourceKind, raw: Value) -> Self {
        Self {
            kind,
            fields: BTreeMap::new(),
            raw,
        }
    }

    pub fn set(&mut self, name: impl Into<String>, value: FieldValue) {
        self.fields.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Text value of `id` when present; used for parent tracking.
    pub fn id(&self) -> Option<String> {
        match self.fields.get("id") {
            Some(FieldValue::Null) | None => None,
            Some(v) => Some(v.render()),
        }
    }
}

/// Ordered natural-key values of one record.
#[derive(Debug, Clone, PartialEq)]
pub struct NaturalKey {
    pub parts: Vec<(&'static str, FieldValue)>,
}

impl NaturalKey {
    /// `value1|value2|...` as stored in the exception table.
    pub fn render(&self) -> String {
        self.parts
            .iter()
            .map(|(_, v)| v.render())
            .collect::<Vec<_>>()
            .join(KEY_SEPARATOR)
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum MapError {
    /// A natural-key field is absent or null.
    MissingKeyField {
        kind: ResourceKind,
        field: &'static str,
    },
    /// A value cannot be coerced to the declared column type.
    Uncoercible {
        kind: ResourceKind,
        field: String,
        expected: FieldType,
        found: ValueKind,
        detail: String,
    },
}

impl fmt::Display for MapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapError::MissingKeyField { kind, field } => {
                write!(f, "{kind}: natural key field '{field}' missing or null")
            }
            MapError::Uncoercible {
                kind,
                field,
                expected,
                found,
                detail,
            } => write!(
                f,
                "{kind}.{field}: expected {} got {}: {detail}",
                expected.as_str(),
                found.as_str()
            ),
        }
    }
}

impl std::error::Error for MapError {}

// ---------------------------------------------------------------------------
// Mapped record
// ---------------------------------------------------------------------------

/// A flat record restricted to its shape and coerced to declared types.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedRecord {
    pub kind: ResourceKind,
    pub fields: BTreeMap<&'static str, FieldValue>,
    pub raw: Value,
    /// Fields dropped as schema drift, sorted.
    pub unmapped_fields: Vec<String>,
}

impl MappedRecord {
    pub fn natural_key(&self) -> Result<NaturalKey, MapError> {
        let mut parts = Vec::with_capacity(self.kind.natural_key().len());
        for name in self.kind.natural_key() {
            match self.fields.get(name) {
                Some(v) if !v.is_null() => parts.push((*name, v.clone())),
                _ => {
                    return Err(MapError::MissingKeyField {
                        kind: self.kind,
                        field: *name,
                    })
                }
            }
        }
        Ok(NaturalKey { parts })
    }

    /// Value of `name`, or Null when the record does not carry it.
    pub fn value(&self, name: &str) -> &FieldValue {
        self.fields.get(name).unwrap_or(&FieldValue::Null)
    }
}

/// Upstream envelope fields consumed for kind detection, not schema drift.
fn is_envelope_field(name: &str) -> bool {
    name == "resource" || name == "resource_path" || name.ends_with("_resource_path")
}

/// Restrict a flat record to its kind's shape and coerce every value.
///
/// Unknown fields are dropped with a schema-drift warning and listed in
/// `unmapped_fields`; the record itself is still mapped.
pub fn map_record(flat: &FlatRecord) -> Result<MappedRecord, MapError> {
    let shape = flat.kind.shape();
    let mut fields: BTreeMap<&'static str, FieldValue> = BTreeMap::new();
    let mut unmapped: Vec<String> = Vec::new();

    for (name, value) in &flat.fields {
        match shape.field(name) {
            Some(spec) => {
                let coerced = value.clone().coerce(spec.ty).map_err(|detail| {
                    MapError::Uncoercible {
                        kind: flat.kind,
                        field: name.clone(),
                        expected: spec.ty,
                        found: value.kind(),
                        detail,
                    }
                })?;
                fields.insert(spec.name, coerced);
            }
            None if is_envelope_field(name) => {}
            None if value.is_null() => {
                tracing::debug!(kind = %flat.kind, field = %name, "dropping unmapped null field");
            }
            None => {
                tracing::warn!(
                    kind = %flat.kind,
                    field = %name,
                    id = ?flat.id(),
                    "schema drift: field is not part of the known shape, dropped"
                );
                unmapped.push(name.clone());
            }
        }
    }

    if shape.contains(DOCUMENT_FIELD) && !flat.raw.is_null() {
        fields.insert(DOCUMENT_FIELD, FieldValue::Document(flat.raw.clone()));
    }

    let mapped = MappedRecord {
        kind: flat.kind,
        fields,
        raw: flat.raw.clone(),
        unmapped_fields: unmapped,
    };
    mapped.natural_key()?;
    Ok(mapped)
}
