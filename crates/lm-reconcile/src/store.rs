//! Store seam consumed by the Reconciliation Engine.
//!
//! The engine never talks to a database directly; it receives a [`Store`]
//! and drives one transaction per record through it.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use lm_schemas::{FieldValue, MappedRecord, NaturalKey, ResourceKind, ValueKind};
use serde::Serialize;
use serde_json::Value;

/// Result of an insert attempt. A conflict is an ordinary outcome, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertResult {
    Inserted,
    Conflict,
}

/// A row as currently held by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub kind: ResourceKind,
    pub fields: BTreeMap<&'static str, FieldValue>,
}

impl StoredRecord {
    pub fn from_mapped(record: &MappedRecord) -> Self {
        Self {
            kind: record.kind,
            fields: record.fields.clone(),
        }
    }

    pub fn value(&self, name: &str) -> &FieldValue {
        self.fields.get(name).unwrap_or(&FieldValue::Null)
    }

    pub fn matches_key(&self, key: &NaturalKey) -> bool {
        key.parts
            .iter()
            .all(|(name, v)| self.fields.get(name).is_some_and(|mine| mine == v))
    }
}

/// A discrepancy about to be recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReconciliationException {
    pub resource: ResourceKind,
    pub record_key: String,
    pub field_name: &'static str,
    pub stored_value: FieldValue,
    pub incoming_value: FieldValue,
    pub detected_at: DateTime<Utc>,
}

impl NewReconciliationException {
    pub fn stored_kind(&self) -> ValueKind {
        self.stored_value.kind()
    }

    pub fn incoming_kind(&self) -> ValueKind {
        self.incoming_value.kind()
    }

    /// Both sides are structured documents.
    pub fn json_doc(&self) -> bool {
        self.stored_kind() == ValueKind::Document && self.incoming_kind() == ValueKind::Document
    }
}

/// A recorded discrepancy as read back for operators.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciliationException {
    pub id: i64,
    pub resource: String,
    pub record_key: String,
    pub field_name: String,
    pub stored_value: Value,
    pub incoming_value: Value,
    pub stored_kind: String,
    pub incoming_kind: String,
    pub json_doc: bool,
    pub resolved: bool,
    pub resolution: Option<String>,
    pub detected_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl ReconciliationException {
    pub fn from_new(id: i64, exc: &NewReconciliationException) -> Self {
        Self {
            id,
            resource: exc.resource.as_str().to_string(),
            record_key: exc.record_key.clone(),
            field_name: exc.field_name.to_string(),
            stored_value: exc.stored_value.to_json(),
            incoming_value: exc.incoming_value.to_json(),
            stored_kind: exc.stored_kind().as_str().to_string(),
            incoming_kind: exc.incoming_kind().as_str().to_string(),
            json_doc: exc.json_doc(),
            resolved: false,
            resolution: None,
            detected_at: exc.detected_at,
            resolved_at: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Store failure other than a uniqueness conflict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backing store could not be reached or the transaction broke.
    Unavailable(String),
    /// The store refused the write (type error, constraint other than uniqueness).
    Rejected(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Unavailable(msg) => write!(f, "store unavailable: {msg}"),
            StoreError::Rejected(msg) => write!(f, "store rejected write: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Insert / conflict-detect / point-lookup store with per-record transactions.
///
/// Implementations must never update an existing row: `insert_record` and
/// `insert_exception` report [`InsertResult::Conflict`] and leave the stored
/// state untouched when the natural key (or the unresolved exception key)
/// already exists.
#[async_trait::async_trait]
pub trait Store: Send {
    async fn begin(&mut self) -> Result<(), StoreError>;

    async fn commit(&mut self) -> Result<(), StoreError>;

    async fn rollback(&mut self) -> Result<(), StoreError>;

    async fn insert_record(&mut self, record: &MappedRecord) -> Result<InsertResult, StoreError>;

    /// Every stored row of `kind` whose natural key equals `key`.
    async fn load_by_key(
        &mut self,
        kind: ResourceKind,
        key: &NaturalKey,
    ) -> Result<Vec<StoredRecord>, StoreError>;

    /// Conflict when an unresolved exception already exists for
    /// `(resource, record_key, field_name)`.
    async fn insert_exception(
        &mut self,
        exception: &NewReconciliationException,
    ) -> Result<InsertResult, StoreError>;
}
