use std::fmt;

use chrono::Utc;
use lm_schemas::{MappedRecord, NaturalKey, ResourceKind};

use crate::equality::values_equal;
use crate::store::{InsertResult, NewReconciliationException, Store, StoreError, StoredRecord};

/// Result of reconciling one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Inserted,
    /// Conflict with differences. `already_open` counts discrepancies that
    /// an unresolved exception already records.
    DiffLogged {
        new_exceptions: usize,
        already_open: usize,
    },
    NoChange,
    Failed(UpsertFailure),
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Inserted => "INSERTED",
            Outcome::DiffLogged { .. } => "DIFF_LOGGED",
            Outcome::NoChange => "NO_CHANGE",
            Outcome::Failed(_) => "FAILED",
        }
    }

    pub fn new_exceptions(&self) -> usize {
        match self {
            Outcome::DiffLogged { new_exceptions, .. } => *new_exceptions,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertFailure {
    MissingKeyField {
        kind: ResourceKind,
        field: &'static str,
    },
    /// A conflict whose natural key resolves to zero or several stored rows.
    LookupInconsistency {
        kind: ResourceKind,
        key: String,
        matches: usize,
    },
    Persistence {
        kind: ResourceKind,
        key: String,
        message: String,
    },
}

impl UpsertFailure {
    /// Lookup inconsistency breaks the identity model for the whole kind.
    pub fn halts_kind(&self) -> bool {
        matches!(self, UpsertFailure::LookupInconsistency { .. })
    }

    pub fn reason(&self) -> &'static str {
        match self {
            UpsertFailure::MissingKeyField { .. } => "MISSING_KEY_FIELD",
            UpsertFailure::LookupInconsistency { .. } => "LOOKUP_INCONSISTENCY",
            UpsertFailure::Persistence { .. } => "PERSISTENCE_FAILURE",
        }
    }
}

impl fmt::Display for UpsertFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpsertFailure::MissingKeyField { kind, field } => {
                write!(f, "{kind}: natural key field '{field}' missing")
            }
            UpsertFailure::LookupInconsistency { kind, key, matches } => write!(
                f,
                "{kind} key={key}: conflict resolved to {matches} stored rows (expected exactly 1)"
            ),
            UpsertFailure::Persistence { kind, key, message } => {
                write!(f, "{kind} key={key}: persistence failed: {message}")
            }
        }
    }
}

impl std::error::Error for UpsertFailure {}

/// One field found unequal after type-aware normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDiff {
    pub field: &'static str,
    pub stored: lm_schemas::FieldValue,
    pub incoming: lm_schemas::FieldValue,
}

/// Compare every non-key shape field of `stored` against `incoming`.
pub fn diff_record(stored: &StoredRecord, incoming: &MappedRecord) -> Vec<FieldDiff> {
    let shape = incoming.kind.shape();
    shape
        .compared_fields()
        .filter_map(|spec| {
            let old = stored.value(spec.name);
            let new = incoming.value(spec.name);
            if values_equal(old, new) {
                None
            } else {
                Some(FieldDiff {
                    field: spec.name,
                    stored: old.clone(),
                    incoming: new.clone(),
                })
            }
        })
        .collect()
}

/// Insert-or-diff engine over an injected [`Store`].
///
/// Never overwrites a stored row. Each `upsert` runs in its own store
/// transaction so one failing record cannot undo its neighbours.
pub struct ReconcileEngine<S: Store> {
    store: S,
}

impl<S: Store> ReconcileEngine<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub async fn upsert(&mut self, record: &MappedRecord) -> Outcome {
        let key = match record.natural_key() {
            Ok(k) => k,
            Err(lm_schemas::MapError::MissingKeyField { kind, field }) => {
                return Outcome::Failed(UpsertFailure::MissingKeyField { kind, field })
            }
            Err(other) => {
                return Outcome::Failed(UpsertFailure::Persistence {
                    kind: record.kind,
                    key: String::new(),
                    message: other.to_string(),
                })
            }
        };
        let persistence = |e: StoreError| UpsertFailure::Persistence {
            kind: record.kind,
            key: key.render(),
            message: e.to_string(),
        };

        if let Err(e) = self.store.begin().await {
            return Outcome::Failed(persistence(e));
        }

        match self.upsert_in_tx(record, &key).await {
            Ok(outcome) => match self.store.commit().await {
                Ok(()) => outcome,
                Err(e) => {
                    self.rollback_quietly(record.kind, &key).await;
                    Outcome::Failed(persistence(e))
                }
            },
            Err(failure) => {
                self.rollback_quietly(record.kind, &key).await;
                Outcome::Failed(failure)
            }
        }
    }

    async fn upsert_in_tx(
        &mut self,
        record: &MappedRecord,
        key: &NaturalKey,
    ) -> Result<Outcome, UpsertFailure> {
        let persistence = |e: StoreError| UpsertFailure::Persistence {
            kind: record.kind,
            key: key.render(),
            message: e.to_string(),
        };

        match self.store.insert_record(record).await.map_err(persistence)? {
            InsertResult::Inserted => return Ok(Outcome::Inserted),
            InsertResult::Conflict => {}
        }

        let mut matches = self
            .store
            .load_by_key(record.kind, key)
            .await
            .map_err(persistence)?;
        if matches.len() != 1 {
            return Err(UpsertFailure::LookupInconsistency {
                kind: record.kind,
                key: key.render(),
                matches: matches.len(),
            });
        }
        let stored = matches.remove(0);

        let diffs = diff_record(&stored, record);
        if diffs.is_empty() {
            return Ok(Outcome::NoChange);
        }

        let record_key = key.render();
        let detected_at = Utc::now();
        let mut new_exceptions = 0;
        let mut already_open = 0;
        for diff in diffs {
            let exc = NewReconciliationException {
                resource: record.kind,
                record_key: record_key.clone(),
                field_name: diff.field,
                stored_value: diff.stored,
                incoming_value: diff.incoming,
                detected_at,
            };
            match self.store.insert_exception(&exc).await.map_err(persistence)? {
                InsertResult::Inserted => {
                    tracing::info!(
                        kind = %record.kind,
                        key = %record_key,
                        field = exc.field_name,
                        stored_kind = exc.stored_kind().as_str(),
                        incoming_kind = exc.incoming_kind().as_str(),
                        "reconciliation exception logged"
                    );
                    new_exceptions += 1;
                }
                InsertResult::Conflict => already_open += 1,
            }
        }

        Ok(Outcome::DiffLogged {
            new_exceptions,
            already_open,
        })
    }

    async fn rollback_quietly(&mut self, kind: ResourceKind, key: &NaturalKey) {
        if let Err(e) = self.store.rollback().await {
            tracing::error!(kind = %kind, key = %key, error = %e, "rollback failed");
        }
    }
}
