//! lm-reconcile
//!
//! Reconciliation Engine: insert, and on a natural-key conflict diff the
//! stored row against the incoming one and log one exception per differing
//! field. The stored row is never overwritten.
//!
//! - [`Store`] is the only persistence seam; [`MemoryStore`] implements it
//!   in-process, `lm-db` implements it on Postgres.
//! - Equality is type-aware (see [`values_equal`]).
//! - Re-detecting an open discrepancy never creates a duplicate exception.

mod engine;
mod equality;
mod memory;
mod store;

pub use engine::{diff_record, FieldDiff, Outcome, ReconcileEngine, UpsertFailure};
pub use equality::{document_diff, values_equal, DocumentDiff};
pub use memory::MemoryStore;
pub use store::{
    InsertResult, NewReconciliationException, ReconciliationException, Store, StoreError,
    StoredRecord,
};
