//! Run report: counters per collection walk plus an incident list detailed
//! enough to replay a failed document by hand.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

/// Counters for one walk of one collection (per parent account when the
/// collection is account-scoped).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CollectionReport {
    pub collection: String,
    pub parent: Option<String>,
    pub pages: usize,
    pub documents: usize,
    /// Flat records produced, fan-out siblings included.
    pub records: usize,
    pub inserted: usize,
    pub diff_logged: usize,
    pub new_exceptions: usize,
    pub already_open: usize,
    pub no_change: usize,
    pub failed: usize,
    pub shape_violations: usize,
    pub unmapped_fields: usize,
    /// Records not reconciled because their resource kind halted earlier in the run.
    pub kind_halted: usize,
    /// Why the walk stopped early, if it did.
    pub halted: Option<String>,
}

impl CollectionReport {
    pub fn new(collection: &str, parent: Option<String>) -> Self {
        Self {
            collection: collection.to_string(),
            parent,
            ..Self::default()
        }
    }

    pub fn is_halted(&self) -> bool {
        self.halted.is_some()
    }

    fn add(&mut self, other: &CollectionReport) {
        self.pages += other.pages;
        self.documents += other.documents;
        self.records += other.records;
        self.inserted += other.inserted;
        self.diff_logged += other.diff_logged;
        self.new_exceptions += other.new_exceptions;
        self.already_open += other.already_open;
        self.no_change += other.no_change;
        self.failed += other.failed;
        self.shape_violations += other.shape_violations;
        self.unmapped_fields += other.unmapped_fields;
        self.kind_halted += other.kind_halted;
    }
}

/// A fatal condition for one document or record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Incident {
    pub collection: String,
    pub kind: String,
    pub key: Option<String>,
    pub field: Option<String>,
    pub reason: String,
    pub message: String,
    pub raw: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedCollection {
    pub collection: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub config_hash: Option<String>,
    pub on_failure: String,
    pub collections: Vec<CollectionReport>,
    pub skipped: Vec<SkippedCollection>,
    /// Resource kinds whose ingestion stopped after a lookup inconsistency.
    pub halted_kinds: Vec<String>,
    pub incidents: Vec<Incident>,
}

impl IngestReport {
    pub fn begin(on_failure: &str, config_hash: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            started_at: now,
            finished_at: now,
            config_hash,
            on_failure: on_failure.to_string(),
            collections: Vec::new(),
            skipped: Vec::new(),
            halted_kinds: Vec::new(),
            incidents: Vec::new(),
        }
    }

    /// True when any walk stopped early.
    pub fn halted(&self) -> bool {
        self.collections.iter().any(CollectionReport::is_halted)
    }

    pub fn halted_collections(&self) -> Vec<&CollectionReport> {
        self.collections.iter().filter(|c| c.is_halted()).collect()
    }

    /// Sum over every walk.
    pub fn totals(&self) -> CollectionReport {
        let mut t = CollectionReport::new("total", None);
        for c in &self.collections {
            t.add(c);
        }
        t
    }

    /// Sum over the walks of one collection.
    pub fn collection_totals(&self, name: &str) -> CollectionReport {
        let mut t = CollectionReport::new(name, None);
        for c in self.collections.iter().filter(|c| c.collection == name) {
            t.add(c);
            if t.halted.is_none() {
                t.halted = c.halted.clone();
            }
        }
        t
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_sum_walks_and_track_halts() {
        let mut r = IngestReport::begin("skip", None);
        let mut a = CollectionReport::new("addresses", Some("acct-1".into()));
        a.inserted = 2;
        a.records = 2;
        let mut b = CollectionReport::new("addresses", Some("acct-2".into()));
        b.inserted = 1;
        b.records = 2;
        b.failed = 1;
        b.halted = Some("PERSISTENCE_FAILURE".into());
        r.collections.push(a);
        r.collections.push(b);

        assert!(r.halted());
        let t = r.collection_totals("addresses");
        assert_eq!(t.inserted, 3);
        assert_eq!(t.records, 4);
        assert_eq!(t.halted.as_deref(), Some("PERSISTENCE_FAILURE"));
        assert_eq!(r.totals().failed, 1);
        assert_eq!(r.to_json()["collections"][1]["parent"], "acct-2");
    }
}
