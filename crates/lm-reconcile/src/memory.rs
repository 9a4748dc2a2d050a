//! In-memory [`Store`] with the same uniqueness rules as the relational one.
//!
//! Backs unit tests and `--dry-run` ingestion. Writes inside a transaction
//! are append-only, so rollback truncates back to the marks taken at begin.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use lm_schemas::{MappedRecord, NaturalKey, ResourceKind};

use crate::store::{
    InsertResult, NewReconciliationException, ReconciliationException, Store, StoreError,
    StoredRecord,
};

#[derive(Debug, Clone)]
struct TxMark {
    rows: BTreeMap<ResourceKind, usize>,
    exceptions: usize,
    next_exception_id: i64,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: BTreeMap<ResourceKind, Vec<StoredRecord>>,
    exceptions: Vec<ReconciliationException>,
    next_exception_id: i64,
    mark: Option<TxMark>,
    fail_next_write: Option<String>,
    lookup_blind: BTreeSet<ResourceKind>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self, kind: ResourceKind) -> &[StoredRecord] {
        self.rows.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn row_count(&self) -> usize {
        self.rows.values().map(Vec::len).sum()
    }

    pub fn exceptions(&self) -> &[ReconciliationException] {
        &self.exceptions
    }

    pub fn open_exceptions(&self) -> impl Iterator<Item = &ReconciliationException> {
        self.exceptions.iter().filter(|e| !e.resolved)
    }

    /// Mark an exception resolved. Returns false when `id` is unknown or
    /// already resolved.
    pub fn resolve_exception(&mut self, id: i64, resolution: &str) -> bool {
        match self.exceptions.iter_mut().find(|e| e.id == id && !e.resolved) {
            Some(e) => {
                e.resolved = true;
                e.resolution = Some(resolution.to_string());
                e.resolved_at = Some(Utc::now());
                true
            }
            None => false,
        }
    }

    /// Append a row bypassing uniqueness. Lets tests build states the
    /// relational store would only reach through upstream identity bugs.
    pub fn force_insert_row(&mut self, row: StoredRecord) {
        self.rows.entry(row.kind).or_default().push(row);
    }

    /// Make the next record or exception write fail with `message`.
    pub fn fail_next_write(&mut self, message: impl Into<String>) {
        self.fail_next_write = Some(message.into());
    }

    /// Make key lookups for `kind` come back empty while inserts still see
    /// the existing rows, as after a concurrent delete.
    pub fn hide_from_lookup(&mut self, kind: ResourceKind) {
        self.lookup_blind.insert(kind);
    }

    fn take_injected_failure(&mut self) -> Result<(), StoreError> {
        match self.fail_next_write.take() {
            Some(msg) => Err(StoreError::Rejected(msg)),
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    async fn begin(&mut self) -> Result<(), StoreError> {
        if self.mark.is_some() {
            return Err(StoreError::Unavailable(
                "transaction already open".to_string(),
            ));
        }
        self.mark = Some(TxMark {
            rows: self.rows.iter().map(|(k, v)| (*k, v.len())).collect(),
            exceptions: self.exceptions.len(),
            next_exception_id: self.next_exception_id,
        });
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        match self.mark.take() {
            Some(_) => Ok(()),
            None => Err(StoreError::Unavailable("no open transaction".to_string())),
        }
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        let Some(mark) = self.mark.take() else {
            return Ok(());
        };
        for (kind, rows) in self.rows.iter_mut() {
            rows.truncate(mark.rows.get(kind).copied().unwrap_or(0));
        }
        self.exceptions.truncate(mark.exceptions);
        self.next_exception_id = mark.next_exception_id;
        Ok(())
    }

    async fn insert_record(&mut self, record: &MappedRecord) -> Result<InsertResult, StoreError> {
        self.take_injected_failure()?;
        let key = record
            .natural_key()
            .map_err(|e| StoreError::Rejected(e.to_string()))?;
        let table = self.rows.entry(record.kind).or_default();
        if table.iter().any(|row| row.matches_key(&key)) {
            return Ok(InsertResult::Conflict);
        }
        table.push(StoredRecord::from_mapped(record));
        Ok(InsertResult::Inserted)
    }

    async fn load_by_key(
        &mut self,
        kind: ResourceKind,
        key: &NaturalKey,
    ) -> Result<Vec<StoredRecord>, StoreError> {
        if self.lookup_blind.contains(&kind) {
            return Ok(Vec::new());
        }
        Ok(self
            .rows(kind)
            .iter()
            .filter(|row| row.matches_key(key))
            .cloned()
            .collect())
    }

    async fn insert_exception(
        &mut self,
        exception: &NewReconciliationException,
    ) -> Result<InsertResult, StoreError> {
        self.take_injected_failure()?;
        let resource = exception.resource.as_str();
        let open_duplicate = self.exceptions.iter().any(|e| {
            !e.resolved
                && e.resource == resource
                && e.record_key == exception.record_key
                && e.field_name == exception.field_name
        });
        if open_duplicate {
            return Ok(InsertResult::Conflict);
        }
        self.next_exception_id += 1;
        self.exceptions
            .push(ReconciliationException::from_new(self.next_exception_id, exception));
        Ok(InsertResult::Inserted)
    }
}
