use std::collections::BTreeSet;
use std::ops::ControlFlow;

use anyhow::Result;
use chrono::Utc;
use lm_config::FailurePolicy;
use lm_denest::{flatten, FlattenContext, ParentRef};
use lm_reconcile::{Outcome, ReconcileEngine, Store, UpsertFailure};
use lm_schemas::{map_record, FlatRecord, MapError, ResourceKind};
use lm_source::{PageSource, Paginator};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::cache::CacheWriter;
use crate::plan::{Api, Collection, Owner, Plan};
use crate::report::{CollectionReport, Incident, IngestReport, SkippedCollection};

/// Collection name used in reports for cache replays.
pub const REPLAY_COLLECTION: &str = "replay";

/// Ids discovered by parent collections during this run.
#[derive(Debug, Default)]
struct Parents {
    user: Option<String>,
    wallet_accounts: Vec<String>,
    exchange_accounts: Vec<String>,
}

impl Parents {
    fn record(&mut self, owner: Owner, id: String) {
        let list = match owner {
            Owner::User => {
                self.user.get_or_insert(id);
                return;
            }
            Owner::WalletAccount => &mut self.wallet_accounts,
            Owner::ExchangeAccount => &mut self.exchange_accounts,
            Owner::None => return,
        };
        if !list.contains(&id) {
            list.push(id);
        }
    }

    /// Parent ids for the walks of `collection`; `None` means one unparented walk.
    fn walks_for(&self, collection: &Collection) -> Vec<Option<String>> {
        match collection.owner {
            Owner::None => vec![None],
            Owner::User => vec![self.user.clone()],
            Owner::WalletAccount => self.wallet_accounts.iter().cloned().map(Some).collect(),
            Owner::ExchangeAccount => self.exchange_accounts.iter().cloned().map(Some).collect(),
        }
    }
}

/// Drives Paginator, Denester and the Reconciliation Engine over a [`Plan`].
///
/// Strictly sequential: every document is flattened and reconciled before
/// the next page is requested. A failing record never aborts its
/// neighbours; whether the walk continues is up to the [`FailurePolicy`],
/// except that lookup inconsistencies and source errors always stop it.
///
/// A lookup inconsistency also halts its resource kind for the rest of the
/// run: later collections of that kind are skipped and stray records of it
/// are counted but never reconciled.
pub struct Ingestor<'a, S: Store> {
    engine: ReconcileEngine<S>,
    wallet: Option<&'a dyn PageSource>,
    exchange: Option<&'a dyn PageSource>,
    policy: FailurePolicy,
    cache: Option<CacheWriter>,
    config_hash: Option<String>,
    parents: Parents,
    halted_kinds: BTreeSet<ResourceKind>,
}

impl<'a, S: Store> Ingestor<'a, S> {
    pub fn new(store: S, policy: FailurePolicy) -> Self {
        Self {
            engine: ReconcileEngine::new(store),
            wallet: None,
            exchange: None,
            policy,
            cache: None,
            config_hash: None,
            parents: Parents::default(),
            halted_kinds: BTreeSet::new(),
        }
    }

    pub fn with_wallet(mut self, source: &'a dyn PageSource) -> Self {
        self.wallet = Some(source);
        self
    }

    pub fn with_exchange(mut self, source: &'a dyn PageSource) -> Self {
        self.exchange = Some(source);
        self
    }

    /// Capture every flat record to `cache` before it is reconciled.
    pub fn with_cache(mut self, cache: CacheWriter) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = Some(hash.into());
        self
    }

    pub fn store(&self) -> &S {
        self.engine.store()
    }

    pub fn into_store(self) -> S {
        self.engine.into_store()
    }

    fn source_for(&self, api: Api) -> Option<&'a dyn PageSource> {
        match api {
            Api::Wallet => self.wallet,
            Api::Exchange => self.exchange,
        }
    }

    /// Walk every collection of `plan` in order.
    ///
    /// Errors only on cache I/O; upstream and store failures end up in the
    /// report.
    pub async fn run(&mut self, plan: &Plan) -> Result<IngestReport> {
        let mut report = IngestReport::begin(self.policy.as_str(), self.config_hash.clone());
        info!(
            run_id = %report.run_id,
            collections = ?plan.names(),
            on_failure = self.policy.as_str(),
            "ingest run started"
        );

        for collection in plan.collections() {
            let Some(source) = self.source_for(collection.api) else {
                warn!(collection = collection.name, api = collection.api.as_str(), "source not configured, skipping");
                report.skipped.push(SkippedCollection {
                    collection: collection.name.to_string(),
                    reason: format!("{} api not configured", collection.api.as_str()),
                });
                continue;
            };
            if self.halted_kinds.contains(&collection.kind) {
                warn!(collection = collection.name, kind = %collection.kind, "resource kind halted earlier in the run, skipping");
                report.skipped.push(SkippedCollection {
                    collection: collection.name.to_string(),
                    reason: format!("{} halted by lookup inconsistency", collection.kind.as_str()),
                });
                continue;
            }

            let walks = self.parents.walks_for(collection);
            if walks.is_empty() {
                info!(collection = collection.name, "no parent accounts discovered, nothing to walk");
            }
            for parent_id in walks {
                let walk = self
                    .walk(source, collection, parent_id, &mut report.incidents)
                    .await?;
                let halted = walk.is_halted();
                report.collections.push(walk);
                if halted {
                    break;
                }
            }
        }

        report.halted_kinds = self.halted_kind_names();
        if let Some(cache) = &mut self.cache {
            cache.flush()?;
            info!(path = %cache.path().display(), records = cache.written(), "cache file written");
        }
        report.finished_at = Utc::now();
        log_summary(&report);
        Ok(report)
    }

    async fn walk(
        &mut self,
        source: &'a dyn PageSource,
        collection: &Collection,
        parent_id: Option<String>,
        incidents: &mut Vec<Incident>,
    ) -> Result<CollectionReport> {
        let parent: Option<ParentRef> = parent_id.as_deref().and_then(|id| collection.parent_ref(id));
        let ctx = FlattenContext {
            default_kind: Some(collection.kind),
            parent,
        };
        let mut walk = CollectionReport::new(collection.name, parent_id.clone());
        let mut pages = Paginator::new(source, collection.request_for(parent_id.as_deref()));

        'pages: loop {
            let page = match pages.next_page().await {
                Ok(Some(page)) => page,
                Ok(None) => break,
                Err(e) => {
                    error!(
                        collection = collection.name,
                        parent = ?parent_id,
                        source = source.name(),
                        cursor = ?pages.cursor(),
                        error = %e,
                        "page fetch failed, collection halted"
                    );
                    incidents.push(Incident {
                        collection: collection.name.to_string(),
                        kind: collection.kind.as_str().to_string(),
                        key: parent_id.clone(),
                        field: None,
                        reason: "SOURCE_ERROR".to_string(),
                        message: e.to_string(),
                        raw: Value::Null,
                    });
                    walk.halted = Some(format!("SOURCE_ERROR: {e}"));
                    break;
                }
            };
            walk.pages += 1;

            for doc in &page.documents {
                walk.documents += 1;
                if let ControlFlow::Break(reason) = self
                    .ingest_document(doc, &ctx, collection, &mut walk, incidents)
                    .await?
                {
                    walk.halted = Some(reason);
                    break 'pages;
                }
            }
        }

        info!(
            collection = collection.name,
            parent = ?parent_id,
            pages = walk.pages,
            documents = walk.documents,
            records = walk.records,
            inserted = walk.inserted,
            diff_logged = walk.diff_logged,
            new_exceptions = walk.new_exceptions,
            no_change = walk.no_change,
            failed = walk.failed,
            halted = ?walk.halted,
            "collection walk finished"
        );
        Ok(walk)
    }

    async fn ingest_document(
        &mut self,
        doc: &Value,
        ctx: &FlattenContext,
        collection: &Collection,
        walk: &mut CollectionReport,
        incidents: &mut Vec<Incident>,
    ) -> Result<ControlFlow<String>> {
        let records = match flatten(doc, ctx) {
            Ok(records) => records,
            Err(v) => {
                walk.shape_violations += 1;
                error!(
                    collection = collection.name,
                    field = %v.field,
                    reason = %v.reason,
                    raw = %v.raw,
                    "shape violation, document skipped"
                );
                incidents.push(Incident {
                    collection: collection.name.to_string(),
                    kind: collection.kind.as_str().to_string(),
                    key: doc.get("id").map(render_id),
                    field: Some(v.field.clone()),
                    reason: "SHAPE_VIOLATION".to_string(),
                    message: v.to_string(),
                    raw: v.raw,
                });
                return Ok(self.after_failure("SHAPE_VIOLATION"));
            }
        };

        if let Some(cache) = &mut self.cache {
            cache.write_all(&records)?;
        }

        if let (Some(owner), Some(first)) = (collection.discovers, records.first()) {
            if first.kind == collection.kind {
                if let Some(id) = first.id() {
                    self.parents.record(owner, id);
                }
            }
        }

        for flat in &records {
            if let ControlFlow::Break(reason) = self.reconcile(flat, collection.name, walk, incidents).await {
                return Ok(ControlFlow::Break(reason));
            }
        }
        Ok(ControlFlow::Continue(()))
    }

    async fn reconcile(
        &mut self,
        flat: &FlatRecord,
        collection: &str,
        walk: &mut CollectionReport,
        incidents: &mut Vec<Incident>,
    ) -> ControlFlow<String> {
        walk.records += 1;
        if self.halted_kinds.contains(&flat.kind) {
            walk.kind_halted += 1;
            debug!(collection, kind = %flat.kind, id = ?flat.id(), "resource kind halted, record not reconciled");
            return ControlFlow::Continue(());
        }

        let mapped = match map_record(flat) {
            Ok(m) => m,
            Err(e) => {
                walk.failed += 1;
                let (reason, field) = match &e {
                    MapError::MissingKeyField { field, .. } => ("MISSING_KEY_FIELD", field.to_string()),
                    MapError::Uncoercible { field, .. } => ("UNCOERCIBLE_VALUE", field.clone()),
                };
                error!(collection, kind = %flat.kind, field = %field, error = %e, raw = %flat.raw, "record rejected by mapper");
                incidents.push(Incident {
                    collection: collection.to_string(),
                    kind: flat.kind.as_str().to_string(),
                    key: flat.id(),
                    field: Some(field),
                    reason: reason.to_string(),
                    message: e.to_string(),
                    raw: flat.raw.clone(),
                });
                return self.after_failure(reason);
            }
        };
        walk.unmapped_fields += mapped.unmapped_fields.len();

        let outcome = self.engine.upsert(&mapped).await;
        debug!(collection, kind = %mapped.kind, id = ?flat.id(), outcome = outcome.as_str(), "record reconciled");
        match outcome {
            Outcome::Inserted => walk.inserted += 1,
            Outcome::DiffLogged {
                new_exceptions,
                already_open,
            } => {
                walk.diff_logged += 1;
                walk.new_exceptions += new_exceptions;
                walk.already_open += already_open;
            }
            Outcome::NoChange => walk.no_change += 1,
            Outcome::Failed(failure) => {
                walk.failed += 1;
                error!(collection, kind = %mapped.kind, error = %failure, raw = %flat.raw, "record failed");
                incidents.push(incident_for(collection, flat, &failure));
                if failure.halts_kind() {
                    if self.halted_kinds.insert(mapped.kind) {
                        error!(collection, kind = %mapped.kind, "resource kind halted for the rest of the run");
                    }
                    return ControlFlow::Break(failure.reason().to_string());
                }
                return self.after_failure(failure.reason());
            }
        }
        ControlFlow::Continue(())
    }

    fn halted_kind_names(&self) -> Vec<String> {
        self.halted_kinds.iter().map(|k| k.as_str().to_string()).collect()
    }

    fn after_failure(&self, reason: &str) -> ControlFlow<String> {
        match self.policy {
            FailurePolicy::Skip => ControlFlow::Continue(()),
            FailurePolicy::Halt => ControlFlow::Break(format!("{reason} (on_failure=halt)")),
        }
    }

    /// Map and reconcile cached records without touching the upstream APIs.
    pub async fn replay(&mut self, records: &[FlatRecord]) -> IngestReport {
        let mut report = IngestReport::begin(self.policy.as_str(), self.config_hash.clone());
        let mut walk = CollectionReport::new(REPLAY_COLLECTION, None);
        info!(run_id = %report.run_id, records = records.len(), "cache replay started");

        for flat in records {
            if let ControlFlow::Break(reason) = self
                .reconcile(flat, REPLAY_COLLECTION, &mut walk, &mut report.incidents)
                .await
            {
                walk.halted = Some(reason);
                break;
            }
        }

        report.collections.push(walk);
        report.halted_kinds = self.halted_kind_names();
        report.finished_at = Utc::now();
        log_summary(&report);
        report
    }
}

fn incident_for(collection: &str, flat: &FlatRecord, failure: &UpsertFailure) -> Incident {
    let (key, field) = match failure {
        UpsertFailure::MissingKeyField { field, .. } => (flat.id(), Some(field.to_string())),
        UpsertFailure::LookupInconsistency { key, .. } | UpsertFailure::Persistence { key, .. } => {
            (Some(key.clone()), None)
        }
    };
    Incident {
        collection: collection.to_string(),
        kind: flat.kind.as_str().to_string(),
        key,
        field,
        reason: failure.reason().to_string(),
        message: failure.to_string(),
        raw: flat.raw.clone(),
    }
}

fn render_id(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn log_summary(report: &IngestReport) {
    let t = report.totals();
    info!(
        run_id = %report.run_id,
        walks = report.collections.len(),
        records = t.records,
        inserted = t.inserted,
        diff_logged = t.diff_logged,
        new_exceptions = t.new_exceptions,
        already_open = t.already_open,
        no_change = t.no_change,
        failed = t.failed,
        shape_violations = t.shape_violations,
        kind_halted = t.kind_halted,
        halted_kinds = ?report.halted_kinds,
        incidents = report.incidents.len(),
        halted = report.halted(),
        "ingest run finished"
    );
}
