//! lm-ingest
//!
//! Ingestion Orchestrator: walks the upstream collections in dependency
//! order and drives every document through Denester, Resource Mapper and
//! Reconciliation Engine, producing an [`IngestReport`].
//!
//! Also owns the optional JSON Lines cache of flat records and its replay.

mod cache;
mod orchestrator;
mod plan;
mod report;
mod sources;

pub use cache::{read_cache, CacheWriter};
pub use orchestrator::{Ingestor, REPLAY_COLLECTION};
pub use plan::{Api, Collection, Owner, Plan, ACCOUNT_PLACEHOLDER, DEFAULT_PLAN};
pub use report::{CollectionReport, Incident, IngestReport, SkippedCollection};
pub use sources::http_sources;
