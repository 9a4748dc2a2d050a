//! Capture a run to a JSON Lines cache and reconcile it again offline.

use lm_config::FailurePolicy;
use lm_ingest::{read_cache, CacheWriter, Ingestor, Plan, REPLAY_COLLECTION};
use lm_reconcile::MemoryStore;
use lm_schemas::ResourceKind;
use lm_testkit::docs::{standard_exchange, standard_wallet};

#[tokio::test]
async fn scenario_replay_rebuilds_the_same_mirror_without_upstream() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("capture.jsonl");

    let wallet = standard_wallet();
    let exchange = standard_exchange();
    let mut live = Ingestor::new(MemoryStore::new(), FailurePolicy::Skip)
        .with_wallet(&wallet)
        .with_exchange(&exchange)
        .with_cache(CacheWriter::create(&path).unwrap())
        .with_config_hash("abc123");
    let live_report = live.run(&Plan::default()).await.unwrap();
    assert_eq!(live_report.config_hash.as_deref(), Some("abc123"));
    let live_store = live.into_store();

    let cached = read_cache(&path).unwrap();
    assert_eq!(cached.len(), 20);
    assert_eq!(cached[0].kind, ResourceKind::User);

    // Fresh store: everything inserts again.
    let mut fresh = Ingestor::new(MemoryStore::new(), FailurePolicy::Skip);
    let report = fresh.replay(&cached).await;
    assert_eq!(report.collections.len(), 1);
    assert_eq!(report.collections[0].collection, REPLAY_COLLECTION);
    assert_eq!(report.totals().inserted, 20);
    let fresh_store = fresh.into_store();
    assert_eq!(fresh_store.row_count(), live_store.row_count());
    assert_eq!(
        fresh_store.rows(ResourceKind::Fill),
        live_store.rows(ResourceKind::Fill)
    );

    // Same store: nothing to do.
    let mut again = Ingestor::new(live_store, FailurePolicy::Skip);
    let report = again.replay(&cached).await;
    assert_eq!(report.totals().no_change, 20);
    assert!(again.store().exceptions().is_empty());
}

#[tokio::test]
async fn scenario_cache_is_written_even_for_records_that_fail() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("capture.jsonl");

    let wallet = standard_wallet();
    let mut store = MemoryStore::new();
    store.fail_next_write("connection reset");
    let mut ingestor = Ingestor::new(store, FailurePolicy::Skip)
        .with_wallet(&wallet)
        .with_cache(CacheWriter::create(&path).unwrap());
    let report = ingestor.run(&Plan::select(&["user"]).unwrap()).await.unwrap();
    assert_eq!(report.totals().failed, 1);

    let cached = read_cache(&path).unwrap();
    assert_eq!(cached.len(), 1);
    assert_eq!(cached[0].id().as_deref(), Some("u-1"));
}
