use lm_reconcile::*;
use lm_schemas::{map_record, FieldValue, FlatRecord, ResourceKind};
use serde_json::json;

fn limit(total: &str) -> lm_schemas::MappedRecord {
    let mut flat = FlatRecord::new(ResourceKind::Limit, json!({"total": total}));
    flat.set("payment_method_id", FieldValue::Text("pm-1".into()));
    flat.set("type", FieldValue::Text("buy".into()));
    flat.set("period_in_days", FieldValue::Integer(7));
    flat.set("total", FieldValue::Text(total.into()));
    map_record(&flat).unwrap()
}

#[tokio::test]
async fn scenario_ambiguous_natural_key_is_fatal_and_not_swallowed() {
    let mut engine = ReconcileEngine::new(MemoryStore::new());
    let r = limit("3000.00");
    assert_eq!(engine.upsert(&r).await, Outcome::Inserted);

    // A second row with the same composite key only reachable by bypassing
    // uniqueness.
    engine
        .store_mut()
        .force_insert_row(StoredRecord::from_mapped(&r));

    match engine.upsert(&limit("2000.00")).await {
        Outcome::Failed(failure) => {
            assert!(failure.halts_kind());
            assert_eq!(
                failure,
                UpsertFailure::LookupInconsistency {
                    kind: ResourceKind::Limit,
                    key: "pm-1|buy|7".into(),
                    matches: 2,
                }
            );
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(engine.store().exceptions().is_empty());
}

#[tokio::test]
async fn scenario_conflict_without_a_stored_row_is_fatal() {
    let mut engine = ReconcileEngine::new(MemoryStore::new());
    assert_eq!(engine.upsert(&limit("3000.00")).await, Outcome::Inserted);

    engine.store_mut().hide_from_lookup(ResourceKind::Limit);

    match engine.upsert(&limit("2000.00")).await {
        Outcome::Failed(failure) => {
            assert!(failure.halts_kind());
            assert_eq!(failure.reason(), "LOOKUP_INCONSISTENCY");
            assert_eq!(
                failure,
                UpsertFailure::LookupInconsistency {
                    kind: ResourceKind::Limit,
                    key: "pm-1|buy|7".into(),
                    matches: 0,
                }
            );
        }
        other => panic!("expected failure, got {other:?}"),
    }

    // Nothing written and the stored row keeps its original value.
    let rows = engine.store().rows(ResourceKind::Limit);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].value("total"), &FieldValue::Number("3000.00".parse().unwrap()));
    assert!(engine.store().exceptions().is_empty());
}
