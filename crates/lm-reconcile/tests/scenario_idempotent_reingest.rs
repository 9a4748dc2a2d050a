//! Re-delivering an already reconciled document must not change stored state
//! or create exceptions.

use lm_denest::{flatten, FlattenContext};
use lm_reconcile::*;
use lm_schemas::{map_record, ResourceKind};
use serde_json::json;

async fn ingest(engine: &mut ReconcileEngine<MemoryStore>, doc: &serde_json::Value) -> Vec<Outcome> {
    let mut outcomes = Vec::new();
    for flat in flatten(doc, &FlattenContext::default()).unwrap() {
        let mapped = map_record(&flat).unwrap();
        outcomes.push(engine.upsert(&mapped).await);
    }
    outcomes
}

#[tokio::test]
async fn scenario_second_application_yields_no_new_exceptions() {
    let doc = json!({
        "id": "pm-1",
        "resource": "payment_method",
        "type": "ach_bank_account",
        "name": "BANK ****1234",
        "currency": "USD",
        "allow_buy": true,
        "created_at": "2015-01-31T20:49:02Z",
        "limits": {
            "buy": [{"period_in_days": 7, "total": {"amount": "3000.00", "currency": "USD"},
                     "remaining": {"amount": "3000.00", "currency": "USD"}}],
            "sell": [{"period_in_days": 7, "total": {"amount": "3000.00", "currency": "USD"},
                      "remaining": {"amount": "3000.00", "currency": "USD"}}]
        }
    });

    let mut engine = ReconcileEngine::new(MemoryStore::new());
    let first = ingest(&mut engine, &doc).await;
    assert_eq!(first, vec![Outcome::Inserted; 3]);

    let before: Vec<StoredRecord> = engine.store().rows(ResourceKind::Limit).to_vec();

    let second = ingest(&mut engine, &doc).await;
    assert_eq!(second, vec![Outcome::NoChange; 3]);
    assert!(engine.store().exceptions().is_empty());
    assert_eq!(engine.store().rows(ResourceKind::Limit), before.as_slice());
    assert_eq!(engine.store().rows(ResourceKind::PaymentMethod).len(), 1);
}

#[tokio::test]
async fn scenario_open_discrepancy_is_not_logged_twice() {
    let v1 = json!({"id": "addr-1", "resource": "address", "address": "1A", "name": "old"});
    let v2 = json!({"id": "addr-1", "resource": "address", "address": "1A", "name": "new"});

    let mut engine = ReconcileEngine::new(MemoryStore::new());
    ingest(&mut engine, &v1).await;

    let first = ingest(&mut engine, &v2).await;
    // `name` plus the raw `document` differ.
    assert_eq!(
        first,
        vec![Outcome::DiffLogged { new_exceptions: 2, already_open: 0 }]
    );

    let again = ingest(&mut engine, &v2).await;
    assert_eq!(
        again,
        vec![Outcome::DiffLogged { new_exceptions: 0, already_open: 2 }]
    );
    assert_eq!(engine.store().exceptions().len(), 2);
}
