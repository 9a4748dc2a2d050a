//! `lm exceptions list|resolve`.

use anyhow::Result;
use chrono::Utc;
use lm_db::{ExceptionFilter, PgPool};
use lm_reconcile::ReconciliationException;
use lm_schemas::ResourceKind;

pub async fn list(pool: &PgPool, all: bool, resource: Option<&str>) -> Result<()> {
    let filter = ExceptionFilter {
        include_resolved: all,
        resource: resource.map(ResourceKind::parse).transpose()?,
    };
    let rows = lm_db::list_exceptions(pool, &filter).await?;
    for e in &rows {
        print_exception(e);
    }
    println!("count={}", rows.len());
    Ok(())
}

pub async fn resolve(pool: &PgPool, id: i64, resolution: &str) -> Result<()> {
    let e = lm_db::resolve_exception(pool, id, resolution, Utc::now()).await?;
    print_exception(&e);
    println!("resolved=true id={}", e.id);
    Ok(())
}

fn print_exception(e: &ReconciliationException) {
    println!(
        "id={} resource={} key={} field={} stored={} incoming={} stored_kind={} incoming_kind={} json_doc={} detected_at={} resolved={} resolution={}",
        e.id,
        e.resource,
        e.record_key,
        e.field_name,
        e.stored_value,
        e.incoming_value,
        e.stored_kind,
        e.incoming_kind,
        e.json_doc,
        e.detected_at.to_rfc3339(),
        e.resolved,
        e.resolution.as_deref().unwrap_or("-"),
    );
}
