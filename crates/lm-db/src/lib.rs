//! lm-db
//!
//! Postgres side of the mirror: connection, embedded migrations, the
//! [`PgStore`] reconciliation store, exception administration and run
//! report persistence.

mod store;

pub use sqlx::PgPool;
pub use store::PgStore;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use lm_reconcile::ReconciliationException;
use lm_schemas::ResourceKind;
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::Row;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

pub const ENV_DB_URL: &str = "LM_DATABASE_URL";

/// Connect to Postgres using LM_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    connect_from_env_var(ENV_DB_URL).await
}

/// Connect using the URL held by `var` (config `db.url_env`).
pub async fn connect_from_env_var(var: &str) -> Result<PgPool> {
    let url = std::env::var(var).with_context(|| format!("missing env var {var}"))?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .context("failed to connect to Postgres")?;

    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    /// Mirror tables (one per resource kind, exceptions included) that exist.
    pub tables_present: usize,
    pub tables_expected: usize,
    /// Unresolved exceptions, or `None` before the schema exists.
    pub open_exceptions: Option<i64>,
}

impl DbStatus {
    pub fn schema_ready(&self) -> bool {
        self.tables_present == self.tables_expected
    }
}

/// Connectivity, schema presence and the open exception count.
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    let expected: Vec<String> = ResourceKind::ALL
        .iter()
        .map(|k| k.table_name().to_string())
        .collect();
    let (present,): (i64,) = sqlx::query_as::<_, (i64,)>(
        r#"
        select count(*)::bigint
        from information_schema.tables
        where table_schema = 'public' and table_name = any($1)
        "#,
    )
    .bind(&expected)
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    let mut st = DbStatus {
        ok: one == 1,
        tables_present: present as usize,
        tables_expected: expected.len(),
        open_exceptions: None,
    };
    if st.schema_ready() {
        let (n,): (i64,) = sqlx::query_as::<_, (i64,)>(
            "select count(*)::bigint from reconciliation_exceptions where not resolved",
        )
        .fetch_one(pool)
        .await
        .context("status open-exceptions query failed")?;
        st.open_exceptions = Some(n);
    }
    Ok(st)
}

// ---------------------------------------------------------------------------
// Exceptions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct ExceptionFilter {
    pub include_resolved: bool,
    pub resource: Option<ResourceKind>,
}

fn exception_from_row(row: &PgRow) -> Result<ReconciliationException> {
    Ok(ReconciliationException {
        id: row.try_get("id")?,
        resource: row.try_get("resource")?,
        record_key: row.try_get("record_key")?,
        field_name: row.try_get("field_name")?,
        stored_value: row
            .try_get::<Option<Value>, _>("stored_value")?
            .unwrap_or(Value::Null),
        incoming_value: row
            .try_get::<Option<Value>, _>("incoming_value")?
            .unwrap_or(Value::Null),
        stored_kind: row.try_get("stored_kind")?,
        incoming_kind: row.try_get("incoming_kind")?,
        json_doc: row.try_get("json_doc")?,
        resolved: row.try_get("resolved")?,
        resolution: row.try_get("resolution")?,
        detected_at: row.try_get("detected_at")?,
        resolved_at: row.try_get("resolved_at")?,
    })
}

/// Exceptions ordered by detection time, oldest first.
pub async fn list_exceptions(
    pool: &PgPool,
    filter: &ExceptionFilter,
) -> Result<Vec<ReconciliationException>> {
    let rows = sqlx::query(
        r#"
        select id, resource, record_key, field_name, stored_value, incoming_value,
               stored_kind, incoming_kind, json_doc, resolved, resolution,
               detected_at, resolved_at
        from reconciliation_exceptions
        where ($1 or not resolved)
          and ($2::text is null or resource = $2)
        order by detected_at asc, id asc
        "#,
    )
    .bind(filter.include_resolved)
    .bind(filter.resource.map(|k| k.as_str()))
    .fetch_all(pool)
    .await
    .context("list_exceptions failed")?;

    rows.iter().map(exception_from_row).collect()
}

/// Mark an open exception resolved. Resolving is the only mutation an
/// exception ever sees; the mirror row it refers to stays untouched.
pub async fn resolve_exception(
    pool: &PgPool,
    id: i64,
    resolution: &str,
    now: DateTime<Utc>,
) -> Result<ReconciliationException> {
    if resolution.trim().is_empty() {
        bail!("resolution text must not be empty");
    }
    let row = sqlx::query(
        r#"
        update reconciliation_exceptions
        set resolved = true, resolution = $2, resolved_at = $3
        where id = $1 and not resolved
        returning id, resource, record_key, field_name, stored_value, incoming_value,
                  stored_kind, incoming_kind, json_doc, resolved, resolution,
                  detected_at, resolved_at
        "#,
    )
    .bind(id)
    .bind(resolution)
    .bind(now)
    .fetch_optional(pool)
    .await
    .context("resolve_exception failed")?;

    match row {
        Some(r) => {
            let exc = exception_from_row(&r)?;
            tracing::info!(id, resource = %exc.resource, key = %exc.record_key, field = %exc.field_name, "exception resolved");
            Ok(exc)
        }
        None => bail!("no open reconciliation exception with id {id}"),
    }
}

// ---------------------------------------------------------------------------
// Run reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct NewIngestRun {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub config_hash: Option<String>,
    pub halted: bool,
    pub report: Value,
}

pub async fn insert_ingest_run(pool: &PgPool, run: &NewIngestRun) -> Result<()> {
    sqlx::query(
        r#"
        insert into ingest_runs (
          run_id, started_at, finished_at, config_hash, halted, report
        ) values (
          $1, $2, $3, $4, $5, $6
        )
        "#,
    )
    .bind(run.run_id)
    .bind(run.started_at)
    .bind(run.finished_at)
    .bind(&run.config_hash)
    .bind(run.halted)
    .bind(&run.report)
    .execute(pool)
    .await
    .context("insert_ingest_run failed")?;

    Ok(())
}

/// Header of a persisted run report.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestRunSummary {
    pub run_id: Uuid,
    pub finished_at: DateTime<Utc>,
    pub config_hash: Option<String>,
    pub halted: bool,
}

/// Most recently finished run, if any.
pub async fn latest_ingest_run(pool: &PgPool) -> Result<Option<IngestRunSummary>> {
    let row = sqlx::query(
        "select run_id, finished_at, config_hash, halted from ingest_runs order by finished_at desc limit 1",
    )
    .fetch_optional(pool)
    .await
    .context("latest_ingest_run failed")?;

    match row {
        Some(r) => Ok(Some(IngestRunSummary {
            run_id: r.try_get("run_id")?,
            finished_at: r.try_get("finished_at")?,
            config_hash: r.try_get("config_hash")?,
            halted: r.try_get("halted")?,
        })),
        None => Ok(None),
    }
}
