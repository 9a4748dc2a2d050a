//! `lm ingest` and `lm replay`.

use anyhow::{bail, Context, Result};
use lm_config::MirrorSettings;
use lm_db::{NewIngestRun, PgPool, PgStore};
use lm_ingest::{read_cache, CacheWriter, IngestReport, Ingestor, Plan};
use lm_reconcile::{MemoryStore, Store};
use lm_source::PageSource;

use super::{load_config, print_report};

pub struct IngestArgs {
    pub config_paths: Vec<String>,
    pub only: Vec<String>,
    pub cache_out: Option<String>,
    pub dry_run: bool,
    pub strict_config: bool,
}

struct Wiring<'a> {
    settings: &'a MirrorSettings,
    config_hash: &'a str,
    wallet: &'a dyn PageSource,
    exchange: Option<&'a dyn PageSource>,
}

async fn ingest_into<S: Store>(
    store: S,
    w: &Wiring<'_>,
    plan: &Plan,
    cache: Option<CacheWriter>,
) -> Result<IngestReport> {
    let mut ingestor = Ingestor::new(store, w.settings.ingest.on_failure)
        .with_wallet(w.wallet)
        .with_config_hash(w.config_hash);
    if let Some(ex) = w.exchange {
        ingestor = ingestor.with_exchange(ex);
    }
    if let Some(c) = cache {
        ingestor = ingestor.with_cache(c);
    }
    ingestor.run(plan).await
}

pub async fn run_ingest(args: IngestArgs) -> Result<IngestReport> {
    let loaded = load_config(&args.config_paths, args.strict_config)?;
    let settings = loaded.settings()?;
    let secrets = lm_config::secrets::resolve_secrets(&settings)?;

    let plan = match (args.only.as_slice(), &settings.ingest.collections) {
        ([], None) => Plan::default(),
        ([], Some(names)) => Plan::select(names.as_slice())?,
        (only, _) => Plan::select(only)?,
    };

    let (wallet, exchange) = lm_ingest::http_sources(&settings, &secrets);
    let cache = match args.cache_out.as_ref().or(settings.ingest.cache_path.as_ref()) {
        Some(path) => Some(CacheWriter::create(path)?),
        None => None,
    };
    let wiring = Wiring {
        settings: &settings,
        config_hash: &loaded.config_hash,
        wallet: &wallet,
        exchange: exchange.as_ref().map(|e| e as &dyn PageSource),
    };

    if args.dry_run {
        let report = ingest_into(MemoryStore::new(), &wiring, &plan, cache).await?;
        print_report(&report);
        println!("dry_run=true");
        return Ok(report);
    }

    let pool = connect_ready(&settings).await?;
    let report = ingest_into(PgStore::new(pool.clone()), &wiring, &plan, cache).await?;
    persist_report(&pool, &report).await?;
    print_report(&report);
    Ok(report)
}

pub async fn run_replay(cache: &str, config_paths: &[String], dry_run: bool) -> Result<IngestReport> {
    let settings = if config_paths.is_empty() {
        MirrorSettings::default()
    } else {
        load_config(config_paths, false)?.settings()?
    };
    let records = read_cache(cache)?;
    tracing::info!(path = cache, records = records.len(), "cache loaded");
    let policy = settings.ingest.on_failure;

    let report = if dry_run {
        Ingestor::new(MemoryStore::new(), policy).replay(&records).await
    } else {
        let pool = connect_ready(&settings).await?;
        let report = Ingestor::new(PgStore::new(pool.clone()), policy)
            .replay(&records)
            .await;
        persist_report(&pool, &report).await?;
        report
    };
    print_report(&report);
    if dry_run {
        println!("dry_run=true");
    }
    Ok(report)
}

async fn connect_ready(settings: &MirrorSettings) -> Result<PgPool> {
    let pool = lm_db::connect_from_env_var(&settings.db.url_env).await?;
    let status = lm_db::status(&pool).await?;
    if !status.schema_ready() {
        bail!(
            "mirror schema incomplete ({}/{} tables); run `lm db migrate` first",
            status.tables_present,
            status.tables_expected
        );
    }
    Ok(pool)
}

async fn persist_report(pool: &PgPool, report: &IngestReport) -> Result<()> {
    lm_db::insert_ingest_run(
        pool,
        &NewIngestRun {
            run_id: report.run_id,
            started_at: report.started_at,
            finished_at: report.finished_at,
            config_hash: report.config_hash.clone(),
            halted: report.halted(),
            report: report.to_json(),
        },
    )
    .await
    .context("persist ingest report failed")
}
