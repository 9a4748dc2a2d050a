use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "lm")]
#[command(about = "Ledger mirror: ingest upstream wallet/exchange data and reconcile it", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> env -> local...)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Walk the upstream collections and reconcile them into the mirror
    Ingest {
        /// Layered config paths in merge order
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        /// Restrict the run to these collections (overrides ingest.collections)
        #[arg(long = "only", value_delimiter = ',')]
        only: Vec<String>,

        /// Write every flat record to this JSON Lines file (overrides ingest.cache_path)
        #[arg(long = "cache-out")]
        cache_out: Option<String>,

        /// Reconcile into an in-memory store; the database is not touched
        #[arg(long, default_value_t = false)]
        dry_run: bool,

        /// Fail on config keys nothing reads instead of warning
        #[arg(long, default_value_t = false)]
        strict_config: bool,
    },

    /// Reconcile a cache file again without calling the upstream APIs
    Replay {
        /// JSON Lines cache written by `lm ingest --cache-out`
        #[arg(long)]
        cache: String,

        /// Optional layered config (db.url_env, ingest.on_failure)
        #[arg(long = "config")]
        config_paths: Vec<String>,

        /// Reconcile into an in-memory store; the database is not touched
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },

    /// Reconciliation exception administration
    Exceptions {
        #[command(subcommand)]
        cmd: ExceptionsCmd,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,

    /// Apply SQL migrations (idempotent).
    Migrate,
}

#[derive(Subcommand)]
enum ExceptionsCmd {
    /// Print exceptions, open ones only unless --all
    List {
        #[arg(long, default_value_t = false)]
        all: bool,

        /// Only this resource kind (e.g. account, ledger_entry)
        #[arg(long)]
        resource: Option<String>,
    },

    /// Mark an open exception resolved
    Resolve {
        #[arg(long)]
        id: i64,

        /// Operator note explaining the resolution
        #[arg(long)]
        resolution: String,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let _ = dotenvy::from_filename(".env.local");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = lm_db::connect_from_env().await?;
            match cmd {
                DbCmd::Status => {
                    let s = lm_db::status(&pool).await?;
                    println!(
                        "db_ok={} tables_present={}/{} open_exceptions={}",
                        s.ok,
                        s.tables_present,
                        s.tables_expected,
                        s.open_exceptions
                            .map(|n| n.to_string())
                            .unwrap_or_else(|| "n/a".to_string())
                    );
                    if s.schema_ready() {
                        match lm_db::latest_ingest_run(&pool).await? {
                            Some(run) => println!(
                                "last_run={} finished_at={} halted={} config_hash={}",
                                run.run_id,
                                run.finished_at.to_rfc3339(),
                                run.halted,
                                run.config_hash.as_deref().unwrap_or("-")
                            ),
                            None => println!("last_run=none"),
                        }
                    }
                }
                DbCmd::Migrate => {
                    lm_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = lm_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Ingest {
            config_paths,
            only,
            cache_out,
            dry_run,
            strict_config,
        } => {
            let report = commands::ingest::run_ingest(commands::ingest::IngestArgs {
                config_paths,
                only,
                cache_out,
                dry_run,
                strict_config,
            })
            .await?;
            return Ok(commands::exit_for(&report));
        }

        Commands::Replay {
            cache,
            config_paths,
            dry_run,
        } => {
            let report = commands::ingest::run_replay(&cache, &config_paths, dry_run).await?;
            return Ok(commands::exit_for(&report));
        }

        Commands::Exceptions { cmd } => {
            let pool = lm_db::connect_from_env().await?;
            match cmd {
                ExceptionsCmd::List { all, resource } => {
                    commands::exceptions::list(&pool, all, resource.as_deref()).await?;
                }
                ExceptionsCmd::Resolve { id, resolution } => {
                    commands::exceptions::resolve(&pool, id, &resolution).await?;
                }
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
