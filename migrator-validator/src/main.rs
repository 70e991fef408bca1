//! migrator-validator - Consistency check between two SQLite stores
//!
//! Compares one table of a base database with the same table of a target
//! database while a migration writes to both. Reports are written as JSON
//! lines to stdout (or a file); logs go to stderr.

use anyhow::{Context, Result};
use clap::Parser;
use migrator_common::config::TomlConfig;
use migrator_validator::store::connect_readonly;
use migrator_validator::{
    ErrorPolicy, ForwardStrategy, JsonLinesSink, ReportSink, SqliteStore, StoreAccessor, TableRow,
    Validator, ValidatorConfig,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "migrator-validator", version, about = "Report drift between a base and a target SQLite store")]
struct Args {
    /// Base (source) database file
    #[arg(long)]
    base: PathBuf,

    /// Target (destination) database file
    #[arg(long)]
    target: PathBuf,

    /// Table to compare; must have an integer `id` primary key
    #[arg(long)]
    table: String,

    /// Label attached to every report (default: "<base>-><target>")
    #[arg(long)]
    direction: Option<String>,

    #[arg(long)]
    batch_size: Option<usize>,

    /// Only check base rows modified at or after this epoch-millisecond time
    #[arg(long)]
    since: Option<i64>,

    /// Keep tailing the base store, polling at this interval
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    #[arg(long)]
    read_timeout_ms: Option<u64>,

    /// Forward scan strategy: row or batch
    #[arg(long)]
    strategy: Option<ForwardStrategy>,

    /// Store error policy: skip or abort
    #[arg(long = "on-error")]
    error_policy: Option<ErrorPolicy>,

    /// Modification-time column used with --since
    #[arg(long)]
    watermark_column: Option<String>,

    /// Column excluded from comparison (repeatable)
    #[arg(long = "ignore-column")]
    ignore_columns: Vec<String>,

    /// Config file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Report output file, or "-" for stdout
    #[arg(long, default_value = "-")]
    output: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (toml_config, config_source) = TomlConfig::load_or_default(args.config.as_deref())?;

    init_tracing(&toml_config.logging.level);

    // Build identification first, before any database work
    info!(
        "Starting migrator-validator v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    config_source.log();

    let config = build_config(&args, &toml_config)?;

    let base = open_store(&args.base, &args, &toml_config).await?;
    let target = open_store(&args.target, &args, &toml_config).await?;
    let sink = open_sink(&args.output).await?;

    let validator = Validator::new(base, target, sink, config);

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested, stopping validation");
            shutdown.cancel();
        }
    });

    match validator.validate(&cancel).await {
        Ok(summary) => {
            info!(
                run_id = %summary.run_id,
                not_equal = summary.forward.not_equal,
                target_missing = summary.forward.target_missing,
                base_missing = summary.reverse.base_missing,
                failed_publications =
                    summary.forward.failed_publications + summary.reverse.failed_publications,
                "Validation complete"
            );
            Ok(())
        }
        Err(e) => {
            error!("Validation failed: {}", e);
            Err(e.into())
        }
    }
}

fn init_tracing(level: &str) {
    let default_level = level.parse::<tracing::Level>().unwrap_or(tracing::Level::INFO);
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .init();
}

/// Command line flags override the `[validator]` section, which overrides defaults
fn build_config(args: &Args, toml_config: &TomlConfig) -> Result<ValidatorConfig> {
    let mut config = ValidatorConfig::from_section(&toml_config.validator)?;

    if let Some(direction) = &args.direction {
        config.direction = direction.clone();
    }
    if config.direction.is_empty() {
        config.direction = format!("{}->{}", file_label(&args.base), file_label(&args.target));
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if args.since.is_some() {
        config.watermark = args.since;
    }
    if let Some(ms) = args.poll_interval_ms {
        config.poll_interval = Duration::from_millis(ms);
    }
    if let Some(ms) = args.read_timeout_ms {
        config.read_timeout = Duration::from_millis(ms);
    }
    if let Some(strategy) = args.strategy {
        config.forward_strategy = strategy;
    }
    if let Some(policy) = args.error_policy {
        config.error_policy = policy;
    }

    config.check()?;
    Ok(config)
}

fn file_label(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

async fn open_store(
    db_path: &Path,
    args: &Args,
    toml_config: &TomlConfig,
) -> Result<Arc<dyn StoreAccessor<TableRow>>> {
    let pool = connect_readonly(db_path)
        .await
        .with_context(|| format!("Failed to open {} read-only", db_path.display()))?;
    info!("✓ Connected to {} (read-only)", db_path.display());

    let section = &toml_config.validator;
    let mut store = SqliteStore::<TableRow>::new(pool, &args.table)?;
    if let Some(column) = args
        .watermark_column
        .as_deref()
        .or(section.watermark_column.as_deref())
    {
        store = store.with_watermark_column(column)?;
    }
    if !args.ignore_columns.is_empty() {
        store = store.with_ignored_columns(args.ignore_columns.clone());
    } else if !section.ignore_columns.is_empty() {
        store = store.with_ignored_columns(section.ignore_columns.clone());
    }

    Ok(Arc::new(store))
}

async fn open_sink(output: &str) -> Result<Arc<dyn ReportSink>> {
    if output == "-" {
        return Ok(Arc::new(JsonLinesSink::new(tokio::io::stdout())));
    }

    let file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(output)
        .await
        .with_context(|| format!("Failed to open report output {}", output))?;
    info!("Writing reports to {}", output);
    Ok(Arc::new(JsonLinesSink::new(file)))
}
