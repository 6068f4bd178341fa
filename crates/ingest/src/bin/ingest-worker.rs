//! ingest-worker: fetch news sources and upsert them into the warehouse.
//!
//! Each run fetches (or replays from a snapshot) one batch per requested
//! table and ingests it. A table that fails is logged and does not stop the
//! others. With `--interval-secs` the run repeats until Ctrl-C.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use futures::future::join_all;
use tracing::{error, info, warn};

use newsflow_core::config::{load_dotenv, Config};
use newsflow_core::RawRecord;
use newsflow_ingest::{IngestContext, Ingestor, TableRegistry};
use newsflow_sources::{fetch_all, snapshot, RedditFetcher};
use newsflow_warehouse::{
    AthenaWarehouse, MemoryWarehouse, Warehouse, WarehouseBackend, WarehouseConfig,
};

// ── CLI ─────────────────────────────────────────────────────────────

/// Fetch news sources and merge them into warehouse tables.
#[derive(Parser, Debug)]
#[command(name = "ingest-worker", version, about)]
struct Cli {
    /// Tables to ingest (repeatable).
    #[arg(long = "table", default_value = "reddit")]
    tables: Vec<String>,

    /// Config profile; overrides NEWSFLOW_PROFILE.
    #[arg(long)]
    profile: Option<String>,

    /// Per-source item limit; overrides FETCH_LIMIT.
    #[arg(long)]
    limit: Option<u32>,

    /// Ingest into an in-memory warehouse instead of the configured backend.
    #[arg(long)]
    dry_run: bool,

    /// Read batches from the snapshot directory instead of fetching.
    #[arg(long)]
    replay: bool,

    /// Print the tables present in the dataset and exit.
    #[arg(long)]
    list_tables: bool,

    /// Repeat every N seconds until interrupted.
    #[arg(long, env = "INGEST_INTERVAL_SECS")]
    interval_secs: Option<u64>,
}

// ── Fetching ────────────────────────────────────────────────────────

async fn fetch_batch(table: &str, config: &Config, limit: u32, replay: bool) -> Option<Vec<RawRecord>> {
    let snapshot_dir = config.fetch.snapshot_dir.as_deref();

    if replay {
        let Some(dir) = snapshot_dir else {
            error!(table, "--replay needs SNAPSHOT_DIR to be set");
            return None;
        };
        return match snapshot::load(dir, table) {
            Ok(records) => Some(records),
            Err(e) => {
                error!(table, error = %e, "failed to read snapshot");
                None
            }
        };
    }

    let records = match table {
        "reddit" => {
            let fetcher = RedditFetcher::new();
            fetch_all(&fetcher, &config.fetch.subreddits, limit, config.fetch.concurrency).await
        }
        other => {
            warn!(table = other, "no fetcher for table, use --replay with a snapshot");
            return None;
        }
    };

    if let Some(dir) = snapshot_dir {
        save_snapshot(dir, table, &records);
    }
    Some(records)
}

fn save_snapshot(dir: &Path, table: &str, records: &[RawRecord]) {
    if let Err(e) = snapshot::save(dir, table, records) {
        warn!(table, error = %e, "failed to write snapshot");
    }
}

// ── Run ─────────────────────────────────────────────────────────────

async fn run_once(ingestor: &Ingestor, cli: &Cli, config: &Config) {
    let limit = cli.limit.unwrap_or(config.fetch.limit);

    let runs = cli.tables.iter().map(|table| async move {
        let Some(records) = fetch_batch(table, config, limit, cli.replay).await else {
            return;
        };
        match ingestor.ingest_raw(&records, table).await {
            Ok(report) => info!(
                table = %report.table,
                run_id = %report.run_id,
                input = report.input_rows,
                deduped = report.deduped_rows,
                matched = report.rows_matched,
                inserted = report.rows_inserted,
                "table ingested"
            ),
            Err(e) => error!(table = %table, error = %e, "ingest failed"),
        }
    });
    join_all(runs).await;
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match &cli.profile {
        Some(profile) => Config::for_profile(profile),
        None => Config::from_env(),
    };
    config.log_summary();

    let mut warehouse_config = WarehouseConfig::from_env_profiled(&config.profile);
    if cli.dry_run {
        warehouse_config.backend = WarehouseBackend::Memory;
    }
    warehouse_config.log_summary();

    let warehouse: Arc<dyn Warehouse> = match warehouse_config.backend {
        WarehouseBackend::Athena => {
            if !warehouse_config.is_configured() {
                warn!("ATHENA_OUTPUT_LOCATION is not set, using the placeholder bucket");
            }
            Arc::new(AthenaWarehouse::connect(warehouse_config.clone()).await?)
        }
        WarehouseBackend::Memory => Arc::new(MemoryWarehouse::new()),
    };

    let registry = Arc::new(TableRegistry::builtin()?);
    for table in &cli.tables {
        registry.lookup(table)?;
    }

    let ctx = IngestContext::from_config(warehouse, registry, &config, &warehouse_config);
    let ingestor = Ingestor::new(ctx);

    if cli.list_tables {
        for table in ingestor.list_tables().await? {
            println!("{table}");
        }
        return Ok(());
    }

    info!(tables = ?cli.tables, "ingest-worker starting");

    let Some(interval_secs) = cli.interval_secs else {
        run_once(&ingestor, &cli, &config).await;
        return Ok(());
    };

    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    loop {
        tokio::select! {
            _ = interval.tick() => run_once(&ingestor, &cli, &config).await,
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, shutting down");
                break;
            }
        }
    }

    info!("ingest-worker exited cleanly");
    Ok(())
}
