//! Ingestion orchestrator.
//!
//! One run for a table goes lookup → dedupe → ensure staging → load staging
//! → ensure target → merge. Each step must succeed before the next starts.
//! A failure stops the run where it is; staging is left as-is since the next
//! run truncates it anyway.
//!
//! Runs for the same table are serialized through a per-table async mutex,
//! as concurrent runs would race on the shared staging table. Different
//! tables run concurrently.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use newsflow_core::{RawRecord, Record};

use crate::context::IngestContext;
use crate::dedupe::dedupe;
use crate::error::IngestError;
use crate::merge::merge;
use crate::registry::TableSpec;
use crate::staging::load_staging;

/// First retry delay; doubles on every further attempt.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(200);

/// Summary of one successful ingestion run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestReport {
    pub run_id: Uuid,
    pub table: String,
    /// Records handed in by the caller.
    pub input_rows: usize,
    /// Records left after deduplication, all of them staged.
    pub deduped_rows: usize,
    pub rows_matched: u64,
    pub rows_inserted: u64,
    pub elapsed_ms: u64,
}

pub struct Ingestor {
    ctx: Arc<IngestContext>,
    locks: HashMap<String, Arc<Mutex<()>>>,
}

impl Ingestor {
    pub fn new(ctx: IngestContext) -> Self {
        let locks = ctx
            .registry
            .names()
            .map(|name| (name.to_string(), Arc::new(Mutex::new(()))))
            .collect();
        Self {
            ctx: Arc::new(ctx),
            locks,
        }
    }

    pub fn context(&self) -> &IngestContext {
        &self.ctx
    }

    /// Upsert `batch` into the table registered as `table_name`.
    pub async fn ingest(&self, batch: Vec<Record>, table_name: &str) -> Result<IngestReport, IngestError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("ingest", table = %table_name, run_id = %run_id);
        self.run(run_id, batch, table_name).instrument(span).await
    }

    /// Normalize fetched records against the table schema, then [`ingest`](Self::ingest) them.
    pub async fn ingest_raw(
        &self,
        raw: &[RawRecord],
        table_name: &str,
    ) -> Result<IngestReport, IngestError> {
        let spec = self.ctx.registry.lookup(table_name)?;
        let batch = raw
            .iter()
            .map(|r| spec.schema().normalize(r))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| IngestError::Schema {
                table: table_name.to_string(),
                source,
            })?;
        self.ingest(batch, table_name).await
    }

    /// Tables currently present in the configured dataset.
    pub async fn list_tables(&self) -> Result<Vec<String>, IngestError> {
        let dataset = &self.ctx.dataset;
        match tokio::time::timeout(self.ctx.call_timeout, self.ctx.warehouse.list_tables(dataset)).await {
            Ok(Ok(tables)) => Ok(tables),
            Ok(Err(e)) => Err(IngestError::from_warehouse(dataset, e)),
            Err(_) => Err(IngestError::TransientIo {
                table: dataset.clone(),
                reason: format!("listing tables timed out after {:?}", self.ctx.call_timeout),
            }),
        }
    }

    async fn run(&self, run_id: Uuid, batch: Vec<Record>, table_name: &str) -> Result<IngestReport, IngestError> {
        let started = Instant::now();
        let ctx = &*self.ctx;

        // 1. lookup
        let spec = ctx.registry.lookup(table_name)?;
        let lock = self
            .locks
            .get(spec.name())
            .ok_or_else(|| IngestError::unknown_table(table_name))?;
        let _guard = lock.lock().await;
        debug!("acquired table lock");

        // 2. dedupe
        let input_rows = batch.len();
        let deduped = dedupe(batch, spec.key_columns(), spec.tie_break_columns()).map_err(|source| {
            IngestError::Schema {
                table: spec.name().to_string(),
                source,
            }
        })?;
        info!(input = input_rows, deduped = deduped.len(), "batch deduplicated");

        // 3 + 4. ensure staging, load staging
        let rows = deduped.as_slice();
        self.with_retries(spec, "load staging", move || load_staging(ctx, spec, rows))
            .await?;

        // 5. ensure target
        let target = ctx.target_ref(spec);
        let target = &target;
        self.with_retries(spec, "create target", move || {
            ctx.call(
                spec,
                "create target table",
                ctx.warehouse.create_table_if_absent(target, spec.schema()),
            )
        })
        .await?;

        // 6. merge
        let merged = self.with_retries(spec, "merge", move || merge(ctx, spec)).await?;

        let report = IngestReport {
            run_id,
            table: spec.name().to_string(),
            input_rows,
            deduped_rows: deduped.len(),
            rows_matched: merged.rows_matched,
            rows_inserted: merged.rows_inserted,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            matched = report.rows_matched,
            inserted = report.rows_inserted,
            elapsed_ms = report.elapsed_ms,
            "ingest complete"
        );
        Ok(report)
    }

    /// Run `step`, rerunning it from scratch after transient failures with
    /// exponential backoff. Permanent failures return immediately.
    ///
    /// A retry only starts once the warehouse is idle, so it never overlaps
    /// statements left running by the attempt that timed out.
    async fn with_retries<T, F, Fut>(&self, spec: &TableSpec, step: &str, mut attempt: F) -> Result<T, IngestError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, IngestError>>,
    {
        let mut retries = 0u32;
        loop {
            match attempt().await {
                Err(e) if e.is_transient() && retries < self.ctx.transient_retries => {
                    if !self.ctx.settle().await {
                        error!(
                            table = %spec.name(),
                            step,
                            drain_secs = self.ctx.drain_timeout.as_secs(),
                            error = %e,
                            "earlier attempt still running, not retrying"
                        );
                        return Err(e);
                    }
                    let delay = RETRY_BASE_DELAY * 2u32.saturating_pow(retries);
                    retries += 1;
                    warn!(
                        table = %spec.name(),
                        step,
                        attempt = retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient failure, retrying step"
                    );
                    tokio::time::sleep(delay).await;
                }
                outcome => return outcome,
            }
        }
    }
}
