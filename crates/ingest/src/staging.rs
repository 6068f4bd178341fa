//! Staging table: created once, fully replaced on every run.

use tracing::{debug, info};

use newsflow_core::Record;
use newsflow_warehouse::{TableCreation, WriteMode};

use crate::context::IngestContext;
use crate::error::IngestError;
use crate::registry::TableSpec;

/// Create the staging table for `spec` unless it exists.
pub async fn ensure_staging(ctx: &IngestContext, spec: &TableSpec) -> Result<TableCreation, IngestError> {
    let staging = ctx.staging_ref(spec);
    let creation = ctx
        .call(
            spec,
            "create staging table",
            ctx.warehouse.create_table_if_absent(&staging, spec.schema()),
        )
        .await?;
    debug!(table = %staging, ?creation, "staging table ready");
    Ok(creation)
}

/// Replace the full content of the staging table with `batch`.
///
/// Every record is checked against the schema before anything is written,
/// so a non-conforming batch leaves the staging table untouched.
pub async fn replace_staging(
    ctx: &IngestContext,
    spec: &TableSpec,
    batch: &[Record],
) -> Result<u64, IngestError> {
    for record in batch {
        spec.schema()
            .validate(record)
            .map_err(|e| IngestError::SchemaMismatch {
                table: spec.name().to_string(),
                reason: e.to_string(),
            })?;
    }

    let staging = ctx.staging_ref(spec);
    let written = ctx
        .call(
            spec,
            "load staging table",
            ctx.warehouse
                .load_rows(&staging, batch, spec.schema(), WriteMode::Truncate),
        )
        .await?;
    info!(table = %staging, rows = written, "staging table loaded");
    Ok(written)
}

/// Create the staging table if needed, then replace its content with `batch`.
pub async fn load_staging(
    ctx: &IngestContext,
    spec: &TableSpec,
    batch: &[Record],
) -> Result<u64, IngestError> {
    ensure_staging(ctx, spec).await?;
    replace_staging(ctx, spec, batch).await
}
