//! Reconcile the staging table into the target table.

use tracing::{error, info};

use newsflow_warehouse::{MergeOutcome, MergeStatement};

use crate::context::IngestContext;
use crate::error::IngestError;
use crate::registry::TableSpec;

/// Counts reported by a completed merge.
pub type MergeResult = MergeOutcome;

/// The upsert from `spec`'s staging table into its target table.
pub fn merge_statement(ctx: &IngestContext, spec: &TableSpec) -> Result<MergeStatement, IngestError> {
    MergeStatement::new(
        ctx.target_ref(spec),
        ctx.staging_ref(spec),
        spec.key_columns().to_vec(),
        spec.schema().names(),
    )
    .map_err(|e| IngestError::from_warehouse(spec.name(), e))
}

/// Merge staging into target on all key columns, waiting for the commit.
///
/// Both tables must exist. Staging must hold at most one row per key;
/// otherwise nothing is applied and [`IngestError::AmbiguousMerge`] is returned.
pub async fn merge(ctx: &IngestContext, spec: &TableSpec) -> Result<MergeResult, IngestError> {
    let statement = merge_statement(ctx, spec)?;
    let result = ctx
        .call(spec, "merge", ctx.warehouse.merge(&statement))
        .await
        .inspect_err(|e| {
            if let IngestError::AmbiguousMerge { duplicates, .. } = e {
                error!(
                    table = %statement.target,
                    staging = %statement.source,
                    duplicates,
                    "staging holds duplicate keys, refusing to merge"
                );
            }
        })?;

    info!(
        table = %statement.target,
        matched = result.rows_matched,
        inserted = result.rows_inserted,
        "merge committed"
    );
    Ok(result)
}
