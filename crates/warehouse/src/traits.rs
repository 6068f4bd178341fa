use async_trait::async_trait;
use tracing::error;

use newsflow_core::{Record, Schema};

use crate::error::WarehouseError;
use crate::result::QueryResult;
use crate::statement::{is_ambiguous_merge_reason, MergeOutcome, MergeStatement};
use crate::table::{TableCreation, TableRef, WriteMode};

/// A transactional, SQL-capable tabular store.
///
/// Every method waits for the backend to finish (or fail) before returning.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Create `table` with `schema` unless it already exists.
    async fn create_table_if_absent(
        &self,
        table: &TableRef,
        schema: &Schema,
    ) -> Result<TableCreation, WarehouseError>;

    /// Bulk-load `rows` into `table`. Returns the number of rows written.
    async fn load_rows(
        &self,
        table: &TableRef,
        rows: &[Record],
        schema: &Schema,
        mode: WriteMode,
    ) -> Result<u64, WarehouseError>;

    /// Run an arbitrary SQL statement to completion.
    async fn execute_statement(&self, sql: &str) -> Result<QueryResult, WarehouseError>;

    /// Names of the tables in `dataset`.
    async fn list_tables(&self, dataset: &str) -> Result<Vec<String>, WarehouseError>;

    /// Wait until no statement issued through this warehouse is still running,
    /// including statements whose caller stopped waiting for them.
    async fn wait_idle(&self) -> Result<(), WarehouseError> {
        Ok(())
    }

    /// Apply a key-based upsert.
    ///
    /// The default implementation refuses a source with duplicated keys, counts
    /// the source rows that already have a target row, then runs the MERGE.
    /// A duplicate check or count that cannot be read stops the merge before it runs.
    /// Callers must keep the source stable for the duration of the call.
    async fn merge(&self, statement: &MergeStatement) -> Result<MergeOutcome, WarehouseError> {
        let unreadable = |what: &str| {
            WarehouseError::Rejected(format!(
                "unreadable merge {what} result for {}",
                statement.source
            ))
        };

        let check = self.execute_statement(&statement.duplicate_check_sql()).await?;
        let duplicates = check.u64_at(0, 0).ok_or_else(|| unreadable("duplicate check"))?;
        if duplicates > 0 {
            return Err(WarehouseError::AmbiguousMatch {
                table: statement.source.to_string(),
                duplicates,
            });
        }

        let counts = self.execute_statement(&statement.match_count_sql()).await?;
        let staged = counts.u64_at(0, 0).ok_or_else(|| unreadable("match count"))?;
        let matched = counts.u64_at(0, 1).ok_or_else(|| unreadable("match count"))?;

        match self.execute_statement(&statement.to_sql()).await {
            Ok(_) => Ok(MergeOutcome {
                rows_matched: matched,
                rows_inserted: staged.saturating_sub(matched),
            }),
            Err(WarehouseError::Rejected(reason)) if is_ambiguous_merge_reason(&reason) => {
                error!(source = %statement.source, reason = %reason, "backend refused ambiguous merge");
                Err(WarehouseError::AmbiguousMatch {
                    table: statement.source.to_string(),
                    duplicates: 0,
                })
            }
            Err(e) => Err(e),
        }
    }
}
