use thiserror::Error;

use newsflow_core::SchemaError;
use newsflow_warehouse::WarehouseError;

/// Failure of one ingestion run. Every variant names the table it concerns.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IngestError {
    /// Unknown table or invalid table definition.
    #[error("config error for '{table}': {reason}")]
    Config { table: String, reason: String },

    /// A record lacks a key or tie-break column, or cannot be normalized.
    #[error("schema error in '{table}': {source}")]
    Schema {
        table: String,
        #[source]
        source: SchemaError,
    },

    /// The batch does not conform to the table schema at load time.
    #[error("schema mismatch loading '{table}': {reason}")]
    SchemaMismatch { table: String, reason: String },

    /// A warehouse call timed out. The failed step may be retried from scratch.
    #[error("transient I/O failure on '{table}': {reason}")]
    TransientIo { table: String, reason: String },

    /// Staging held more than one row for some key when the merge ran.
    #[error("ambiguous merge into '{table}': {duplicates} duplicated staging key(s)")]
    AmbiguousMerge { table: String, duplicates: u64 },

    /// The warehouse rejected a statement.
    #[error("query failed on '{table}': {reason}")]
    QueryExecution { table: String, reason: String },
}

impl IngestError {
    pub fn unknown_table(name: &str) -> Self {
        IngestError::Config {
            table: name.to_string(),
            reason: "no such table is registered".into(),
        }
    }

    /// Classify a backend error observed while working on `table`.
    pub fn from_warehouse(table: &str, err: WarehouseError) -> Self {
        let table = table.to_string();
        match err {
            WarehouseError::Timeout { .. } => IngestError::TransientIo {
                table,
                reason: err.to_string(),
            },
            WarehouseError::AmbiguousMatch { duplicates, .. } => {
                IngestError::AmbiguousMerge { table, duplicates }
            }
            WarehouseError::SchemaMismatch { reason, .. } => {
                IngestError::SchemaMismatch { table, reason }
            }
            WarehouseError::NotEnabled
            | WarehouseError::NotFound(_)
            | WarehouseError::Rejected(_)
            | WarehouseError::AwsSdk(_) => IngestError::QueryExecution {
                table,
                reason: err.to_string(),
            },
        }
    }

    /// Whether rerunning the failed step may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, IngestError::TransientIo { .. })
    }

    pub fn table(&self) -> &str {
        match self {
            IngestError::Config { table, .. }
            | IngestError::Schema { table, .. }
            | IngestError::SchemaMismatch { table, .. }
            | IngestError::TransientIo { table, .. }
            | IngestError::AmbiguousMerge { table, .. }
            | IngestError::QueryExecution { table, .. } => table,
        }
    }
}
