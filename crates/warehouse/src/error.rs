use thiserror::Error;

/// Errors surfaced by a [`Warehouse`](crate::Warehouse) backend.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WarehouseError {
    /// The backend integration is not enabled in configuration.
    #[error("warehouse backend is not enabled in config")]
    NotEnabled,

    /// A call did not complete within its deadline. Safe to retry.
    #[error("{operation} timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },

    /// A MERGE source contained more than one row for some key.
    #[error("merge source {table} has {duplicates} duplicated key(s)")]
    AmbiguousMatch { table: String, duplicates: u64 },

    /// Rows handed to a load do not fit the declared schema.
    #[error("schema mismatch on {table}: {reason}")]
    SchemaMismatch { table: String, reason: String },

    #[error("table {0} not found")]
    NotFound(String),

    /// The backend rejected the statement (syntax, permissions, failed query).
    #[error("statement rejected: {0}")]
    Rejected(String),

    /// An AWS SDK error (stringified).
    #[error("AWS SDK error: {0}")]
    AwsSdk(String),
}

impl WarehouseError {
    /// Whether retrying the same call from scratch may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, WarehouseError::Timeout { .. })
    }
}
