use serde::{Deserialize, Serialize};

/// Column definition returned by a query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryColumn {
    /// Column name as declared in the result set.
    pub name: String,
    /// Backend data type (e.g. "varchar", "bigint", "double", "boolean", "timestamp").
    pub data_type: String,
}

/// Execution metadata for a completed statement.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryMetadata {
    /// Backend execution ID.
    pub query_id: String,
    /// Total bytes scanned during execution.
    pub bytes_scanned: u64,
    /// Engine execution time in milliseconds.
    pub execution_time_ms: u64,
    /// Final execution state ("SUCCEEDED", "FAILED", "CANCELLED").
    pub state: String,
    /// Rows written by a DML statement, when the backend reports it.
    pub rows_affected: Option<u64>,
}

/// Structured result set from a statement execution.
///
/// Rows are stored as `Vec<Option<String>>` where `None` represents SQL NULL.
/// Column ordering in each row matches the `columns` vector.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<QueryColumn>,
    pub rows: Vec<Vec<Option<String>>>,
    pub metadata: QueryMetadata,
}

impl QueryResult {
    /// Zero-based index of a column by name (case-sensitive).
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Cell at `row` in column `col`; `None` when absent or NULL.
    pub fn get_value(&self, row: usize, col: &str) -> Option<&str> {
        let col_idx = self.column_index(col)?;
        self.cell(row, col_idx)
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.rows.get(row)?.get(col)?.as_deref()
    }

    /// Parses the cell at `(row, col)` as an unsigned count.
    pub fn u64_at(&self, row: usize, col: usize) -> Option<u64> {
        self.cell(row, col)?.trim().parse().ok()
    }

    /// Values of the first column, skipping NULLs.
    pub fn first_column(&self) -> Vec<String> {
        self.rows
            .iter()
            .filter_map(|row| row.first().cloned().flatten())
            .collect()
    }
}
