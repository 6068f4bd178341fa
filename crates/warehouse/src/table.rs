use std::fmt;

use serde::{Deserialize, Serialize};

use crate::sql::quote_ident;

/// Fully-qualified table identifier: `project.dataset.table`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableRef {
    pub project: String,
    pub dataset: String,
    pub table: String,
}

impl TableRef {
    pub fn new(project: &str, dataset: &str, table: &str) -> Self {
        Self {
            project: project.to_string(),
            dataset: dataset.to_string(),
            table: table.to_string(),
        }
    }

    /// Quoted three-part name for DML, e.g. `"AwsDataCatalog"."sources"."reddit"`.
    pub fn quoted(&self) -> String {
        format!(
            "{}.{}.{}",
            quote_ident(&self.project),
            quote_ident(&self.dataset),
            quote_ident(&self.table)
        )
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.project, self.dataset, self.table)
    }
}

/// How a bulk load treats existing rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteMode {
    /// Keep existing rows and add the batch.
    Append,
    /// Replace the full table content with the batch.
    Truncate,
}

/// Result of an idempotent create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableCreation {
    Created,
    AlreadyExists,
}
