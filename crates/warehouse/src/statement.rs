//! Key-based MERGE (upsert) statement.

use serde::{Deserialize, Serialize};

use crate::error::WarehouseError;
use crate::sql::{is_plain_identifier, quote_ident};
use crate::table::TableRef;

const TARGET_ALIAS: &str = "T";
const SOURCE_ALIAS: &str = "S";

/// Row counts reported by a completed merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MergeOutcome {
    /// Target rows overwritten from a matching source row.
    pub rows_matched: u64,
    /// Source rows inserted as new target rows.
    pub rows_inserted: u64,
}

/// Upsert of every `source` row into `target`, joined on all `key_columns`.
///
/// Matched target rows get every non-key column overwritten; unmatched source
/// rows are inserted with all columns; unmatched target rows are untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeStatement {
    pub target: TableRef,
    pub source: TableRef,
    pub key_columns: Vec<String>,
    /// All columns in schema order, keys included.
    pub columns: Vec<String>,
}

impl MergeStatement {
    pub fn new(
        target: TableRef,
        source: TableRef,
        key_columns: Vec<String>,
        columns: Vec<String>,
    ) -> Result<Self, WarehouseError> {
        if key_columns.is_empty() {
            return Err(WarehouseError::Rejected("merge requires at least one key column".into()));
        }
        if let Some(bad) = columns.iter().find(|c| !is_plain_identifier(c)) {
            return Err(WarehouseError::Rejected(format!("invalid column name '{bad}'")));
        }
        if let Some(missing) = key_columns.iter().find(|k| !columns.contains(k)) {
            return Err(WarehouseError::Rejected(format!(
                "key column '{missing}' is not among the merged columns"
            )));
        }
        Ok(Self {
            target,
            source,
            key_columns,
            columns,
        })
    }

    pub fn non_key_columns(&self) -> impl Iterator<Item = &String> {
        self.columns.iter().filter(|c| !self.key_columns.contains(c))
    }

    fn on_clause(&self) -> String {
        self.key_columns
            .iter()
            .map(|k| {
                let k = quote_ident(k);
                format!("{TARGET_ALIAS}.{k} = {SOURCE_ALIAS}.{k}")
            })
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    fn key_list(&self) -> String {
        self.key_columns
            .iter()
            .map(|k| quote_ident(k))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// The MERGE statement itself.
    pub fn to_sql(&self) -> String {
        let mut sql = format!(
            "MERGE INTO {} AS {TARGET_ALIAS}\nUSING {} AS {SOURCE_ALIAS}\nON {}",
            self.target.quoted(),
            self.source.quoted(),
            self.on_clause()
        );

        let assignments: Vec<String> = self
            .non_key_columns()
            .map(|c| {
                let c = quote_ident(c);
                format!("{c} = {SOURCE_ALIAS}.{c}")
            })
            .collect();
        // A table made only of key columns has nothing to update.
        if !assignments.is_empty() {
            sql.push_str("\nWHEN MATCHED THEN\n  UPDATE SET ");
            sql.push_str(&assignments.join(",\n    "));
        }

        let insert_cols: Vec<String> = self.columns.iter().map(|c| quote_ident(c)).collect();
        let insert_vals: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("{SOURCE_ALIAS}.{}", quote_ident(c)))
            .collect();
        sql.push_str(&format!(
            "\nWHEN NOT MATCHED THEN\n  INSERT ({})\n  VALUES ({})",
            insert_cols.join(", "),
            insert_vals.join(", ")
        ));
        sql
    }

    /// Counts key tuples that occur more than once in the source.
    pub fn duplicate_check_sql(&self) -> String {
        let keys = self.key_list();
        format!(
            "SELECT COUNT(*) FROM (SELECT {keys} FROM {} GROUP BY {keys} HAVING COUNT(*) > 1) AS dup",
            self.source.quoted()
        )
    }

    /// Returns one row: source row count, and how many of them match a target row.
    pub fn match_count_sql(&self) -> String {
        let first_key = quote_ident(&self.key_columns[0]);
        format!(
            "SELECT COUNT(*), COUNT({TARGET_ALIAS}.{first_key}) FROM {} AS {SOURCE_ALIAS} LEFT JOIN {} AS {TARGET_ALIAS} ON {}",
            self.source.quoted(),
            self.target.quoted(),
            self.on_clause()
        )
    }
}

/// Whether a backend failure message reports a target row matched by several source rows.
pub fn is_ambiguous_merge_reason(reason: &str) -> bool {
    let reason = reason.to_lowercase();
    reason.contains("merge_target_row_multiple_matches")
        || reason.contains("matched more than one source row")
        || reason.contains("must match at most one source row")
}
