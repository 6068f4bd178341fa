//! Tests for the trait-provided `Warehouse::merge` built on `execute_statement`.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use newsflow_core::{Record, Schema};
use newsflow_warehouse::*;

/// Answers `execute_statement` from a script and records the SQL it saw.
struct ScriptedWarehouse {
    responses: Mutex<VecDeque<Result<QueryResult, WarehouseError>>>,
    seen: Mutex<Vec<String>>,
}

impl ScriptedWarehouse {
    fn new(responses: Vec<Result<QueryResult, WarehouseError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            seen: Mutex::new(Vec::new()),
        }
    }

    fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Warehouse for ScriptedWarehouse {
    async fn create_table_if_absent(
        &self,
        _table: &TableRef,
        _schema: &Schema,
    ) -> Result<TableCreation, WarehouseError> {
        Ok(TableCreation::AlreadyExists)
    }

    async fn load_rows(
        &self,
        _table: &TableRef,
        rows: &[Record],
        _schema: &Schema,
        _mode: WriteMode,
    ) -> Result<u64, WarehouseError> {
        Ok(rows.len() as u64)
    }

    async fn execute_statement(&self, sql: &str) -> Result<QueryResult, WarehouseError> {
        self.seen.lock().unwrap().push(sql.to_string());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(QueryResult::default()))
    }

    async fn list_tables(&self, _dataset: &str) -> Result<Vec<String>, WarehouseError> {
        Ok(vec![])
    }
}

fn counts(values: &[&str]) -> Result<QueryResult, WarehouseError> {
    Ok(QueryResult {
        columns: values
            .iter()
            .enumerate()
            .map(|(i, _)| QueryColumn { name: format!("_col{i}"), data_type: "bigint".into() })
            .collect(),
        rows: vec![values.iter().map(|v| Some(v.to_string())).collect()],
        metadata: QueryMetadata::default(),
    })
}

fn statement() -> MergeStatement {
    MergeStatement::new(
        TableRef::new("c", "sources", "reddit"),
        TableRef::new("c", "sources", "reddit_staging"),
        vec!["id".into()],
        vec!["id".into(), "title".into()],
    )
    .unwrap()
}

#[tokio::test]
async fn test_merge_reports_counts() {
    let wh = ScriptedWarehouse::new(vec![counts(&["0"]), counts(&["5", "2"]), Ok(QueryResult::default())]);

    let outcome = wh.merge(&statement()).await.unwrap();

    assert_eq!(outcome, MergeOutcome { rows_matched: 2, rows_inserted: 3 });
    let seen = wh.seen();
    assert_eq!(seen.len(), 3);
    assert!(seen[0].contains("HAVING COUNT(*) > 1"));
    assert!(seen[1].contains("LEFT JOIN"));
    assert!(seen[2].starts_with("MERGE INTO"));
}

#[tokio::test]
async fn test_merge_refuses_duplicates_without_merging() {
    let wh = ScriptedWarehouse::new(vec![counts(&["2"])]);

    let err = wh.merge(&statement()).await.unwrap_err();

    assert!(matches!(err, WarehouseError::AmbiguousMatch { duplicates: 2, .. }));
    assert!(wh.seen().iter().all(|sql| !sql.starts_with("MERGE")));
}

#[tokio::test]
async fn test_backend_ambiguity_is_classified() {
    let wh = ScriptedWarehouse::new(vec![
        counts(&["0"]),
        counts(&["1", "1"]),
        Err(WarehouseError::Rejected(
            "query q failed: MERGE_TARGET_ROW_MULTIPLE_MATCHES: target row matched more than one source row".into(),
        )),
    ]);

    let err = wh.merge(&statement()).await.unwrap_err();
    assert!(matches!(err, WarehouseError::AmbiguousMatch { .. }));
}

#[tokio::test]
async fn test_other_rejections_pass_through() {
    let wh = ScriptedWarehouse::new(vec![
        counts(&["0"]),
        counts(&["1", "0"]),
        Err(WarehouseError::Rejected("query q failed: SYNTAX_ERROR".into())),
    ]);

    let err = wh.merge(&statement()).await.unwrap_err();
    assert_eq!(err, WarehouseError::Rejected("query q failed: SYNTAX_ERROR".into()));
}

#[tokio::test]
async fn test_empty_duplicate_check_stops_merge() {
    let wh = ScriptedWarehouse::new(vec![Ok(QueryResult::default())]);

    let err = wh.merge(&statement()).await.unwrap_err();

    assert!(matches!(err, WarehouseError::Rejected(ref reason) if reason.contains("duplicate check")));
    assert_eq!(wh.seen().len(), 1);
    assert!(wh.seen().iter().all(|sql| !sql.starts_with("MERGE")));
}

#[tokio::test]
async fn test_garbled_duplicate_check_stops_merge() {
    let wh = ScriptedWarehouse::new(vec![counts(&["n/a"])]);

    let err = wh.merge(&statement()).await.unwrap_err();

    assert!(matches!(err, WarehouseError::Rejected(_)));
    assert!(wh.seen().iter().all(|sql| !sql.starts_with("MERGE")));
}

#[tokio::test]
async fn test_incomplete_match_count_stops_merge() {
    let wh = ScriptedWarehouse::new(vec![counts(&["0"]), counts(&["4"])]);

    let err = wh.merge(&statement()).await.unwrap_err();

    assert!(matches!(err, WarehouseError::Rejected(ref reason) if reason.contains("match count")));
    assert_eq!(wh.seen().len(), 2);
    assert!(wh.seen().iter().all(|sql| !sql.starts_with("MERGE")));
}
