//! In-process [`Warehouse`] with deterministic semantics.
//!
//! Used by tests and by the worker's dry-run mode. Supports fault injection
//! (fail the next call of a given kind) and artificial latency, and records
//! every call so ordering can be asserted.
//!
//! Latency runs on a detached task, so a call whose caller gives up keeps the
//! store busy until its delay is over, as a remote statement would. Such a
//! call never takes effect.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::debug;

use newsflow_core::{project, Record, Schema, Value};

use crate::error::WarehouseError;
use crate::result::QueryResult;
use crate::statement::{MergeOutcome, MergeStatement};
use crate::table::{TableCreation, TableRef, WriteMode};
use crate::traits::Warehouse;

/// Kind of warehouse call, for fault injection and the call log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateTable,
    LoadRows,
    ExecuteStatement,
    ListTables,
    Merge,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarehouseCall {
    pub operation: Operation,
    /// Table the call targeted, when it targets one.
    pub table: Option<String>,
}

struct MemoryTable {
    schema: Schema,
    rows: Vec<Record>,
}

#[derive(Default)]
struct MemoryState {
    tables: BTreeMap<TableRef, MemoryTable>,
    calls: Vec<WarehouseCall>,
    faults: VecDeque<(Operation, WarehouseError)>,
    delays: VecDeque<(Operation, Duration)>,
}

/// Calls currently in their latency window, whether or not anyone awaits them.
#[derive(Default)]
struct Activity {
    counts: Mutex<(usize, usize)>,
    idle: Notify,
}

impl Activity {
    fn counts(&self) -> std::sync::MutexGuard<'_, (usize, usize)> {
        self.counts.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn start(&self) {
        let mut counts = self.counts();
        counts.0 += 1;
        counts.1 = counts.1.max(counts.0);
    }

    fn end(&self) {
        let mut counts = self.counts();
        counts.0 -= 1;
        if counts.0 == 0 {
            self.idle.notify_waiters();
        }
    }
}

#[derive(Default)]
pub struct MemoryWarehouse {
    state: Mutex<MemoryState>,
    activity: Arc<Activity>,
    latency: Option<Duration>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency` before it takes effect.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make the next call of kind `operation` fail with `error`.
    pub fn fail_next(&self, operation: Operation, error: WarehouseError) {
        self.lock().faults.push_back((operation, error));
    }

    /// Make the next call of kind `operation` take `delay` instead of the
    /// configured latency.
    pub fn delay_next(&self, operation: Operation, delay: Duration) {
        self.lock().delays.push_back((operation, delay));
    }

    /// Most calls that were ever running at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.activity.counts().1
    }

    /// Rows currently stored in `table`, in insertion order.
    pub fn rows(&self, table: &TableRef) -> Option<Vec<Record>> {
        self.lock().tables.get(table).map(|t| t.rows.clone())
    }

    pub fn has_table(&self, table: &TableRef) -> bool {
        self.lock().tables.contains_key(table)
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<WarehouseCall> {
        self.lock().calls.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        // A panicking test thread must not wedge the other tests sharing this store.
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Wait out the call's latency, then log the call and pop a pending fault.
    async fn begin(&self, operation: Operation, table: Option<&TableRef>) -> Result<(), WarehouseError> {
        let delay = {
            let mut state = self.lock();
            let pending = state.delays.iter().position(|(op, _)| *op == operation);
            pending
                .and_then(|pos| state.delays.remove(pos))
                .map(|(_, delay)| delay)
                .or(self.latency)
        };
        self.activity.start();
        match delay {
            Some(delay) => {
                let activity = self.activity.clone();
                let busy = tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    activity.end();
                });
                busy.await
                    .map_err(|e| WarehouseError::Rejected(format!("in-memory call aborted: {e}")))?;
            }
            None => self.activity.end(),
        }
        let mut state = self.lock();
        state.calls.push(WarehouseCall {
            operation,
            table: table.map(|t| t.to_string()),
        });
        if let Some(pos) = state.faults.iter().position(|(op, _)| *op == operation) {
            if let Some((_, err)) = state.faults.remove(pos) {
                return Err(err);
            }
        }
        Ok(())
    }
}

fn key_of(record: &Record, keys: &[String]) -> Result<Vec<Value>, WarehouseError> {
    project(record, keys)
        .map(|values| values.into_iter().cloned().collect())
        .map_err(|missing| WarehouseError::Rejected(format!("row has no key column '{missing}'")))
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
    async fn create_table_if_absent(
        &self,
        table: &TableRef,
        schema: &Schema,
    ) -> Result<TableCreation, WarehouseError> {
        self.begin(Operation::CreateTable, Some(table)).await?;
        let mut state = self.lock();
        if state.tables.contains_key(table) {
            return Ok(TableCreation::AlreadyExists);
        }
        state.tables.insert(
            table.clone(),
            MemoryTable {
                schema: schema.clone(),
                rows: Vec::new(),
            },
        );
        debug!(table = %table, "created in-memory table");
        Ok(TableCreation::Created)
    }

    async fn load_rows(
        &self,
        table: &TableRef,
        rows: &[Record],
        schema: &Schema,
        mode: WriteMode,
    ) -> Result<u64, WarehouseError> {
        self.begin(Operation::LoadRows, Some(table)).await?;
        let mut state = self.lock();
        let stored = state
            .tables
            .get_mut(table)
            .ok_or_else(|| WarehouseError::NotFound(table.to_string()))?;

        let mismatch = |reason: String| WarehouseError::SchemaMismatch {
            table: table.to_string(),
            reason,
        };
        if stored.schema.names() != schema.names() {
            return Err(mismatch("declared schema differs from table schema".into()));
        }
        for row in rows {
            schema.validate(row).map_err(|e| mismatch(e.to_string()))?;
        }

        if mode == WriteMode::Truncate {
            stored.rows.clear();
        }
        stored.rows.extend(rows.iter().cloned());
        Ok(rows.len() as u64)
    }

    async fn execute_statement(&self, sql: &str) -> Result<QueryResult, WarehouseError> {
        self.begin(Operation::ExecuteStatement, None).await?;
        Err(WarehouseError::Rejected(format!(
            "in-memory warehouse cannot run raw SQL: {}",
            sql.lines().next().unwrap_or_default()
        )))
    }

    async fn list_tables(&self, dataset: &str) -> Result<Vec<String>, WarehouseError> {
        self.begin(Operation::ListTables, None).await?;
        Ok(self
            .lock()
            .tables
            .keys()
            .filter(|t| t.dataset == dataset)
            .map(|t| t.table.clone())
            .collect())
    }

    async fn wait_idle(&self) -> Result<(), WarehouseError> {
        loop {
            let idle = self.activity.idle.notified();
            if self.activity.counts().0 == 0 {
                return Ok(());
            }
            idle.await;
        }
    }

    async fn merge(&self, statement: &MergeStatement) -> Result<MergeOutcome, WarehouseError> {
        self.begin(Operation::Merge, Some(&statement.target)).await?;
        let mut state = self.lock();

        let source_rows = state
            .tables
            .get(&statement.source)
            .ok_or_else(|| WarehouseError::NotFound(statement.source.to_string()))?
            .rows
            .clone();
        if !state.tables.contains_key(&statement.target) {
            return Err(WarehouseError::NotFound(statement.target.to_string()));
        }

        // Refuse before touching the target so a failed merge changes nothing.
        let mut source_keys: Vec<Vec<Value>> = Vec::with_capacity(source_rows.len());
        let mut duplicates = 0u64;
        for row in &source_rows {
            let key = key_of(row, &statement.key_columns)?;
            if source_keys.contains(&key) {
                duplicates += 1;
            }
            source_keys.push(key);
        }
        if duplicates > 0 {
            return Err(WarehouseError::AmbiguousMatch {
                table: statement.source.to_string(),
                duplicates,
            });
        }

        let target = state
            .tables
            .get_mut(&statement.target)
            .ok_or_else(|| WarehouseError::NotFound(statement.target.to_string()))?;

        let mut outcome = MergeOutcome::default();
        for (source, key) in source_rows.iter().zip(source_keys) {
            let mut matched = None;
            for (idx, row) in target.rows.iter().enumerate() {
                if key_of(row, &statement.key_columns)? == key {
                    matched = Some(idx);
                    break;
                }
            }

            match matched {
                Some(idx) => {
                    let row = &mut target.rows[idx];
                    for column in statement.non_key_columns() {
                        let value = source.get(column).cloned().unwrap_or(Value::Null);
                        row.insert(column.clone(), value);
                    }
                    outcome.rows_matched += 1;
                }
                None => {
                    let row: Record = statement
                        .columns
                        .iter()
                        .map(|c| (c.clone(), source.get(c).cloned().unwrap_or(Value::Null)))
                        .collect();
                    target.rows.push(row);
                    outcome.rows_inserted += 1;
                }
            }
        }

        Ok(outcome)
    }
}
