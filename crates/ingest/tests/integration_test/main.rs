//! Integration tests for newsflow-ingest.
//!
//! Everything runs against the in-memory warehouse; no cloud access needed.

mod concurrency;
mod failures;
mod pipeline;

use std::sync::Arc;
use std::time::Duration;

use newsflow_core::{record, ColumnType, Field, Record, Schema, Value};
use newsflow_ingest::{IngestContext, Ingestor, TableRegistry, TableSpec};
use newsflow_warehouse::{MemoryWarehouse, TableRef};

/// The built-in tables plus a two-column `kv` table keyed on `key`.
pub fn registry() -> TableRegistry {
    let kv = TableSpec::new(
        "kv",
        Schema::new(vec![
            Field::nullable("key", ColumnType::Int64),
            Field::nullable("val", ColumnType::String),
        ])
        .unwrap(),
        &["key"],
        &[],
    )
    .unwrap();
    let builtin = TableRegistry::builtin().unwrap();
    let mut specs: Vec<TableSpec> = builtin.names().map(|n| builtin.lookup(n).unwrap().clone()).collect();
    specs.push(kv);
    TableRegistry::from_specs(specs).unwrap()
}

pub fn setup_with(warehouse: MemoryWarehouse, retries: u32, timeout: Duration) -> (Arc<MemoryWarehouse>, Ingestor) {
    let wh = Arc::new(warehouse);
    let ctx = IngestContext::new(wh.clone(), Arc::new(registry()), "mem", "sources")
        .with_transient_retries(retries)
        .with_call_timeout(timeout);
    (wh, Ingestor::new(ctx))
}

pub fn setup() -> (Arc<MemoryWarehouse>, Ingestor) {
    setup_with(MemoryWarehouse::new(), 0, Duration::from_secs(5))
}

pub fn target(table: &str) -> TableRef {
    TableRef::new("mem", "sources", table)
}

pub fn staging(table: &str) -> TableRef {
    TableRef::new("mem", "sources", &format!("{table}_staging"))
}

pub fn kv(key: i64, val: &str) -> Record {
    record! { "key" => key, "val" => val }
}

pub fn post(id: &str, title: &str, created_utc: f64) -> Record {
    record! {
        "id" => id,
        "title" => title,
        "url" => Value::Null,
        "description" => Value::Null,
        "created_utc" => created_utc,
        "subreddit" => "ethereum",
    }
}
