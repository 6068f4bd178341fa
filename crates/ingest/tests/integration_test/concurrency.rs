//! Per-table single-flight and cross-table concurrency.

use std::time::Duration;

use newsflow_warehouse::{MemoryWarehouse, Operation};

use crate::{kv, post, setup_with, target};

const RUN: [Operation; 4] = [
    Operation::CreateTable,
    Operation::LoadRows,
    Operation::CreateTable,
    Operation::Merge,
];

fn slow() -> MemoryWarehouse {
    MemoryWarehouse::new().with_latency(Duration::from_millis(10))
}

#[tokio::test]
async fn same_table_runs_do_not_interleave() {
    let (wh, ingestor) = setup_with(slow(), 0, Duration::from_secs(5));

    let (a, b) = tokio::join!(
        ingestor.ingest(vec![kv(1, "a"), kv(2, "a")], "kv"),
        ingestor.ingest(vec![kv(1, "b")], "kv"),
    );
    a.unwrap();
    b.unwrap();

    let ops: Vec<Operation> = wh.calls().into_iter().map(|c| c.operation).collect();
    assert_eq!(ops, [RUN, RUN].concat());
    assert_eq!(wh.rows(&target("kv")).unwrap(), vec![kv(1, "b"), kv(2, "a")]);
}

#[tokio::test]
async fn different_tables_run_concurrently() {
    let (wh, ingestor) = setup_with(slow(), 0, Duration::from_secs(5));

    let (a, b) = tokio::join!(
        ingestor.ingest(vec![kv(1, "a")], "kv"),
        ingestor.ingest(vec![post("t5-a1", "X", 1.0)], "reddit"),
    );
    a.unwrap();
    b.unwrap();

    let calls = wh.calls();
    assert_eq!(calls.len(), 8);
    assert_eq!(calls[0].operation, Operation::CreateTable);
    assert_eq!(calls[1].operation, Operation::CreateTable);
    assert_ne!(calls[0].table, calls[1].table);
}
