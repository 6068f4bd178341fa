//! Step failures, timeouts and retries.

use std::sync::Arc;
use std::time::Duration;

use newsflow_core::record;
use newsflow_ingest::{IngestContext, IngestError, Ingestor};
use newsflow_warehouse::{MemoryWarehouse, Operation, WarehouseError};

use crate::{kv, registry, setup, setup_with, staging, target};

fn timeout() -> WarehouseError {
    WarehouseError::Timeout {
        operation: "injected".into(),
        seconds: 1,
    }
}

#[tokio::test]
async fn failed_staging_load_never_reaches_merge() {
    let (wh, ingestor) = setup();
    wh.fail_next(Operation::LoadRows, WarehouseError::Rejected("permission denied".into()));

    let err = ingestor.ingest(vec![kv(1, "a")], "kv").await.unwrap_err();

    assert!(matches!(err, IngestError::QueryExecution { .. }));
    assert!(wh.calls().iter().all(|c| c.operation != Operation::Merge));
    assert!(!wh.has_table(&target("kv")));
}

#[tokio::test]
async fn nonconforming_batch_is_schema_mismatch() {
    let (wh, ingestor) = setup();
    let bad = record! { "key" => 1i64, "val" => 42i64 };

    let err = ingestor.ingest(vec![bad], "kv").await.unwrap_err();

    assert!(matches!(err, IngestError::SchemaMismatch { ref table, .. } if table == "kv"));
    assert!(wh.calls().iter().all(|c| c.operation != Operation::LoadRows));
}

#[tokio::test]
async fn record_missing_key_is_schema_error() {
    let (wh, ingestor) = setup();
    let err = ingestor
        .ingest(vec![record! { "val" => "orphan" }], "kv")
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::Schema { .. }));
    assert!(wh.calls().is_empty());
}

#[tokio::test]
async fn slow_backend_surfaces_as_transient() {
    let (wh, ingestor) = setup_with(
        MemoryWarehouse::new().with_latency(Duration::from_millis(200)),
        0,
        Duration::from_millis(20),
    );

    let err = ingestor.ingest(vec![kv(1, "a")], "kv").await.unwrap_err();

    assert!(err.is_transient());
    assert!(!wh.has_table(&staging("kv")));
}

#[tokio::test]
async fn retry_waits_for_abandoned_load() {
    let (wh, ingestor) = setup_with(MemoryWarehouse::new(), 1, Duration::from_millis(50));
    wh.delay_next(Operation::LoadRows, Duration::from_millis(600));

    let report = ingestor.ingest(vec![kv(1, "a"), kv(2, "b")], "kv").await.unwrap();

    assert_eq!(report.rows_inserted, 2);
    // The retried load never ran alongside the one that timed out.
    assert_eq!(wh.peak_concurrency(), 1);
    assert_eq!(wh.rows(&staging("kv")).unwrap(), vec![kv(1, "a"), kv(2, "b")]);
    assert_eq!(wh.rows(&target("kv")).unwrap(), vec![kv(1, "a"), kv(2, "b")]);
}

#[tokio::test]
async fn no_retry_while_abandoned_load_still_runs() {
    let wh = Arc::new(MemoryWarehouse::new());
    wh.delay_next(Operation::LoadRows, Duration::from_secs(2));
    let ctx = IngestContext::new(wh.clone(), Arc::new(registry()), "mem", "sources")
        .with_transient_retries(3)
        .with_call_timeout(Duration::from_millis(50))
        .with_drain_timeout(Duration::from_millis(100));
    let ingestor = Ingestor::new(ctx);

    let err = ingestor.ingest(vec![kv(1, "a")], "kv").await.unwrap_err();

    assert!(err.is_transient());
    assert_eq!(wh.peak_concurrency(), 1);
    let creates = wh.calls().iter().filter(|c| c.operation == Operation::CreateTable).count();
    assert_eq!(creates, 1);
    assert!(wh.calls().iter().all(|c| c.operation != Operation::LoadRows));
}

#[tokio::test]
async fn transient_merge_failure_is_retried() {
    let (wh, ingestor) = setup_with(MemoryWarehouse::new(), 2, Duration::from_secs(5));
    wh.fail_next(Operation::Merge, timeout());

    let report = ingestor.ingest(vec![kv(1, "a")], "kv").await.unwrap();

    assert_eq!(report.rows_inserted, 1);
    let merges = wh.calls().iter().filter(|c| c.operation == Operation::Merge).count();
    assert_eq!(merges, 2);
    assert_eq!(wh.rows(&target("kv")).unwrap(), vec![kv(1, "a")]);
}

#[tokio::test]
async fn retries_are_bounded() {
    let (wh, ingestor) = setup_with(MemoryWarehouse::new(), 1, Duration::from_secs(5));
    wh.fail_next(Operation::LoadRows, timeout());
    wh.fail_next(Operation::LoadRows, timeout());

    let err = ingestor.ingest(vec![kv(1, "a")], "kv").await.unwrap_err();

    assert!(err.is_transient());
    let loads = wh.calls().iter().filter(|c| c.operation == Operation::LoadRows).count();
    assert_eq!(loads, 2);
}

#[tokio::test]
async fn permanent_failures_are_not_retried() {
    let (wh, ingestor) = setup_with(MemoryWarehouse::new(), 3, Duration::from_secs(5));
    wh.fail_next(Operation::Merge, WarehouseError::Rejected("syntax error".into()));

    let err = ingestor.ingest(vec![kv(1, "a")], "kv").await.unwrap_err();

    assert!(matches!(err, IngestError::QueryExecution { .. }));
    let merges = wh.calls().iter().filter(|c| c.operation == Operation::Merge).count();
    assert_eq!(merges, 1);
}

#[tokio::test]
async fn backend_ambiguity_is_not_retried() {
    let (wh, ingestor) = setup_with(MemoryWarehouse::new(), 3, Duration::from_secs(5));
    wh.fail_next(
        Operation::Merge,
        WarehouseError::AmbiguousMatch {
            table: "mem.sources.kv_staging".into(),
            duplicates: 1,
        },
    );

    let err = ingestor.ingest(vec![kv(1, "a")], "kv").await.unwrap_err();

    assert!(matches!(err, IngestError::AmbiguousMerge { duplicates: 1, .. }));
    assert!(wh.rows(&target("kv")).unwrap().is_empty());
}
