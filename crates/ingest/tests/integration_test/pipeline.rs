//! End-to-end ingestion behaviour.

use newsflow_core::Value;
use newsflow_ingest::IngestError;

use crate::{kv, post, setup, staging, target};

#[tokio::test]
async fn edited_post_replaces_original() {
    let (wh, ingestor) = setup();
    let batch = vec![post("t5-a1", "X", 100.0), post("t5-a1", "X-edited", 200.0)];

    let report = ingestor.ingest(batch, "reddit").await.unwrap();

    assert_eq!(report.input_rows, 2);
    assert_eq!(report.deduped_rows, 1);
    assert_eq!(wh.rows(&staging("reddit")).unwrap(), vec![post("t5-a1", "X-edited", 200.0)]);
    assert_eq!(wh.rows(&target("reddit")).unwrap(), vec![post("t5-a1", "X-edited", 200.0)]);
}

#[tokio::test]
async fn merge_overwrites_and_inserts() {
    let (wh, ingestor) = setup();
    ingestor.ingest(vec![kv(1, "a")], "kv").await.unwrap();

    let report = ingestor.ingest(vec![kv(1, "b"), kv(2, "c")], "kv").await.unwrap();

    assert_eq!((report.rows_matched, report.rows_inserted), (1, 1));
    assert_eq!(wh.rows(&target("kv")).unwrap(), vec![kv(1, "b"), kv(2, "c")]);
}

#[tokio::test]
async fn target_rows_absent_from_batch_survive() {
    let (wh, ingestor) = setup();
    ingestor.ingest(vec![kv(1, "a"), kv(2, "b")], "kv").await.unwrap();
    ingestor.ingest(vec![kv(2, "B")], "kv").await.unwrap();

    assert_eq!(wh.rows(&target("kv")).unwrap(), vec![kv(1, "a"), kv(2, "B")]);
}

#[tokio::test]
async fn reingesting_the_same_batch_is_idempotent() {
    let (wh, ingestor) = setup();
    let batch = vec![
        post("t5-a1", "X", 100.0),
        post("t5-a2", "Y", 150.0),
        post("t5-a1", "X-edited", 200.0),
    ];

    let first = ingestor.ingest(batch.clone(), "reddit").await.unwrap();
    let after_first = wh.rows(&target("reddit")).unwrap();
    let second = ingestor.ingest(batch, "reddit").await.unwrap();

    assert_eq!(wh.rows(&target("reddit")).unwrap(), after_first);
    assert_eq!((first.rows_matched, first.rows_inserted), (0, 2));
    assert_eq!((second.rows_matched, second.rows_inserted), (2, 0));
    assert_ne!(first.run_id, second.run_id);
}

#[tokio::test]
async fn composite_keys_upsert_per_ticker_day() {
    use newsflow_core::record;

    let (wh, ingestor) = setup();
    let day = |d: &str, t: &str, close: f64| {
        record! {
            "date" => chrono_date(d), "ticker" => t, "open" => Value::Null, "high" => Value::Null,
            "low" => Value::Null, "close" => close, "volume" => Value::Null,
        }
    };

    ingestor
        .ingest(vec![day("2024-06-01", "BTC", 1.0), day("2024-06-01", "ETH", 2.0)], "yfinance_tickers")
        .await
        .unwrap();
    ingestor
        .ingest(vec![day("2024-06-01", "BTC", 1.5), day("2024-06-02", "BTC", 3.0)], "yfinance_tickers")
        .await
        .unwrap();

    let rows = wh.rows(&target("yfinance_tickers")).unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0]["close"], Value::Float64(1.5));
    assert_eq!(rows[1]["close"], Value::Float64(2.0));
}

fn chrono_date(s: &str) -> Value {
    Value::Date(s.parse().unwrap())
}

#[tokio::test]
async fn empty_batch_empties_staging_and_keeps_target() {
    let (wh, ingestor) = setup();
    ingestor.ingest(vec![kv(1, "a")], "kv").await.unwrap();

    let report = ingestor.ingest(vec![], "kv").await.unwrap();

    assert_eq!((report.rows_matched, report.rows_inserted), (0, 0));
    assert!(wh.rows(&staging("kv")).unwrap().is_empty());
    assert_eq!(wh.rows(&target("kv")).unwrap(), vec![kv(1, "a")]);
}

#[tokio::test]
async fn unknown_table_is_config_error() {
    let (_, ingestor) = setup();
    let err = ingestor.ingest(vec![kv(1, "a")], "unknown-table").await.unwrap_err();
    assert!(matches!(err, IngestError::Config { .. }));
}

#[tokio::test]
async fn list_tables_reports_created_tables() {
    let (_, ingestor) = setup();
    ingestor.ingest(vec![kv(1, "a")], "kv").await.unwrap();

    let mut tables = ingestor.list_tables().await.unwrap();
    tables.sort();
    assert_eq!(tables, vec!["kv", "kv_staging"]);
}
