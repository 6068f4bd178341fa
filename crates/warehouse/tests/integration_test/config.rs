//! Tests for WarehouseConfig: environment loading and profiles.

use std::env;
use std::sync::Mutex;

use newsflow_warehouse::*;

// Env-based tests must run serially to avoid interfering with each other.
static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_warehouse_env() {
    let keys = [
        "NEWSFLOW_PROFILE",
        "WAREHOUSE_BACKEND",
        "WAREHOUSE_PROJECT",
        "WAREHOUSE_DATASET",
        "ATHENA_REGION",
        "ATHENA_OUTPUT_LOCATION",
        "ATHENA_TIMEOUT_SECONDS",
        "AWS_REGION",
        "TEST_WAREHOUSE_DATASET",
        "TEST_ATHENA_REGION",
        "TEST_ATHENA_OUTPUT_LOCATION",
    ];
    for k in keys {
        env::remove_var(k);
    }
}

#[test]
fn test_config_from_env() {
    let _lock = ENV_LOCK.lock().unwrap();
    clear_warehouse_env();

    env::set_var("WAREHOUSE_PROJECT", "market-volatility");
    env::set_var("WAREHOUSE_DATASET", "signals");
    env::set_var("ATHENA_REGION", "us-west-2");
    env::set_var("ATHENA_OUTPUT_LOCATION", "s3://my-bucket/results/");
    env::set_var("ATHENA_TIMEOUT_SECONDS", "600");

    let cfg = WarehouseConfig::from_env();

    assert_eq!(cfg.backend, WarehouseBackend::Athena);
    assert_eq!(cfg.project, "market-volatility");
    assert_eq!(cfg.dataset, "signals");
    assert_eq!(cfg.region, "us-west-2");
    assert_eq!(cfg.output_location, "s3://my-bucket/results/");
    assert_eq!(cfg.timeout_seconds, 600);
    assert!(cfg.is_configured());

    clear_warehouse_env();
}

#[test]
fn test_config_profile() {
    let _lock = ENV_LOCK.lock().unwrap();
    clear_warehouse_env();

    env::set_var("WAREHOUSE_DATASET", "base_db");
    env::set_var("NEWSFLOW_PROFILE", "test");
    env::set_var("TEST_WAREHOUSE_DATASET", "test_db");
    env::set_var("TEST_ATHENA_REGION", "eu-west-1");
    env::set_var("TEST_ATHENA_OUTPUT_LOCATION", "s3://test-bucket/");

    let cfg = WarehouseConfig::from_env();

    assert_eq!(cfg.dataset, "test_db");
    assert_eq!(cfg.region, "eu-west-1");
    assert_eq!(cfg.output_location, "s3://test-bucket/");

    clear_warehouse_env();
}

/// Requires valid AWS credentials, network access, and:
/// - `ATHENA_OUTPUT_LOCATION=s3://<your-bucket>/results/`
/// - `WAREHOUSE_DATASET=<existing database>`
///
/// Run with: `cargo test test_real_athena_list_tables -- --ignored`
#[test]
#[ignore]
fn test_real_athena_list_tables() {
    let rt = tokio::runtime::Runtime::new().unwrap();

    rt.block_on(async {
        let config = WarehouseConfig::from_env();
        let dataset = config.dataset.clone();
        let warehouse = AthenaWarehouse::connect(config)
            .await
            .expect("Failed to create Athena warehouse");

        let result = warehouse
            .execute_statement("SELECT 1 AS test_column")
            .await
            .expect("Query execution failed");
        assert_eq!(result.get_value(0, "test_column"), Some("1"));

        let tables = warehouse.list_tables(&dataset).await.expect("SHOW TABLES failed");
        println!("{} tables in {}", tables.len(), dataset);
    });
}
