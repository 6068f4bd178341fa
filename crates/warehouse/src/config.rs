use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use newsflow_core::config::{
    active_profile, profiled_env_opt, profiled_env_or, profiled_env_u32, profiled_env_u64,
};

/// Default S3 output location for Athena query results.
const DEFAULT_OUTPUT_LOCATION: &str = "s3://newsflow-athena-results/";

/// Default S3 prefix under which Iceberg table data lives.
const DEFAULT_TABLE_LOCATION: &str = "s3://newsflow-warehouse/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarehouseBackend {
    /// Iceberg tables queried through AWS Athena.
    Athena,
    /// In-process tables; nothing persists past the process.
    Memory,
}

impl FromStr for WarehouseBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "athena" => Ok(WarehouseBackend::Athena),
            "memory" => Ok(WarehouseBackend::Memory),
            other => Err(format!("unknown warehouse backend '{other}'")),
        }
    }
}

impl fmt::Display for WarehouseBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WarehouseBackend::Athena => write!(f, "athena"),
            WarehouseBackend::Memory => write!(f, "memory"),
        }
    }
}

// ── WarehouseConfig ──────────────────────────────────────────────

/// Warehouse connection settings.
///
/// Reads from environment variables with optional profile prefix.
/// When `NEWSFLOW_PROFILE=PROD`, checks `PROD_WAREHOUSE_DATASET` before `WAREHOUSE_DATASET`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarehouseConfig {
    pub backend: WarehouseBackend,
    /// Project (Athena data catalog) holding the dataset.
    pub project: String,
    /// Dataset (Athena database) holding every table.
    pub dataset: String,
    /// AWS region for Athena queries.
    pub region: String,
    /// Athena workgroup.
    pub workgroup: String,
    /// S3 path for query results.
    pub output_location: String,
    /// S3 prefix for table data; each table lives at `<prefix><table>/`.
    pub table_location: String,
    /// Query timeout in seconds.
    pub timeout_seconds: u32,
    /// Rows per `INSERT ... VALUES` statement when loading.
    pub insert_chunk_rows: usize,
}

impl WarehouseConfig {
    /// Build config from environment variables using the active profile.
    pub fn from_env() -> Self {
        Self::from_env_profiled(&active_profile())
    }

    /// Build config for a specific named profile.
    ///
    /// `ATHENA_REGION` falls back to `AWS_REGION` before using the default.
    pub fn from_env_profiled(profile: &str) -> Self {
        let region = profiled_env_opt(profile, "ATHENA_REGION")
            .or_else(|| profiled_env_opt(profile, "AWS_REGION"))
            .unwrap_or_else(|| "us-east-1".to_string());

        let backend = profiled_env_opt(profile, "WAREHOUSE_BACKEND")
            .and_then(|v| match v.parse() {
                Ok(b) => Some(b),
                Err(e) => {
                    tracing::warn!(error = %e, "falling back to athena backend");
                    None
                }
            })
            .unwrap_or(WarehouseBackend::Athena);

        let mut table_location =
            profiled_env_or(profile, "WAREHOUSE_TABLE_LOCATION", DEFAULT_TABLE_LOCATION);
        if !table_location.ends_with('/') {
            table_location.push('/');
        }

        Self {
            backend,
            project: profiled_env_or(profile, "WAREHOUSE_PROJECT", "AwsDataCatalog"),
            dataset: profiled_env_or(profile, "WAREHOUSE_DATASET", "sources"),
            region,
            workgroup: profiled_env_or(profile, "ATHENA_WORKGROUP", "primary"),
            output_location: profiled_env_or(
                profile,
                "ATHENA_OUTPUT_LOCATION",
                DEFAULT_OUTPUT_LOCATION,
            ),
            table_location,
            timeout_seconds: profiled_env_u32(profile, "ATHENA_TIMEOUT_SECONDS", 300),
            insert_chunk_rows: profiled_env_u64(profile, "WAREHOUSE_INSERT_CHUNK_ROWS", 500).max(1)
                as usize,
        }
    }

    /// Returns `true` for the memory backend, or when the Athena output location
    /// has been explicitly configured (differs from the placeholder default).
    pub fn is_configured(&self) -> bool {
        match self.backend {
            WarehouseBackend::Memory => true,
            WarehouseBackend::Athena => self.output_location != DEFAULT_OUTPUT_LOCATION,
        }
    }

    pub fn log_summary(&self) {
        tracing::info!(
            "  warehouse: backend={}, project={}, dataset={}, region={}, workgroup={}",
            self.backend,
            self.project,
            self.dataset,
            self.region,
            self.workgroup
        );
    }
}

// ── Tests ────────────────────────────────────────────────────────
