use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use newsflow_core::Config;
use newsflow_warehouse::{TableRef, Warehouse, WarehouseConfig, WarehouseError};

use crate::error::IngestError;
use crate::registry::{TableRegistry, TableSpec};

const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(600);
const DEFAULT_TRANSIENT_RETRIES: u32 = 2;
const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(300);

/// Everything an ingestion step needs, handed in instead of reached for globally.
pub struct IngestContext {
    pub warehouse: Arc<dyn Warehouse>,
    pub registry: Arc<TableRegistry>,
    /// Project (catalog) holding the dataset.
    pub project: String,
    /// Dataset (database) holding every target and staging table.
    pub dataset: String,
    /// Upper bound on any single warehouse call.
    pub call_timeout: Duration,
    /// Extra attempts for a step that failed transiently.
    pub transient_retries: u32,
    /// How long a retry waits for abandoned warehouse work before giving up.
    pub drain_timeout: Duration,
}

impl IngestContext {
    pub fn new(
        warehouse: Arc<dyn Warehouse>,
        registry: Arc<TableRegistry>,
        project: &str,
        dataset: &str,
    ) -> Self {
        Self {
            warehouse,
            registry,
            project: project.to_string(),
            dataset: dataset.to_string(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
            transient_retries: DEFAULT_TRANSIENT_RETRIES,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    /// Build from loaded configuration.
    pub fn from_config(
        warehouse: Arc<dyn Warehouse>,
        registry: Arc<TableRegistry>,
        config: &Config,
        warehouse_config: &WarehouseConfig,
    ) -> Self {
        Self::new(
            warehouse,
            registry,
            &warehouse_config.project,
            &warehouse_config.dataset,
        )
        .with_call_timeout(Duration::from_secs(config.ingest.call_timeout_seconds))
        .with_transient_retries(config.ingest.transient_retries)
        .with_drain_timeout(Duration::from_secs(config.ingest.drain_timeout_seconds))
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_transient_retries(mut self, retries: u32) -> Self {
        self.transient_retries = retries;
        self
    }

    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    pub fn target_ref(&self, spec: &TableSpec) -> TableRef {
        TableRef::new(&self.project, &self.dataset, spec.table())
    }

    pub fn staging_ref(&self, spec: &TableSpec) -> TableRef {
        TableRef::new(&self.project, &self.dataset, spec.staging_table())
    }

    /// Await one warehouse call under the call timeout, classifying failures
    /// against the logical table `spec`.
    ///
    /// On timeout the future is dropped but the backend may still be running
    /// it; call [`settle`](Self::settle) before issuing the same work again.
    pub(crate) async fn call<T, F>(
        &self,
        spec: &TableSpec,
        operation: &str,
        call: F,
    ) -> Result<T, IngestError>
    where
        F: Future<Output = Result<T, WarehouseError>>,
    {
        let outcome = match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(WarehouseError::Timeout {
                operation: operation.to_string(),
                seconds: self.call_timeout.as_secs(),
            }),
        };
        outcome.map_err(|e| IngestError::from_warehouse(spec.name(), e))
    }

    /// Wait, up to the drain timeout, until the warehouse has nothing running.
    /// Returns `false` if abandoned work may still be in progress.
    pub(crate) async fn settle(&self) -> bool {
        match tokio::time::timeout(self.drain_timeout, self.warehouse.wait_idle()).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!(error = %e, "could not confirm the warehouse is idle");
                false
            }
            Err(_) => false,
        }
    }
}
