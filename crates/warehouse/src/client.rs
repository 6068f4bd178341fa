//! AWS Athena query execution client.
//!
//! Provides [`AthenaClient`] for executing SQL statements against AWS Athena,
//! with exponential-backoff polling, timeout enforcement (with cancellation),
//! and structured result parsing into [`QueryResult`].

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use aws_config::BehaviorVersion;
use aws_sdk_athena::types::{QueryExecution, QueryExecutionState};
use tracing::{debug, error, info, warn};

use crate::config::{WarehouseBackend, WarehouseConfig};
use crate::error::WarehouseError;
use crate::result::{QueryColumn, QueryMetadata, QueryResult};

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Client for executing statements against AWS Athena.
///
/// Wraps the AWS SDK Athena client and adds:
/// - Exponential-backoff polling with jitter
/// - Timeout enforcement with automatic cancellation
/// - Cancellation of queries whose caller stopped waiting
/// - Paged result parsing into [`QueryResult`]
pub struct AthenaClient {
    config: WarehouseConfig,
    athena_client: aws_sdk_athena::Client,
    /// Query ids started here that have not reached a terminal state.
    in_flight: Arc<Mutex<HashSet<String>>>,
}

/// How long a cancelled query may take to reach a terminal state.
const CANCEL_GRACE: Duration = Duration::from_secs(60);

/// Poll interval while waiting for in-flight queries to drain.
const IDLE_POLL: Duration = Duration::from_millis(250);

impl AthenaClient {
    /// Create a new [`AthenaClient`] from the given configuration.
    ///
    /// Returns [`WarehouseError::NotEnabled`] unless the Athena backend is selected.
    pub async fn new(config: WarehouseConfig) -> Result<Self, WarehouseError> {
        if config.backend != WarehouseBackend::Athena {
            return Err(WarehouseError::NotEnabled);
        }

        let region = aws_sdk_athena::config::Region::new(config.region.clone());
        let aws_cfg = aws_config::defaults(BehaviorVersion::latest())
            .region(region)
            .load()
            .await;

        let athena_client = aws_sdk_athena::Client::new(&aws_cfg);

        info!(
            region = %config.region,
            project = %config.project,
            dataset = %config.dataset,
            workgroup = %config.workgroup,
            "AthenaClient initialised"
        );

        Ok(Self {
            config,
            athena_client,
            in_flight: Arc::default(),
        })
    }

    pub fn config(&self) -> &WarehouseConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Public API
    // -----------------------------------------------------------------------

    /// Execute a SQL statement and wait for it to finish.
    ///
    /// 1. Start query execution
    /// 2. Poll until completion (with exponential backoff)
    /// 3. Fetch and parse every result page
    pub async fn execute_query(&self, sql: &str) -> Result<QueryResult, WarehouseError> {
        debug!(sql = %sql, "Starting Athena query");

        let start_resp = self
            .athena_client
            .start_query_execution()
            .query_string(sql)
            .client_request_token(uuid::Uuid::new_v4().to_string())
            .query_execution_context(
                aws_sdk_athena::types::QueryExecutionContext::builder()
                    .catalog(&self.config.project)
                    .database(&self.config.dataset)
                    .build(),
            )
            .result_configuration(
                aws_sdk_athena::types::ResultConfiguration::builder()
                    .output_location(&self.config.output_location)
                    .build(),
            )
            .work_group(&self.config.workgroup)
            .send()
            .await
            .map_err(|e| WarehouseError::AwsSdk(e.to_string()))?;

        let query_id = start_resp
            .query_execution_id()
            .ok_or_else(|| WarehouseError::AwsSdk("No query execution ID returned".into()))?
            .to_string();

        debug!(query_id = %query_id, "Query execution started");

        let guard = InFlightQuery::track(self, &query_id);
        let polled = self.poll_until_complete(&query_id).await;
        guard.finish();

        let query_execution = polled?;
        let metadata = Self::extract_metadata(&query_id, &query_execution);

        self.fetch_results(metadata).await
    }

    /// Wait until every query started through this client has finished,
    /// including ones cancelled because their caller went away.
    pub async fn wait_idle(&self) {
        loop {
            let pending = lock_ids(&self.in_flight).len();
            if pending == 0 {
                return;
            }
            debug!(pending, "waiting for in-flight queries");
            tokio::time::sleep(IDLE_POLL).await;
        }
    }

    /// Cancel a running Athena query.
    pub async fn cancel_query(&self, query_id: &str) -> Result<(), WarehouseError> {
        info!(query_id = %query_id, "Cancelling query");

        self.athena_client
            .stop_query_execution()
            .query_execution_id(query_id)
            .send()
            .await
            .map_err(|e| WarehouseError::AwsSdk(e.to_string()))?;

        Ok(())
    }

    // -----------------------------------------------------------------------
    // Private helpers
    // -----------------------------------------------------------------------

    /// Poll `GetQueryExecution` until the query reaches a terminal state,
    /// cancelling it once `timeout_seconds` have passed.
    async fn poll_until_complete(
        &self,
        query_id: &str,
    ) -> Result<QueryExecution, WarehouseError> {
        let started = Instant::now();
        let deadline = Duration::from_secs(self.config.timeout_seconds as u64);
        let mut backoff = PollBackoff::default();

        loop {
            let execution = self
                .athena_client
                .get_query_execution()
                .query_execution_id(query_id)
                .send()
                .await
                .map_err(|e| WarehouseError::AwsSdk(e.to_string()))?
                .query_execution()
                .cloned()
                .ok_or_else(|| WarehouseError::AwsSdk("GetQueryExecution returned no execution".into()))?;

            debug!(
                query_id = %query_id,
                state = ?execution.status().and_then(|s| s.state()),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "polled query"
            );

            if let Some(outcome) = terminal_outcome(query_id, &execution) {
                return outcome.map(|()| execution);
            }

            if started.elapsed() > deadline {
                warn!(query_id = %query_id, seconds = self.config.timeout_seconds, "query over deadline, cancelling");
                stop_and_wait(&self.athena_client, query_id).await;
                return Err(WarehouseError::Timeout {
                    operation: format!("query {query_id}"),
                    seconds: self.config.timeout_seconds as u64,
                });
            }

            tokio::time::sleep(backoff.next_delay()).await;
        }
    }

    /// Page through `GetQueryResults` and collect a [`QueryResult`].
    ///
    /// When `UpdateCount` is absent the first row of the first page repeats the
    /// column headers and is skipped.
    async fn fetch_results(&self, mut metadata: QueryMetadata) -> Result<QueryResult, WarehouseError> {
        let mut columns: Vec<QueryColumn> = Vec::new();
        let mut rows: Vec<Vec<Option<String>>> = Vec::new();
        let mut next_token: Option<String> = None;
        let mut first_page = true;

        loop {
            let output = self
                .athena_client
                .get_query_results()
                .query_execution_id(&metadata.query_id)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| WarehouseError::AwsSdk(e.to_string()))?;

            if first_page {
                metadata.rows_affected = output.update_count().map(|n| n.max(0) as u64);
            }

            if let Some(result_set) = output.result_set() {
                if columns.is_empty() {
                    columns = result_set
                        .result_set_metadata()
                        .map(|meta| {
                            meta.column_info()
                                .iter()
                                .map(|ci| QueryColumn {
                                    name: ci.name().to_string(),
                                    data_type: ci.r#type().to_string(),
                                })
                                .collect()
                        })
                        .unwrap_or_default();
                }

                let raw_rows = result_set.rows();
                let skip = if first_page && output.update_count().is_none() && !raw_rows.is_empty() {
                    1
                } else {
                    0
                };

                rows.extend(raw_rows.iter().skip(skip).map(|row| {
                    row.data()
                        .iter()
                        .map(|datum| datum.var_char_value().map(|v| v.to_string()))
                        .collect::<Vec<_>>()
                }));
            }

            first_page = false;
            match output.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }

        debug!(
            columns = columns.len(),
            rows = rows.len(),
            query_id = %metadata.query_id,
            "Parsed Athena results"
        );

        Ok(QueryResult {
            columns,
            rows,
            metadata,
        })
    }

    fn extract_metadata(query_id: &str, qe: &QueryExecution) -> QueryMetadata {
        let stats = qe.statistics();

        QueryMetadata {
            query_id: query_id.to_string(),
            bytes_scanned: stats.and_then(|s| s.data_scanned_in_bytes()).unwrap_or(0) as u64,
            execution_time_ms: stats
                .and_then(|s| s.engine_execution_time_in_millis())
                .unwrap_or(0) as u64,
            state: qe
                .status()
                .and_then(|s| s.state())
                .map(|s| format!("{:?}", s))
                .unwrap_or_else(|| "UNKNOWN".to_string()),
            rows_affected: None,
        }
    }
}

// ---------------------------------------------------------------------------
// In-flight tracking
// ---------------------------------------------------------------------------

fn lock_ids(ids: &Mutex<HashSet<String>>) -> std::sync::MutexGuard<'_, HashSet<String>> {
    ids.lock().unwrap_or_else(|p| p.into_inner())
}

/// Registers a started query and, if dropped before [`finish`](Self::finish),
/// cancels it in the background. The id stays registered until the query is
/// terminal, so [`AthenaClient::wait_idle`] covers orphaned queries too.
struct InFlightQuery {
    athena_client: aws_sdk_athena::Client,
    in_flight: Arc<Mutex<HashSet<String>>>,
    query_id: String,
    finished: bool,
}

impl InFlightQuery {
    fn track(client: &AthenaClient, query_id: &str) -> Self {
        lock_ids(&client.in_flight).insert(query_id.to_string());
        Self {
            athena_client: client.athena_client.clone(),
            in_flight: client.in_flight.clone(),
            query_id: query_id.to_string(),
            finished: false,
        }
    }

    /// The query reached a terminal state, or was cancelled and waited out.
    fn finish(mut self) {
        self.finished = true;
        lock_ids(&self.in_flight).remove(&self.query_id);
    }
}

impl Drop for InFlightQuery {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let query_id = std::mem::take(&mut self.query_id);
        let in_flight = self.in_flight.clone();
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            error!(query_id = %query_id, "caller dropped a running query outside a runtime, cannot cancel it");
            lock_ids(&in_flight).remove(&query_id);
            return;
        };

        warn!(query_id = %query_id, "caller stopped waiting, cancelling query");
        let athena_client = self.athena_client.clone();
        runtime.spawn(async move {
            stop_and_wait(&athena_client, &query_id).await;
            lock_ids(&in_flight).remove(&query_id);
        });
    }
}

/// Ask Athena to stop `query_id`, then poll until it is terminal or
/// [`CANCEL_GRACE`] has passed.
async fn stop_and_wait(athena_client: &aws_sdk_athena::Client, query_id: &str) {
    if let Err(e) = athena_client
        .stop_query_execution()
        .query_execution_id(query_id)
        .send()
        .await
    {
        warn!(query_id = %query_id, error = %e, "cancel failed");
    }

    let started = Instant::now();
    let mut backoff = PollBackoff::default();
    while started.elapsed() < CANCEL_GRACE {
        let execution = athena_client
            .get_query_execution()
            .query_execution_id(query_id)
            .send()
            .await
            .ok()
            .and_then(|out| out.query_execution().cloned());
        if execution.is_some_and(|e| terminal_outcome(query_id, &e).is_some()) {
            return;
        }
        tokio::time::sleep(backoff.next_delay()).await;
    }
    error!(query_id = %query_id, grace_secs = CANCEL_GRACE.as_secs(), "cancelled query did not stop in time");
}

// ---------------------------------------------------------------------------
// Polling helpers
// ---------------------------------------------------------------------------

/// Growing delay between status polls: 200 ms, times 1.5 per poll, capped at
/// 2 s, plus up to 100 ms of jitter.
struct PollBackoff {
    delay_ms: u64,
}

impl PollBackoff {
    const INITIAL_MS: u64 = 200;
    const MAX_MS: u64 = 2_000;

    fn next_delay(&mut self) -> Duration {
        let delay = Duration::from_millis(self.delay_ms + jitter_ms());
        self.delay_ms = (self.delay_ms * 3 / 2).min(Self::MAX_MS);
        delay
    }
}

impl Default for PollBackoff {
    fn default() -> Self {
        Self {
            delay_ms: Self::INITIAL_MS,
        }
    }
}

/// `Some` once the execution has finished: `Ok` on success, `Rejected` when
/// it failed or was cancelled. `None` while queued or running.
fn terminal_outcome(query_id: &str, execution: &QueryExecution) -> Option<Result<(), WarehouseError>> {
    let status = execution.status()?;
    match status.state()? {
        QueryExecutionState::Succeeded => Some(Ok(())),
        QueryExecutionState::Failed => {
            let reason = status.state_change_reason().unwrap_or("unknown");
            error!(query_id = %query_id, reason = %reason, "query failed");
            Some(Err(WarehouseError::Rejected(format!("query {query_id} failed: {reason}"))))
        }
        QueryExecutionState::Cancelled => {
            warn!(query_id = %query_id, "query was cancelled");
            Some(Err(WarehouseError::Rejected(format!("query {query_id} was cancelled"))))
        }
        _ => None,
    }
}

/// Jitter in `[0, 100)` ms from the sub-second part of the clock.
fn jitter_ms() -> u64 {
    (SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos()
        % 100) as u64
}
