//! Bounded fan-out over independent sources.

use futures::stream::{self, StreamExt};
use tracing::{error, info};

use newsflow_core::RawRecord;

use crate::traits::SourceFetcher;

/// Fetch every source in `sources` with at most `concurrency` requests in flight.
///
/// Results are concatenated in `sources` order regardless of completion order.
/// A failing source contributes nothing and is logged; this never fails.
pub async fn fetch_all<F>(fetcher: &F, sources: &[String], limit: u32, concurrency: usize) -> Vec<RawRecord>
where
    F: SourceFetcher + ?Sized,
{
    let per_source: Vec<Vec<RawRecord>> = stream::iter(sources)
        .map(|source_id| async move {
            match fetcher.fetch(source_id, limit).await {
                Ok(records) => {
                    info!(
                        fetcher = fetcher.name(),
                        source = %source_id,
                        records = records.len(),
                        "fetched source"
                    );
                    records
                }
                Err(e) => {
                    error!(
                        fetcher = fetcher.name(),
                        source = %source_id,
                        error = %e,
                        "source fetch failed, contributing no records"
                    );
                    Vec::new()
                }
            }
        })
        .buffered(concurrency.max(1))
        .collect()
        .await;

    per_source.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;

    use crate::error::SourceError;

    /// Serves canned records per source after a per-source delay.
    struct FakeFetcher {
        delays_ms: HashMap<String, u64>,
        failing: Vec<String>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl FakeFetcher {
        fn new(delays_ms: &[(&str, u64)], failing: &[&str]) -> Self {
            Self {
                delays_ms: delays_ms.iter().map(|(s, d)| (s.to_string(), *d)).collect(),
                failing: failing.iter().map(|s| s.to_string()).collect(),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SourceFetcher for FakeFetcher {
        fn name(&self) -> &str {
            "fake"
        }

        async fn fetch(&self, source_id: &str, limit: u32) -> Result<Vec<RawRecord>, SourceError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            let delay = self.delays_ms.get(source_id).copied().unwrap_or(1);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.failing.iter().any(|f| f == source_id) {
                return Err(SourceError::Status {
                    source_id: source_id.to_string(),
                    status: 503,
                });
            }
            Ok((0..limit)
                .map(|i| json!({ "id": format!("{source_id}-{i}") }).as_object().cloned().unwrap())
                .collect())
        }
    }

    fn ids(records: &[RawRecord]) -> Vec<String> {
        records
            .iter()
            .map(|r| r["id"].as_str().unwrap().to_string())
            .collect()
    }

    fn names(sources: &[&str]) -> Vec<String> {
        sources.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn keeps_source_order_when_completion_order_differs() {
        let fetcher = FakeFetcher::new(&[("a", 40), ("b", 5), ("c", 20)], &[]);
        let records = fetch_all(&fetcher, &names(&["a", "b", "c"]), 2, 3).await;
        assert_eq!(ids(&records), vec!["a-0", "a-1", "b-0", "b-1", "c-0", "c-1"]);
    }

    #[tokio::test]
    async fn failing_source_contributes_nothing() {
        let fetcher = FakeFetcher::new(&[], &["b"]);
        let records = fetch_all(&fetcher, &names(&["a", "b", "c"]), 1, 3).await;
        assert_eq!(ids(&records), vec!["a-0", "c-0"]);
    }

    #[tokio::test]
    async fn all_sources_failing_yields_empty() {
        let fetcher = FakeFetcher::new(&[], &["a", "b"]);
        assert!(fetch_all(&fetcher, &names(&["a", "b"]), 3, 2).await.is_empty());
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let sources: Vec<String> = (0..8).map(|i| format!("s{i}")).collect();
        let delays: Vec<(&str, u64)> = sources.iter().map(|s| (s.as_str(), 15)).collect();
        let fetcher = FakeFetcher::new(&delays, &[]);

        let records = fetch_all(&fetcher, &sources, 1, 3).await;

        assert_eq!(records.len(), 8);
        assert!(fetcher.max_in_flight.load(Ordering::SeqCst) <= 3);
    }
}
