use async_trait::async_trait;

use newsflow_core::RawRecord;

use crate::error::SourceError;

/// Fetches flat records from one upstream API.
///
/// A fetcher serves several source ids (e.g. one per subreddit); each call
/// fetches a single source and shares no mutable state with other calls.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Short name of the upstream, used for logs and snapshot file names.
    fn name(&self) -> &str;

    /// Fetch at most `limit` records from `source_id`.
    async fn fetch(&self, source_id: &str, limit: u32) -> Result<Vec<RawRecord>, SourceError>;
}
