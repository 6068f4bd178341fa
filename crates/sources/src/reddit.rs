//! Reddit `/new` listing fetcher.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use newsflow_core::RawRecord;

use crate::error::SourceError;
use crate::traits::SourceFetcher;

const BASE_URL: &str = "https://www.reddit.com";

/// Reddit refuses requests without a browser-like agent.
const USER_AGENT: &str = "Mozilla/5.0";

/// Fetches the newest posts of a subreddit; the source id is the subreddit name.
pub struct RedditFetcher {
    client: Client,
    base_url: String,
}

impl RedditFetcher {
    pub fn new() -> Self {
        Self::with_base_url(BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            client: Client::builder()
                .user_agent(USER_AGENT)
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl Default for RedditFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Deserialize)]
struct Listing {
    #[serde(default)]
    data: ListingData,
}

#[derive(Deserialize, Default)]
struct ListingData {
    #[serde(default)]
    children: Vec<Child>,
}

#[derive(Deserialize)]
struct Child {
    data: Post,
}

#[derive(Deserialize)]
struct Post {
    id: Option<String>,
    subreddit_id: Option<String>,
    title: Option<String>,
    url: Option<String>,
    selftext: Option<String>,
    created_utc: Option<f64>,
    subreddit: Option<String>,
}

impl Post {
    /// Flatten into the `reddit` table's column layout.
    fn into_record(self) -> Option<RawRecord> {
        let (Some(subreddit_id), Some(id)) = (self.subreddit_id, self.id) else {
            return None;
        };
        json!({
            "id": format!("{subreddit_id}-{id}"),
            "title": self.title,
            "url": self.url,
            "description": self.selftext,
            "created_utc": self.created_utc,
            "subreddit": self.subreddit,
        })
        .as_object()
        .cloned()
    }
}

/// Flatten a `/new.json` listing body into records.
///
/// Posts lacking an id or subreddit id cannot be keyed and are skipped.
pub fn parse_listing(body: &str) -> Result<Vec<RawRecord>, SourceError> {
    let listing: Listing = serde_json::from_str(body)?;
    let total = listing.data.children.len();
    let records: Vec<RawRecord> = listing
        .data
        .children
        .into_iter()
        .filter_map(|child| child.data.into_record())
        .collect();
    if records.len() < total {
        warn!(skipped = total - records.len(), "skipped reddit posts without an id");
    }
    Ok(records)
}

#[async_trait]
impl SourceFetcher for RedditFetcher {
    fn name(&self) -> &str {
        "reddit"
    }

    async fn fetch(&self, source_id: &str, limit: u32) -> Result<Vec<RawRecord>, SourceError> {
        let url = format!("{}/r/{}/new.json", self.base_url, source_id);
        let response = self
            .client
            .get(&url)
            .query(&[("limit", limit)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!(subreddit = %source_id, status = status.as_u16(), "failed to fetch subreddit");
            return Err(SourceError::Status {
                source_id: format!("r/{source_id}"),
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        parse_listing(&body)
    }
}
