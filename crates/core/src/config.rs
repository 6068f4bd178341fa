use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
pub fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

pub fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

pub fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

pub fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Name of the env var selecting the active profile.
pub const PROFILE_ENV: &str = "NEWSFLOW_PROFILE";

/// Active profile from [`PROFILE_ENV`], upper-cased (empty = default).
pub fn active_profile() -> String {
    env_or(PROFILE_ENV, "").to_uppercase()
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub fetch: FetchConfig,
    pub ingest: IngestConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// When `NEWSFLOW_PROFILE` is set (e.g. `PROD`), every key is first looked
    /// up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        Self::for_profile(&active_profile())
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            fetch: FetchConfig::from_env_profiled(p),
            ingest: IngestConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  fetch:   concurrency={}, limit={}, subreddits={}",
            self.fetch.concurrency,
            self.fetch.limit,
            self.fetch.subreddits.join(",")
        );
        tracing::info!(
            "  fetch:   snapshot_dir={}",
            self.fetch
                .snapshot_dir
                .as_ref()
                .map(|d| d.display().to_string())
                .unwrap_or_else(|| "(none)".into())
        );
        tracing::info!(
            "  ingest:  call_timeout={}s, transient_retries={}, drain_timeout={}s",
            self.ingest.call_timeout_seconds,
            self.ingest.transient_retries,
            self.ingest.drain_timeout_seconds
        );
    }
}

// ── Fetching ──────────────────────────────────────────────────

pub const DEFAULT_SUBREDDITS: &[&str] = &["CryptoCurrency", "ethfinance", "CryptoMarkets", "ethereum"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Maximum number of sources fetched at the same time.
    pub concurrency: usize,
    /// Per-source item limit.
    pub limit: u32,
    pub subreddits: Vec<String>,
    /// Where fetched batches are snapshotted; `None` disables snapshots.
    pub snapshot_dir: Option<PathBuf>,
}

impl FetchConfig {
    fn from_env_profiled(p: &str) -> Self {
        let subreddits = profiled_env_opt(p, "REDDIT_SUBREDDITS")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_else(|| DEFAULT_SUBREDDITS.iter().map(|s| s.to_string()).collect());
        Self {
            concurrency: profiled_env_u32(p, "FETCH_CONCURRENCY", 3).max(1) as usize,
            limit: profiled_env_u32(p, "FETCH_LIMIT", 10),
            subreddits,
            snapshot_dir: profiled_env_opt(p, "SNAPSHOT_DIR").map(PathBuf::from),
        }
    }
}

// ── Ingestion ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Upper bound on any single warehouse call.
    pub call_timeout_seconds: u64,
    /// Extra attempts for a step that failed with a transient error.
    pub transient_retries: u32,
    /// How long a retry waits for abandoned warehouse work to finish.
    pub drain_timeout_seconds: u64,
}

impl IngestConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            call_timeout_seconds: profiled_env_u64(p, "INGEST_CALL_TIMEOUT_SECONDS", 600),
            transient_retries: profiled_env_u32(p, "INGEST_TRANSIENT_RETRIES", 2),
            drain_timeout_seconds: profiled_env_u64(p, "INGEST_DRAIN_TIMEOUT_SECONDS", 300),
        }
    }
}
