//! Fetched-record snapshots on local disk.
//!
//! A snapshot is `<dir>/<source>_data.json`, a pretty-printed JSON array of
//! the raw records exactly as fetched. It can be replayed into ingestion
//! without touching the network.

use std::path::{Path, PathBuf};

use tracing::info;

use newsflow_core::RawRecord;

use crate::error::SourceError;

pub fn snapshot_path(dir: &Path, source: &str) -> PathBuf {
    dir.join(format!("{source}_data.json"))
}

/// Write `records` to the snapshot file for `source`, replacing any previous one.
pub fn save(dir: &Path, source: &str, records: &[RawRecord]) -> Result<PathBuf, SourceError> {
    std::fs::create_dir_all(dir)?;
    let path = snapshot_path(dir, source);
    let json = serde_json::to_string_pretty(records)?;
    std::fs::write(&path, json)?;
    info!(path = %path.display(), records = records.len(), "wrote snapshot");
    Ok(path)
}

/// Read back the snapshot for `source`.
pub fn load(dir: &Path, source: &str) -> Result<Vec<RawRecord>, SourceError> {
    let path = snapshot_path(dir, source);
    let json = std::fs::read_to_string(&path)?;
    let records: Vec<RawRecord> = serde_json::from_str(&json)?;
    info!(path = %path.display(), records = records.len(), "read snapshot");
    Ok(records)
}
