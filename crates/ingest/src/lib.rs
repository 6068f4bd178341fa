//! Merge-based upsert ingestion.
//!
//! A fetched batch is deduplicated per key, loaded into a per-table staging
//! table, and reconciled into the durable target table with one key-based
//! MERGE. Runs for the same table are serialized; different tables proceed
//! independently.

pub mod context;
pub mod dedupe;
pub mod error;
pub mod merge;
pub mod orchestrator;
pub mod registry;
pub mod staging;

pub use context::IngestContext;
pub use dedupe::dedupe;
pub use error::IngestError;
pub use merge::{merge, MergeResult};
pub use orchestrator::{IngestReport, Ingestor};
pub use registry::{TableRegistry, TableSpec};
pub use staging::load_staging;
