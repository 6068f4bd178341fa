//! Integration tests for newsflow-warehouse.
//!
//! These tests run without AWS credentials. Tests marked with `#[ignore]`
//! require a real Athena workgroup and must be run explicitly.

mod config;
mod default_merge;
