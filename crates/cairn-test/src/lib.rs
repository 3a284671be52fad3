//! # cairn-test
//!
//! Integration tests for Cairn.
//!
//! This crate contains:
//! - Multi-session handle scenarios against a shared table cache
//! - Scan mode coverage over real table contents
//! - Shared fixtures used by those tests

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Test utilities and fixtures.
pub mod utils;

pub use utils::{collect_ids, init_tracing, numbers_table, shared_cache, wait_until, TestCluster};
