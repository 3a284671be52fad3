//! Configuration for Cairn.
//!
//! This module provides configuration structures for the handle layer,
//! the table cache and the metadata lock manager.

mod cairn;

pub use cairn::{CairnConfig, HandlerConfig, LockConfig, TableCacheConfig};
