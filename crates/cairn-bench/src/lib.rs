//! Cairn Performance Benchmarks
//!
//! This crate contains benchmarks for:
//! - The handle read loop in each read mode
//! - Handle reopen after a flush
//! - Table cache open/close and metadata locks
//!
//! Run benchmarks with:
//! ```bash
//! cargo bench -p cairn-bench
//! ```

pub mod utils;
