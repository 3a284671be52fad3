//! # cairn-table
//!
//! The shared table layer that session-scoped handles are opened against.
//!
//! This crate provides:
//!
//! - **Catalog**: table, column and index definitions, object kinds and
//!   storage engines.
//!
//! - **Metadata Locks**: a monitor-style lock manager granting shared and
//!   exclusive table locks, with broadcast wake-up on release and
//!   detection of pending conflicting requests.
//!
//! - **Table Cache**: opens tables into a session's open-table list,
//!   closes them, locks them for a read, and tracks share versions so
//!   flushes and DDL can invalidate open instances.
//!
//! - **Access Methods**: index-ordered and sequential cursor primitives
//!   over in-memory table data.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         TableCache                           │
//! │                              │                               │
//! │     ┌────────────────────────┼────────────────────────┐      │
//! │     ▼                        ▼                        ▼      │
//! │ ┌──────────┐      ┌─────────────────────┐   ┌─────────────┐  │
//! │ │ Catalog  │      │ MetadataLockManager │   │ TableShare  │  │
//! │ │ (defs)   │      │  (S / X grants)     │   │ (versioned) │  │
//! │ └──────────┘      └─────────────────────┘   └─────────────┘  │
//! │                                                   │          │
//! │                                                   ▼          │
//! │                                        ┌──────────────────┐  │
//! │                                        │ TableData +      │  │
//! │                                        │ AccessMethod     │  │
//! │                                        └──────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Storage access methods.
///
/// This module provides:
/// - [`access::AccessMethod`]: cursor primitives driven by scans
/// - [`access::MemoryAccess`]: the in-memory implementation
/// - [`access::ComparisonMode`]: key lookup comparison variants
pub mod access;

/// Global table cache.
///
/// This module provides:
/// - [`cache::TableCache`]: opens, closes, locks and flushes tables
/// - [`cache::OpenTable`]: one session's instance of an opened table
/// - [`cache::OpenContext`]: a session's ordinary open-table state
pub mod cache;

/// Table, column and index definitions.
pub mod catalog;

/// Order-preserving index key encoding.
pub mod encoder;

/// Metadata lock manager.
pub mod mdl;

/// In-memory table contents.
pub mod storage;

pub use access::{AccessError, AccessKind, AccessMethod, ComparisonMode, CursorState, MemoryAccess};
pub use cache::{CacheStats, NeedsRetry, OpenContext, OpenTable, TableCache, TableLock, TableRequest, TableShare};
pub use catalog::{ColumnDef, EngineKind, IndexDef, TableDef, TableKind};
pub use encoder::KeyEncoder;
pub use mdl::{MdlContext, MdlMode, MdlStats, MdlTicket, MetadataLockManager};
pub use storage::TableData;
