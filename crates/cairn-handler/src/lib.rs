//! # cairn-handler
//!
//! Named, session-owned table cursors that outlive statements and survive
//! table cache flushes.
//!
//! A client opens a handle on a table, then reads from it any number of
//! times. Each read continues from where the previous one stopped, or
//! restarts the cursor, depending on the read mode. When the table is
//! flushed or another session needs it exclusively, the handle is closed
//! behind the client's back but stays registered, and the next read
//! reopens it transparently.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use cairn_common::config::CairnConfig;
//! use cairn_common::types::{ColumnType, Datum, Row, SessionId, TableIdent};
//! use cairn_handler::{HandleTarget, ReadMode, ReadRequest, Session};
//! use cairn_table::{TableCache, TableDef};
//!
//! let config = CairnConfig::default();
//! let cache = Arc::new(TableCache::with_config(&config));
//! let t1 = TableIdent::new("test", "t1");
//! cache
//!     .create_table(TableDef::new(t1.clone()).column("a", ColumnType::Int).index("PRIMARY", vec![0], true))
//!     .unwrap();
//! cache.insert_rows(&t1, (1..=3).map(|i| Row::new(vec![Datum::Int(i)]))).unwrap();
//!
//! let mut session = Session::new(SessionId::new(1), Arc::clone(&cache), config.handler.clone());
//! session.open("h1", HandleTarget::new(t1)).unwrap();
//!
//! let rows: Vec<Row> = session
//!     .read("h1", ReadRequest::new(ReadMode::First).index("PRIMARY").limit(10))
//!     .unwrap()
//!     .collect::<Result<_, _>>()
//!     .unwrap();
//! assert_eq!(rows.len(), 3);
//!
//! session.close("h1").unwrap();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod coordinator;
pub mod descriptor;
pub mod registry;
pub mod scan;
pub mod session;
pub mod stats;
mod sweep;

pub use descriptor::{AccessMode, HandleDescriptor, HandleTarget};
pub use registry::HandleRegistry;
pub use scan::{next_mode_after_lookup, transition, EffectiveAction, ReadCursor, ReadMode, ReadRequest};
pub use session::{Session, SessionState};
pub use stats::HandlerStats;
pub use sweep::SweepReason;
