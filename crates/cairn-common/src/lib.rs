//! # cairn-common
//!
//! Common types, errors, and configuration for Cairn.
//!
//! This crate provides the foundational types shared by the table cache and
//! the handle layer:
//!
//! - **Types**: identifiers (`SessionId`, `TicketId`, `InstanceId`), table
//!   identities, `Datum`/`Row` values and order-preserving index `Key`s
//! - **Errors**: unified error handling with `CairnError`
//! - **Config**: handle, table-cache and lock configuration
//! - **Constants**: system-wide defaults and limits
//!
//! ## Example
//!
//! ```rust
//! use cairn_common::types::{Datum, Row, TableIdent};
//! use cairn_common::error::CairnResult;
//!
//! fn example() -> CairnResult<()> {
//!     let ident = TableIdent::new("shop", "orders");
//!     let row = Row::new(vec![Datum::Int(1), Datum::text("pending")]);
//!     assert_eq!(ident.to_string(), "shop.orders");
//!     assert_eq!(row.num_columns(), 2);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod constants;
pub mod error;
pub mod types;

// Re-export commonly used items at the crate root
pub use constants::*;
pub use error::{CairnError, CairnResult, ErrorCode, OpenFailure};
pub use types::{Datum, InstanceId, Key, Row, SessionId, TableIdent, TicketId};
