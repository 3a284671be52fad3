//! Type definitions for Cairn.
//!
//! This module contains the core type definitions shared across crates.

mod datum;
mod ident;
mod ids;
mod keys;

pub use datum::{ColumnType, Datum, Row};
pub use ident::{TableIdent, TablePattern};
pub use ids::{InstanceId, SessionId, TicketId};
pub use keys::Key;
