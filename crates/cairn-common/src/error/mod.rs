//! Error handling for Cairn.
//!
//! This module provides a unified error type and result alias used
//! across all Cairn components.

mod cairn;

pub use cairn::{CairnError, ErrorCode, OpenFailure};

/// Result type alias for Cairn operations.
pub type CairnResult<T> = std::result::Result<T, CairnError>;
