//! Storage access methods.
//!
//! An [`AccessMethod`] is the per-instance cursor an opened table reads
//! through. It is initialized for either an index or a sequential scan,
//! keeps its position between calls, and is read against the table's
//! current [`TableData`].

mod memory;

pub use memory::MemoryAccess;

use std::fmt;

use cairn_common::types::{Key, Row};
use thiserror::Error;

use crate::storage::TableData;

/// How an index lookup compares the search key against index entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonMode {
    /// First entry whose key equals the search key.
    Exact,
    /// First entry whose key is at or after the search key.
    KeyOrNext,
    /// Last entry whose key is at or before the search key.
    KeyOrPrev,
    /// First entry whose key is strictly after the search key.
    AfterKey,
    /// Last entry whose key is strictly before the search key.
    BeforeKey,
    /// First entry whose key starts with the search key.
    Prefix,
    /// Last entry whose key starts with the search key.
    PrefixLast,
    /// Last entry whose key starts with or sorts before the search key.
    PrefixLastOrPrev,
}

impl ComparisonMode {
    /// Returns true if the lookup positions on the last qualifying entry.
    pub fn is_backward(&self) -> bool {
        matches!(
            self,
            Self::KeyOrPrev | Self::BeforeKey | Self::PrefixLast | Self::PrefixLastOrPrev
        )
    }
}

impl fmt::Display for ComparisonMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Exact => "=",
            Self::KeyOrNext => ">=",
            Self::KeyOrPrev => "<=",
            Self::AfterKey => ">",
            Self::BeforeKey => "<",
            Self::Prefix => "PREFIX",
            Self::PrefixLast => "PREFIX_LAST",
            Self::PrefixLastOrPrev => "PREFIX_LAST_OR_PREV",
        };
        f.write_str(s)
    }
}

/// What an access method is currently initialized for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    /// Not initialized.
    None,
    /// Index scan over the given index.
    Index(usize),
    /// Sequential heap scan.
    Sequential,
}

/// Position of an access method's cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// Cursor has not been positioned yet.
    Uninitialized,
    /// Cursor is positioned on a valid entry.
    Valid,
    /// Cursor is at the end (past all entries).
    AtEnd,
    /// Cursor is before the start.
    BeforeStart,
}

/// Errors and signals returned by access method reads.
///
/// [`AccessError::EndOfFile`], [`AccessError::KeyNotFound`] and
/// [`AccessError::RecordDeleted`] are scan control signals. The others are
/// real failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    /// No more entries in the scan direction.
    #[error("end of file")]
    EndOfFile,

    /// A key lookup matched nothing.
    #[error("key not found")]
    KeyNotFound,

    /// The heap slot read holds a deleted row.
    #[error("record deleted")]
    RecordDeleted,

    /// The table contents are marked crashed.
    #[error("table is marked as crashed and should be repaired")]
    Crashed,

    /// The requested index does not exist.
    #[error("index {keyno} does not exist")]
    WrongIndex {
        /// Requested index number.
        keyno: usize,
    },

    /// The read does not match how the access method was initialized.
    #[error("access method not initialized for this read")]
    NotInitialized,
}

impl AccessError {
    /// Returns the engine error number.
    pub fn code(&self) -> i32 {
        match self {
            Self::KeyNotFound => 120,
            Self::WrongIndex { .. } => 124,
            Self::Crashed => 126,
            Self::RecordDeleted => 134,
            Self::EndOfFile => 137,
            Self::NotInitialized => 168,
        }
    }

    /// Returns true if this ends a scan rather than failing it.
    pub fn is_end_of_data(&self) -> bool {
        matches!(self, Self::EndOfFile | Self::KeyNotFound)
    }
}

/// Cursor primitives over one opened table instance.
///
/// Every read positions the cursor and returns a copy of the row found
/// there. Reads are only valid for the matching initialization: index
/// reads after [`AccessMethod::index_init`], heap reads after
/// [`AccessMethod::rnd_init`].
pub trait AccessMethod: Send + fmt::Debug {
    /// Returns the engine name.
    fn engine_name(&self) -> &'static str;

    /// Returns true if this access method can be driven as a standalone
    /// handle cursor.
    fn supports_handle_cursor(&self) -> bool;

    /// Prepares the instance to be held across statements by a handle.
    fn prepare_for_handle(&mut self) {}

    /// Returns what the access method is initialized for.
    fn access_kind(&self) -> AccessKind;

    /// Returns the cursor position.
    fn cursor_state(&self) -> CursorState;

    /// Initializes an index scan over index `keyno`.
    fn index_init(&mut self, data: &TableData, keyno: usize) -> Result<(), AccessError>;

    /// Initializes a sequential heap scan from the first slot.
    fn rnd_init(&mut self, data: &TableData) -> Result<(), AccessError>;

    /// Ends whichever scan is active. Idempotent.
    fn end_access(&mut self);

    /// Positions on the first index entry.
    fn index_first(&mut self, data: &TableData) -> Result<Row, AccessError>;

    /// Positions on the last index entry.
    fn index_last(&mut self, data: &TableData) -> Result<Row, AccessError>;

    /// Moves to the next index entry.
    fn index_next(&mut self, data: &TableData) -> Result<Row, AccessError>;

    /// Moves to the previous index entry.
    fn index_prev(&mut self, data: &TableData) -> Result<Row, AccessError>;

    /// Positions by key lookup.
    fn index_read(
        &mut self,
        data: &TableData,
        key: &Key,
        mode: ComparisonMode,
    ) -> Result<Row, AccessError>;

    /// Moves to the next entry if it still starts with `key`.
    fn index_next_same(&mut self, data: &TableData, key: &Key) -> Result<Row, AccessError>;

    /// Reads the next heap slot.
    fn rnd_next(&mut self, data: &TableData) -> Result<Row, AccessError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backward_modes() {
        assert!(ComparisonMode::KeyOrPrev.is_backward());
        assert!(ComparisonMode::PrefixLastOrPrev.is_backward());
        assert!(!ComparisonMode::Exact.is_backward());
        assert!(!ComparisonMode::AfterKey.is_backward());
    }

    #[test]
    fn test_access_error_codes() {
        assert_eq!(AccessError::EndOfFile.code(), 137);
        assert!(AccessError::KeyNotFound.is_end_of_data());
        assert!(!AccessError::RecordDeleted.is_end_of_data());
        assert!(!AccessError::Crashed.is_end_of_data());
    }
}
