//! Cairn error types.

use std::fmt;
use thiserror::Error;

/// Error codes for categorizing errors.
///
/// These codes can be used for programmatic error handling and
/// are stable across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    // General errors (0x0000 - 0x00FF)
    /// Unknown or unspecified error.
    Unknown = 0x0000,
    /// Internal error (bug).
    Internal = 0x0001,
    /// Invalid argument provided.
    InvalidArgument = 0x0003,
    /// Invalid configuration.
    InvalidConfig = 0x0004,
    /// General I/O error.
    Io = 0x0005,

    // Handle errors (0x0100 - 0x01FF)
    /// A handle with this name is already registered.
    AlreadyExists = 0x0100,
    /// No handle with this name is registered.
    UnknownHandle = 0x0101,
    /// The session is in a state that forbids the operation.
    InvalidState = 0x0102,
    /// Opening the target produced more than one table.
    IllegalHandleTarget = 0x0103,
    /// The access method cannot drive a standalone handle cursor.
    UnsupportedForHandle = 0x0104,
    /// The open/lock sequence kept being invalidated.
    RetryLimitExceeded = 0x0105,

    // Table errors (0x0200 - 0x02FF)
    /// The table could not be opened.
    OpenFailed = 0x0200,
    /// The table already exists.
    TableExists = 0x0201,

    // Lock errors (0x0300 - 0x03FF)
    /// Waiting for a lock timed out.
    LockTimeout = 0x0300,

    // Scan errors (0x0400 - 0x04FF)
    /// The access method failed while reading.
    ScanFailed = 0x0400,
    /// The named index does not exist.
    UnknownIndex = 0x0401,
    /// The key expression has more parts than the index.
    TooManyKeyParts = 0x0402,
    /// A key value could not be applied to its key column.
    WrongArguments = 0x0403,
    /// The read mode needs an index but none was named.
    IndexRequired = 0x0404,
}

impl ErrorCode {
    /// Returns the numeric code.
    #[inline]
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Returns the error category name.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match (*self as u16) >> 8 {
            0x00 => "General",
            0x01 => "Handle",
            0x02 => "Table",
            0x03 => "Lock",
            0x04 => "Scan",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Why the global table cache refused to open a table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OpenFailure {
    /// No table with this identity exists.
    #[error("table does not exist")]
    NoSuchTable,

    /// The object exists but is not a base table.
    #[error("'{actual}' is not a base table")]
    WrongObjectType {
        /// Kind of the object that was found.
        actual: String,
    },

    /// The storage engine refused to open the table.
    #[error("storage engine refused: {message}")]
    EngineRefused {
        /// Engine diagnostic.
        message: String,
    },

    /// Waiting for the metadata lock timed out.
    #[error("metadata lock wait timed out after {waited_ms}ms")]
    LockTimeout {
        /// Time spent waiting.
        waited_ms: u64,
    },

    /// The table cache is at its instance limit.
    #[error("too many open table instances (limit {limit})")]
    TooManyOpen {
        /// Configured limit.
        limit: usize,
    },
}

/// The main error type for Cairn.
///
/// This enum covers all errors surfaced by the table cache and the handle
/// layer. End-of-data and deleted rows are scan control signals, not errors,
/// and never appear here.
///
/// # Example
///
/// ```rust
/// use cairn_common::error::{CairnError, CairnResult, ErrorCode};
///
/// fn lookup(name: &str) -> CairnResult<()> {
///     Err(CairnError::UnknownHandle { name: name.to_string() })
/// }
///
/// assert_eq!(lookup("h1").unwrap_err().code(), ErrorCode::UnknownHandle);
/// ```
#[derive(Debug, Error)]
pub enum CairnError {
    // ==========================================================================
    // General Errors
    // ==========================================================================
    /// Internal error - this indicates a bug.
    #[error("internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },

    /// Invalid argument provided.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Error message.
        message: String,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Error message.
        message: String,
    },

    /// I/O error from the underlying system.
    #[error("I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    // ==========================================================================
    // Handle Errors
    // ==========================================================================
    /// A handle with this name is already registered in the session.
    #[error("handle '{name}' already exists")]
    AlreadyExists {
        /// The duplicate name.
        name: String,
    },

    /// No handle with this name is registered in the session.
    #[error("unknown handle '{name}'")]
    UnknownHandle {
        /// The missing name.
        name: String,
    },

    /// The session holds a lock mode or transaction state that forbids the operation.
    #[error("invalid session state: {reason}")]
    InvalidState {
        /// What made the state invalid.
        reason: String,
    },

    /// Opening the target pulled in more than one table.
    #[error("handle '{name}' cannot target '{table}': it opens {opened} tables")]
    IllegalHandleTarget {
        /// Handle name.
        name: String,
        /// Target table.
        table: String,
        /// Number of tables the open produced.
        opened: usize,
    },

    /// The table's access method cannot be driven as a standalone handle cursor.
    #[error("table '{table}' uses engine '{engine}' which does not support handles")]
    UnsupportedForHandle {
        /// Target table.
        table: String,
        /// Engine name.
        engine: String,
    },

    /// The table kept being invalidated between open and lock.
    #[error("handle '{name}' could not be reopened after {attempts} attempts")]
    RetryLimitExceeded {
        /// Handle name.
        name: String,
        /// Attempts made.
        attempts: u32,
    },

    // ==========================================================================
    // Table Errors
    // ==========================================================================
    /// The underlying open failed.
    #[error("cannot open table '{table}': {reason}")]
    OpenFailed {
        /// Target table.
        table: String,
        /// Why the open failed.
        reason: OpenFailure,
    },

    /// A table with this identity already exists.
    #[error("table '{table}' already exists")]
    TableExists {
        /// The duplicate table.
        table: String,
    },

    // ==========================================================================
    // Lock Errors
    // ==========================================================================
    /// Waiting for a lock timed out.
    #[error("lock wait on '{resource}' timed out after {waited_ms}ms")]
    LockTimeout {
        /// Locked resource.
        resource: String,
        /// Time spent waiting.
        waited_ms: u64,
    },

    // ==========================================================================
    // Scan Errors
    // ==========================================================================
    /// The access method failed for a reason other than end-of-data or a deleted row.
    #[error("error {code} when reading table '{table}': {message}")]
    ScanFailed {
        /// Target table.
        table: String,
        /// Engine error number.
        code: i32,
        /// Engine diagnostic.
        message: String,
    },

    /// The named index does not exist on the table.
    #[error("key '{index}' does not exist in table '{table}'")]
    UnknownIndex {
        /// Index name.
        index: String,
        /// Table name.
        table: String,
    },

    /// The key expression has more parts than the index.
    #[error("too many key parts specified; max {max} parts allowed")]
    TooManyKeyParts {
        /// Number of parts in the index.
        max: usize,
    },

    /// A key value could not be stored in its key column.
    #[error("incorrect arguments to handle read: {message}")]
    WrongArguments {
        /// What was wrong.
        message: String,
    },

    /// The read mode needs an index but none was named.
    #[error("read mode {mode} requires an index")]
    IndexRequired {
        /// The offending mode.
        mode: String,
    },
}

impl CairnError {
    /// Returns the error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Internal { .. } => ErrorCode::Internal,
            Self::InvalidArgument { .. } => ErrorCode::InvalidArgument,
            Self::InvalidConfig { .. } => ErrorCode::InvalidConfig,
            Self::Io { .. } => ErrorCode::Io,
            Self::AlreadyExists { .. } => ErrorCode::AlreadyExists,
            Self::UnknownHandle { .. } => ErrorCode::UnknownHandle,
            Self::InvalidState { .. } => ErrorCode::InvalidState,
            Self::IllegalHandleTarget { .. } => ErrorCode::IllegalHandleTarget,
            Self::UnsupportedForHandle { .. } => ErrorCode::UnsupportedForHandle,
            Self::RetryLimitExceeded { .. } => ErrorCode::RetryLimitExceeded,
            Self::OpenFailed { .. } => ErrorCode::OpenFailed,
            Self::TableExists { .. } => ErrorCode::TableExists,
            Self::LockTimeout { .. } => ErrorCode::LockTimeout,
            Self::ScanFailed { .. } => ErrorCode::ScanFailed,
            Self::UnknownIndex { .. } => ErrorCode::UnknownIndex,
            Self::TooManyKeyParts { .. } => ErrorCode::TooManyKeyParts,
            Self::WrongArguments { .. } => ErrorCode::WrongArguments,
            Self::IndexRequired { .. } => ErrorCode::IndexRequired,
        }
    }

    /// Returns true if retrying the same call later may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::LockTimeout { .. }
                | Self::RetryLimitExceeded { .. }
                | Self::OpenFailed {
                    reason: OpenFailure::LockTimeout { .. } | OpenFailure::TooManyOpen { .. },
                    ..
                }
        )
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an invalid state error.
    #[must_use]
    pub fn invalid_state(reason: impl Into<String>) -> Self {
        Self::InvalidState {
            reason: reason.into(),
        }
    }

    /// Creates an open failure for `table`.
    #[must_use]
    pub fn open_failed(table: impl fmt::Display, reason: OpenFailure) -> Self {
        Self::OpenFailed {
            table: table.to_string(),
            reason,
        }
    }
}
