//! System-wide constants for Cairn.

// =============================================================================
// Handle Registry
// =============================================================================

/// Initial capacity of a session's handle registry.
pub const DEFAULT_REGISTRY_CAPACITY: usize = 120;

/// Maximum length of a handle name in bytes.
pub const MAX_HANDLE_NAME_LEN: usize = 64;

/// Number of times an Open/Reopen sequence is retried after the table was
/// invalidated between opening and locking it.
pub const DEFAULT_MAX_OPEN_RETRIES: u32 = 16;

// =============================================================================
// Locking
// =============================================================================

/// Default metadata lock wait timeout in milliseconds.
pub const DEFAULT_LOCK_WAIT_TIMEOUT_MS: u64 = 50_000;

/// Default time a flush waits for old table versions to be released.
pub const DEFAULT_FLUSH_WAIT_TIMEOUT_MS: u64 = 30_000;

// =============================================================================
// Table Cache
// =============================================================================

/// Default upper bound on concurrently open table instances.
pub const DEFAULT_MAX_OPEN_INSTANCES: usize = 4096;

/// Name of the system schema. Objects in it cannot be opened as handles.
pub const SYSTEM_SCHEMA_NAME: &str = "information_schema";

// =============================================================================
// Keys
// =============================================================================

/// Maximum number of parts in an index key.
pub const MAX_KEY_PARTS: usize = 16;

/// Maximum encoded index key size in bytes.
pub const MAX_KEY_SIZE: usize = 3072;
