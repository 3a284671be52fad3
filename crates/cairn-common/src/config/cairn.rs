//! Configuration structures.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::constants::{
    DEFAULT_FLUSH_WAIT_TIMEOUT_MS, DEFAULT_LOCK_WAIT_TIMEOUT_MS, DEFAULT_MAX_OPEN_INSTANCES,
    DEFAULT_MAX_OPEN_RETRIES, DEFAULT_REGISTRY_CAPACITY,
};
use crate::error::{CairnError, CairnResult};

/// Top-level configuration.
///
/// # Example
///
/// ```rust
/// use cairn_common::config::CairnConfig;
///
/// let config = CairnConfig::default();
/// assert_eq!(config.handler.registry_capacity, 120);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CairnConfig {
    /// Handle layer configuration.
    #[serde(default)]
    pub handler: HandlerConfig,

    /// Global table cache configuration.
    #[serde(default)]
    pub table_cache: TableCacheConfig,

    /// Metadata lock configuration.
    #[serde(default)]
    pub lock: LockConfig,
}

impl CairnConfig {
    /// Creates a configuration with short waits, for tests.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            handler: HandlerConfig::default(),
            table_cache: TableCacheConfig {
                flush_wait_timeout_ms: 2_000,
                ..Default::default()
            },
            lock: LockConfig {
                lock_wait_timeout_ms: 2_000,
            },
        }
    }

    /// Parses a configuration from TOML.
    pub fn from_toml_str(content: &str) -> CairnResult<Self> {
        let config: Self = toml::from_str(content).map_err(|e| CairnError::InvalidConfig {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> CairnResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Serializes the configuration to TOML.
    pub fn to_toml(&self) -> CairnResult<String> {
        toml::to_string_pretty(self).map_err(|e| CairnError::InvalidConfig {
            message: e.to_string(),
        })
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> CairnResult<()> {
        if self.handler.registry_capacity == 0 {
            return Err(invalid("handler.registry_capacity must be at least 1"));
        }
        if self.handler.max_open_retries == 0 {
            return Err(invalid("handler.max_open_retries must be at least 1"));
        }
        if self.table_cache.max_open_instances == 0 {
            return Err(invalid("table_cache.max_open_instances must be at least 1"));
        }
        if self.lock.lock_wait_timeout_ms == 0 {
            return Err(invalid("lock.lock_wait_timeout_ms must be positive"));
        }
        Ok(())
    }
}

fn invalid(message: &str) -> CairnError {
    CairnError::InvalidConfig {
        message: message.to_string(),
    }
}

/// Handle layer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerConfig {
    /// Initial capacity of each session's handle registry.
    /// Default: 120
    #[serde(default = "default_registry_capacity")]
    pub registry_capacity: usize,

    /// Attempts at the open/lock sequence before a read gives up when the
    /// table keeps being invalidated underneath it.
    /// Default: 16
    #[serde(default = "default_max_open_retries")]
    pub max_open_retries: u32,

    /// Run the invalidation sweep at the start of every Open and Read when
    /// the table cache or lock manager signalled a change.
    /// Default: true
    #[serde(default = "default_true")]
    pub sweep_on_statement: bool,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            registry_capacity: DEFAULT_REGISTRY_CAPACITY,
            max_open_retries: DEFAULT_MAX_OPEN_RETRIES,
            sweep_on_statement: true,
        }
    }
}

/// Global table cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableCacheConfig {
    /// Maximum number of table instances open at once, across sessions.
    /// Default: 4096
    #[serde(default = "default_max_open_instances")]
    pub max_open_instances: usize,

    /// How long a waiting flush blocks for old table versions to be closed.
    /// Default: 30000
    #[serde(default = "default_flush_wait_timeout_ms")]
    pub flush_wait_timeout_ms: u64,
}

impl TableCacheConfig {
    /// Returns the flush wait timeout as a `Duration`.
    #[must_use]
    pub fn flush_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_wait_timeout_ms)
    }
}

impl Default for TableCacheConfig {
    fn default() -> Self {
        Self {
            max_open_instances: DEFAULT_MAX_OPEN_INSTANCES,
            flush_wait_timeout_ms: DEFAULT_FLUSH_WAIT_TIMEOUT_MS,
        }
    }
}

/// Metadata lock configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    /// How long a lock request waits for conflicting grants to be released.
    /// Default: 50000
    #[serde(default = "default_lock_wait_timeout_ms")]
    pub lock_wait_timeout_ms: u64,
}

impl LockConfig {
    /// Returns the lock wait timeout as a `Duration`.
    #[must_use]
    pub fn lock_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_wait_timeout_ms)
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            lock_wait_timeout_ms: DEFAULT_LOCK_WAIT_TIMEOUT_MS,
        }
    }
}

fn default_registry_capacity() -> usize {
    DEFAULT_REGISTRY_CAPACITY
}

fn default_max_open_retries() -> u32 {
    DEFAULT_MAX_OPEN_RETRIES
}

fn default_true() -> bool {
    true
}

fn default_max_open_instances() -> usize {
    DEFAULT_MAX_OPEN_INSTANCES
}

fn default_flush_wait_timeout_ms() -> u64 {
    DEFAULT_FLUSH_WAIT_TIMEOUT_MS
}

fn default_lock_wait_timeout_ms() -> u64 {
    DEFAULT_LOCK_WAIT_TIMEOUT_MS
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = CairnConfig::default();
        assert_eq!(config.handler.max_open_retries, 16);
        assert!(config.handler.sweep_on_statement);
        assert_eq!(config.lock.lock_wait_timeout(), Duration::from_secs(50));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config = CairnConfig::from_toml_str(
            r#"
            [handler]
            max_open_retries = 3

            [lock]
            lock_wait_timeout_ms = 250
            "#,
        )
        .unwrap();
        assert_eq!(config.handler.max_open_retries, 3);
        assert_eq!(config.handler.registry_capacity, 120);
        assert_eq!(config.lock.lock_wait_timeout_ms, 250);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = CairnConfig::from_toml_str("[handler]\nregistry_capacity = 0\n").unwrap_err();
        assert!(matches!(err, CairnError::InvalidConfig { .. }));

        let err = CairnConfig::from_toml_str("[handler\n").unwrap_err();
        assert!(matches!(err, CairnError::InvalidConfig { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let config = CairnConfig::for_testing();
        let toml = config.to_toml().unwrap();
        assert!(toml.contains("lock_wait_timeout_ms"));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(toml.as_bytes()).unwrap();

        let loaded = CairnConfig::load(file.path()).unwrap();
        assert_eq!(loaded.lock.lock_wait_timeout_ms, 2_000);
        assert_eq!(loaded.table_cache.flush_wait_timeout_ms, 2_000);
    }
}
