//! Configuration for crosskv
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for a [`crate::StoreRegistry`]
#[derive(Debug, Clone)]
pub struct StoreConfig {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all store files.
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── {name}.kv          (primary snapshot)
    ///     ├── {name}.kv.bak      (backup, present only while a write is in flight)
    ///     └── {name}.kv.lock     (lock file; only its lock state matters)
    pub data_dir: PathBuf,

    /// Permission policy applied to primary and backup files
    pub access: AccessMode,

    // -------------------------------------------------------------------------
    // Locking Configuration
    // -------------------------------------------------------------------------
    /// Delay between retries of a failed lock-file acquisition
    pub lock_retry_delay: Duration,
}

/// File permission policy for store files.
///
/// Maps to Unix permission bits on top of a `rw-rw----` base; a no-op on
/// platforms without Unix permissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Owner and group read/write only
    Private,

    /// Additionally world-readable
    WorldReadable,

    /// Additionally world-writable
    WorldWritable,
}

impl AccessMode {
    /// Permission bits for store files under this mode
    pub fn file_mode(self) -> u32 {
        let base = 0o660;
        match self {
            AccessMode::Private => base,
            AccessMode::WorldReadable => base | 0o004,
            AccessMode::WorldWritable => base | 0o002,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./crosskv_data"),
            access: AccessMode::Private,
            lock_retry_delay: Duration::from_millis(10),
        }
    }
}

impl StoreConfig {
    /// Create a new config builder
    pub fn builder() -> StoreConfigBuilder {
        StoreConfigBuilder::default()
    }
}

/// Builder for StoreConfig
#[derive(Default)]
pub struct StoreConfigBuilder {
    config: StoreConfig,
}

impl StoreConfigBuilder {
    /// Set the data directory (root for all store files)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the file permission policy
    pub fn access(mut self, access: AccessMode) -> Self {
        self.config.access = access;
        self
    }

    /// Set the delay between lock acquisition retries
    pub fn lock_retry_delay(mut self, delay: Duration) -> Self {
        self.config.lock_retry_delay = delay;
        self
    }

    pub fn build(self) -> StoreConfig {
        self.config
    }
}
