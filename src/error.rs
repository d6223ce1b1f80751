//! Error types for crosskv
//!
//! Provides a unified error type for all operations.
//!
//! Most failures inside the engine are deliberately swallowed after logging
//! (a store must never become permanently unreadable), so the variants here
//! mainly surface through `Result`-returning entry points such as
//! [`crate::StoreRegistry::open`] and the persist path.

use thiserror::Error;

/// Result type alias using StoreError
pub type Result<T> = std::result::Result<T, StoreError>;

/// Unified error type for crosskv operations
#[derive(Debug, Error)]
pub enum StoreError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Snapshot Format Errors
    // -------------------------------------------------------------------------
    #[error("snapshot corrupt: {0}")]
    Corrupt(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Persistence Errors
    // -------------------------------------------------------------------------
    #[error("backup creation failed: {0}")]
    Backup(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("configuration error: {0}")]
    Config(String),
}
