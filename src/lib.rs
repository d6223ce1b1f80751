//! # crosskv
//!
//! A small persistent key-value store that stays consistent when read and
//! written concurrently by multiple OS processes and multiple threads, with:
//! - Process-level exclusive locking composed with an intra-process
//!   re-entrant lock
//! - Backup-then-replace writes with automatic crash recovery
//! - Change detection via file-metadata fingerprints
//! - Weakly-held change listeners notified only for keys that actually
//!   changed
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                     StoreRegistry                          │
//! │        (one instance per name, weakly held)                │
//! └───────────────────────────┬───────────────────────────────┘
//!                             │
//! ┌───────────────────────────▼───────────────────────────────┐
//! │                         Store                              │
//! │      (snapshot + fingerprint, monitor-guarded)             │
//! └───────┬───────────────┬───────────────┬───────────────────┘
//!         │               │               │
//!         ▼               ▼               ▼
//!  ┌────────────┐  ┌─────────────┐  ┌─────────────┐
//!  │ProcessLock │  │ChangeWatcher│  │ ListenerHub │
//!  │ (.lock +   │  │  (notify)   │  │ (dispatch   │
//!  │ reentrant) │  │             │  │   thread)   │
//!  └────────────┘  └─────────────┘  └─────────────┘
//!         │
//!         ▼
//!  ┌────────────────────────────┐
//!  │         Persister          │
//!  │ (backup -> write -> fsync) │
//!  └────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use crosskv::{StoreConfig, StoreRegistry};
//!
//! # fn main() -> crosskv::Result<()> {
//! let registry = StoreRegistry::new(StoreConfig::builder().data_dir("./data").build())?;
//! let store = registry.open("settings")?;
//!
//! let mut editor = store.edit();
//! editor.put_string("theme", "dark").put_int("font_size", 14);
//! editor.commit();
//!
//! assert_eq!(store.get_string("theme", "light"), "dark");
//! registry.shutdown();
//! # Ok(())
//! # }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod lock;
pub mod watcher;
pub mod snapshot;
pub mod store;
pub mod listener;
pub mod registry;

mod worker;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use config::{AccessMode, StoreConfig};
pub use error::{Result, StoreError};
pub use listener::ChangeListener;
pub use registry::StoreRegistry;
pub use snapshot::{Snapshot, Value};
pub use store::{Editor, Store};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of crosskv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
