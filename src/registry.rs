//! Store registry
//!
//! Process-wide registry of named stores: one authoritative in-memory
//! instance per name per process, weakly held so a store nobody references
//! anymore can be reclaimed.
//!
//! Deliberately not a global singleton. The registry is created by the
//! hosting application, passed by reference to whatever opens stores, and
//! torn down with [`StoreRegistry::shutdown`]. It owns the two process-wide
//! threads: the notification dispatcher and the background write worker.

use std::collections::HashMap;
use std::sync::Weak;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::listener::Dispatcher;
use crate::store::{self, Store};
use crate::worker::WriteQueue;

use crate::store::StoreInner;

/// Process-wide registry of named stores.
pub struct StoreRegistry {
    config: StoreConfig,
    stores: Mutex<HashMap<String, Weak<StoreInner>>>,
    dispatcher: Dispatcher,
    queue: WriteQueue,
}

impl StoreRegistry {
    /// Create a registry rooted at `config.data_dir`, spawning the
    /// dispatcher and write-worker threads.
    pub fn new(config: StoreConfig) -> Result<Self> {
        store::ensure_data_dir(&config.data_dir)?;
        Ok(Self {
            config,
            stores: Mutex::new(HashMap::new()),
            dispatcher: Dispatcher::new()?,
            queue: WriteQueue::new()?,
        })
    }

    /// Open the store registered under `name`, creating it on first request.
    ///
    /// Returns a handle to the single per-process instance; repeated calls
    /// with the same name share state. Creation starts the initial load
    /// asynchronously, so this never blocks on disk.
    pub fn open(&self, name: &str) -> Result<Store> {
        validate_name(name)?;
        let mut stores = self.stores.lock();
        if let Some(weak) = stores.get(name) {
            if let Some(inner) = weak.upgrade() {
                debug!(store = name, "reusing registered store");
                return Ok(Store { inner });
            }
        }
        let store = Store::open(
            name,
            &self.config,
            self.dispatcher.clone(),
            self.queue.clone(),
        )?;
        stores.insert(name.to_string(), std::sync::Arc::downgrade(&store.inner));
        info!(store = name, path = %store.path().display(), "store opened");
        Ok(store)
    }

    /// Registry configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Block until every write queued through `apply()` has completed.
    ///
    /// Invoke before process exit to guarantee deferred writes are durable.
    pub fn flush_pending(&self) {
        self.queue.wait_idle();
    }

    /// Tear down: drain the write queue, then release every live store's
    /// file watch and forget the registrations.
    pub fn shutdown(&self) {
        self.queue.wait_idle();
        let mut stores = self.stores.lock();
        for (name, weak) in stores.drain() {
            if let Some(inner) = weak.upgrade() {
                debug!(store = %name, "releasing store watch");
                Store { inner }.close();
            }
        }
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(StoreError::Config("store name must not be empty".into()));
    }
    if name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(StoreError::Config(format!(
            "store name must not be a path: {name:?}"
        )));
    }
    Ok(())
}
