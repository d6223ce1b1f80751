//! Change watcher
//!
//! Watches the primary snapshot file for external modification and triggers a
//! reload callback. Two platform quirks drive the contract:
//!
//! - watching a non-existent path is a no-op on most platforms, so the watch
//!   is only armed once the file is known to exist
//! - some platforms tie the watch to the underlying inode, so the watch must
//!   be torn down and recreated whenever the file is recreated

use std::path::PathBuf;
use std::sync::Arc;

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, warn};

/// Reload trigger bound to one exact file path.
pub struct ChangeWatcher {
    path: PathBuf,
    callback: Option<Arc<dyn Fn() + Send + Sync>>,
    watcher: Option<RecommendedWatcher>,
}

impl ChangeWatcher {
    /// Create a disarmed watcher for `path`.
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            callback: None,
            watcher: None,
        }
    }

    /// Install the callback invoked on every modify event.
    pub fn set_callback(&mut self, callback: impl Fn() + Send + Sync + 'static) {
        self.callback = Some(Arc::new(callback));
    }

    /// Start watching, if the file exists and a callback is installed.
    ///
    /// No-op when already armed.
    pub fn arm(&mut self) {
        if self.watcher.is_some() {
            return;
        }
        if !self.path.exists() {
            debug!(path = %self.path.display(), "not arming watch, file does not exist");
            return;
        }
        let Some(callback) = self.callback.clone() else {
            return;
        };
        let event_path = self.path.clone();
        let handler = move |res: notify::Result<Event>| match res {
            Ok(event) => {
                // The watch is on the exact file, so any modify event is ours.
                if event.kind.is_modify() {
                    callback();
                }
            }
            Err(e) => {
                warn!(path = %event_path.display(), error = %e, "watch event error");
            }
        };
        match notify::recommended_watcher(handler) {
            Ok(mut watcher) => match watcher.watch(&self.path, RecursiveMode::NonRecursive) {
                Ok(()) => {
                    debug!(path = %self.path.display(), "watch armed");
                    self.watcher = Some(watcher);
                }
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "could not arm watch");
                }
            },
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "could not create watcher");
            }
        }
    }

    /// Stop watching. Idempotent; safe without a prior [`ChangeWatcher::arm`].
    pub fn disarm(&mut self) {
        if self.watcher.take().is_some() {
            debug!(path = %self.path.display(), "watch disarmed");
        }
    }

    /// Tear down and recreate the watch.
    ///
    /// Required after the watched file has been recreated, since the old
    /// watch may be bound to a dead inode.
    pub fn rearm(&mut self) {
        self.disarm();
        self.arm();
    }
}
