//! Store Module
//!
//! The per-name snapshot store that coordinates all components.
//!
//! ## Responsibilities
//! - Own the in-memory mapping, guarded by one per-store monitor
//! - Reload from disk under the process lock, recovering from a backup first
//! - Skip redundant parses via the size+mtime fingerprint
//! - Block accessors until the initial load completes
//! - Hand out single-use editors and deliver change notifications
//!
//! ## Concurrency Model
//!
//! - Every accessor, every load and every commit-merge step takes the
//!   per-store monitor (`state`); readers see either the pre-commit or the
//!   post-commit snapshot, never an intermediate one
//! - The full read-decide-write sequence of a reload or commit runs while
//!   holding the [`ProcessLock`], which totally orders commits across
//!   threads and processes

mod editor;
mod persist;

pub use editor::Editor;

use std::collections::BTreeSet;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::SystemTime;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::config::{AccessMode, StoreConfig};
use crate::error::Result;
use crate::listener::{ChangeListener, Dispatcher, ListenerHub};
use crate::lock::ProcessLock;
use crate::snapshot::{self, Snapshot, Value};
use crate::watcher::ChangeWatcher;
use crate::worker::WriteQueue;

/// File-metadata fingerprint: (size, modification time).
///
/// A cheap, non-cryptographic proxy for "has this file changed since I last
/// read it". A missing file stats as `(0, None)`.
pub(crate) type Fingerprint = (u64, Option<SystemTime>);

/// Snapshot state guarded by the per-store monitor.
pub(crate) struct StoreState {
    /// The live mapping; mutated only while this struct's mutex is held
    pub(crate) entries: Snapshot,

    /// False until the first disk read completes; accessors block on it
    pub(crate) loaded: bool,

    /// Fingerprint of the file content last merged into `entries`
    pub(crate) stat: Fingerprint,
}

pub(crate) struct StoreInner {
    pub(crate) name: String,
    pub(crate) file: PathBuf,
    pub(crate) backup: PathBuf,
    pub(crate) access: AccessMode,
    pub(crate) lock: ProcessLock,
    pub(crate) watcher: Mutex<ChangeWatcher>,
    pub(crate) state: Mutex<StoreState>,
    pub(crate) loaded_cond: Condvar,
    pub(crate) listeners: ListenerHub,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) queue: WriteQueue,
}

/// Handle to one named store.
///
/// Cheap to clone; all clones share the same in-memory snapshot. Obtain via
/// [`crate::StoreRegistry::open`], which guarantees one authoritative
/// instance per name per process.
#[derive(Clone)]
pub struct Store {
    pub(crate) inner: Arc<StoreInner>,
}

impl Store {
    /// Open the store backing files and kick off the initial asynchronous
    /// load. Construction never blocks on disk; accessors do, until the
    /// first load finishes.
    pub(crate) fn open(
        name: &str,
        config: &StoreConfig,
        dispatcher: Dispatcher,
        queue: WriteQueue,
    ) -> Result<Store> {
        let file = config.data_dir.join(format!("{name}.kv"));
        let backup = sibling(&file, ".bak");
        let lock_path = sibling(&file, ".lock");

        // The watch only arms on an existing file, so create it up front.
        if let Err(e) = ensure_file_exists(&file) {
            warn!(store = name, error = %e, "could not create store file");
        }

        let inner = Arc::new(StoreInner {
            name: name.to_string(),
            file: file.clone(),
            backup,
            access: config.access,
            lock: ProcessLock::new(lock_path, config.lock_retry_delay),
            watcher: Mutex::new(ChangeWatcher::new(file)),
            state: Mutex::new(StoreState {
                entries: Snapshot::new(),
                loaded: false,
                stat: (0, None),
            }),
            loaded_cond: Condvar::new(),
            listeners: ListenerHub::new(),
            dispatcher,
            queue,
        });

        // The watch callback must not keep the store alive; a reclaimed
        // store simply stops reloading.
        let weak: Weak<StoreInner> = Arc::downgrade(&inner);
        {
            let mut watcher = inner.watcher.lock();
            watcher.set_callback(move || {
                if let Some(inner) = weak.upgrade() {
                    Store { inner }.start_reload(true);
                }
            });
            watcher.arm();
        }

        let store = Store { inner };
        store.start_reload(false);
        Ok(store)
    }

    /// Name this store was opened under.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Path of the primary snapshot file.
    pub fn path(&self) -> &Path {
        &self.inner.file
    }

    // =========================================================================
    // Load
    // =========================================================================

    /// Mark the snapshot stale and reload it on a background thread.
    pub(crate) fn start_reload(&self, notify_listeners: bool) {
        self.inner.state.lock().loaded = false;
        let store = self.clone();
        let spawned = thread::Builder::new()
            .name(format!("crosskv-load-{}", self.inner.name))
            .spawn(move || store.reload(notify_listeners));
        if let Err(e) = spawned {
            warn!(store = self.name(), error = %e, "load thread spawn failed, reloading inline");
            self.reload(notify_listeners);
        }
    }

    /// Reload the snapshot from disk.
    ///
    /// Runs under the process lock. Recovers from a backup if one exists
    /// (copy-and-delete, never rename: a rename can silently invalidate the
    /// active watch), skips parsing when the fingerprint is unchanged, and
    /// merges parsed content into the live mapping. A parse failure keeps
    /// the prior in-memory snapshot.
    fn reload(&self, notify_listeners: bool) {
        let plock = self.inner.lock.acquire("reload");
        let mut state = self.inner.state.lock();
        let mut modified = Vec::new();
        if !state.loaded {
            let disk_trusted = self.recover_backup();
            if disk_trusted && self.fingerprint_changed(&state) {
                match snapshot::read_snapshot(&self.inner.file) {
                    Ok(parsed) => {
                        modified =
                            snapshot::update_merge(&mut state.entries, parsed, notify_listeners);
                        state.stat = self.current_fingerprint();
                    }
                    Err(e) => {
                        // No new data; the prior snapshot stays authoritative.
                        warn!(store = self.name(), error = %e, "snapshot unreadable, keeping in-memory state");
                    }
                }
            }
        }
        state.loaded = true;
        self.inner.loaded_cond.notify_all();
        drop(state);
        drop(plock);
        if notify_listeners {
            self.inner
                .listeners
                .dispatch(&self.inner.dispatcher, self.clone(), modified);
        }
    }

    /// Restore the primary from a leftover backup, if one exists.
    ///
    /// Called with the process lock held; the backup's existence marks an
    /// interrupted write, so until it is consumed the primary's content is
    /// untrusted. Returns false when a backup exists but could not be
    /// restored: callers must then skip reading the primary entirely, or a
    /// half-written (possibly truncated) snapshot would fold into the live
    /// mapping and the subsequent write would destroy the recovery point.
    pub(crate) fn recover_backup(&self) -> bool {
        if !self.inner.backup.exists() {
            return true;
        }
        if let Err(e) = ensure_file_exists(&self.inner.file) {
            warn!(store = self.name(), error = %e, "could not recreate store file");
        }
        self.inner.watcher.lock().rearm();
        match persist::copy_file(&self.inner.backup, &self.inner.file) {
            Ok(()) => {
                let _ = fs::remove_file(&self.inner.backup);
                debug!(store = self.name(), "recovered snapshot from backup");
                true
            }
            Err(e) => {
                warn!(store = self.name(), error = %e, "backup recovery failed");
                false
            }
        }
    }

    pub(crate) fn current_fingerprint(&self) -> Fingerprint {
        match fs::metadata(&self.inner.file) {
            Ok(meta) => (meta.len(), meta.modified().ok()),
            Err(_) => (0, None),
        }
    }

    pub(crate) fn fingerprint_changed(&self, state: &StoreState) -> bool {
        self.current_fingerprint() != state.stat
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Run `f` against the live mapping, blocking until the initial load
    /// has completed.
    fn with_loaded<R>(&self, f: impl FnOnce(&Snapshot) -> R) -> R {
        let mut state = self.inner.state.lock();
        while !state.loaded {
            self.inner.loaded_cond.wait(&mut state);
        }
        f(&state.entries)
    }

    /// Get the raw value for `key`, if present.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.with_loaded(|entries| entries.get(key).cloned())
    }

    /// Get a string value, or `default` when absent or of another type.
    pub fn get_string(&self, key: &str, default: &str) -> String {
        self.with_loaded(|entries| match entries.get(key) {
            Some(Value::String(v)) => v.clone(),
            _ => default.to_string(),
        })
    }

    /// Get a boolean value, or `default` when absent or of another type.
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.with_loaded(|entries| match entries.get(key) {
            Some(Value::Bool(v)) => *v,
            _ => default,
        })
    }

    /// Get a 32-bit integer value, or `default` when absent or of another type.
    pub fn get_int(&self, key: &str, default: i32) -> i32 {
        self.with_loaded(|entries| match entries.get(key) {
            Some(Value::Int(v)) => *v,
            _ => default,
        })
    }

    /// Get a 64-bit integer value, or `default` when absent or of another type.
    pub fn get_long(&self, key: &str, default: i64) -> i64 {
        self.with_loaded(|entries| match entries.get(key) {
            Some(Value::Long(v)) => *v,
            _ => default,
        })
    }

    /// Get a float value, or `default` when absent or of another type.
    pub fn get_float(&self, key: &str, default: f32) -> f32 {
        self.with_loaded(|entries| match entries.get(key) {
            Some(Value::Float(v)) => *v,
            _ => default,
        })
    }

    /// Get a string-set value, or `default` when absent or of another type.
    pub fn get_string_set(&self, key: &str, default: BTreeSet<String>) -> BTreeSet<String> {
        self.with_loaded(|entries| match entries.get(key) {
            Some(Value::StringSet(v)) => v.clone(),
            _ => default,
        })
    }

    /// Whether `key` is present, regardless of value type.
    pub fn contains(&self, key: &str) -> bool {
        self.with_loaded(|entries| entries.contains_key(key))
    }

    /// Isolated copy of the whole mapping, safe to mutate.
    pub fn get_all(&self) -> Snapshot {
        self.with_loaded(|entries| entries.clone())
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Begin a staged batch of mutations.
    ///
    /// Blocks until the initial load completes, so the editor resolves
    /// against a real base snapshot.
    pub fn edit(&self) -> Editor {
        self.with_loaded(|_| ());
        Editor::new(self.clone())
    }

    // =========================================================================
    // Listeners
    // =========================================================================

    /// Register a change listener.
    ///
    /// The registration holds only a weak reference: a listener the
    /// application no longer references is dropped without explicit
    /// unregistration.
    pub fn register_listener<L: ChangeListener + 'static>(&self, listener: &Arc<L>) {
        let weak: Weak<dyn ChangeListener> = Arc::downgrade(listener) as Weak<dyn ChangeListener>;
        self.inner.listeners.register(weak);
    }

    /// Unregister a previously registered listener. No-op if absent.
    pub fn unregister_listener<L: ChangeListener + 'static>(&self, listener: &Arc<L>) {
        let weak: Weak<dyn ChangeListener> = Arc::downgrade(listener) as Weak<dyn ChangeListener>;
        self.inner.listeners.unregister(&weak);
    }

    pub(crate) fn hub(&self) -> &ListenerHub {
        &self.inner.listeners
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Release the file watch.
    ///
    /// The store stays readable and writable afterwards; it just no longer
    /// observes external changes. Called by the registry at teardown.
    pub fn close(&self) {
        self.inner.watcher.lock().disarm();
    }
}

/// `<path><suffix>` as a sibling path (`store.kv` -> `store.kv.bak`).
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut s: OsString = path.as_os_str().to_os_string();
    s.push(suffix);
    PathBuf::from(s)
}

/// Create the registry's data directory if missing, with store directory
/// permissions.
pub(crate) fn ensure_data_dir(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)?;
        persist::apply_dir_permissions(path);
    }
    Ok(())
}

/// Create `path` and its parent directory if missing. Never truncates.
pub(crate) fn ensure_file_exists(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)?;
            persist::apply_dir_permissions(parent);
        }
    }
    if !path.exists() {
        fs::File::create(path)?;
    }
    Ok(())
}
