//! Editor session
//!
//! A staged batch of mutations, resolved against the latest on-disk state at
//! commit time. An editor only touches its private pending map until
//! [`Editor::commit`] or [`Editor::apply`]; either consumes the session.
//!
//! Resolution order on commit: if the fingerprint shows the disk moved under
//! us, the disk state is folded into the live mapping first (disk wins over
//! this session's stale base), then the session's explicit edits re-apply on
//! top.

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, warn};

use crate::snapshot::{self, push_modified, Value};

use super::Store;

/// Staged edits: key -> new value, or `None` as the tombstone meaning
/// "remove this key". Removing and "setting null" are the same tombstone.
pub(crate) struct PendingEdits {
    pub(crate) changes: HashMap<String, Option<Value>>,
    pub(crate) clear_all: bool,
}

/// A single-use batch of mutations against one store.
pub struct Editor {
    store: Store,
    pending: PendingEdits,
}

impl Editor {
    pub(crate) fn new(store: Store) -> Self {
        Self {
            store,
            pending: PendingEdits {
                changes: HashMap::new(),
                clear_all: false,
            },
        }
    }

    /// Stage any raw value.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.pending.changes.insert(key.into(), Some(value.into()));
        self
    }

    /// Stage a string value.
    pub fn put_string(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.put(key, Value::String(value.into()))
    }

    /// Stage a boolean value.
    pub fn put_bool(&mut self, key: impl Into<String>, value: bool) -> &mut Self {
        self.put(key, Value::Bool(value))
    }

    /// Stage a 32-bit integer value.
    pub fn put_int(&mut self, key: impl Into<String>, value: i32) -> &mut Self {
        self.put(key, Value::Int(value))
    }

    /// Stage a 64-bit integer value.
    pub fn put_long(&mut self, key: impl Into<String>, value: i64) -> &mut Self {
        self.put(key, Value::Long(value))
    }

    /// Stage a float value.
    pub fn put_float(&mut self, key: impl Into<String>, value: f32) -> &mut Self {
        self.put(key, Value::Float(value))
    }

    /// Stage a string-set value.
    pub fn put_string_set(&mut self, key: impl Into<String>, value: BTreeSet<String>) -> &mut Self {
        self.put(key, Value::StringSet(value))
    }

    /// Stage removal of `key`.
    pub fn remove(&mut self, key: impl Into<String>) -> &mut Self {
        self.pending.changes.insert(key.into(), None);
        self
    }

    /// Stage removal of every key not also re-put in this same session.
    pub fn clear(&mut self) -> &mut Self {
        self.pending.clear_all = true;
        self
    }

    /// Commit synchronously.
    ///
    /// Returns whether the physical write succeeded; a no-op diff reports
    /// success without touching disk. The in-memory snapshot is updated and
    /// listeners are notified even when the write itself fails - the backup
    /// guarantees the next load recovers.
    pub fn commit(self) -> bool {
        let Editor { store, pending } = self;
        store.commit_edits(pending)
    }

    /// Commit on the background write worker and return immediately.
    ///
    /// Fire-and-forget with respect to the caller; use
    /// [`crate::StoreRegistry::flush_pending`] as a completion barrier
    /// before process shutdown.
    pub fn apply(self) {
        let Editor { store, pending } = self;
        let queue = store.inner.queue.clone();
        queue.submit(Box::new(move || {
            store.commit_edits(pending);
        }));
    }
}

impl Store {
    /// Resolve and apply a pending batch: the commit path shared by
    /// [`Editor::commit`] and [`Editor::apply`].
    pub(crate) fn commit_edits(&self, pending: PendingEdits) -> bool {
        let plock = self.inner.lock.acquire("commit");
        let mut state = self.inner.state.lock();
        let mut modified: Vec<String> = Vec::new();
        let mut changes_made = false;

        // A leftover backup marks an interrupted write: restore it before
        // trusting the primary, or the truncated primary would read as a
        // valid empty snapshot and wipe the live mapping.
        let disk_trusted = self.recover_backup();

        // The disk may be newer than this session's base snapshot; fold it
        // in before re-applying the session's own edits.
        if disk_trusted && self.fingerprint_changed(&state) {
            match snapshot::read_snapshot(&self.inner.file) {
                Ok(disk) => {
                    for key in snapshot::update_merge(&mut state.entries, disk, true) {
                        push_modified(&mut modified, key);
                    }
                    state.stat = self.current_fingerprint();
                }
                Err(e) => {
                    warn!(store = self.name(), error = %e,
                          "ignoring unreadable snapshot while committing");
                }
            }
        }

        if pending.clear_all {
            let removed: Vec<String> = state
                .entries
                .keys()
                .filter(|key| !matches!(pending.changes.get(*key), Some(Some(_))))
                .cloned()
                .collect();
            for key in removed {
                state.entries.remove(&key);
                changes_made = true;
                push_modified(&mut modified, key);
            }
        }

        for (key, change) in pending.changes {
            match change {
                None => {
                    if state.entries.remove(&key).is_some() {
                        changes_made = true;
                        push_modified(&mut modified, key);
                    }
                }
                Some(value) => {
                    if state.entries.get(&key) != Some(&value) {
                        state.entries.insert(key.clone(), value);
                        changes_made = true;
                        push_modified(&mut modified, key);
                    }
                }
            }
        }

        let succeeded = if changes_made {
            match self.write_to_disk(&mut state) {
                Ok(()) => true,
                Err(e) => {
                    warn!(store = self.name(), error = %e, "commit write failed");
                    false
                }
            }
        } else {
            debug!(store = self.name(), "commit with empty diff, skipping write");
            true
        };

        drop(state);
        self.inner
            .listeners
            .dispatch(&self.inner.dispatcher, self.clone(), modified);
        drop(plock);
        succeeded
    }
}
