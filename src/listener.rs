//! Listener Hub
//!
//! Change listeners and the thread that delivers to them.
//!
//! ## Responsibilities
//! - Weakly-held listener registrations: registering does not keep a
//!   listener alive, so callers never have to deregister to avoid leaks
//! - Delivery of a modified-key set on one fixed dispatch thread, inline
//!   when the triggering operation already runs on that thread
//! - Keys delivered in modified-set insertion order; delivery order between
//!   listeners for the same key is unspecified

use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};

use crossbeam::channel::{unbounded, Sender};
use parking_lot::Mutex;
use tracing::{trace, warn};

use crate::store::Store;

/// Callback invoked once per changed key after a commit or external reload.
pub trait ChangeListener: Send + Sync {
    fn on_changed(&self, store: &Store, key: &str);
}

type Job = Box<dyn FnOnce() + Send>;

/// Handle to the designated notification thread.
///
/// One dispatcher exists per registry; every store created by that registry
/// delivers on it. Cheap to clone.
#[derive(Clone)]
pub(crate) struct Dispatcher {
    tx: Sender<Job>,
    thread_id: ThreadId,
}

impl Dispatcher {
    pub(crate) fn new() -> std::io::Result<Self> {
        let (tx, rx) = unbounded::<Job>();
        let handle = thread::Builder::new()
            .name("crosskv-dispatch".to_string())
            .spawn(move || {
                for job in rx {
                    job();
                }
            })?;
        Ok(Self {
            tx,
            thread_id: handle.thread().id(),
        })
    }

    /// Run `job` inline if already on the dispatch thread, otherwise queue it.
    pub(crate) fn run(&self, job: Job) {
        if thread::current().id() == self.thread_id {
            job();
        } else if self.tx.send(job).is_err() {
            warn!("dispatch thread gone, dropping notification");
        }
    }
}

/// Per-store set of weakly-held listeners.
pub(crate) struct ListenerHub {
    listeners: Mutex<Vec<Weak<dyn ChangeListener>>>,
}

impl ListenerHub {
    pub(crate) fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn register(&self, listener: Weak<dyn ChangeListener>) {
        self.listeners.lock().push(listener);
    }

    pub(crate) fn unregister(&self, listener: &Weak<dyn ChangeListener>) {
        self.listeners.lock().retain(|w| !w.ptr_eq(listener));
    }

    /// Upgrade live registrations and drop dead ones.
    fn snapshot(&self) -> Vec<Arc<dyn ChangeListener>> {
        let mut guard = self.listeners.lock();
        guard.retain(|w| w.strong_count() > 0);
        guard.iter().filter_map(|w| w.upgrade()).collect()
    }

    /// Deliver `keys` for `store` on the dispatch thread.
    ///
    /// No-op for an empty key set. Listener liveness is re-checked at
    /// delivery time, not at queue time.
    pub(crate) fn dispatch(&self, dispatcher: &Dispatcher, store: Store, keys: Vec<String>) {
        if keys.is_empty() {
            return;
        }
        dispatcher.run(Box::new(move || {
            let listeners = store.hub().snapshot();
            if listeners.is_empty() {
                return;
            }
            trace!(store = store.name(), count = keys.len(), "dispatching key changes");
            for key in &keys {
                for listener in &listeners {
                    listener.on_changed(&store, key);
                }
            }
        }));
    }
}
