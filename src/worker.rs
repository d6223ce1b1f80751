//! Background write queue
//!
//! A single dedicated worker executing deferred (`apply`) writes in
//! submission order, with a barrier so a process can wait for every pending
//! write before exiting. This replaces the hidden deferred-work queue of the
//! system crosskv was modeled on with an explicit, owned one.

use std::sync::Arc;
use std::thread;

use crossbeam::channel::{unbounded, Sender};
use parking_lot::{Condvar, Mutex};
use tracing::warn;

type Job = Box<dyn FnOnce() + Send>;

struct PendingCount {
    count: Mutex<usize>,
    idle: Condvar,
}

/// Handle to the background write worker. Cheap to clone; one per registry.
#[derive(Clone)]
pub(crate) struct WriteQueue {
    tx: Sender<Job>,
    pending: Arc<PendingCount>,
}

impl WriteQueue {
    pub(crate) fn new() -> std::io::Result<Self> {
        let (tx, rx) = unbounded::<Job>();
        thread::Builder::new()
            .name("crosskv-write".to_string())
            .spawn(move || {
                for job in rx {
                    job();
                }
            })?;
        Ok(Self {
            tx,
            pending: Arc::new(PendingCount {
                count: Mutex::new(0),
                idle: Condvar::new(),
            }),
        })
    }

    /// Queue `job` for execution on the worker. Fire-and-forget.
    pub(crate) fn submit(&self, job: Job) {
        *self.pending.count.lock() += 1;
        let pending = Arc::clone(&self.pending);
        let wrapped: Job = Box::new(move || {
            job();
            let mut count = pending.count.lock();
            *count -= 1;
            if *count == 0 {
                pending.idle.notify_all();
            }
        });
        if self.tx.send(wrapped).is_err() {
            warn!("write worker gone, dropping deferred write");
            let mut count = self.pending.count.lock();
            *count -= 1;
            if *count == 0 {
                self.pending.idle.notify_all();
            }
        }
    }

    /// Block until every job submitted so far has finished.
    ///
    /// The shutdown barrier: invoke before process exit to guarantee
    /// deferred writes have reached disk.
    pub(crate) fn wait_idle(&self) {
        let mut count = self.pending.count.lock();
        while *count > 0 {
            self.pending.idle.wait(&mut count);
        }
    }
}
