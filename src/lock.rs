//! Process-level exclusive lock
//!
//! A named, file-backed mutual-exclusion primitive composing two layers:
//! - an OS-level advisory exclusive lock on a dedicated `.lock` file, which
//!   blocks other *processes*
//! - an intra-process re-entrant lock, which blocks other *threads*
//!
//! The second layer is mandatory: on common platforms the OS file lock does
//! not serialize threads of the same process, so without it two threads could
//! both believe they hold exclusivity.
//!
//! Acquisition is blocking with no timeout. Transient failures (the lock file
//! vanishing, interrupted waits turned into plain I/O errors) close the failed
//! handle and retry in a loop. A small set of fatal conditions gives up and
//! proceeds *unlocked* - a degraded-safety fallback that keeps the store
//! usable, logged loudly rather than silently ignored.

use std::cell::RefCell;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use fs2::FileExt;
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use tracing::{debug, trace, warn};

/// Cross-process + cross-thread exclusive lock on a lock file.
pub struct ProcessLock {
    /// Path of the dedicated lock file (`<primary>.lock`)
    lock_path: PathBuf,

    /// Intra-process layer; the RefCell is only touched while the
    /// re-entrant lock is held, so borrows never overlap across threads
    inner: ReentrantMutex<RefCell<LockInner>>,

    /// Delay between retries of a failed OS-level acquisition
    retry_delay: Duration,
}

struct LockInner {
    /// Open handle holding the OS-level lock; None while unlocked or when
    /// acquisition degraded to thread-only locking
    file: Option<File>,

    /// Re-entrancy depth; the OS lock is taken at 0 -> 1 and released at 1 -> 0
    depth: usize,
}

/// RAII guard returned by [`ProcessLock::acquire`].
///
/// Releases both layers in reverse order on drop.
pub struct LockGuard<'a> {
    lock: &'a ProcessLock,
    guard: ReentrantMutexGuard<'a, RefCell<LockInner>>,
    remove_file: bool,
}

impl ProcessLock {
    /// Create a lock around the given lock-file path.
    ///
    /// The lock file (and its parent directory) is created lazily on the
    /// first acquisition, not here.
    pub fn new(lock_path: PathBuf, retry_delay: Duration) -> Self {
        Self {
            lock_path,
            inner: ReentrantMutex::new(RefCell::new(LockInner {
                file: None,
                depth: 0,
            })),
            retry_delay,
        }
    }

    /// Block until the calling thread holds both the intra-process lock and
    /// the OS-level file lock.
    ///
    /// Re-entrant: the same thread may nest acquisitions; the OS lock is only
    /// taken by the outermost one. `tag` names the calling operation in logs.
    pub fn acquire(&self, tag: &str) -> LockGuard<'_> {
        trace!(tag, path = %self.lock_path.display(), "lock.wait");
        let guard = self.inner.lock();
        {
            let mut inner = guard.borrow_mut();
            if inner.depth == 0 {
                inner.file = self.lock_file(tag);
            }
            inner.depth += 1;
        }
        trace!(tag, "lock.acquired");
        LockGuard {
            lock: self,
            guard,
            remove_file: false,
        }
    }

    /// Path of the lock file.
    pub fn path(&self) -> &PathBuf {
        &self.lock_path
    }

    /// Acquire the OS-level lock, retrying on transient errors.
    ///
    /// Returns None when acquisition degraded: either the lock file could not
    /// be created at all, or a fatal error kind was hit. Callers proceed
    /// without cross-process exclusion in that case.
    fn lock_file(&self, tag: &str) -> Option<File> {
        if let Err(e) = self.ensure_lock_file() {
            warn!(tag, path = %self.lock_path.display(), error = %e,
                  "could not create lock file, proceeding without cross-process lock");
            return None;
        }
        loop {
            let file = match OpenOptions::new()
                .write(true)
                .create(true)
                .open(&self.lock_path)
            {
                Ok(f) => f,
                Err(e) => {
                    warn!(tag, error = %e,
                          "could not open lock file, proceeding without cross-process lock");
                    return None;
                }
            };
            match file.lock_exclusive() {
                Ok(()) => return Some(file),
                Err(e) => match e.kind() {
                    // Fatal kinds: give up and run unlocked rather than
                    // making the store unusable.
                    ErrorKind::Interrupted | ErrorKind::PermissionDenied => {
                        warn!(tag, error = %e,
                              "lock acquisition failed, proceeding without cross-process lock");
                        return None;
                    }
                    _ => {
                        // Close the failed handle and try again.
                        drop(file);
                        debug!(tag, error = %e, "lock acquisition retry");
                        thread::sleep(self.retry_delay);
                    }
                },
            }
        }
    }

    fn ensure_lock_file(&self) -> std::io::Result<()> {
        if let Some(parent) = self.lock_path.parent() {
            fs::create_dir_all(parent)?;
        }
        if !self.lock_path.exists() {
            File::create(&self.lock_path)?;
        }
        Ok(())
    }
}

impl LockGuard<'_> {
    /// Delete the lock file once the outermost guard releases.
    ///
    /// Used at registry teardown so an uninstalled store leaves nothing
    /// behind; normal releases keep the file.
    pub fn remove_file_on_release(&mut self) {
        self.remove_file = true;
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        let mut inner = self.guard.borrow_mut();
        inner.depth -= 1;
        if inner.depth == 0 {
            if let Some(file) = inner.file.take() {
                if let Err(e) = FileExt::unlock(&file) {
                    warn!(path = %self.lock.lock_path.display(), error = %e, "unlock failed");
                }
            }
            if self.remove_file {
                let _ = fs::remove_file(&self.lock.lock_path);
            }
        }
        trace!(path = %self.lock.lock_path.display(), "lock.released");
    }
}
