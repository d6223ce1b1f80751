//! Persister
//!
//! The durable-write protocol. At every instant either the backup or the
//! fully-written primary (or both) is a complete, valid snapshot; recovery
//! never needs more than "prefer the backup if it exists".
//!
//! ## Write sequence
//! 1. Copy primary -> backup (skipped if a backup already exists); a failed
//!    backup aborts the write, so a crash-recovery point always precedes it
//! 2. Recreate the primary and its watch if the file was deleted externally
//! 3. Serialize through a buffered stream and fsync before declaring success
//! 4. Update the fingerprint, then delete the backup - its existence is the
//!    sole crash marker the next load keys off
//! 5. On failure, keep the backup and best-effort truncate the half-written
//!    primary; truncation, not deletion, keeps the inode and thus the watch

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::Path;

use tracing::warn;

use crate::error::{Result, StoreError};
use crate::snapshot;

use super::{ensure_file_exists, Store, StoreState};

/// Buffer size for file copies
const BUFFER_SIZE: usize = 16 * 1024;

impl Store {
    /// Write the live mapping to disk following the backup-then-replace
    /// protocol. Called with the process lock and the store monitor held.
    pub(crate) fn write_to_disk(&self, state: &mut StoreState) -> Result<()> {
        let inner = &self.inner;

        if inner.file.exists() {
            if !inner.backup.exists() {
                copy_file(&inner.file, &inner.backup).map_err(|e| {
                    StoreError::Backup(format!(
                        "{} -> {}: {e}",
                        inner.file.display(),
                        inner.backup.display()
                    ))
                })?;
                apply_file_permissions(&inner.backup, inner.access.file_mode());
            }
        } else {
            // Externally deleted; recreate file and watch before writing.
            ensure_file_exists(&inner.file)?;
            inner.watcher.lock().rearm();
        }

        match snapshot::write_snapshot(&inner.file, &state.entries) {
            Ok(()) => {
                apply_file_permissions(&inner.file, inner.access.file_mode());
                state.stat = self.current_fingerprint();
                if inner.backup.exists() {
                    let _ = fs::remove_file(&inner.backup);
                }
                Ok(())
            }
            Err(e) => {
                // The backup stays: the next load recovers from it.
                if let Err(trunc_err) = truncate_file(&inner.file) {
                    warn!(store = self.name(), error = %trunc_err,
                          "could not clean up partially-written snapshot");
                }
                Err(e)
            }
        }
    }
}

/// Stream-copy `src` to `dst`, fsyncing the destination.
///
/// Used for both backup creation and backup recovery. Copying preserves the
/// destination inode where it exists, which a rename would not.
pub(crate) fn copy_file(src: &Path, dst: &Path) -> io::Result<()> {
    let mut reader = BufReader::with_capacity(BUFFER_SIZE, File::open(src)?);
    let mut writer = BufWriter::with_capacity(BUFFER_SIZE, File::create(dst)?);
    io::copy(&mut reader, &mut writer)?;
    writer.into_inner().map_err(|e| e.into_error())?.sync_all()
}

/// Empty the file without deleting it.
fn truncate_file(path: &Path) -> io::Result<()> {
    let file = fs::OpenOptions::new().write(true).truncate(true).open(path)?;
    file.sync_all()
}

/// Apply Unix permission bits to a store file. No-op elsewhere.
#[cfg(unix)]
pub(crate) fn apply_file_permissions(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(mode)) {
        warn!(path = %path.display(), error = %e, "could not set file permissions");
    }
}

#[cfg(not(unix))]
pub(crate) fn apply_file_permissions(_path: &Path, _mode: u32) {}

/// Permissions for a freshly created data directory: owner and group full,
/// others may traverse.
#[cfg(unix)]
pub(crate) fn apply_dir_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o771)) {
        warn!(path = %path.display(), error = %e, "could not set directory permissions");
    }
}

#[cfg(not(unix))]
pub(crate) fn apply_dir_permissions(_path: &Path) {}
