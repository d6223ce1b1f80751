//! Snapshot file format
//!
//! A plain, versioned encoding for one complete snapshot.
//!
//! ## File Format
//! ```text
//! ┌───────────┬─────────────┬─────────┬──────────────────────┐
//! │ Magic (4) │ Version (1) │ CRC (4) │ Body (bincode map)   │
//! └───────────┴─────────────┴─────────┴──────────────────────┘
//! ```
//!
//! The CRC covers the body only. A zero-length file decodes to the empty
//! snapshot (stores create their primary file before first writing to it);
//! anything else that fails validation is reported as `Corrupt` and treated
//! by callers as "no new data", never as a crash.

use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{Result, StoreError};
use super::Snapshot;

/// Magic bytes at the start of every non-empty snapshot file
pub const MAGIC: &[u8; 4] = b"CKV\0";

/// Current snapshot format version
pub const FORMAT_VERSION: u8 = 1;

/// Header size: 4 bytes magic + 1 byte version + 4 bytes CRC
const HEADER_SIZE: usize = 9;

/// Buffer size for snapshot I/O (matches the copy buffer in persist)
const BUFFER_SIZE: usize = 16 * 1024;

/// Serialize `snapshot` to `path`, truncating any previous content, and
/// fsync before returning.
///
/// Durability matters more than latency here: the caller has already made a
/// backup, and success is only declared once the bytes are on stable storage.
pub fn write_snapshot(path: &Path, snapshot: &Snapshot) -> Result<()> {
    let body =
        bincode::serialize(snapshot).map_err(|e| StoreError::Serialization(e.to_string()))?;

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&body);
    let crc = hasher.finalize();

    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    let mut writer = BufWriter::with_capacity(BUFFER_SIZE, file);
    writer.write_all(MAGIC)?;
    writer.write_all(&[FORMAT_VERSION])?;
    writer.write_all(&crc.to_be_bytes())?;
    writer.write_all(&body)?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(())
}

/// Parse the snapshot stored at `path`.
///
/// Any validation failure (short file, bad magic, unknown version, CRC
/// mismatch, undecodable body) is a [`StoreError::Corrupt`].
pub fn read_snapshot(path: &Path) -> Result<Snapshot> {
    let bytes = std::fs::read(path)?;
    decode_snapshot(&bytes)
}

/// Decode a snapshot from raw bytes.
pub fn decode_snapshot(bytes: &[u8]) -> Result<Snapshot> {
    if bytes.is_empty() {
        return Ok(Snapshot::new());
    }
    if bytes.len() < HEADER_SIZE {
        return Err(StoreError::Corrupt(format!(
            "file too short: {} bytes",
            bytes.len()
        )));
    }
    if &bytes[0..4] != MAGIC {
        return Err(StoreError::Corrupt("bad magic".to_string()));
    }
    let version = bytes[4];
    if version != FORMAT_VERSION {
        return Err(StoreError::Corrupt(format!(
            "unsupported format version {version}"
        )));
    }
    let expected_crc = u32::from_be_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]);
    let body = &bytes[HEADER_SIZE..];

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(body);
    if hasher.finalize() != expected_crc {
        return Err(StoreError::Corrupt("CRC mismatch".to_string()));
    }

    bincode::deserialize(body).map_err(|e| StoreError::Corrupt(e.to_string()))
}
