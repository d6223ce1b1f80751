//! Tests for crash recovery
//!
//! These tests verify:
//! - A backup left by an interrupted write is preferred over the primary
//! - A corrupt primary without a backup degrades to "no data", not a crash
//! - A deleted primary is recreated from the backup
//! - A commit issued on a live store in the crash state restores the
//!   backup before resolving, instead of reading the truncated primary
//! - Recovery leaves no backup file behind

use std::thread;
use std::time::{Duration, Instant};

use crosskv::{StoreConfig, StoreRegistry, Value};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn config_for(temp: &TempDir) -> StoreConfig {
    StoreConfig::builder().data_dir(temp.path()).build()
}

/// Populate `name` with two entries and shut the registry down cleanly.
fn seed_store(temp: &TempDir, name: &str) {
    let registry = StoreRegistry::new(config_for(temp)).unwrap();
    let store = registry.open(name).unwrap();
    let mut editor = store.edit();
    editor.put_int("a", 1).put_string("b", "two");
    assert!(editor.commit());
    registry.shutdown();
}

// =============================================================================
// Crash Simulation Tests
// =============================================================================

#[test]
fn test_interrupted_write_recovers_from_backup() {
    let temp = TempDir::new().unwrap();
    seed_store(&temp, "crash");

    let primary = temp.path().join("crash.kv");
    let backup = temp.path().join("crash.kv.bak");

    // Simulate a kill between backup creation and primary completion:
    // the backup holds the good snapshot, the primary is half-written junk.
    std::fs::copy(&primary, &backup).unwrap();
    std::fs::write(&primary, b"partial garbage from a dying process").unwrap();

    let registry = StoreRegistry::new(config_for(&temp)).unwrap();
    let store = registry.open("crash").unwrap();

    assert_eq!(store.get_int("a", 0), 1);
    assert_eq!(store.get_string("b", ""), "two");
    // The crash marker is consumed by recovery.
    assert!(!backup.exists());
}

#[test]
fn test_deleted_primary_recovers_from_backup() {
    let temp = TempDir::new().unwrap();
    seed_store(&temp, "deleted");

    let primary = temp.path().join("deleted.kv");
    let backup = temp.path().join("deleted.kv.bak");

    std::fs::copy(&primary, &backup).unwrap();
    std::fs::remove_file(&primary).unwrap();

    let registry = StoreRegistry::new(config_for(&temp)).unwrap();
    let store = registry.open("deleted").unwrap();

    assert_eq!(store.get_int("a", 0), 1);
    assert!(primary.exists());
    assert!(!backup.exists());
}

#[test]
fn test_commit_in_crash_state_keeps_prior_data() {
    let temp = TempDir::new().unwrap();
    let registry = StoreRegistry::new(config_for(&temp)).unwrap();
    let store = registry.open("midwrite").unwrap();

    let mut editor = store.edit();
    editor.put_int("a", 1);
    assert!(editor.commit());

    let primary = temp.path().join("midwrite.kv");
    let backup = temp.path().join("midwrite.kv.bak");

    // Recreate the state of a write that died after cleaning up its
    // half-written primary: good backup, truncated primary. A commit on
    // the live store must restore from the backup, not read the empty
    // primary as "everything was removed".
    std::fs::copy(&primary, &backup).unwrap();
    std::fs::write(&primary, b"").unwrap();

    let mut editor = store.edit();
    editor.put_int("c", 3);
    assert!(editor.commit());

    assert_eq!(store.get_int("a", -1), 1);
    assert_eq!(store.get_int("c", 0), 3);
    assert!(!backup.exists());
    registry.shutdown();

    // A fresh load agrees.
    let registry = StoreRegistry::new(config_for(&temp)).unwrap();
    let store = registry.open("midwrite").unwrap();
    assert_eq!(store.get_int("a", -1), 1);
    assert_eq!(store.get_int("c", 0), 3);
}

#[test]
fn test_external_crash_state_recovered_by_reload() {
    let temp = TempDir::new().unwrap();
    let registry = StoreRegistry::new(config_for(&temp)).unwrap();
    let store = registry.open("watched").unwrap();

    let mut editor = store.edit();
    editor.put_int("a", 1);
    assert!(editor.commit());

    let primary = temp.path().join("watched.kv");
    let backup = temp.path().join("watched.kv.bak");
    std::fs::copy(&primary, &backup).unwrap();
    std::fs::write(&primary, b"").unwrap();

    // The truncation fires the watch; the reload must restore from the
    // backup instead of merging the empty primary over the live mapping.
    let deadline = Instant::now() + Duration::from_secs(5);
    while backup.exists() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(20));
    }
    assert!(!backup.exists());
    assert_eq!(store.get_int("a", -1), 1);
}

// =============================================================================
// Corruption Tests
// =============================================================================

#[test]
fn test_corrupt_primary_without_backup_is_no_data() {
    let temp = TempDir::new().unwrap();
    let primary = temp.path().join("corrupt.kv");
    std::fs::write(&primary, b"random bytes that are not a snapshot").unwrap();

    let registry = StoreRegistry::new(config_for(&temp)).unwrap();
    let store = registry.open("corrupt").unwrap();

    // Unreadable content is treated as an empty store, never an error.
    assert!(store.get_all().is_empty());
    assert_eq!(store.get_string("a", "default"), "default");
}

#[test]
fn test_store_is_writable_after_corruption() {
    let temp = TempDir::new().unwrap();
    let primary = temp.path().join("rewrite.kv");
    std::fs::write(&primary, b"random bytes that are not a snapshot").unwrap();

    {
        let registry = StoreRegistry::new(config_for(&temp)).unwrap();
        let store = registry.open("rewrite").unwrap();
        let mut editor = store.edit();
        editor.put_int("fresh", 42);
        assert!(editor.commit());
        registry.shutdown();
    }

    let registry = StoreRegistry::new(config_for(&temp)).unwrap();
    let store = registry.open("rewrite").unwrap();
    assert_eq!(store.get("fresh"), Some(Value::Int(42)));
}
