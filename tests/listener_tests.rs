//! Tests for change listeners
//!
//! These tests verify:
//! - Exactly one notification for a key whose value actually changed
//! - No notification for an equal re-set, nor for a reload that finds
//!   identical content behind a moved fingerprint
//! - Weak registration: a dropped listener never fires and never crashes
//! - Unregistration stops delivery
//! - External file changes propagate to another store instance

use std::sync::Arc;
use std::time::{Duration, Instant};

use crosskv::{ChangeListener, Store, StoreConfig, StoreRegistry};
use parking_lot::Mutex;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

struct Recorder {
    events: Mutex<Vec<String>>,
}

impl Recorder {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
        })
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    /// Poll until the recorded events match `expected` (any order) or the
    /// deadline passes; dispatch is asynchronous.
    fn wait_for(&self, expected: &[&str], timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let mut events = self.events();
            events.sort();
            let mut want: Vec<String> = expected.iter().map(|s| s.to_string()).collect();
            want.sort();
            if events == want {
                return true;
            }
            if Instant::now() > deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
    }
}

impl ChangeListener for Recorder {
    fn on_changed(&self, _store: &Store, key: &str) {
        self.events.lock().push(key.to_string());
    }
}

fn setup_registry() -> (TempDir, StoreRegistry) {
    let temp_dir = TempDir::new().unwrap();
    let config = StoreConfig::builder().data_dir(temp_dir.path()).build();
    let registry = StoreRegistry::new(config).unwrap();
    (temp_dir, registry)
}

// =============================================================================
// Basic Notification Tests
// =============================================================================

#[test]
fn test_changed_key_notified_exactly_once() {
    let (_temp, registry) = setup_registry();
    let store = registry.open("notify").unwrap();

    let recorder = Recorder::new();
    store.register_listener(&recorder);

    let mut editor = store.edit();
    editor.put_int("x", 1);
    assert!(editor.commit());

    assert!(recorder.wait_for(&["x"], Duration::from_secs(2)));

    // Same value again: no diff, no notification.
    let mut editor = store.edit();
    editor.put_int("x", 1);
    assert!(editor.commit());

    std::thread::sleep(Duration::from_millis(300));
    assert_eq!(recorder.events(), vec!["x".to_string()]);
}

#[test]
fn test_reload_of_unchanged_content_is_silent() {
    let (_temp, registry) = setup_registry();
    let store = registry.open("idempotent").unwrap();

    let recorder = Recorder::new();
    store.register_listener(&recorder);

    let mut editor = store.edit();
    editor.put_int("k", 1);
    assert!(editor.commit());
    assert!(recorder.wait_for(&["k"], Duration::from_secs(2)));

    // Bump the mtime without changing content: the fingerprint moves and
    // the watch fires a reload, but no resolved value changes, so the
    // second load must stay silent.
    let file = std::fs::OpenOptions::new()
        .write(true)
        .open(store.path())
        .unwrap();
    file.set_modified(std::time::SystemTime::now()).unwrap();
    drop(file);

    std::thread::sleep(Duration::from_millis(500));
    assert_eq!(recorder.events(), vec!["k".to_string()]);
    assert_eq!(store.get_int("k", 0), 1);
}

#[test]
fn test_removal_is_notified() {
    let (_temp, registry) = setup_registry();
    let store = registry.open("removals").unwrap();

    let mut editor = store.edit();
    editor.put_int("x", 1);
    assert!(editor.commit());

    let recorder = Recorder::new();
    store.register_listener(&recorder);

    let mut editor = store.edit();
    editor.remove("x");
    assert!(editor.commit());

    assert!(recorder.wait_for(&["x"], Duration::from_secs(2)));
}

#[test]
fn test_multi_key_commit_notifies_each_changed_key() {
    let (_temp, registry) = setup_registry();
    let store = registry.open("multi").unwrap();

    let mut editor = store.edit();
    editor.put_int("same", 1);
    assert!(editor.commit());

    let recorder = Recorder::new();
    store.register_listener(&recorder);

    let mut editor = store.edit();
    editor.put_int("same", 1).put_int("a", 2).put_int("b", 3);
    assert!(editor.commit());

    // "same" did not change, so only the two new keys fire.
    assert!(recorder.wait_for(&["a", "b"], Duration::from_secs(2)));
}

// =============================================================================
// Registration Lifetime Tests
// =============================================================================

#[test]
fn test_dropped_listener_is_not_delivered() {
    let (_temp, registry) = setup_registry();
    let store = registry.open("weak").unwrap();

    let recorder = Recorder::new();
    store.register_listener(&recorder);
    drop(recorder);

    // Registration must not keep the listener alive; this just must not
    // crash or leak delivery into freed state.
    let mut editor = store.edit();
    editor.put_int("x", 1);
    assert!(editor.commit());

    std::thread::sleep(Duration::from_millis(200));
    assert_eq!(store.get_int("x", 0), 1);
}

#[test]
fn test_unregistered_listener_is_silent() {
    let (_temp, registry) = setup_registry();
    let store = registry.open("unregister").unwrap();

    let recorder = Recorder::new();
    store.register_listener(&recorder);
    store.unregister_listener(&recorder);

    let mut editor = store.edit();
    editor.put_int("x", 1);
    assert!(editor.commit());

    std::thread::sleep(Duration::from_millis(300));
    assert!(recorder.events().is_empty());
}

// =============================================================================
// External Change Tests
// =============================================================================

#[test]
fn test_external_write_triggers_notification() {
    let temp = TempDir::new().unwrap();
    let config = StoreConfig::builder().data_dir(temp.path()).build();

    // Two registries simulate two independent processes sharing the
    // directory: separate snapshots, same files and locks.
    let observer_registry = StoreRegistry::new(config.clone()).unwrap();
    let observer = observer_registry.open("shared").unwrap();

    let recorder = Recorder::new();
    observer.register_listener(&recorder);
    // Force the initial load to finish before the external write happens.
    assert!(!observer.contains("remote"));

    let writer_registry = StoreRegistry::new(config).unwrap();
    let writer = writer_registry.open("shared").unwrap();
    let mut editor = writer.edit();
    editor.put_int("remote", 99);
    assert!(editor.commit());

    // Filesystem events take a moment to arrive.
    assert!(recorder.wait_for(&["remote"], Duration::from_secs(5)));
    assert_eq!(observer.get_int("remote", 0), 99);
}
