//! Update-merge
//!
//! Reconciles the live mapping against a freshly parsed one, mutating the
//! live map in place and reporting exactly the keys whose resolved value
//! actually changed.
//!
//! The traversal is asymmetric on purpose: first reconcile every existing
//! key against the new map (update or remove, consuming matches from the new
//! map as it goes), then insert whatever the new map still holds. That gives
//! a single O(|old| + |new|) pass with no separate removed-keys scan.

use super::Snapshot;

/// Merge `new` into `old` in place.
///
/// Returns the modified-key set in first-touch order; empty when
/// `collect_modified` is false. Keys present in both maps with equal values
/// are not reported.
pub fn update_merge(old: &mut Snapshot, mut new: Snapshot, collect_modified: bool) -> Vec<String> {
    let mut modified = Vec::new();

    // Pass 1: reconcile keys already present in the live map.
    let existing: Vec<String> = old.keys().cloned().collect();
    for key in existing {
        match new.remove(&key) {
            Some(value) => {
                if old.get(&key) != Some(&value) {
                    old.insert(key.clone(), value);
                    if collect_modified {
                        modified.push(key);
                    }
                }
            }
            None => {
                old.remove(&key);
                if collect_modified {
                    modified.push(key);
                }
            }
        }
    }

    // Pass 2: everything left in the new map is an addition.
    for (key, value) in new {
        if collect_modified {
            modified.push(key.clone());
        }
        old.insert(key, value);
    }

    modified
}

/// Append `key` to `modified` unless it is already present.
///
/// Modified-key sets stay small (one commit batch), so a linear scan keeps
/// the first-insertion order without another data structure.
pub(crate) fn push_modified(modified: &mut Vec<String>, key: String) {
    if !modified.contains(&key) {
        modified.push(key);
    }
}
