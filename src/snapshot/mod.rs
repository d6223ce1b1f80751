//! Snapshot Module
//!
//! The in-memory value model plus the algorithms that reconcile memory
//! against disk content.
//!
//! ## Responsibilities
//! - Flat mapping of string keys to scalar or string-set values
//! - Versioned, checksummed on-disk encoding
//! - Update-merge producing the exact set of changed keys

mod format;
mod merge;

pub use format::{decode_snapshot, read_snapshot, write_snapshot, FORMAT_VERSION, MAGIC};
pub use merge::update_merge;
pub(crate) use merge::push_modified;

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

/// The in-memory mapping held by a store at a given instant.
pub type Snapshot = HashMap<String, Value>;

/// A single stored value.
///
/// The value model is deliberately flat: scalars and string sets only, no
/// nesting. Equality is by value; it decides whether a key counts as
/// "changed" during merges and commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    String(String),
    Bool(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    StringSet(BTreeSet<String>),
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<BTreeSet<String>> for Value {
    fn from(v: BTreeSet<String>) -> Self {
        Value::StringSet(v)
    }
}
