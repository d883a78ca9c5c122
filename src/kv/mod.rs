//! Ordered KV Module
//!
//! Capacity-bounded, ordered in-memory key-value store.
//!
//! ## Responsibilities
//! - Point reads and writes keyed by raw bytes
//! - Half-open range scans in byte-wise key order
//! - Byte accounting against a fixed budget (admission control, no eviction)
//! - Batched mutation under a single write lock
//!
//! ## Data Structure Choice
//! BTreeMap wrapped in a parking_lot RwLock:
//! - Ordered keys give range scans for free
//! - Readers (get/scan/capacity) share the lock, writers exclude everyone

mod in_mem;

use std::fmt;

pub use in_mem::{entry_size, InMem, ENTRY_OVERHEAD};

/// Raw key bytes, ordered lexicographically
pub type Key = Vec<u8>;

/// Raw value bytes
pub type Value = Vec<u8>;

/// A key paired with its value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: Key,
    pub value: Value,
}

impl KeyValue {
    pub fn new(key: impl Into<Key>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Capacity report for a store, in bytes.
///
/// Approximate: accounting does not model every allocation the tree makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreCapacity {
    pub capacity: u64,
    pub available: u64,
}

/// Labels describing a store ("mem", "ssd", region names, ...).
///
/// Read by placement logic outside this crate to decide where data may live.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes(Vec<String>);

impl Attributes {
    pub fn new<I, S>(attrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(attrs.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, attr: &str) -> bool {
        self.0.iter().any(|a| a == attr)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for Attributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(":"))
    }
}
