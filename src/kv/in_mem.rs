//! InMem implementation
//!
//! BTreeMap-based ordered store with RwLock for concurrency and a byte budget.

use std::collections::BTreeMap;
use std::fmt;
use std::mem;
use std::ops::Bound;

use parking_lot::RwLock;

use crate::config::Config;
use crate::error::{Result, StoreError};

use super::{Attributes, Key, KeyValue, StoreCapacity, Value};

/// Fixed per-entry cost charged on top of key and value bytes
pub const ENTRY_OVERHEAD: u64 = mem::size_of::<KeyValue>() as u64;

/// Approximate bytes an entry occupies while stored
pub fn entry_size(key: &[u8], value: &[u8]) -> u64 {
    key.len() as u64 + value.len() as u64 + ENTRY_OVERHEAD
}

/// Capacity-bounded, ordered in-memory key-value store
///
/// ## Concurrency:
/// - `get`, `scan`, `capacity`: shared read lock, run concurrently
/// - `put`, `del`, `write_batch`: exclusive write lock
pub struct InMem {
    /// Labels advertised to placement
    attrs: Attributes,

    /// Byte budget; writes past it are rejected
    max_bytes: u64,

    /// Tree and byte accounting, guarded together
    inner: RwLock<Inner>,
}

struct Inner {
    data: BTreeMap<Key, Value>,
    used_bytes: u64,
}

impl InMem {
    /// Create an empty store with the given attributes and byte budget
    pub fn new(attrs: Attributes, max_bytes: u64) -> Self {
        Self {
            attrs,
            max_bytes,
            inner: RwLock::new(Inner {
                data: BTreeMap::new(),
                used_bytes: 0,
            }),
        }
    }

    /// Create a store sized and labelled from the config
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.store_attrs.clone(), config.store_max_bytes)
    }

    /// Attributes describing this store
    pub fn attrs(&self) -> &Attributes {
        &self.attrs
    }

    /// Set `key` to `value`, replacing any previous value.
    ///
    /// Fails with `CapacityExceeded` and leaves the store untouched if the
    /// entry does not fit in the remaining budget. A replaced entry's bytes
    /// are credited back before the check.
    pub fn put(&self, key: Key, value: Value) -> Result<()> {
        let mut inner = self.inner.write();
        self.put_locked(&mut inner, key, value)
    }

    /// Get the value stored under `key`, or `None` if absent
    pub fn get(&self, key: &[u8]) -> Option<Value> {
        self.inner.read().data.get(key).cloned()
    }

    /// Return up to `max` entries with `start <= key < end`, in key order.
    /// `max == 0` means no limit.
    pub fn scan(&self, start: &[u8], end: &[u8], max: usize) -> Vec<KeyValue> {
        if start > end {
            return Vec::new();
        }

        let inner = self.inner.read();
        let range = inner
            .data
            .range::<[u8], _>((Bound::Included(start), Bound::Excluded(end)))
            .map(|(k, v)| KeyValue {
                key: k.clone(),
                value: v.clone(),
            });

        if max == 0 {
            range.collect()
        } else {
            range.take(max).collect()
        }
    }

    /// Remove `key` if present. Deleting an absent key is a no-op.
    pub fn del(&self, key: &[u8]) {
        let mut inner = self.inner.write();
        Self::del_locked(&mut inner, key);
    }

    /// Apply all `puts` in order, then all `dels` in order, under one lock.
    ///
    /// Not atomic: the first failing put aborts the rest of the batch, but
    /// operations already applied by this call stay applied. Callers that
    /// need all-or-nothing must check the batch fits beforehand (see
    /// [`entry_size`] and [`InMem::capacity`]).
    pub fn write_batch(&self, puts: Vec<KeyValue>, dels: Vec<Key>) -> Result<()> {
        let mut inner = self.inner.write();
        for kv in puts {
            self.put_locked(&mut inner, kv.key, kv.value)?;
        }
        for key in &dels {
            Self::del_locked(&mut inner, key);
        }
        Ok(())
    }

    /// Total and remaining budget. The remaining figure is approximate since
    /// tree node overhead is estimated, not measured.
    pub fn capacity(&self) -> StoreCapacity {
        let used = self.inner.read().used_bytes;
        StoreCapacity {
            capacity: self.max_bytes,
            available: self.max_bytes.saturating_sub(used),
        }
    }

    /// Bytes currently charged against the budget
    pub fn used_bytes(&self) -> u64 {
        self.inner.read().used_bytes
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.inner.read().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().data.is_empty()
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Caller holds the write lock. See put().
    fn put_locked(&self, inner: &mut Inner, key: Key, value: Value) -> Result<()> {
        let size = entry_size(&key, &value);
        let reclaimed = inner
            .data
            .get(&key)
            .map(|old| entry_size(&key, old))
            .unwrap_or(0);

        let used_after = inner.used_bytes - reclaimed + size;
        if used_after > self.max_bytes {
            return Err(StoreError::CapacityExceeded {
                used: inner.used_bytes,
                requested: size,
                max: self.max_bytes,
            });
        }

        inner.used_bytes = used_after;
        inner.data.insert(key, value);
        Ok(())
    }

    /// Caller holds the write lock. See del().
    fn del_locked(inner: &mut Inner, key: &[u8]) {
        if let Some(old) = inner.data.remove(key) {
            inner.used_bytes -= entry_size(key, &old);
        }
    }
}

impl fmt::Display for InMem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.attrs, self.max_bytes)
    }
}
