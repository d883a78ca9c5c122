//! KvStorage
//!
//! `Storage` layered on the ordered in-memory store. Unlike `MemoryStorage`
//! it implements the whole contract: truncation, point reads, replay on
//! load and term-regression checks. Records are bincode-encoded.
//!
//! ## Records per group
//! ```text
//! state   -> GroupElectionState
//! members -> GroupMembers
//! tail    -> LogTail { last_index, last_term }
//! log/i   -> LogEntry            (1 <= i <= tail.last_index)
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;

use crossbeam::channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::kv::{entry_size, InMem, KeyValue};

use super::keys::{self, RecordKind};
use super::storage::Storage;
use super::types::{
    GroupElectionState, GroupId, GroupMembers, GroupPersistentState, LogEntry, LogEntryState,
};

/// Position of the last entry in a group's log. `last_index == 0` means
/// the log is empty.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
struct LogTail {
    last_index: u64,
    last_term: u64,
}

/// [`Storage`] backed by an [`InMem`] store.
///
/// ## Concurrency:
/// - Mutations serialize on `write_lock` so read-validate-write sequences
///   (contiguity, capacity, term checks) cannot interleave
/// - Range reads also take `write_lock`: the tail check and the scan are
///   separate store calls and must see the same log
/// - Point reads go straight to the store's shared lock
///
/// The store should not be written by anyone else, or the capacity
/// pre-check in `append_log_entries` may be stale.
pub struct KvStorage {
    store: Arc<InMem>,
    write_lock: Mutex<()>,
}

impl KvStorage {
    pub fn new(store: Arc<InMem>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    /// The underlying ordered store
    pub fn store(&self) -> &Arc<InMem> {
        &self.store
    }

    /// Persist the membership of a group. `members.members` must be non-empty.
    pub fn set_group_members(&self, group_id: GroupId, members: &GroupMembers) -> Result<()> {
        members.validate()?;
        let _guard = self.write_lock.lock();
        self.store
            .put(keys::members_key(group_id), bincode::serialize(members)?)
    }

    /// Last index and term of a group's log, `(0, 0)` when empty
    pub fn last_log_position(&self, group_id: GroupId) -> Result<(u64, u64)> {
        let tail = self.tail(group_id)?;
        Ok((tail.last_index, tail.last_term))
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn read<T: DeserializeOwned>(&self, key: &[u8]) -> Result<Option<T>> {
        match self.store.get(key) {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn tail(&self, group_id: GroupId) -> Result<LogTail> {
        Ok(self.read::<LogTail>(&keys::tail_key(group_id))?.unwrap_or_default())
    }

    fn load_group(&self, group_id: GroupId) -> Result<GroupPersistentState> {
        let election_state: GroupElectionState =
            self.read(&keys::state_key(group_id))?.unwrap_or_default();
        let members: GroupMembers = self.read(&keys::members_key(group_id))?.unwrap_or_default();
        let tail = self.tail(group_id)?;
        Ok(GroupPersistentState {
            group_id,
            election_state,
            members,
            last_log_index: tail.last_index,
            last_log_term: tail.last_term,
        })
    }

    /// Every group that has at least one per-group record
    fn known_groups(&self) -> BTreeSet<GroupId> {
        let mut groups = BTreeSet::new();
        for kind in [RecordKind::State, RecordKind::Members, RecordKind::Tail] {
            let (start, end) = keys::kind_range(kind);
            for kv in self.store.scan(&start, &end, 0) {
                if let Some(group_id) = keys::parse_group(&kv.key) {
                    groups.insert(group_id);
                }
            }
        }
        groups
    }

    fn read_range(&self, group_id: GroupId, first_index: u64, last_index: u64)
        -> Result<Vec<LogEntry>>
    {
        let _guard = self.write_lock.lock();
        let tail = self.tail(group_id)?;
        if first_index == 0 {
            return Err(StoreError::EntryNotFound { group_id, index: 0 });
        }
        if last_index > tail.last_index {
            return Err(StoreError::EntryNotFound {
                group_id,
                index: tail.last_index + 1,
            });
        }

        let start = keys::log_key(group_id, first_index);
        let end = keys::log_key(group_id, last_index + 1);
        self.store
            .scan(&start, &end, 0)
            .into_iter()
            .map(|kv| bincode::deserialize(&kv.value).map_err(StoreError::from))
            .collect()
    }
}

impl Storage for KvStorage {
    /// Decodes every known group before returning, so the receiver is
    /// already filled and closed. Groups that fail to decode are logged and
    /// skipped.
    fn load_groups(&self) -> Receiver<GroupPersistentState> {
        let (tx, rx) = unbounded();
        let mut loaded = 0usize;

        for group_id in self.known_groups() {
            match self.load_group(group_id) {
                Ok(state) => {
                    let _ = tx.send(state);
                    loaded += 1;
                }
                Err(e) => {
                    tracing::error!(group_id, error = %e, "failed to load group, skipping");
                }
            }
        }

        tracing::debug!(loaded, "loaded groups from store");
        rx
    }

    fn set_group_election_state(
        &self,
        group_id: GroupId,
        state: &GroupElectionState,
    ) -> Result<()> {
        let _guard = self.write_lock.lock();
        let key = keys::state_key(group_id);

        if let Some(stored) = self.read::<GroupElectionState>(&key)? {
            if state.current_term < stored.current_term {
                return Err(StoreError::TermRegression {
                    stored: stored.current_term,
                    requested: state.current_term,
                });
            }
        }

        self.store.put(key, bincode::serialize(state)?)
    }

    fn append_log_entries(&self, group_id: GroupId, entries: &[LogEntry]) -> Result<()> {
        let Some(last) = entries.last() else {
            return Ok(());
        };

        let _guard = self.write_lock.lock();
        let tail = self.tail(group_id)?;

        for (i, entry) in entries.iter().enumerate() {
            let expected = tail.last_index + 1 + i as u64;
            if entry.index != expected {
                return Err(StoreError::Sequencing {
                    expected,
                    actual: entry.index,
                });
            }
        }

        let mut puts = Vec::with_capacity(entries.len() + 1);
        for entry in entries {
            puts.push(KeyValue::new(
                keys::log_key(group_id, entry.index),
                bincode::serialize(entry)?,
            ));
        }
        let new_tail = LogTail {
            last_index: last.index,
            last_term: last.term,
        };
        let tail_key = keys::tail_key(group_id);
        let old_tail_size = self
            .store
            .get(&tail_key)
            .map(|v| entry_size(&tail_key, &v))
            .unwrap_or(0);
        puts.push(KeyValue::new(tail_key, bincode::serialize(&new_tail)?));

        // write_batch stops at the first failed put without rolling back,
        // so reject up front anything that would not fit.
        let requested: u64 = puts.iter().map(|kv| entry_size(&kv.key, &kv.value)).sum();
        let capacity = self.store.capacity();
        if requested > capacity.available + old_tail_size {
            return Err(StoreError::CapacityExceeded {
                used: capacity.capacity - capacity.available,
                requested,
                max: capacity.capacity,
            });
        }

        tracing::trace!(group_id, first = entries[0].index, last = last.index, "appending entries");
        self.store.write_batch(puts, Vec::new())
    }

    fn truncate_log(&self, group_id: GroupId, last_index: u64) -> Result<()> {
        let _guard = self.write_lock.lock();
        let tail = self.tail(group_id)?;
        if last_index >= tail.last_index {
            return Ok(());
        }

        let new_tail = if last_index == 0 {
            LogTail::default()
        } else {
            let entry: LogEntry = self
                .read(&keys::log_key(group_id, last_index))?
                .ok_or(StoreError::EntryNotFound { group_id, index: last_index })?;
            LogTail {
                last_index,
                last_term: entry.term,
            }
        };

        let start = keys::log_key(group_id, last_index + 1);
        let end = keys::log_end(group_id);
        let dels: Vec<_> = self
            .store
            .scan(&start, &end, 0)
            .into_iter()
            .map(|kv| kv.key)
            .collect();

        tracing::debug!(group_id, last_index, removed = dels.len(), "truncating log");
        let tail_put = KeyValue::new(keys::tail_key(group_id), bincode::serialize(&new_tail)?);
        self.store.write_batch(vec![tail_put], dels)
    }

    fn get_log_entry(&self, group_id: GroupId, index: u64) -> Result<LogEntry> {
        if index == 0 {
            return Err(StoreError::EntryNotFound { group_id, index });
        }
        self.read::<LogEntry>(&keys::log_key(group_id, index))?
            .ok_or(StoreError::EntryNotFound { group_id, index })
    }

    fn get_log_entries(
        &self,
        group_id: GroupId,
        first_index: u64,
        last_index: u64,
        tx: Sender<Result<LogEntryState>>,
    ) {
        if first_index > last_index {
            return;
        }

        match self.read_range(group_id, first_index, last_index) {
            Ok(entries) => {
                for entry in entries {
                    let state = LogEntryState {
                        index: entry.index,
                        entry,
                    };
                    if tx.send(Ok(state)).is_err() {
                        return;
                    }
                }
            }
            Err(e) => {
                let _ = tx.send(Err(e));
            }
        }
    }
}
