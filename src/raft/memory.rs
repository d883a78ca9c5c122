//! MemoryStorage
//!
//! Volatile reference `Storage` for tests and as a template for real
//! backends. Nothing survives the process.

use std::collections::HashMap;

use crossbeam::channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

use crate::error::{Result, StoreError};

use super::storage::Storage;
use super::types::{GroupElectionState, GroupId, GroupPersistentState, LogEntry, LogEntryState};

/// Per-group state. `entries[i]` holds index `i + 1`; index 0 is the
/// sentinel and is never stored.
#[derive(Default)]
struct MemoryGroup {
    /// `None` until an election state is written
    election_state: Option<GroupElectionState>,
    entries: Vec<LogEntry>,
}

/// In-memory implementation of [`Storage`].
///
/// Limitations: `load_groups` does not replay anything, and `truncate_log`
/// and `get_log_entry` fail with `StoreError::Unimplemented`.
#[derive(Default)]
pub struct MemoryStorage {
    groups: Mutex<HashMap<GroupId, MemoryGroup>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of real entries in a group's log (the sentinel is not counted)
    pub fn log_len(&self, group_id: GroupId) -> usize {
        self.groups
            .lock()
            .get(&group_id)
            .map(|g| g.entries.len())
            .unwrap_or(0)
    }

    /// Last election state written for a group, `None` if none was ever
    /// written (even when the group has entries)
    pub fn election_state(&self, group_id: GroupId) -> Option<GroupElectionState> {
        self.groups.lock().get(&group_id).and_then(|g| g.election_state)
    }
}

impl Storage for MemoryStorage {
    fn load_groups(&self) -> Receiver<GroupPersistentState> {
        // TODO: replay groups once this backend keeps members and tail state.
        let (_tx, rx) = unbounded();
        rx
    }

    fn set_group_election_state(
        &self,
        group_id: GroupId,
        state: &GroupElectionState,
    ) -> Result<()> {
        self.groups.lock().entry(group_id).or_default().election_state = Some(*state);
        Ok(())
    }

    fn append_log_entries(&self, group_id: GroupId, entries: &[LogEntry]) -> Result<()> {
        let mut groups = self.groups.lock();
        let group = groups.entry(group_id).or_default();

        for (i, entry) in entries.iter().enumerate() {
            let expected = (group.entries.len() + i + 1) as u64;
            if entry.index != expected {
                return Err(StoreError::Sequencing {
                    expected,
                    actual: entry.index,
                });
            }
        }

        group.entries.extend_from_slice(entries);
        Ok(())
    }

    fn truncate_log(&self, _group_id: GroupId, _last_index: u64) -> Result<()> {
        Err(StoreError::Unimplemented("MemoryStorage::truncate_log"))
    }

    fn get_log_entry(&self, _group_id: GroupId, _index: u64) -> Result<LogEntry> {
        Err(StoreError::Unimplemented("MemoryStorage::get_log_entry"))
    }

    fn get_log_entries(
        &self,
        group_id: GroupId,
        first_index: u64,
        last_index: u64,
        tx: Sender<Result<LogEntryState>>,
    ) {
        // Copy out under the lock; the receiver may be slow.
        let batch = {
            let groups = self.groups.lock();
            let entries = groups
                .get(&group_id)
                .map(|g| g.entries.as_slice())
                .unwrap_or(&[]);

            let len = entries.len() as u64;
            if first_index <= last_index && (first_index == 0 || last_index > len) {
                let index = if first_index == 0 { 0 } else { len + 1 };
                Err(StoreError::EntryNotFound { group_id, index })
            } else if first_index > last_index {
                Ok(Vec::new())
            } else {
                Ok(entries[(first_index - 1) as usize..last_index as usize].to_vec())
            }
        };

        match batch {
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
            Err(err) => {
                let _ = tx.send(Err(err));
            }
        }
    }
}
