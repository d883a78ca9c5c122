//! The durability boundary between consensus and a storage provider.

use crossbeam::channel::{Receiver, Sender};

use crate::error::Result;

use super::types::{GroupElectionState, GroupId, GroupPersistentState, LogEntry, LogEntryState};

/// Persistent storage for the election state and log of many groups.
///
/// Supplied by the application. All methods take `&self`; implementations
/// use interior locking and must be shareable across threads, since the
/// write task calls them from its worker thread while readers call them
/// from elsewhere.
pub trait Storage: Send + Sync {
    /// Load every previously existing group at startup.
    ///
    /// The returned channel yields each group once and is closed (all
    /// senders dropped) when loading is complete.
    fn load_groups(&self) -> Receiver<GroupPersistentState>;

    /// Persist the election state for a group.
    ///
    /// A durable backend must not return until the state would survive a
    /// crash, because a granted vote depends on it.
    fn set_group_election_state(&self, group_id: GroupId, state: &GroupElectionState)
        -> Result<()>;

    /// Append entries to a group's log.
    ///
    /// Entries must span a contiguous range starting right after the current
    /// last index. Anything else fails with `StoreError::Sequencing` and
    /// leaves the log unchanged.
    fn append_log_entries(&self, group_id: GroupId, entries: &[LogEntry]) -> Result<()>;

    /// Delete all entries with index > `last_index`.
    fn truncate_log(&self, group_id: GroupId, last_index: u64) -> Result<()>;

    /// Synchronously read one entry. Fails if the index does not exist.
    fn get_log_entry(&self, group_id: GroupId, index: u64) -> Result<LogEntry>;

    /// Stream entries `first_index..=last_index` into `tx` in ascending order.
    ///
    /// On error, exactly one `Err` is sent and then `tx` is dropped; nothing
    /// follows an error. On success `tx` is dropped after the last entry.
    fn get_log_entries(
        &self,
        group_id: GroupId,
        first_index: u64,
        last_index: u64,
        tx: Sender<Result<LogEntryState>>,
    );
}
