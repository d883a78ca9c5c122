//! Consensus Storage Module
//!
//! Durable per-group state for a multi-group consensus protocol.
//!
//! ## Responsibilities
//! - Define the storage contract consensus depends on (`Storage`)
//! - Provide a volatile reference backend (`MemoryStorage`)
//! - Provide a complete backend over the ordered store (`KvStorage`)
//! - Serialize writes off the consensus loop (`WriteTask`)
//!
//! ## Log Layout
//! ```text
//! index:  0 (sentinel) │ 1 │ 2 │ 3 │ ... │ last
//!         never stored │ contiguous, append-only at the tail
//! ```

mod keys;
mod kv_storage;
mod memory;
mod storage;
mod types;
mod write_task;

pub use kv_storage::KvStorage;
pub use memory::MemoryStorage;
pub use storage::Storage;
pub use types::{
    GroupElectionState, GroupId, GroupMembers, GroupPersistentState, LogEntry, LogEntryState,
    LogEntryType, NodeId,
};
pub use write_task::{
    GroupWriteRequest, GroupWriteResponse, WriteRequest, WriteResponse, WriteTask,
};
