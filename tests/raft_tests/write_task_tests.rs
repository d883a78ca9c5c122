//! WriteTask Tests
//!
//! Tests verify:
//! - Readiness probe and single-slot admission
//! - Per-group response fields (election state, last index/term, echo)
//! - In-order application across requests
//! - Failures reported through unset response fields
//! - Stop behavior with and without a request in flight

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{unbounded, Receiver, Sender};
use raftstore::kv::{Attributes, InMem};
use raftstore::raft::{
    GroupElectionState, GroupId, GroupPersistentState, KvStorage, LogEntry, LogEntryState,
    MemoryStorage, Storage, WriteRequest, WriteTask,
};
use raftstore::{Config, Result, StoreError};

const WAIT: Duration = Duration::from_secs(5);

// =============================================================================
// Helper Functions
// =============================================================================

fn entries(range: std::ops::RangeInclusive<u64>, term: u64) -> Vec<LogEntry> {
    range
        .map(|i| LogEntry::command(term, i, format!("cmd{}", i).into_bytes()))
        .collect()
}

fn request_with_entries(group: GroupId, batch: Vec<LogEntry>) -> WriteRequest {
    let mut request = WriteRequest::new();
    request.group_mut(group).entries = batch;
    request
}

fn submit_and_wait(task: &WriteTask, request: WriteRequest) -> raftstore::raft::WriteResponse {
    assert!(task.wait_ready(WAIT));
    task.submit(request).unwrap();
    task.recv_response_timeout(WAIT).unwrap()
}

/// Storage that parks every append until released, announcing entry first.
struct GatedStorage {
    inner: MemoryStorage,
    entered: Sender<()>,
    release: Receiver<()>,
}

impl GatedStorage {
    fn new() -> (Arc<Self>, Receiver<()>, Sender<()>) {
        let (entered_tx, entered_rx) = unbounded();
        let (release_tx, release_rx) = unbounded();
        let storage = Arc::new(Self {
            inner: MemoryStorage::new(),
            entered: entered_tx,
            release: release_rx,
        });
        (storage, entered_rx, release_tx)
    }
}

impl Storage for GatedStorage {
    fn load_groups(&self) -> Receiver<GroupPersistentState> {
        self.inner.load_groups()
    }

    fn set_group_election_state(&self, group_id: GroupId, state: &GroupElectionState)
        -> Result<()>
    {
        self.inner.set_group_election_state(group_id, state)
    }

    fn append_log_entries(&self, group_id: GroupId, entries: &[LogEntry]) -> Result<()> {
        let _ = self.entered.send(());
        let _ = self.release.recv();
        self.inner.append_log_entries(group_id, entries)
    }

    fn truncate_log(&self, group_id: GroupId, last_index: u64) -> Result<()> {
        self.inner.truncate_log(group_id, last_index)
    }

    fn get_log_entry(&self, group_id: GroupId, index: u64) -> Result<LogEntry> {
        self.inner.get_log_entry(group_id, index)
    }

    fn get_log_entries(
        &self,
        group_id: GroupId,
        first_index: u64,
        last_index: u64,
        tx: Sender<Result<LogEntryState>>,
    ) {
        self.inner.get_log_entries(group_id, first_index, last_index, tx)
    }
}

// =============================================================================
// Response Tests
// =============================================================================

#[test]
fn test_entries_only_request() {
    let storage = Arc::new(MemoryStorage::new());
    let task = WriteTask::start(storage.clone()).unwrap();

    let response = submit_and_wait(&task, request_with_entries(1, entries(1..=3, 2)));

    let group = &response.groups[&1];
    assert_eq!(group.election_state, None);
    assert_eq!(group.last_index, Some(3));
    assert_eq!(group.last_term, Some(2));
    assert_eq!(group.entries, entries(1..=3, 2));
    assert!(group.appended());
    assert_eq!(storage.log_len(1), 3);

    task.join().unwrap();
}

#[test]
fn test_election_state_only_request() {
    let storage = Arc::new(MemoryStorage::new());
    let task = WriteTask::start(storage.clone()).unwrap();
    let state = GroupElectionState::new(4, Some(2));

    let mut request = WriteRequest::new();
    request.set_election_state(1, state);
    let response = submit_and_wait(&task, request);

    let group = &response.groups[&1];
    assert_eq!(group.election_state, Some(state));
    assert_eq!(group.last_index, None);
    assert_eq!(group.last_term, None);
    assert_eq!(storage.election_state(1), Some(state));

    task.join().unwrap();
}

#[test]
fn test_multi_group_request() {
    let storage = Arc::new(MemoryStorage::new());
    let task = WriteTask::start(storage.clone()).unwrap();

    let mut request = WriteRequest::new();
    request.set_election_state(1, GroupElectionState::new(1, Some(1)));
    for entry in entries(1..=2, 1) {
        request.append(1, entry);
    }
    for entry in entries(1..=4, 3) {
        request.append(2, entry);
    }
    let response = submit_and_wait(&task, request);

    assert_eq!(response.groups.len(), 2);
    assert_eq!(response.groups[&1].last_index, Some(2));
    assert_eq!(response.groups[&2].last_index, Some(4));
    assert_eq!(response.groups[&2].last_term, Some(3));
    assert_eq!(storage.log_len(2), 4);

    task.join().unwrap();
}

#[test]
fn test_requests_applied_in_order() {
    let storage = Arc::new(MemoryStorage::new());
    let task = WriteTask::start(storage.clone()).unwrap();

    for batch in 0..10u64 {
        let first = batch * 3 + 1;
        let response = submit_and_wait(&task, request_with_entries(1, entries(first..=first + 2, 1)));
        assert_eq!(response.groups[&1].last_index, Some(first + 2));
    }

    assert_eq!(storage.log_len(1), 30);
    task.join().unwrap();
}

// =============================================================================
// Failure Reporting Tests
// =============================================================================

#[test]
fn test_append_failure_leaves_fields_unset() {
    let storage = Arc::new(MemoryStorage::new());
    let task = WriteTask::start(storage.clone()).unwrap();

    let response = submit_and_wait(&task, request_with_entries(1, entries(5..=6, 1)));

    let group = &response.groups[&1];
    assert_eq!(group.last_index, None);
    assert_eq!(group.last_term, None);
    assert_eq!(group.entries.len(), 2);
    assert!(!group.appended());
    assert_eq!(storage.log_len(1), 0);

    task.join().unwrap();
}

#[test]
fn test_election_state_failure_skips_append() {
    let store = Arc::new(InMem::new(Attributes::new(["mem"]), 1024 * 1024));
    let storage = Arc::new(KvStorage::new(store));
    storage
        .set_group_election_state(1, &GroupElectionState::new(9, None))
        .unwrap();
    let task = WriteTask::start(storage.clone()).unwrap();

    let mut request = request_with_entries(1, entries(1..=2, 1));
    request.set_election_state(1, GroupElectionState::new(3, Some(1)));
    let response = submit_and_wait(&task, request);

    let group = &response.groups[&1];
    assert_eq!(group.election_state, None);
    assert_eq!(group.last_index, None);
    assert_eq!(storage.last_log_position(1).unwrap(), (0, 0));

    task.join().unwrap();
}

#[test]
fn test_failure_in_one_group_does_not_affect_another() {
    let storage = Arc::new(MemoryStorage::new());
    let task = WriteTask::start(storage.clone()).unwrap();

    let mut request = request_with_entries(1, entries(2..=2, 1));
    request.group_mut(2).entries = entries(1..=2, 1);
    let response = submit_and_wait(&task, request);

    assert_eq!(response.groups[&1].last_index, None);
    assert_eq!(response.groups[&2].last_index, Some(2));

    task.join().unwrap();
}

// =============================================================================
// Admission Tests
// =============================================================================

#[test]
fn test_not_ready_while_writing_and_single_slot() {
    let (storage, entered, release) = GatedStorage::new();
    let task = WriteTask::start(storage.clone()).unwrap();

    assert!(task.wait_ready(WAIT));
    task.submit(request_with_entries(1, entries(1..=1, 1))).unwrap();
    entered.recv_timeout(WAIT).unwrap();

    // Worker is inside the backend call
    assert!(!task.is_ready());

    // One request may wait in the slot, a second is refused
    task.submit(request_with_entries(1, entries(2..=2, 1))).unwrap();
    assert!(matches!(
        task.submit(request_with_entries(1, entries(3..=3, 1))),
        Err(StoreError::TaskBusy)
    ));

    release.send(()).unwrap();
    let first = task.recv_response_timeout(WAIT).unwrap();
    assert_eq!(first.groups[&1].last_index, Some(1));

    entered.recv_timeout(WAIT).unwrap();
    release.send(()).unwrap();
    let second = task.recv_response_timeout(WAIT).unwrap();
    assert_eq!(second.groups[&1].last_index, Some(2));

    task.join().unwrap();
}

#[test]
fn test_recv_timeout_without_request() {
    let task = WriteTask::start(Arc::new(MemoryStorage::new())).unwrap();

    assert!(matches!(
        task.recv_response_timeout(Duration::from_millis(20)),
        Err(StoreError::Timeout)
    ));

    task.join().unwrap();
}

#[test]
fn test_start_with_custom_config() {
    let config = Config::builder().write_task_name("group-writer").build();
    let task = WriteTask::start_with_config(Arc::new(MemoryStorage::new()), &config).unwrap();

    let response = submit_and_wait(&task, request_with_entries(1, entries(1..=1, 1)));
    assert!(response.groups[&1].appended());

    task.join().unwrap();
}

#[test]
fn test_invalid_config_rejected() {
    let config = Config::builder().write_task_name("").build();

    let result = WriteTask::start_with_config(Arc::new(MemoryStorage::new()), &config);

    assert!(matches!(result, Err(StoreError::Config(_))));
}

// =============================================================================
// Stop Tests
// =============================================================================

#[test]
fn test_stop_rejects_further_requests() {
    let mut task = WriteTask::start(Arc::new(MemoryStorage::new())).unwrap();

    task.stop();

    assert!(task.is_stopped());
    assert!(!task.is_ready());
    assert!(matches!(
        task.submit(request_with_entries(1, entries(1..=1, 1))),
        Err(StoreError::TaskStopped)
    ));
    assert!(matches!(task.recv_response_timeout(WAIT), Err(StoreError::TaskStopped)));
    task.join().unwrap();
}

#[test]
fn test_stop_with_request_in_flight() {
    let (storage, entered, release) = GatedStorage::new();
    let mut task = WriteTask::start(storage.clone()).unwrap();

    assert!(task.wait_ready(WAIT));
    task.submit(request_with_entries(1, entries(1..=2, 1))).unwrap();
    entered.recv_timeout(WAIT).unwrap();

    task.stop();
    release.send(()).unwrap();

    // Worker finishes the backend call, then exits without responding
    assert!(matches!(task.recv_response_timeout(WAIT), Err(StoreError::TaskStopped)));
    task.join().unwrap();
    assert_eq!(storage.inner.log_len(1), 2);
}

#[test]
fn test_drop_stops_worker() {
    let storage = Arc::new(MemoryStorage::new());
    let task = WriteTask::start(storage.clone()).unwrap();
    assert_eq!(Arc::strong_count(&storage), 2);

    drop(task);

    // The worker releases its storage handle on exit
    let deadline = Instant::now() + WAIT;
    while Arc::strong_count(&storage) > 1 {
        assert!(Instant::now() < deadline, "worker did not exit after drop");
        thread::sleep(Duration::from_millis(5));
    }
}
