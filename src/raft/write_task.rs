//! Write Task
//!
//! Moves storage writes off the consensus loop onto one worker thread.
//!
//! ## Channels
//! ```text
//!   consensus loop                         worker thread
//!   ──────────────                         ─────────────
//!   is_ready()   ──── ready (rendezvous) ──▶  Idle?
//!   submit()     ──── requests (cap 1)   ──▶  apply to Storage
//!   recv_*()     ◀─── responses (cap 1)  ───  one response per request
//!   stop()       ──── stopper (closed)   ──▶  exit
//! ```
//!
//! Only one request is ever being applied, and requests are taken in
//! submission order, so writes reach the backend strictly in order. There
//! is no queue past the single request slot; `is_ready` is the admission
//! gate.
//!
//! ## Failure reporting
//! A failed per-group write is not returned as an error. The group's
//! response keeps `election_state`, `last_index` and `last_term` as `None`,
//! and the failure is logged at `warn`. Callers must inspect those fields
//! before treating a write as persisted.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{
    bounded, select, Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError,
};

use crate::config::Config;
use crate::error::{Result, StoreError};

use super::storage::Storage;
use super::types::{GroupElectionState, GroupId, LogEntry};

// =============================================================================
// Request / Response
// =============================================================================

/// Changes to make to one group
#[derive(Debug, Clone, Default)]
pub struct GroupWriteRequest {
    pub election_state: Option<GroupElectionState>,
    pub entries: Vec<LogEntry>,
}

/// A batch of per-group changes applied as one unit of work
#[derive(Debug, Clone, Default)]
pub struct WriteRequest {
    pub groups: HashMap<GroupId, GroupWriteRequest>,
}

impl WriteRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// The pending changes for a group, created empty if needed
    pub fn group_mut(&mut self, group_id: GroupId) -> &mut GroupWriteRequest {
        self.groups.entry(group_id).or_default()
    }

    pub fn set_election_state(&mut self, group_id: GroupId, state: GroupElectionState) {
        self.group_mut(group_id).election_state = Some(state);
    }

    pub fn append(&mut self, group_id: GroupId, entry: LogEntry) {
        self.group_mut(group_id).entries.push(entry);
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// What was actually persisted for one group.
///
/// `None` means unchanged: either nothing was requested or the write failed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupWriteResponse {
    pub election_state: Option<GroupElectionState>,
    pub last_index: Option<u64>,
    pub last_term: Option<u64>,

    /// The entries from the request, echoed back whether or not they were
    /// appended
    pub entries: Vec<LogEntry>,
}

impl GroupWriteResponse {
    fn unchanged(entries: Vec<LogEntry>) -> Self {
        Self {
            entries,
            ..Self::default()
        }
    }

    /// True if the request carried entries and they were appended
    pub fn appended(&self) -> bool {
        self.last_index.is_some()
    }
}

/// One response per `WriteRequest`, keyed by the same groups
#[derive(Debug, Clone, Default)]
pub struct WriteResponse {
    pub groups: HashMap<GroupId, GroupWriteResponse>,
}

// =============================================================================
// Handle
// =============================================================================

/// Handle to the write worker. Owned by a single caller (the consensus loop).
///
/// ## Lifecycle
/// Idle → Writing → Idle ... ; `stop()` moves to Stopped from either state.
pub struct WriteTask {
    /// Zero-capacity: a send only succeeds while the worker is Idle
    ready: Sender<()>,

    /// Single pending request slot
    requests: Sender<WriteRequest>,

    /// Single finished response slot
    responses: Receiver<WriteResponse>,

    /// Dropped to signal stop
    stopper: Option<Sender<()>>,

    worker: Option<JoinHandle<()>>,

    /// Used by `wait_response`; `None` waits forever
    response_timeout: Option<Duration>,
}

impl WriteTask {
    /// Spawn the worker with the default config
    pub fn start(storage: Arc<dyn Storage>) -> Result<Self> {
        Self::start_with_config(storage, &Config::default())
    }

    /// Spawn the worker thread and return its handle
    pub fn start_with_config(storage: Arc<dyn Storage>, config: &Config) -> Result<Self> {
        config.validate()?;

        let (ready_tx, ready_rx) = bounded(0);
        let (request_tx, request_rx) = bounded(1);
        let (response_tx, response_rx) = bounded(1);
        let (stop_tx, stop_rx) = bounded(0);

        let worker = Worker {
            storage,
            ready: ready_rx,
            requests: request_rx,
            responses: response_tx,
            stopper: stop_rx,
        };

        let handle = thread::Builder::new()
            .name(config.write_task_name.clone())
            .spawn(move || worker.run())?;

        tracing::debug!(name = %config.write_task_name, "write task started");

        let response_timeout = match config.response_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };

        Ok(Self {
            ready: ready_tx,
            requests: request_tx,
            responses: response_rx,
            stopper: Some(stop_tx),
            worker: Some(handle),
            response_timeout,
        })
    }

    /// Non-blocking probe: true if the worker is Idle and can take a request.
    pub fn is_ready(&self) -> bool {
        !self.is_stopped() && self.ready.try_send(()).is_ok()
    }

    /// Block up to `timeout` for the worker to become Idle
    pub fn wait_ready(&self, timeout: Duration) -> bool {
        !self.is_stopped() && self.ready.send_timeout((), timeout).is_ok()
    }

    /// Hand a request to the worker.
    ///
    /// Fails with `TaskBusy` if a request is already waiting in the slot and
    /// `TaskStopped` once the task is stopped. Check `is_ready` first.
    pub fn submit(&self, request: WriteRequest) -> Result<()> {
        if self.is_stopped() {
            return Err(StoreError::TaskStopped);
        }

        tracing::trace!(groups = request.groups.len(), "submitting write request");
        self.requests.try_send(request).map_err(|e| match e {
            TrySendError::Full(_) => StoreError::TaskBusy,
            TrySendError::Disconnected(_) => StoreError::TaskStopped,
        })
    }

    /// The response channel, for use in a caller-side `select!`
    pub fn responses(&self) -> &Receiver<WriteResponse> {
        &self.responses
    }

    /// Block until the next response arrives
    pub fn recv_response(&self) -> Result<WriteResponse> {
        self.responses.recv().map_err(|_| StoreError::TaskStopped)
    }

    /// Block up to `timeout` for the next response
    pub fn recv_response_timeout(&self, timeout: Duration) -> Result<WriteResponse> {
        self.responses.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => StoreError::Timeout,
            RecvTimeoutError::Disconnected => StoreError::TaskStopped,
        })
    }

    /// Wait for the next response using the configured timeout
    pub fn wait_response(&self) -> Result<WriteResponse> {
        match self.response_timeout {
            Some(timeout) => self.recv_response_timeout(timeout),
            None => self.recv_response(),
        }
    }

    /// Signal the worker to exit. Does not wait for it.
    ///
    /// A request still being applied when this is called gets no response.
    pub fn stop(&mut self) {
        if self.stopper.take().is_some() {
            tracing::debug!("stopping write task");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopper.is_none()
    }

    /// Stop and wait for the worker thread to exit.
    ///
    /// Blocks for as long as an in-flight backend call does.
    pub fn join(mut self) -> Result<()> {
        self.stop();
        match self.worker.take() {
            Some(handle) => handle.join().map_err(|_| StoreError::WorkerPanicked),
            None => Ok(()),
        }
    }
}

impl Drop for WriteTask {
    fn drop(&mut self) {
        self.stop();
    }
}

// =============================================================================
// Worker
// =============================================================================

struct Worker {
    storage: Arc<dyn Storage>,
    ready: Receiver<()>,
    requests: Receiver<WriteRequest>,
    responses: Sender<WriteResponse>,
    stopper: Receiver<()>,
}

impl Worker {
    fn run(self) {
        loop {
            let request = select! {
                recv(self.ready) -> msg => match msg {
                    Ok(()) => continue,
                    Err(_) => break,
                },
                recv(self.stopper) -> _ => break,
                recv(self.requests) -> msg => match msg {
                    Ok(request) => request,
                    Err(_) => break,
                },
            };

            if self.stopped() {
                break;
            }

            tracing::trace!(?request, "write task got request");
            let response = self.apply(request);

            if self.stopped() {
                break;
            }

            select! {
                send(self.responses, response) -> res => {
                    if res.is_err() {
                        break;
                    }
                }
                recv(self.stopper) -> _ => break,
            }
        }

        tracing::debug!("write task exited");
    }

    fn stopped(&self) -> bool {
        matches!(self.stopper.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Apply every group's changes and build the response.
    ///
    /// A group whose election state fails to persist does not get its
    /// entries appended.
    fn apply(&self, request: WriteRequest) -> WriteResponse {
        let mut response = WriteResponse::default();

        for (group_id, group_req) in request.groups {
            let mut group_resp = GroupWriteResponse::unchanged(group_req.entries);

            if let Some(state) = group_req.election_state {
                match self.storage.set_group_election_state(group_id, &state) {
                    Ok(()) => group_resp.election_state = Some(state),
                    Err(e) => {
                        tracing::warn!(group_id, error = %e, "failed to persist election state");
                        response.groups.insert(group_id, group_resp);
                        continue;
                    }
                }
            }

            let tail = group_resp.entries.last().map(|e| (e.index, e.term));
            if let Some((last_index, last_term)) = tail {
                match self.storage.append_log_entries(group_id, &group_resp.entries) {
                    Ok(()) => {
                        group_resp.last_index = Some(last_index);
                        group_resp.last_term = Some(last_term);
                    }
                    Err(e) => {
                        tracing::warn!(group_id, error = %e, "failed to append log entries");
                    }
                }
            }

            response.groups.insert(group_id, group_resp);
        }

        response
    }
}
