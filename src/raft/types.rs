//! Consensus data model
//!
//! Log entries, election state and membership records persisted per group.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// Identifies one consensus group (an independent replica set)
pub type GroupId = u64;

/// Identifies one cluster member
pub type NodeId = u64;

/// Kind of a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[non_exhaustive]
pub enum LogEntryType {
    /// Application-level command; the payload is opaque to this crate
    #[default]
    Command,
}

/// A single entry in a group's log
///
/// Index 0 is reserved to mean "no entry", so real entries start at 1 and
/// each group's indices are contiguous.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub term: u64,
    pub index: u64,
    pub entry_type: LogEntryType,
    pub payload: Bytes,
}

impl LogEntry {
    /// Create an application command entry
    pub fn command(term: u64, index: u64, payload: impl Into<Bytes>) -> Self {
        Self {
            term,
            index,
            entry_type: LogEntryType::Command,
            payload: payload.into(),
        }
    }
}

/// The votes this node has cast, persisted so a restart never changes a vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GroupElectionState {
    /// Highest term this node has seen
    pub current_term: u64,

    /// Node voted for in `current_term`; `None` if not voted yet this term
    pub voted_for: Option<NodeId>,
}

impl GroupElectionState {
    pub fn new(current_term: u64, voted_for: Option<NodeId>) -> Self {
        Self {
            current_term,
            voted_for,
        }
    }
}

/// Current and future members of a group.
///
/// Updated when membership entries are received rather than when they
/// commit (joint consensus). While `proposed_members` is non-empty a quorum
/// must be reached independently in both `members` and `proposed_members`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GroupMembers {
    /// Voting members. Non-empty once the group is configured.
    pub members: Vec<NodeId>,

    /// Target configuration during joint consensus
    pub proposed_members: Vec<NodeId>,

    /// Nodes receiving the log without voting, until they catch up
    pub non_voting_members: Vec<NodeId>,
}

impl GroupMembers {
    /// Create a configuration with the given voters
    pub fn new(members: Vec<NodeId>) -> Result<Self> {
        let config = Self {
            members,
            proposed_members: Vec::new(),
            non_voting_members: Vec::new(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.members.is_empty() {
            return Err(StoreError::InvalidMembers("members must not be empty".to_string()));
        }
        Ok(())
    }

    /// True while a membership change is in flight
    pub fn in_joint_consensus(&self) -> bool {
        !self.proposed_members.is_empty()
    }

    /// True if `node` votes in the current or proposed configuration
    pub fn is_voter(&self, node: NodeId) -> bool {
        self.members.contains(&node) || self.proposed_members.contains(&node)
    }

    /// Move a caught-up non-voting member into the proposed configuration.
    ///
    /// Starts joint consensus if none is in progress, seeding the proposed
    /// set from the current members. Returns false if `node` was not a
    /// non-voting member.
    pub fn promote(&mut self, node: NodeId) -> bool {
        let Some(pos) = self.non_voting_members.iter().position(|&n| n == node) else {
            return false;
        };
        self.non_voting_members.remove(pos);

        if self.proposed_members.is_empty() {
            self.proposed_members = self.members.clone();
        }
        if !self.proposed_members.contains(&node) {
            self.proposed_members.push(node);
        }
        true
    }
}

/// Everything readable about a group except its log entries.
///
/// Produced by `Storage::load_groups` at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupPersistentState {
    pub group_id: GroupId,
    pub election_state: GroupElectionState,
    pub members: GroupMembers,
    pub last_log_index: u64,
    pub last_log_term: u64,
}

/// One element of a range read: an entry and the index it was read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntryState {
    pub index: u64,
    pub entry: LogEntry,
}
