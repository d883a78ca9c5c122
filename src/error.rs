//! Error types for RaftStore
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using StoreError
pub type Result<T> = std::result::Result<T, StoreError>;

/// Unified error type for RaftStore operations
#[derive(Debug, Error)]
pub enum StoreError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Ordered Store Errors
    // -------------------------------------------------------------------------
    #[error("in-memory store at capacity: {used} + {requested} > {max}")]
    CapacityExceeded { used: u64, requested: u64, max: u64 },

    // -------------------------------------------------------------------------
    // Log / Election State Errors
    // -------------------------------------------------------------------------
    #[error("log index mismatch: expected {expected} but was {actual}")]
    Sequencing { expected: u64, actual: u64 },

    #[error("term regression: stored term {stored} > requested term {requested}")]
    TermRegression { stored: u64, requested: u64 },

    #[error("log entry {index} not found in group {group_id}")]
    EntryNotFound { group_id: u64, index: u64 },

    #[error("invalid group members: {0}")]
    InvalidMembers(String),

    #[error("operation not implemented by this backend: {0}")]
    Unimplemented(&'static str),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Write Task Errors
    // -------------------------------------------------------------------------
    #[error("write task busy: a request is already pending")]
    TaskBusy,

    #[error("write task stopped")]
    TaskStopped,

    #[error("timed out waiting for write response")]
    Timeout,

    #[error("write task worker panicked")]
    WorkerPanicked,

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<bincode::Error> for StoreError {
    fn from(err: bincode::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
