//! # RaftStore
//!
//! Storage primitives for a multi-group consensus protocol:
//! - Per-group election state and append-only logs behind one `Storage` contract
//! - A write task that serializes writes off the consensus loop
//! - A capacity-bounded ordered key-value store usable as a backend
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Consensus Loop                            │
//! │          (external: elections, replication)                  │
//! └─────────────────────┬───────────────────────────────────────┘
//!            WriteRequest │ ▲ WriteResponse
//! ┌─────────────────────▼─┴─────────────────────────────────────┐
//! │                     WriteTask                                │
//! │          (one worker, one request in flight)                 │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ Storage trait
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌───────────────┐         ┌─────────────┐
//!   │ MemoryStorage │         │  KvStorage  │
//!   │  (reference)  │         │             │
//!   └───────────────┘         └──────┬──────┘
//!                                    │
//!                                    ▼
//!                             ┌─────────────┐
//!                             │    InMem    │
//!                             │  (RwLock)   │
//!                             └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod kv;
pub mod raft;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{StoreError, Result};
pub use config::Config;
pub use kv::InMem;
pub use raft::{KvStorage, MemoryStorage, Storage, WriteTask};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of RaftStore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
