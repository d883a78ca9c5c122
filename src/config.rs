//! Configuration for RaftStore
//!
//! Centralized configuration with sensible defaults.

use crate::error::{Result, StoreError};
use crate::kv::Attributes;

/// Main configuration for a RaftStore instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Ordered Store Configuration
    // -------------------------------------------------------------------------
    /// Byte budget of the in-memory ordered store. Writes that would exceed
    /// it are rejected, never evicted.
    pub store_max_bytes: u64,

    /// Attributes advertised by the store (e.g. "mem")
    pub store_attrs: Attributes,

    // -------------------------------------------------------------------------
    // Write Task Configuration
    // -------------------------------------------------------------------------
    /// Name given to the write task's worker thread
    pub write_task_name: String,

    /// How long `WriteTask::wait_response` waits (milliseconds).
    /// Zero waits forever.
    pub response_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_max_bytes: 64 * 1024 * 1024, // 64 MB
            store_attrs: Attributes::new(["mem"]),
            write_task_name: "raft-write-task".to_string(),
            response_timeout_ms: 5000,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check the config for values that cannot work
    pub fn validate(&self) -> Result<()> {
        if self.store_max_bytes == 0 {
            return Err(StoreError::Config("store_max_bytes must be > 0".to_string()));
        }
        if self.write_task_name.is_empty() {
            return Err(StoreError::Config("write_task_name must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the ordered store byte budget
    pub fn store_max_bytes(mut self, bytes: u64) -> Self {
        self.config.store_max_bytes = bytes;
        self
    }

    /// Set the ordered store attributes
    pub fn store_attrs(mut self, attrs: Attributes) -> Self {
        self.config.store_attrs = attrs;
        self
    }

    /// Set the worker thread name
    pub fn write_task_name(mut self, name: impl Into<String>) -> Self {
        self.config.write_task_name = name.into();
        self
    }

    /// Set the response timeout (in milliseconds)
    pub fn response_timeout_ms(mut self, ms: u64) -> Self {
        self.config.response_timeout_ms = ms;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
