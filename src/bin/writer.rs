//! RaftStore Writer Binary
//!
//! Drives a write task the way a consensus loop would: builds multi-group
//! write requests, waits for readiness, submits, and checks each response.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use raftstore::kv::Attributes;
use raftstore::raft::{GroupElectionState, LogEntry, WriteRequest};
use raftstore::{Config, InMem, KvStorage, MemoryStorage, Storage, WriteTask};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Backend {
    /// Volatile reference backend
    Memory,
    /// Backend over the capacity-bounded ordered store
    Kv,
}

/// RaftStore Writer
#[derive(Parser, Debug)]
#[command(name = "raftstore-writer")]
#[command(about = "Drive the write task against a storage backend")]
#[command(version)]
struct Args {
    /// Storage backend
    #[arg(short, long, value_enum, default_value = "kv")]
    backend: Backend,

    /// Number of consensus groups
    #[arg(short, long, default_value = "4")]
    groups: u64,

    /// Number of write requests to submit
    #[arg(long, default_value = "16")]
    batches: u64,

    /// Entries appended per group per request
    #[arg(short, long, default_value = "8")]
    entries: u64,

    /// Payload size in bytes
    #[arg(long, default_value = "128")]
    payload_bytes: usize,

    /// Ordered store budget in MB (kv backend)
    #[arg(short = 'm', long, default_value = "64")]
    store_mb: u64,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,raftstore=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("RaftStore Writer v{}", raftstore::VERSION);
    tracing::info!("Backend: {:?}, groups: {}, batches: {}", args.backend, args.groups, args.batches);

    let config = Config::builder()
        .store_max_bytes(args.store_mb * 1024 * 1024)
        .store_attrs(Attributes::new(["mem"]))
        .build();

    let (storage, store): (Arc<dyn Storage>, Option<Arc<InMem>>) = match args.backend {
        Backend::Memory => (Arc::new(MemoryStorage::new()) as Arc<dyn Storage>, None),
        Backend::Kv => {
            let store = Arc::new(InMem::from_config(&config));
            tracing::info!("Store: {}", store);
            (Arc::new(KvStorage::new(Arc::clone(&store))) as Arc<dyn Storage>, Some(store))
        }
    };

    let loaded = storage.load_groups().iter().count();
    tracing::info!("Loaded {} existing groups", loaded);

    let task = match WriteTask::start_with_config(Arc::clone(&storage), &config) {
        Ok(t) => t,
        Err(e) => {
            tracing::error!("Failed to start write task: {}", e);
            std::process::exit(1);
        }
    };

    let payload = vec![0xabu8; args.payload_bytes];
    let mut failed_groups = 0u64;

    for batch in 0..args.batches {
        let term = batch / 4 + 1;
        let mut request = WriteRequest::new();
        for group_id in 1..=args.groups {
            if batch % 4 == 0 {
                request.set_election_state(group_id, GroupElectionState::new(term, Some(1)));
            }
            for i in 0..args.entries {
                let index = batch * args.entries + i + 1;
                request.append(group_id, LogEntry::command(term, index, payload.clone()));
            }
        }

        if !task.wait_ready(Duration::from_secs(5)) {
            tracing::error!("Write task not ready for batch {}", batch);
            break;
        }

        if let Err(e) = task.submit(request) {
            tracing::error!("Submit failed: {}", e);
            break;
        }

        let response = match task.wait_response() {
            Ok(r) => r,
            Err(e) => {
                tracing::error!("No response for batch {}: {}", batch, e);
                break;
            }
        };

        for (group_id, group) in &response.groups {
            if !group.entries.is_empty() && !group.appended() {
                failed_groups += 1;
                tracing::warn!("Group {} batch {} was not appended", group_id, batch);
            } else {
                tracing::debug!(
                    "Group {} persisted through index {:?} term {:?}",
                    group_id, group.last_index, group.last_term
                );
            }
        }
    }

    if let Err(e) = task.join() {
        tracing::error!("Write task error: {}", e);
    }

    if let Some(store) = store {
        let capacity = store.capacity();
        tracing::info!(
            "Store capacity: {} bytes, available: {} bytes, entries: {}",
            capacity.capacity, capacity.available, store.len()
        );
    }

    tracing::info!("Done, {} group writes failed", failed_groups);
}
