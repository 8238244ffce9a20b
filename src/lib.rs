//! # KDB Snapshots
//!
//! Persists and restores the in-memory state of a small key-value store to
//! a single, human-readable snapshot file.
//!
//! ## Core Concepts
//!
//! - **Snapshot file**: three framed sections (info, command data, collections)
//! - **Command log**: delimiter-joined `key<-KC->payload` records in write order
//! - **Lookup table**: last write per key, rebuilt on load
//! - **Guard**: a load and a write never overlap, nor do two writes
//! - **Scheduler**: periodic writes plus one final flush on shutdown
//!
//! ## Example
//!
//! ```ignore
//! use kdb_snapshot::{SnapshotConfig, SnapshotService, Store};
//!
//! let store = Store::shared();
//! let (service, _) = SnapshotService::open(
//!     SnapshotConfig::new("./data/kdb.snapshot").with_save_period_ms(5_000),
//!     store.clone(),
//! )?;
//! service.start();
//!
//! store.write().record_command("user:1", r#"{"name":"ada"}"#)?;
//!
//! // On SIGINT, from the owning process:
//! service.shutdown();
//! ```

pub mod codec;
pub mod error;
pub mod service;
pub mod snapshot;
pub mod store;
pub mod types;

// Re-exports
pub use codec::SnapshotFile;
pub use error::{Result, SnapshotError};
pub use service::{RecoveryPolicy, SnapshotConfig, SnapshotService};
pub use snapshot::{
    read_snapshot, LoadOutcome, Phase, ShutdownOutcome, SnapshotGuard, SnapshotLoader,
    SnapshotScheduler, SnapshotWriter, WriteDurability, WriteOutcome,
};
pub use store::{CollectionValidator, CommandTable, SharedStore, Store};
pub use types::*;
