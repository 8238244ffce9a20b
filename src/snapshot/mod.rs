//! Snapshot load/write pipeline.
//!
//! Loader and writer share one [`SnapshotGuard`], so a write never runs
//! during a load or alongside another write.

mod loader;
mod scheduler;
mod state;
mod writer;

pub use loader::{read_snapshot, LoadOutcome, SnapshotLoader};
pub use scheduler::{ShutdownOutcome, SnapshotScheduler};
pub use state::{ClaimError, Phase, PhaseTicket, SnapshotGuard};
pub use writer::{RenderedSnapshot, SnapshotWriter, WriteDurability, WriteOutcome};

pub(crate) use writer::parent_dir;
