//! Serializes store state into a snapshot file.

use super::state::{Phase, SnapshotGuard};
use crate::codec::{assemble, encode_collections, encode_command_log, encode_info};
use crate::error::Result;
use crate::store::{SharedStore, Store};
use crate::types::{epoch_millis, snapshot_timestamp, SnapshotId, SnapshotInfo, FORMAT_VERSION};
use parking_lot::Mutex;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use tempfile::NamedTempFile;
use tracing::{debug, error, info};

/// How the snapshot file is replaced on each write.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum WriteDurability {
    /// Truncate and overwrite the file in place. A crash mid-write can leave
    /// a truncated or corrupt snapshot.
    InPlace,
    /// Write a temp file next to the snapshot, fsync it, then rename it over
    /// the old one.
    #[default]
    Atomic,
}

/// Result of a guarded write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    Written(SnapshotInfo),
    /// Another load or write held the pipeline; nothing was written.
    Skipped(Phase),
}

impl WriteOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, WriteOutcome::Written(_))
    }
}

/// Snapshot file content rendered from a store, ready to persist.
#[derive(Clone, Debug)]
pub struct RenderedSnapshot {
    pub info: SnapshotInfo,
    pub content: String,
}

/// Writes snapshots of a store to one file.
pub struct SnapshotWriter {
    path: PathBuf,
    store_id: String,
    role: String,
    durability: WriteDurability,
    guard: Arc<SnapshotGuard>,
    last_written: Mutex<Option<SnapshotInfo>>,
}

impl SnapshotWriter {
    pub fn new(
        path: impl AsRef<Path>,
        store_id: impl Into<String>,
        role: impl Into<String>,
        durability: WriteDurability,
        guard: Arc<SnapshotGuard>,
    ) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            store_id: store_id.into(),
            role: role.into(),
            durability,
            guard,
            last_written: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn guard(&self) -> &Arc<SnapshotGuard> {
        &self.guard
    }

    /// Info block of the most recent successful write.
    pub fn last_written(&self) -> Option<SnapshotInfo> {
        self.last_written.lock().clone()
    }

    /// Write a snapshot unless a load or another write is in flight.
    ///
    /// The store is read-locked only while rendering, not during file I/O.
    pub fn write(&self, store: &SharedStore) -> Result<WriteOutcome> {
        let _ticket = match self.guard.try_claim(Phase::Writing) {
            Ok(ticket) => ticket,
            Err(holder) => {
                debug!(path = %self.path.display(), ?holder, "snapshot write skipped");
                return Ok(WriteOutcome::Skipped(holder));
            }
        };

        self.write_claimed(store).map(WriteOutcome::Written)
    }

    /// Write without touching the guard. The caller must already hold a
    /// `Loading` or `Writing` ticket.
    pub(crate) fn write_claimed(&self, store: &SharedStore) -> Result<SnapshotInfo> {
        let rendered = {
            let store = store.read();
            self.render(&store)
        };

        let result = rendered.and_then(|rendered| {
            self.persist(&rendered.content)?;
            Ok(rendered.info)
        });

        match result {
            Ok(info) => {
                info!(
                    path = %self.path.display(),
                    id = %info.id,
                    points = info.point_count,
                    collections = info.collection_count,
                    bytes = info.byte_size,
                    "snapshot written"
                );
                *self.last_written.lock() = Some(info.clone());
                Ok(info)
            }
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "snapshot write failed");
                Err(e)
            }
        }
    }

    /// Encode the store into file content.
    ///
    /// The command log and the collections are encoded on separate threads.
    pub fn render(&self, store: &Store) -> Result<RenderedSnapshot> {
        let table = store.table();
        let collections = store.collections();

        let (command_log, collections_json) = thread::scope(|s| {
            let collections_task = s.spawn(|| encode_collections(collections));
            let command_log = encode_command_log(table.records());
            let collections_json = match collections_task.join() {
                Ok(encoded) => encoded,
                Err(panic) => std::panic::resume_unwind(panic),
            };
            (command_log, collections_json)
        });
        let collections_json = collections_json?;

        let info = SnapshotInfo {
            version: FORMAT_VERSION.to_string(),
            id: SnapshotId::new(&self.store_id, &self.role, epoch_millis()).into_string(),
            path: self.path.display().to_string(),
            snapshot_time: snapshot_timestamp(),
            collection_count: collections.len() as u64,
            point_count: table.len() as u64,
            byte_size: command_log.len() as u64,
        };

        let content = assemble(&encode_info(&info)?, &command_log, &collections_json);
        Ok(RenderedSnapshot { info, content })
    }

    /// Replace the snapshot file with `content`.
    fn persist(&self, content: &str) -> Result<()> {
        let dir = parent_dir(&self.path);
        fs::create_dir_all(dir)?;

        match self.durability {
            WriteDurability::InPlace => {
                let mut file = OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(&self.path)?;
                file.write_all(content.as_bytes())?;
                file.sync_all()?;
            }
            WriteDurability::Atomic => {
                let mut tmp = NamedTempFile::new_in(dir)?;
                tmp.write_all(content.as_bytes())?;
                tmp.as_file().sync_all()?;
                tmp.persist(&self.path).map_err(|e| e.error)?;
            }
        }

        Ok(())
    }
}

/// Directory holding `path`; `.` for bare file names.
pub(crate) fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}
