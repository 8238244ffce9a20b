//! Restores store state from a snapshot file.

use super::state::Phase;
use super::writer::SnapshotWriter;
use crate::codec::SnapshotFile;
use crate::error::{Result, SnapshotError};
use crate::store::SharedStore;
use crate::types::SnapshotInfo;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Result of a load.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The store was replaced with the file's contents.
    Loaded {
        info: SnapshotInfo,
        points: usize,
        collections: usize,
    },
    /// No file existed; a fresh snapshot of the current store was written.
    Bootstrapped(SnapshotInfo),
    /// Another load or write held the pipeline.
    Skipped(Phase),
}

/// Read a snapshot file and decode all three sections.
pub fn read_snapshot(path: &Path) -> Result<SnapshotFile> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(SnapshotError::NotFound(path.to_path_buf()))
        }
        Err(e) if e.kind() == ErrorKind::InvalidData => {
            return Err(SnapshotError::MalformedFormat(format!("not UTF-8: {}", e)))
        }
        Err(e) => return Err(e.into()),
    };
    SnapshotFile::parse(&content)
}

/// Reject a file whose info block disagrees with the sections it describes.
///
/// A record carrying a section marker cuts its section short on read; the
/// counts are what catches that.
fn check_counts(file: &SnapshotFile) -> Result<()> {
    let info = &file.info;
    let checks = [
        ("pointCount", info.point_count, file.distinct_keys()),
        ("byteSize", info.byte_size, file.data_len()),
        ("collectionCount", info.collection_count, file.collections.len()),
    ];
    for (field, expected, actual) in checks {
        if expected != actual as u64 {
            return Err(SnapshotError::MalformedFormat(format!(
                "info {} is {} but sections hold {}",
                field, expected, actual
            )));
        }
    }
    Ok(())
}

/// Loads the snapshot file the paired writer writes.
pub struct SnapshotLoader {
    writer: Arc<SnapshotWriter>,
}

impl SnapshotLoader {
    pub fn new(writer: Arc<SnapshotWriter>) -> Self {
        Self { writer }
    }

    pub fn path(&self) -> &Path {
        self.writer.path()
    }

    /// Populate `store` from the snapshot file.
    ///
    /// A missing file is not an error: a fresh snapshot is written instead.
    /// On any other failure the store is left exactly as it was.
    pub fn load(&self, store: &SharedStore) -> Result<LoadOutcome> {
        let path = self.writer.path();
        let _ticket = match self.writer.guard().try_claim(Phase::Loading) {
            Ok(ticket) => ticket,
            Err(holder) => {
                warn!(path = %path.display(), ?holder, "snapshot load skipped");
                return Ok(LoadOutcome::Skipped(holder));
            }
        };

        let file = match read_snapshot(path) {
            Ok(file) => file,
            Err(e) if e.is_not_found() => {
                warn!(path = %path.display(), "no snapshot found, creating a fresh one");
                let info = self.writer.write_claimed(store)?;
                return Ok(LoadOutcome::Bootstrapped(info));
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "failed to read snapshot");
                return Err(e);
            }
        };

        if !file.info.is_current_version() {
            warn!(
                path = %path.display(),
                version = %file.info.version,
                "snapshot was written by a different format version"
            );
        }

        if let Err(e) = check_counts(&file) {
            error!(path = %path.display(), error = %e, "snapshot rejected");
            return Err(e);
        }

        let SnapshotFile {
            info,
            commands,
            collections,
        } = file;

        let mut store = store.write();
        if let Err(e) = store.populate(commands, collections) {
            error!(path = %path.display(), error = %e, "snapshot rejected");
            return Err(SnapshotError::MalformedFormat(e.to_string()));
        }

        let points = store.point_count();
        let collections = store.collections().len();

        info!(
            path = %path.display(),
            id = %info.id,
            points,
            collections,
            "snapshot loaded"
        );

        Ok(LoadOutcome::Loaded {
            info,
            points,
            collections,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{
        assemble, command_key, decode_command_log, encode_collections, encode_info,
    };
    use crate::snapshot::state::SnapshotGuard;
    use crate::snapshot::writer::WriteDurability;
    use crate::store::Store;
    use crate::types::{CollectionRecord, FORMAT_VERSION};
    use std::collections::HashSet;
    use tempfile::TempDir;

    fn loader(dir: &TempDir) -> SnapshotLoader {
        SnapshotLoader::new(Arc::new(SnapshotWriter::new(
            dir.path().join("db.snapshot"),
            "kdb",
            "primary",
            WriteDurability::Atomic,
            Arc::new(SnapshotGuard::new()),
        )))
    }

    fn write_file(path: &Path, commands: &str, collections: &[CollectionRecord]) {
        let keys: HashSet<&str> = decode_command_log(commands)
            .into_iter()
            .filter_map(command_key)
            .collect();
        let info = SnapshotInfo {
            version: FORMAT_VERSION.to_string(),
            id: "kdb-primary-1".to_string(),
            path: path.display().to_string(),
            snapshot_time: "2024-01-01T00:00:00.000Z".to_string(),
            collection_count: collections.len() as u64,
            point_count: keys.len() as u64,
            byte_size: commands.len() as u64,
        };
        let content = assemble(
            &encode_info(&info).unwrap(),
            commands,
            &encode_collections(collections).unwrap(),
        );
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_load_last_write_wins() {
        let dir = TempDir::new().unwrap();
        let loader = loader(&dir);
        write_file(
            loader.path(),
            "a<-KC->1<-KCOMMAND->b<-KC->2<-KCOMMAND->a<-KC->3<-KCOMMAND->",
            &[CollectionRecord::new("users")],
        );

        let store = Store::shared();
        let outcome = loader.load(&store).unwrap();

        assert!(matches!(outcome, LoadOutcome::Loaded { points: 2, collections: 1, .. }));
        let store = store.read();
        assert_eq!(store.get("a"), Some("a<-KC->3"));
        assert_eq!(store.get("b"), Some("b<-KC->2"));
        assert_eq!(store.commands().len(), 3);
        assert_eq!(store.collection_ids(), ["users"]);
    }

    #[test]
    fn test_missing_file_bootstraps() {
        let dir = TempDir::new().unwrap();
        let loader = loader(&dir);

        let outcome = loader.load(&Store::shared()).unwrap();
        let LoadOutcome::Bootstrapped(info) = outcome else {
            panic!("expected bootstrap");
        };

        assert_eq!(info.point_count, 0);
        assert_eq!(info.collection_count, 0);
        let file = read_snapshot(loader.path()).unwrap();
        assert_eq!(file.commands, vec![""]);
        assert!(file.collections.is_empty());
    }

    #[test]
    fn test_malformed_file_leaves_store_untouched() {
        let dir = TempDir::new().unwrap();
        let loader = loader(&dir);
        fs::write(loader.path(), "garbage").unwrap();

        let store = Store::shared();
        store.write().record_command("keep", "me").unwrap();

        let err = loader.load(&store).unwrap_err();
        assert!(err.is_malformed());
        assert_eq!(store.read().get("keep"), Some("keep<-KC->me"));
        assert_eq!(loader.writer.guard().phase(), Phase::Idle);
    }

    #[test]
    fn test_truncated_data_section_is_malformed() {
        let dir = TempDir::new().unwrap();
        let loader = loader(&dir);
        write_file(
            loader.path(),
            "a<-KC->{\"note\":\"--KDB-DATA-END--\"}<-KCOMMAND->b<-KC->2<-KCOMMAND->",
            &[],
        );

        let store = Store::shared();
        store.write().record_command("keep", "me").unwrap();

        let err = loader.load(&store).unwrap_err();
        assert!(matches!(&err, SnapshotError::MalformedFormat(msg) if msg.contains("pointCount")));
        assert_eq!(store.read().get("keep"), Some("keep<-KC->me"));
        assert_eq!(store.read().point_count(), 1);
    }

    #[test]
    fn test_stale_byte_size_is_malformed() {
        let dir = TempDir::new().unwrap();
        let loader = loader(&dir);
        let info = SnapshotInfo {
            version: FORMAT_VERSION.to_string(),
            id: "kdb-primary-1".to_string(),
            path: "db.snapshot".to_string(),
            snapshot_time: "2024-01-01T00:00:00.000Z".to_string(),
            collection_count: 0,
            point_count: 1,
            byte_size: 3,
        };
        let content = assemble(&encode_info(&info).unwrap(), "a<-KC->1<-KCOMMAND->", "[]");
        fs::write(loader.path(), content).unwrap();

        let err = loader.load(&Store::shared()).unwrap_err();
        assert!(matches!(&err, SnapshotError::MalformedFormat(msg) if msg.contains("byteSize")));
    }

    #[test]
    fn test_invalid_collection_is_malformed() {
        let dir = TempDir::new().unwrap();
        let loader = loader(&dir);
        let bad = CollectionRecord::new("bad").with_field("required", serde_json::json!("x"));
        write_file(loader.path(), "", &[bad]);

        assert!(loader.load(&Store::shared()).unwrap_err().is_malformed());
    }

    #[test]
    fn test_load_skipped_while_writing() {
        let dir = TempDir::new().unwrap();
        let loader = loader(&dir);

        let _writing = loader.writer.guard().try_claim(Phase::Writing).unwrap();
        assert_eq!(
            loader.load(&Store::shared()).unwrap(),
            LoadOutcome::Skipped(Phase::Writing)
        );
    }
}
