//! Snapshot service tying loader, writer and scheduler together.

use crate::error::{Result, SnapshotError};
use crate::snapshot::{
    parent_dir, LoadOutcome, ShutdownOutcome, SnapshotGuard, SnapshotLoader, SnapshotScheduler,
    SnapshotWriter, WriteDurability, WriteOutcome,
};
use crate::store::SharedStore;
use crate::types::{epoch_millis, SnapshotInfo};
use fs2::FileExt;
use std::ffi::OsString;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

/// What to do when the snapshot file exists but cannot be decoded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RecoveryPolicy {
    /// Refuse to open; the caller decides.
    #[default]
    FailFast,
    /// Move the corrupt file aside, write a fresh snapshot and continue
    /// with the store as it is.
    StartEmpty,
}

/// Snapshot service configuration.
#[derive(Clone, Debug)]
pub struct SnapshotConfig {
    /// Snapshot file location.
    pub path: PathBuf,

    /// Time between automatic writes.
    pub save_period: Duration,

    /// First component of snapshot ids.
    pub store_id: String,

    /// Second component of snapshot ids.
    pub role: String,

    pub durability: WriteDurability,

    pub recovery: RecoveryPolicy,

    /// Hold an exclusive lock on `<path>.lock` while open.
    pub lock_file: bool,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./kdb.snapshot"),
            save_period: Duration::from_secs(60),
            store_id: "kdb".to_string(),
            role: "primary".to_string(),
            durability: WriteDurability::Atomic,
            recovery: RecoveryPolicy::FailFast,
            lock_file: true,
        }
    }
}

impl SnapshotConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_save_period(mut self, period: Duration) -> Self {
        self.save_period = period;
        self
    }

    pub fn with_save_period_ms(self, millis: u64) -> Self {
        self.with_save_period(Duration::from_millis(millis))
    }

    pub fn with_identity(mut self, store_id: impl Into<String>, role: impl Into<String>) -> Self {
        self.store_id = store_id.into();
        self.role = role.into();
        self
    }

    pub fn with_durability(mut self, durability: WriteDurability) -> Self {
        self.durability = durability;
        self
    }

    pub fn with_recovery(mut self, recovery: RecoveryPolicy) -> Self {
        self.recovery = recovery;
        self
    }

    pub fn with_lock_file(mut self, lock_file: bool) -> Self {
        self.lock_file = lock_file;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Err(SnapshotError::InvalidConfig("path is empty".into()));
        }
        if self.save_period.is_zero() {
            return Err(SnapshotError::InvalidConfig("save period must be positive".into()));
        }
        if self.store_id.is_empty() || self.role.is_empty() {
            return Err(SnapshotError::InvalidConfig("store id and role must be set".into()));
        }
        Ok(())
    }
}

/// `path` with `suffix` appended to its file name.
fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

/// Owns the snapshot pipeline for one store.
pub struct SnapshotService {
    config: SnapshotConfig,
    store: SharedStore,
    writer: Arc<SnapshotWriter>,
    loader: SnapshotLoader,
    scheduler: SnapshotScheduler,
    lock_file: Option<File>,
}

impl SnapshotService {
    /// Lock the snapshot, load it into `store` (or create it) and return the
    /// service. The scheduler is not started.
    pub fn open(config: SnapshotConfig, store: SharedStore) -> Result<(Self, LoadOutcome)> {
        config.validate()?;

        let lock_file = if config.lock_file {
            Some(Self::acquire_lock(&config.path)?)
        } else {
            None
        };

        let writer = Arc::new(SnapshotWriter::new(
            &config.path,
            config.store_id.clone(),
            config.role.clone(),
            config.durability,
            Arc::new(SnapshotGuard::new()),
        ));
        let loader = SnapshotLoader::new(Arc::clone(&writer));
        let scheduler = SnapshotScheduler::new(Arc::clone(&writer), config.save_period);

        let service = Self {
            config,
            store,
            writer,
            loader,
            scheduler,
            lock_file,
        };

        let outcome = service.load_with_recovery()?;
        Ok((service, outcome))
    }

    fn load_with_recovery(&self) -> Result<LoadOutcome> {
        match self.loader.load(&self.store) {
            Err(e) if e.is_malformed() && self.config.recovery == RecoveryPolicy::StartEmpty => {
                let suffix = format!(".corrupt-{}", epoch_millis());
                let aside = sibling_path(&self.config.path, &suffix);
                warn!(
                    path = %self.config.path.display(),
                    moved_to = %aside.display(),
                    error = %e,
                    "corrupt snapshot moved aside, starting empty"
                );
                fs::rename(&self.config.path, &aside)?;
                self.loader.load(&self.store)
            }
            other => other,
        }
    }

    fn acquire_lock(path: &Path) -> Result<File> {
        fs::create_dir_all(parent_dir(path))?;
        let lock_path = sibling_path(path, ".lock");
        let lock_file = File::create(&lock_path)?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| SnapshotError::Locked(lock_path))?;

        Ok(lock_file)
    }

    pub fn config(&self) -> &SnapshotConfig {
        &self.config
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Guard shared by this service's loader and writer.
    pub fn guard(&self) -> &Arc<SnapshotGuard> {
        self.writer.guard()
    }

    /// Begin periodic writes.
    pub fn start(&self) {
        self.scheduler.start(Arc::clone(&self.store));
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Write a snapshot now, unless a load or write is in flight.
    pub fn snapshot_now(&self) -> Result<WriteOutcome> {
        self.writer.write(&self.store)
    }

    /// Reload the store from disk.
    pub fn reload(&self) -> Result<LoadOutcome> {
        self.loader.load(&self.store)
    }

    pub fn last_snapshot(&self) -> Option<SnapshotInfo> {
        self.writer.last_written()
    }

    /// Stop the timer and flush once more.
    pub fn shutdown(&self) -> ShutdownOutcome {
        self.scheduler.shutdown(&self.store)
    }

    pub fn shutdown_timeout(&self, timeout: Duration) -> ShutdownOutcome {
        self.scheduler.shutdown_timeout(&self.store, timeout)
    }
}

impl Drop for SnapshotService {
    fn drop(&mut self) {
        self.scheduler.stop();
        if let Some(lock) = &self.lock_file {
            if let Err(e) = FileExt::unlock(lock) {
                error!(error = %e, "failed to release snapshot lock");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use tempfile::TempDir;

    #[test]
    fn test_sibling_path() {
        assert_eq!(
            sibling_path(Path::new("/data/db.snapshot"), ".lock"),
            PathBuf::from("/data/db.snapshot.lock")
        );
        assert_eq!(sibling_path(Path::new("db"), ".corrupt-1"), PathBuf::from("db.corrupt-1"));
    }

    #[test]
    fn test_config_validation() {
        assert!(SnapshotConfig::default().validate().is_ok());
        assert!(SnapshotConfig::new("").validate().is_err());
        assert!(SnapshotConfig::new("x").with_save_period_ms(0).validate().is_err());
        assert!(SnapshotConfig::new("x").with_identity("", "primary").validate().is_err());
    }

    #[test]
    fn test_second_open_is_locked() {
        let dir = TempDir::new().unwrap();
        let config = SnapshotConfig::new(dir.path().join("db.snapshot"));

        let (_first, _) = SnapshotService::open(config.clone(), Store::shared()).unwrap();
        let err = SnapshotService::open(config, Store::shared()).err().unwrap();
        assert!(matches!(err, SnapshotError::Locked(_)));
    }

    #[test]
    fn test_lock_released_on_drop() {
        let dir = TempDir::new().unwrap();
        let config = SnapshotConfig::new(dir.path().join("db.snapshot"));

        drop(SnapshotService::open(config.clone(), Store::shared()).unwrap());
        assert!(SnapshotService::open(config, Store::shared()).is_ok());
    }
}
