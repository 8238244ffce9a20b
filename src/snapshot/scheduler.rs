//! Periodic snapshot writes and the final flush on shutdown.
//!
//! A background thread writes the store on every tick of a fixed period.
//! `shutdown()` stops that thread and waits for it to exit, then waits on the
//! guard until no other write is running and performs one last write. Signal handling belongs to the
//! process that owns the scheduler; it calls `shutdown()` when told to stop.

use super::state::ClaimError;
use super::writer::SnapshotWriter;
use crate::error::{Result, SnapshotError};
use crate::store::SharedStore;
use crate::types::SnapshotInfo;
use crossbeam_channel::{bounded, select, tick, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Result of `shutdown()`.
#[derive(Debug)]
pub enum ShutdownOutcome {
    /// The final write completed.
    Flushed(SnapshotInfo),
    /// A load was in progress; no flush was attempted.
    SkippedLoadInProgress,
    /// A running write did not finish before the deadline.
    TimedOut,
    /// The final write failed.
    Failed(SnapshotError),
}

/// Background timer thread.
struct Worker {
    stop: Sender<()>,
    /// Disconnects when the thread exits.
    done: Receiver<()>,
    handle: JoinHandle<()>,
}

impl Worker {
    /// Signal the thread and wait for it to exit. Returns `false` if it is
    /// still running at `deadline`; the thread is then left detached.
    fn stop_by(self, deadline: Option<Instant>) -> bool {
        let _ = self.stop.send(());
        let exited = match deadline {
            None => self.done.recv().is_err(),
            Some(deadline) => matches!(
                self.done.recv_deadline(deadline),
                Err(RecvTimeoutError::Disconnected)
            ),
        };
        if !exited {
            return false;
        }
        if self.handle.join().is_err() {
            error!("snapshot timer thread panicked");
        }
        true
    }
}

/// Drives periodic snapshot writes.
pub struct SnapshotScheduler {
    writer: Arc<SnapshotWriter>,
    period: Duration,
    worker: Mutex<Option<Worker>>,
}

impl SnapshotScheduler {
    pub fn new(writer: Arc<SnapshotWriter>, period: Duration) -> Self {
        Self {
            writer,
            period,
            worker: Mutex::new(None),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }

    /// Start periodic writes of `store`. Logs and does nothing if already
    /// started.
    pub fn start(&self, store: SharedStore) {
        if let Err(e) = self.try_start(store) {
            error!(error = %e, "snapshot scheduler not started");
        }
    }

    /// Start periodic writes of `store`.
    pub fn try_start(&self, store: SharedStore) -> Result<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Err(SnapshotError::AlreadyStarted);
        }

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let (done_tx, done_rx) = bounded::<()>(0);
        let writer = Arc::clone(&self.writer);
        let period = self.period;

        let handle = thread::Builder::new()
            .name("kdb-snapshot".to_string())
            .spawn(move || {
                let _done = done_tx;
                let ticker = tick(period);
                loop {
                    select! {
                        recv(ticker) -> _ => {
                            // Failures are logged by the writer; the next tick retries.
                            let _ = writer.write(&store);
                        }
                        recv(stop_rx) -> _ => break,
                    }
                }
                debug!("snapshot timer stopped");
            })?;

        info!(period_ms = self.period.as_millis() as u64, "snapshot scheduler started");
        *worker = Some(Worker {
            stop: stop_tx,
            done: done_rx,
            handle,
        });
        Ok(())
    }

    /// Stop the timer thread, letting a write already running finish.
    pub fn stop(&self) {
        if let Some(worker) = self.worker.lock().take() {
            worker.stop_by(None);
        }
    }

    /// Stop the timer and flush the store once more.
    ///
    /// The timer thread has exited before the final write starts. Does
    /// nothing if a load is in progress. Otherwise waits, without a bound,
    /// for a running write to finish before writing.
    pub fn shutdown(&self, store: &SharedStore) -> ShutdownOutcome {
        self.shutdown_inner(store, None)
    }

    /// Like [`shutdown`](Self::shutdown), giving up after `timeout` if a
    /// running write has not finished.
    pub fn shutdown_timeout(&self, store: &SharedStore, timeout: Duration) -> ShutdownOutcome {
        self.shutdown_inner(store, Some(Instant::now() + timeout))
    }

    fn shutdown_inner(&self, store: &SharedStore, deadline: Option<Instant>) -> ShutdownOutcome {
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if !worker.stop_by(deadline) {
                error!("timed out waiting for snapshot timer thread");
                return ShutdownOutcome::TimedOut;
            }
        }

        match self.writer.guard().claim_writing_after(deadline) {
            Ok(_ticket) => match self.writer.write_claimed(store) {
                Ok(info) => {
                    info!(id = %info.id, "final snapshot flushed");
                    ShutdownOutcome::Flushed(info)
                }
                Err(e) => {
                    error!(error = %e, "final snapshot flush failed");
                    ShutdownOutcome::Failed(e)
                }
            },
            Err(ClaimError::LoadInProgress) => {
                warn!("snapshot load in progress, skipping final flush");
                ShutdownOutcome::SkippedLoadInProgress
            }
            Err(ClaimError::TimedOut) => {
                error!("timed out waiting for running snapshot write");
                ShutdownOutcome::TimedOut
            }
        }
    }
}

impl Drop for SnapshotScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
