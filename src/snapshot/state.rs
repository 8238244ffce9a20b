//! Mutual exclusion between snapshot loads and writes.
//!
//! One tri-state phase behind a mutex replaces separate `loading` and
//! `writing` flags. Leaving a phase notifies a condvar, which the shutdown
//! path waits on instead of polling.

use parking_lot::{Condvar, Mutex};
use std::time::Instant;

/// What the snapshot pipeline is doing right now.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Loading,
    Writing,
}

/// Why a phase could not be claimed while waiting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClaimError {
    /// A load holds the pipeline; flushing now would race it.
    LoadInProgress,
    /// The deadline passed while a write was still running.
    TimedOut,
}

/// Shared guard over the snapshot file.
#[derive(Debug)]
pub struct SnapshotGuard {
    phase: Mutex<Phase>,
    released: Condvar,
}

impl Default for SnapshotGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotGuard {
    pub fn new() -> Self {
        Self {
            phase: Mutex::new(Phase::Idle),
            released: Condvar::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        *self.phase.lock()
    }

    /// Claim `phase` if the pipeline is idle.
    ///
    /// Returns the phase currently holding the pipeline on failure.
    pub fn try_claim(&self, phase: Phase) -> Result<PhaseTicket<'_>, Phase> {
        let mut current = self.phase.lock();
        if *current != Phase::Idle {
            return Err(*current);
        }
        *current = phase;
        Ok(PhaseTicket { guard: self, phase })
    }

    /// Wait for any running write to finish, then claim `Writing`.
    ///
    /// Gives up immediately if a load holds the pipeline. With a deadline,
    /// gives up once it passes.
    pub fn claim_writing_after(
        &self,
        deadline: Option<Instant>,
    ) -> Result<PhaseTicket<'_>, ClaimError> {
        let mut current = self.phase.lock();
        loop {
            match *current {
                Phase::Idle => {
                    *current = Phase::Writing;
                    return Ok(PhaseTicket {
                        guard: self,
                        phase: Phase::Writing,
                    });
                }
                Phase::Loading => return Err(ClaimError::LoadInProgress),
                Phase::Writing => match deadline {
                    Some(deadline) => {
                        if self.released.wait_until(&mut current, deadline).timed_out()
                            && *current == Phase::Writing
                        {
                            return Err(ClaimError::TimedOut);
                        }
                    }
                    None => self.released.wait(&mut current),
                },
            }
        }
    }

    fn release(&self) {
        *self.phase.lock() = Phase::Idle;
        self.released.notify_all();
    }
}

/// Holds a claimed phase; dropping it returns the pipeline to idle.
#[derive(Debug)]
pub struct PhaseTicket<'a> {
    guard: &'a SnapshotGuard,
    phase: Phase,
}

impl PhaseTicket<'_> {
    pub fn phase(&self) -> Phase {
        self.phase
    }
}

impl Drop for PhaseTicket<'_> {
    fn drop(&mut self) {
        self.guard.release();
    }
}
