//! Countdown of outstanding workers.
//!
//! [`CompletionTracker`] hands out one [`CompletionTicket`] per worker using a tokio semaphore.
//! Each ticket holds a permit and returns it when dropped, so a worker completes on every exit
//! path, including panics. [`CompletionTracker::wait_all`] resolves once every ticket has been
//! returned, which happens-after everything the workers did while holding them.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{BenchmarkError, Result};

/// The largest number of workers a tracker can account for.
pub const MAX_WORKERS: usize = u32::MAX as usize;

/// Tracks completion of a fixed number of workers.
#[derive(Clone, Debug)]
pub struct CompletionTracker {
    semaphore: Arc<Semaphore>,
    expected: u32,
}

impl CompletionTracker {
    /// Creates a tracker for `expected` workers.
    pub fn new(expected: usize) -> Result<Self> {
        let max = MAX_WORKERS.min(Semaphore::MAX_PERMITS);
        let Ok(permits) = u32::try_from(expected) else {
            return Err(BenchmarkError::TooManyWorkers {
                requested: expected,
                max,
            });
        };
        if expected > max {
            return Err(BenchmarkError::TooManyWorkers {
                requested: expected,
                max,
            });
        }

        Ok(Self {
            semaphore: Arc::new(Semaphore::new(expected)),
            expected: permits,
        })
    }

    /// Hands out the ticket for the next worker.
    ///
    /// Returns `None` once all `expected` tickets are out.
    pub fn ticket(&self) -> Option<CompletionTicket> {
        let permit = Arc::clone(&self.semaphore).try_acquire_owned().ok()?;
        Some(CompletionTicket { _permit: permit })
    }

    /// Returns the number of tickets currently held.
    pub fn outstanding(&self) -> usize {
        self.expected as usize - self.semaphore.available_permits()
    }

    /// Waits until every ticket has been returned.
    ///
    /// Tickets must be handed out before calling this, otherwise it may return before the
    /// corresponding workers ran.
    pub async fn wait_all(&self) {
        // The semaphore is never closed, so acquiring cannot fail.
        if let Ok(permits) = self.semaphore.acquire_many(self.expected).await {
            // Keep the count intact for `outstanding`.
            drop(permits);
        }
    }
}

/// RAII guard marking one worker as outstanding.
///
/// Dropping the ticket marks the worker as completed.
#[derive(Debug)]
pub struct CompletionTicket {
    _permit: OwnedSemaphorePermit,
}
