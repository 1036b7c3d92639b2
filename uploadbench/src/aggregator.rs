//! Thread-safe accumulation of upload outcomes.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use sketches_ddsketch::DDSketch;

#[derive(Default)]
struct Tally {
    successful: u64,
    failed: u64,
    total_duration: Duration,
    latencies: DDSketch,
}

/// Collects the outcome of every worker of a run.
///
/// All updates are serialized by an internal lock, so concurrent workers never lose an update.
/// Counts only grow; there is no way to reset or decrement them within a run.
#[derive(Default)]
pub struct ResultAggregator {
    tally: Mutex<Tally>,
}

impl ResultAggregator {
    /// Creates an aggregator with all counts at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a successful upload that took `elapsed`.
    pub fn record_success(&self, elapsed: Duration) {
        let mut tally = self.lock();
        tally.successful += 1;
        tally.total_duration += elapsed;
        tally.latencies.add(elapsed.as_secs_f64());
    }

    /// Records a failed upload.
    pub fn record_failure(&self) {
        self.lock().failed += 1;
    }

    /// Returns the current counts.
    ///
    /// The snapshot is only complete once every worker has reported.
    pub fn snapshot(&self) -> Snapshot {
        let tally = self.lock();
        let quantile = |q: f64| {
            tally
                .latencies
                .quantile(q)
                .ok()
                .flatten()
                .map(|secs| Duration::from_secs_f64(secs.max(0.0)))
        };

        Snapshot {
            successful: tally.successful,
            failed: tally.failed,
            total_duration: tally.total_duration,
            p50: quantile(0.5),
            p90: quantile(0.9),
            p99: quantile(0.99),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Tally> {
        // Updates cannot panic halfway, so a poisoned tally is still consistent.
        self.tally.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ResultAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tally = self.lock();
        f.debug_struct("ResultAggregator")
            .field("successful", &tally.successful)
            .field("failed", &tally.failed)
            .field("total_duration", &tally.total_duration)
            .finish_non_exhaustive()
    }
}

/// Point-in-time counts of a [`ResultAggregator`].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Snapshot {
    /// Number of successful uploads.
    pub successful: u64,
    /// Number of failed uploads.
    pub failed: u64,
    /// Sum of the durations of all successful uploads.
    pub total_duration: Duration,
    /// Approximate median latency of successful uploads.
    pub p50: Option<Duration>,
    /// Approximate 90th percentile latency of successful uploads.
    pub p90: Option<Duration>,
    /// Approximate 99th percentile latency of successful uploads.
    pub p99: Option<Duration>,
}

impl Snapshot {
    /// Number of workers that reported, successful or not.
    pub fn completed(&self) -> u64 {
        self.successful + self.failed
    }

    /// Average duration of successful uploads.
    ///
    /// Returns `None` if no upload succeeded, in which case the average is undefined.
    pub fn average(&self) -> Option<Duration> {
        if self.successful == 0 {
            return None;
        }
        let nanos = self.total_duration.as_nanos() / u128::from(self.successful);
        Some(Duration::from_nanos(nanos.try_into().unwrap_or(u64::MAX)))
    }
}
