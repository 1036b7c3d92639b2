//! The benchmark orchestrator.
//!
//! [`run`] drives a single benchmark from validation to cleanup:
//!
//! 1. Validate the payload size and worker count. Nothing is touched on failure.
//! 2. Connect to storage.
//! 3. Create a uniquely named container, reusing it if it exists already.
//! 4. Generate the shared payload.
//! 5. Set up the release signal, the aggregator and the completion tracker.
//! 6. Spawn all workers. They park on the release gate.
//! 7. Open the release gate.
//! 8. Wait for every worker to return its completion ticket.
//! 9. Snapshot the aggregator and log the summary.
//! 10. Delete the container. Failure is recorded in the report but is not an error.

use std::sync::Arc;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::SmallRng;
use tokio::time::Instant;
use uploadbench_storage::{BoxedStorage, ContainerStatus, Storage, StorageResult};

use crate::aggregator::{ResultAggregator, Snapshot};
use crate::completion::CompletionTracker;
use crate::error::{BenchmarkError, Result};
use crate::release::ReleaseSignal;
use crate::worker::{self, WorkItem, WorkerContext};
use crate::{names, payload};

/// Parameters of a single benchmark run.
#[derive(Clone, Debug)]
pub struct BenchmarkSettings {
    /// Number of concurrent workers, each uploading one object.
    pub worker_count: usize,
    /// Size of the uploaded payload in bytes.
    pub payload_size: u64,
    /// Prefix shared by the container name and all object names.
    pub name_prefix: String,
    /// Timeout for container creation and deletion.
    pub request_timeout: Duration,
    /// Optional deadline for every single upload.
    pub upload_timeout: Option<Duration>,
    /// Seed for name and payload generation. Random if `None`.
    pub seed: Option<u64>,
}

impl Default for BenchmarkSettings {
    fn default() -> Self {
        Self {
            worker_count: 10,
            payload_size: 10 * 1024,
            name_prefix: "bench".to_owned(),
            request_timeout: Duration::from_secs(60),
            upload_timeout: None,
            seed: None,
        }
    }
}

/// Outcome of deleting the benchmark container.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Cleanup {
    /// The container was deleted.
    Deleted,
    /// The container could not be deleted. Contains the rendered error.
    Failed(String),
}

/// Results of a completed benchmark run.
#[derive(Clone, Debug)]
pub struct BenchmarkReport {
    /// Name of the container holding the uploads.
    pub container: String,
    /// Whether the container was created by this run or reused.
    pub container_status: ContainerStatus,
    /// Number of spawned workers.
    pub worker_count: usize,
    /// Size of the uploaded payload in bytes.
    pub payload_size: u64,
    /// When the workers were released. No upload started before this instant.
    pub released_at: Instant,
    /// Time from release until the last worker completed.
    pub wall_time: Duration,
    /// Final counts of the aggregator.
    pub snapshot: Snapshot,
    /// Outcome of the container deletion.
    pub cleanup: Cleanup,
}

impl BenchmarkReport {
    /// Average duration of successful uploads, or `None` if no upload succeeded.
    pub fn average(&self) -> Option<Duration> {
        self.snapshot.average()
    }

    /// Bytes per second uploaded successfully during the wall time of the run.
    pub fn throughput(&self) -> Option<f64> {
        let secs = self.wall_time.as_secs_f64();
        if self.snapshot.successful == 0 || secs == 0.0 {
            return None;
        }
        Some((self.snapshot.successful * self.payload_size) as f64 / secs)
    }
}

/// Runs a complete benchmark.
///
/// `connect` is only invoked after the settings passed validation. Errors before the workers are
/// spawned abort the run; everything afterwards ends up in the returned report.
pub async fn run<F>(settings: &BenchmarkSettings, connect: F) -> Result<BenchmarkReport>
where
    F: FnOnce() -> StorageResult<BoxedStorage>,
{
    payload::check_size(settings.payload_size)?;
    let tracker = CompletionTracker::new(settings.worker_count)?;

    let storage: Arc<dyn Storage> = Arc::from(connect().map_err(BenchmarkError::Connect)?);
    tracing::info!(storage = storage.name(), "Connected to storage");

    let mut rng = match settings.seed {
        Some(seed) => SmallRng::seed_from_u64(seed),
        None => SmallRng::from_os_rng(),
    };

    let container = names::container_name(&mut rng, &settings.name_prefix);
    let container_status = storage
        .create_container(&container, settings.request_timeout)
        .await
        .map_err(|cause| BenchmarkError::CreateContainer {
            container: container.clone(),
            cause,
        })?;
    match container_status {
        ContainerStatus::Created => tracing::info!("Created container {container}"),
        ContainerStatus::AlreadyExists => {
            tracing::info!("Container {container} already exists, reusing it")
        }
    }

    let context = WorkerContext {
        storage: Arc::clone(&storage),
        payload: payload::generate(&mut rng, settings.payload_size)?,
        aggregator: Arc::new(ResultAggregator::new()),
        upload_timeout: settings.upload_timeout,
    };
    let signal = ReleaseSignal::new();
    let shared_container: Arc<str> = Arc::from(container.as_str());

    for (index, ticket) in std::iter::from_fn(|| tracker.ticket()).enumerate() {
        let item = WorkItem {
            index: index + 1,
            container: Arc::clone(&shared_container),
            object: names::object_name(&mut rng, &settings.name_prefix),
        };
        tokio::spawn(worker::run(item, context.clone(), signal.gate(), ticket));
    }

    let released_at = Instant::now();
    signal.open();
    tracing::debug!(workers = settings.worker_count, "Released all workers");

    tracker.wait_all().await;
    let wall_time = released_at.elapsed();
    let snapshot = context.aggregator.snapshot();

    tracing::info!(
        successful = snapshot.successful,
        failed = snapshot.failed,
        average = ?snapshot.average(),
        ?wall_time,
        "All workers finished"
    );

    let cleanup = match storage
        .delete_container(&container, settings.request_timeout)
        .await
    {
        Ok(()) => {
            tracing::info!("Deleted container {container}");
            Cleanup::Deleted
        }
        Err(error) => {
            tracing::error!(
                error = &error as &dyn std::error::Error,
                "Failed to delete container {container}"
            );
            Cleanup::Failed(error.to_string())
        }
    };

    Ok(BenchmarkReport {
        container,
        container_status,
        worker_count: settings.worker_count,
        payload_size: settings.payload_size,
        released_at,
        wall_time,
        snapshot,
        cleanup,
    })
}
