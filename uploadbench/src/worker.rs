//! A single benchmark worker.
//!
//! Every worker goes through the same states: it is spawned, waits on the [`ReleaseGate`], runs
//! one timed upload and reports the outcome to the [`ResultAggregator`]. Its
//! [`CompletionTicket`] is returned when [`run`] exits, no matter how it exits. There are no
//! retries; a failed upload is recorded and the worker ends.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::FutureExt;
use thiserror::Error;
use tokio::time::Instant;
use uploadbench_storage::{Storage, StorageError};

use crate::aggregator::ResultAggregator;
use crate::completion::CompletionTicket;
use crate::release::ReleaseGate;

/// Identity of a single worker.
#[derive(Clone, Debug)]
pub struct WorkItem {
    /// One-based index of the worker within the run.
    pub index: usize,
    /// The container shared by all workers of the run.
    pub container: Arc<str>,
    /// The unique name of the object this worker uploads.
    pub object: String,
}

/// Resources shared by all workers of a run.
#[derive(Clone, Debug)]
pub struct WorkerContext {
    /// The storage receiving the uploads.
    pub storage: Arc<dyn Storage>,
    /// The payload uploaded by every worker. Never mutated.
    pub payload: Bytes,
    /// Where workers report their outcome.
    pub aggregator: Arc<ResultAggregator>,
    /// Optional deadline for a single upload.
    pub upload_timeout: Option<Duration>,
}

#[derive(Debug, Error)]
enum UploadError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("upload panicked: {0}")]
    Panicked(String),
}

/// Runs a worker to completion.
///
/// The gate is the only suspension point before the timed region. The aggregator is updated
/// exactly once, and `ticket` is returned afterwards.
pub async fn run(
    item: WorkItem,
    context: WorkerContext,
    mut gate: ReleaseGate,
    ticket: CompletionTicket,
) {
    let _ticket = ticket;

    if let Err(error) = gate.wait().await {
        tracing::warn!(
            worker = item.index,
            error = &error as &dyn std::error::Error,
            "worker never released, not uploading {}",
            item.object,
        );
        context.aggregator.record_failure();
        return;
    }

    tracing::info!(
        worker = item.index,
        "Start uploading {} into {}",
        item.object,
        item.container
    );

    let start = Instant::now();
    let result = upload(&item, &context).await;
    let elapsed = start.elapsed();

    match result {
        Ok(()) => {
            context.aggregator.record_success(elapsed);
            tracing::info!(
                worker = item.index,
                ?elapsed,
                "Finished uploading {} successfully",
                item.object
            );
        }
        Err(error) => {
            context.aggregator.record_failure();
            tracing::error!(
                worker = item.index,
                ?elapsed,
                error = &error as &dyn std::error::Error,
                "Error uploading {}",
                item.object
            );
        }
    }
}

async fn upload(item: &WorkItem, context: &WorkerContext) -> Result<(), UploadError> {
    let request = async {
        let upload =
            context
                .storage
                .create_object(&item.container, &item.object, context.payload.clone());
        match context.upload_timeout {
            Some(deadline) => tokio::time::timeout(deadline, upload)
                .await
                .unwrap_or(Err(StorageError::Timeout(deadline))),
            None => upload.await,
        }
    };

    match AssertUnwindSafe(request).catch_unwind().await {
        Ok(result) => Ok(result?),
        Err(panic) => Err(UploadError::Panicked(panic_message(panic.as_ref()))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use uploadbench_storage::in_memory::ScriptedUpload;
    use uploadbench_storage::{ContainerStatus, InMemoryStorage, StorageResult};

    use crate::completion::CompletionTracker;
    use crate::release::ReleaseSignal;

    use super::*;

    const CONTAINER: &str = "benchcontainer";

    fn item(index: usize) -> WorkItem {
        WorkItem {
            index,
            container: CONTAINER.into(),
            object: format!("object{index}"),
        }
    }

    fn context(storage: impl Storage, upload_timeout: Option<Duration>) -> WorkerContext {
        WorkerContext {
            storage: Arc::new(storage),
            payload: Bytes::from_static(b"payload"),
            aggregator: Arc::new(ResultAggregator::new()),
            upload_timeout,
        }
    }

    #[tokio::test]
    async fn waits_for_release() {
        let storage = InMemoryStorage::new().with_container(CONTAINER);
        let context = context(storage.clone(), None);
        let signal = ReleaseSignal::new();
        let tracker = CompletionTracker::new(1).unwrap();

        let worker = tokio::spawn(run(
            item(1),
            context.clone(),
            signal.gate(),
            tracker.ticket().unwrap(),
        ));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(storage.upload_calls().is_empty());
        assert_eq!(tracker.outstanding(), 1);

        signal.open();
        worker.await.unwrap();

        assert_eq!(tracker.outstanding(), 0);
        assert_eq!(storage.object_count(CONTAINER), 1);
        assert_eq!(storage.upload_calls()[0].size, context.payload.len());
        assert_eq!(context.aggregator.snapshot().successful, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn measures_upload_duration() {
        let storage = InMemoryStorage::new()
            .with_container(CONTAINER)
            .script_uploads([ScriptedUpload::success(Duration::from_millis(40))]);
        let context = context(storage, None);
        let signal = ReleaseSignal::new();
        let tracker = CompletionTracker::new(1).unwrap();
        let gate = signal.gate();
        signal.open();

        run(item(1), context.clone(), gate, tracker.ticket().unwrap()).await;

        let snapshot = context.aggregator.snapshot();
        assert_eq!(snapshot.successful, 1);
        assert!(snapshot.total_duration >= Duration::from_millis(40));
        assert!(snapshot.total_duration < Duration::from_millis(45));
    }

    #[tokio::test]
    async fn failed_upload_is_recorded_once() {
        let storage = InMemoryStorage::new()
            .with_container(CONTAINER)
            .script_uploads([ScriptedUpload::failure(Duration::ZERO)]);
        let context = context(storage.clone(), None);
        let signal = ReleaseSignal::new();
        let tracker = CompletionTracker::new(1).unwrap();
        let gate = signal.gate();
        signal.open();

        run(item(1), context.clone(), gate, tracker.ticket().unwrap()).await;

        let snapshot = context.aggregator.snapshot();
        assert_eq!((snapshot.successful, snapshot.failed), (0, 1));
        assert_eq!(snapshot.total_duration, Duration::ZERO);
        assert_eq!(storage.upload_calls().len(), 1);
        assert_eq!(tracker.outstanding(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_upload_hits_deadline() {
        let storage = InMemoryStorage::new()
            .with_container(CONTAINER)
            .script_uploads([ScriptedUpload::success(Duration::from_secs(10))]);
        let context = context(storage, Some(Duration::from_millis(100)));
        let signal = ReleaseSignal::new();
        let tracker = CompletionTracker::new(1).unwrap();
        let gate = signal.gate();
        signal.open();

        run(item(1), context.clone(), gate, tracker.ticket().unwrap()).await;

        let snapshot = context.aggregator.snapshot();
        assert_eq!((snapshot.successful, snapshot.failed), (0, 1));
    }

    #[derive(Debug)]
    struct PanickingStorage;

    #[async_trait::async_trait]
    impl Storage for PanickingStorage {
        fn name(&self) -> &'static str {
            "panicking"
        }

        async fn create_container(&self, _: &str, _: Duration) -> StorageResult<ContainerStatus> {
            Ok(ContainerStatus::Created)
        }

        async fn delete_container(&self, _: &str, _: Duration) -> StorageResult<()> {
            Ok(())
        }

        async fn create_object(&self, _: &str, _: &str, _: Bytes) -> StorageResult<()> {
            panic!("connection pool exploded");
        }
    }

    #[tokio::test]
    async fn panicking_upload_counts_as_failure() {
        let context = context(PanickingStorage, None);
        let signal = ReleaseSignal::new();
        let tracker = CompletionTracker::new(1).unwrap();
        let gate = signal.gate();
        signal.open();

        run(item(1), context.clone(), gate, tracker.ticket().unwrap()).await;

        assert_eq!(context.aggregator.snapshot().failed, 1);
        assert_eq!(tracker.outstanding(), 0);
    }

    #[tokio::test]
    async fn abandoned_worker_does_not_upload() {
        let storage = InMemoryStorage::new().with_container(CONTAINER);
        let context = context(storage.clone(), None);
        let signal = ReleaseSignal::new();
        let tracker = CompletionTracker::new(1).unwrap();
        let gate = signal.gate();
        drop(signal);

        run(item(1), context.clone(), gate, tracker.ticket().unwrap()).await;

        assert!(storage.upload_calls().is_empty());
        assert_eq!(context.aggregator.snapshot().failed, 1);
        assert_eq!(tracker.outstanding(), 0);
    }

    #[test]
    fn panic_messages() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42_u32), "unknown panic payload");
    }
}
