//! Errors that abort a benchmark run.

use bytesize::ByteSize;
use thiserror::Error;
use uploadbench_storage::StorageError;

/// Errors that abort a benchmark run before any result is produced.
///
/// Failures of individual uploads and of the final cleanup are not represented here. They are
/// folded into the [`BenchmarkReport`](crate::BenchmarkReport) instead.
#[derive(Debug, Error)]
pub enum BenchmarkError {
    /// The requested payload exceeds [`MAX_PAYLOAD_SIZE`](crate::payload::MAX_PAYLOAD_SIZE).
    #[error("payload size {requested} exceeds the maximum of {max}")]
    PayloadTooLarge { requested: ByteSize, max: ByteSize },

    /// More workers were requested than the completion tracker can account for.
    #[error("worker count {requested} exceeds the maximum of {max}")]
    TooManyWorkers { requested: usize, max: usize },

    /// The storage client could not be set up.
    #[error("cannot connect to storage")]
    Connect(#[source] StorageError),

    /// The benchmark container could not be created.
    #[error("cannot create container `{container}`")]
    CreateContainer {
        container: String,
        #[source]
        cause: StorageError,
    },
}

/// Result type for benchmark runs.
pub type Result<T, E = BenchmarkError> = std::result::Result<T, E>;
