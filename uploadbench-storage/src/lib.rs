//! Storage collaborators for the upload benchmark.
//!
//! The benchmark only depends on four operations of an object storage service: connecting,
//! creating and deleting a container, and creating an object inside a container. This crate
//! defines those operations as the [`Storage`] trait and ships two implementations:
//!
//! - [`AzureBlobStorage`] talks to an Azure Blob (or Azure Stack, or emulator) endpoint over HTTP,
//!   authenticating every request with a Shared Key signature.
//! - [`InMemoryStorage`] keeps everything in process memory and can be scripted with latencies and
//!   failures. It is used by tests.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

use std::fmt::Debug;
use std::time::Duration;

use bytes::Bytes;

pub mod azure;
mod error;
pub mod in_memory;

pub use azure::{AzureBlobStorage, AzureConfig};
pub use error::{StorageError, StorageResult};
pub use in_memory::InMemoryStorage;

/// User agent string used for outgoing requests.
pub const USER_AGENT: &str = concat!("uploadbench/", env!("CARGO_PKG_VERSION"));

/// A type-erased [`Storage`] instance.
pub type BoxedStorage = Box<dyn Storage>;

/// Outcome of a successful container creation request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ContainerStatus {
    /// The container did not exist and was created by this request.
    Created,
    /// A container with the same name already existed.
    AlreadyExists,
}

/// The operations the benchmark performs against an object storage service.
#[async_trait::async_trait]
pub trait Storage: Debug + Send + Sync + 'static {
    /// The storage name, used for diagnostics.
    fn name(&self) -> &'static str;

    /// Creates a container with the given name.
    ///
    /// A container that already exists is not an error; it is reported as
    /// [`ContainerStatus::AlreadyExists`].
    async fn create_container(
        &self,
        container: &str,
        timeout: Duration,
    ) -> StorageResult<ContainerStatus>;

    /// Deletes the container with the given name, including all objects in it.
    async fn delete_container(&self, container: &str, timeout: Duration) -> StorageResult<()>;

    /// Uploads `payload` as a new object named `object` inside `container`.
    async fn create_object(&self, container: &str, object: &str, payload: Bytes)
    -> StorageResult<()>;
}
