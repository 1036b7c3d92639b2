//! In-memory storage for tests.
//!
//! [`InMemoryStorage`] keeps containers and objects in a `HashMap` and can be scripted to simulate
//! upload latency and failures. The storage is [`Clone`], so tests can hold a handle for direct
//! inspection while the benchmark owns a boxed copy.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use reqwest::StatusCode;
use tokio::time::Instant;

use crate::{ContainerStatus, Storage, StorageError, StorageResult};

type Objects = HashMap<String, Bytes>;

/// Simulated outcome of a single `create_object` call.
#[derive(Clone, Copy, Debug)]
pub struct ScriptedUpload {
    latency: Duration,
    succeed: bool,
}

impl ScriptedUpload {
    /// An upload that succeeds after `latency`.
    pub fn success(latency: Duration) -> Self {
        Self {
            latency,
            succeed: true,
        }
    }

    /// An upload that fails after `latency`.
    pub fn failure(latency: Duration) -> Self {
        Self {
            latency,
            succeed: false,
        }
    }
}

/// A `create_object` call observed by [`InMemoryStorage`].
#[derive(Clone, Debug)]
pub struct UploadCall {
    /// The target container.
    pub container: String,
    /// The object name.
    pub object: String,
    /// Size of the uploaded payload in bytes.
    pub size: usize,
    /// When the call reached the storage.
    pub started: Instant,
}

#[derive(Debug, Default)]
struct State {
    containers: HashMap<String, Objects>,
    script: VecDeque<ScriptedUpload>,
    calls: Vec<UploadCall>,
    fail_create_container: bool,
    fail_delete_container: bool,
}

/// A scriptable [`Storage`] backed by process memory.
///
/// Uploads succeed immediately unless a script was installed with
/// [`script_uploads`](Self::script_uploads). Scripted outcomes are consumed in call order.
#[derive(Clone, Debug, Default)]
pub struct InMemoryStorage {
    state: Arc<Mutex<State>>,
}

impl InMemoryStorage {
    /// Creates an empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an existing, empty container.
    pub fn with_container(self, container: &str) -> Self {
        self.state()
            .containers
            .entry(container.to_owned())
            .or_default();
        self
    }

    /// Queues simulated outcomes for upcoming uploads.
    pub fn script_uploads(self, uploads: impl IntoIterator<Item = ScriptedUpload>) -> Self {
        self.state().script.extend(uploads);
        self
    }

    /// Makes every container creation fail.
    pub fn fail_container_creation(self) -> Self {
        self.state().fail_create_container = true;
        self
    }

    /// Makes every container deletion fail.
    pub fn fail_container_deletion(self) -> Self {
        self.state().fail_delete_container = true;
        self
    }

    /// Returns all `create_object` calls received so far.
    pub fn upload_calls(&self) -> Vec<UploadCall> {
        self.state().calls.clone()
    }

    /// Returns `true` if the container exists.
    pub fn contains_container(&self, container: &str) -> bool {
        self.state().containers.contains_key(container)
    }

    /// Returns the number of objects stored in the container.
    pub fn object_count(&self, container: &str) -> usize {
        self.state()
            .containers
            .get(container)
            .map_or(0, HashMap::len)
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn injected(context: &str) -> StorageError {
    StorageError::Generic {
        context: context.to_owned(),
        cause: "injected failure".into(),
    }
}

#[async_trait::async_trait]
impl Storage for InMemoryStorage {
    fn name(&self) -> &'static str {
        "in-memory"
    }

    async fn create_container(
        &self,
        container: &str,
        _timeout: Duration,
    ) -> StorageResult<ContainerStatus> {
        let mut state = self.state();
        if state.fail_create_container {
            return Err(injected("failed to create container"));
        }
        if state.containers.contains_key(container) {
            return Ok(ContainerStatus::AlreadyExists);
        }
        state.containers.insert(container.to_owned(), Objects::new());
        Ok(ContainerStatus::Created)
    }

    async fn delete_container(&self, container: &str, _timeout: Duration) -> StorageResult<()> {
        let mut state = self.state();
        if state.fail_delete_container {
            return Err(injected("failed to delete container"));
        }
        match state.containers.remove(container) {
            Some(_) => Ok(()),
            None => Err(StorageError::Status {
                context: format!("failed to delete container `{container}`"),
                status: StatusCode::NOT_FOUND,
                code: Some("ContainerNotFound".into()),
            }),
        }
    }

    async fn create_object(
        &self,
        container: &str,
        object: &str,
        payload: Bytes,
    ) -> StorageResult<()> {
        let scripted = {
            let mut state = self.state();
            state.calls.push(UploadCall {
                container: container.to_owned(),
                object: object.to_owned(),
                size: payload.len(),
                started: Instant::now(),
            });
            state
                .script
                .pop_front()
                .unwrap_or(ScriptedUpload::success(Duration::ZERO))
        };

        if !scripted.latency.is_zero() {
            tokio::time::sleep(scripted.latency).await;
        }
        if !scripted.succeed {
            return Err(injected("failed to upload object"));
        }

        let mut state = self.state();
        let Some(objects) = state.containers.get_mut(container) else {
            return Err(StorageError::Status {
                context: format!("failed to upload `{object}`"),
                status: StatusCode::NOT_FOUND,
                code: Some("ContainerNotFound".into()),
            });
        };
        objects.insert(object.to_owned(), payload);
        Ok(())
    }
}
