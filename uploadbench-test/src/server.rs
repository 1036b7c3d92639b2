//! Exposes an in-process blob service for use in integration tests.
//!
//! ```
//! use uploadbench_test::server::TestServer;
//!
//! #[tokio::main]
//! async fn main() {
//!    let server = TestServer::new().await;
//!    let endpoint = server.endpoint();
//!    // point the storage client at the endpoint...
//! }
//! ```

use std::collections::{HashMap, HashSet};
use std::net::{SocketAddr, TcpListener};
use std::sync::{Arc, Mutex, MutexGuard};

use axum::Router;
use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::put;
use bytes::Bytes;

/// The storage account served by [`TestServer`].
pub const ACCOUNT_NAME: &str = "devstoreaccount1";

/// A syntactically valid access key for [`ACCOUNT_NAME`].
///
/// Signatures are not verified, only the shape of the `Authorization` header is.
pub const ACCESS_KEY: &str = "dGVzdHNlcnZlcmtleQ==";

#[derive(Debug, Default)]
struct Blobs {
    /// Container name to blob name to blob size.
    containers: HashMap<String, HashMap<String, usize>>,
    /// Containers that reject creation because a deletion is still pending.
    deleting: HashSet<String>,
    failing_uploads: usize,
    uploads: usize,
    uploaded_bytes: usize,
}

#[derive(Debug, Default)]
struct ServerState {
    blobs: Mutex<Blobs>,
}

impl ServerState {
    fn blobs(&self) -> MutexGuard<'_, Blobs> {
        self.blobs.lock().unwrap()
    }
}

type SharedState = Arc<ServerState>;

/// An in-process fake of the Azure Blob REST API for use in integration tests.
///
/// Only the requests issued by the benchmark are supported: creating and deleting containers and
/// uploading block blobs. The server listens on a random available port on localhost and uses
/// path-style addressing, so the account name is not part of the URL.
#[derive(Debug)]
pub struct TestServer {
    handle: tokio::task::JoinHandle<()>,
    socket: SocketAddr,
    state: SharedState,
}

impl TestServer {
    pub async fn new() -> Self {
        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let listener = TcpListener::bind(addr).unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();

        let state = SharedState::default();
        let app = Router::new()
            .route(
                "/{container}",
                put(create_container).delete(delete_container),
            )
            .route("/{container}/{*blob}", put(put_blob))
            .layer(DefaultBodyLimit::disable())
            .with_state(state.clone());

        let handle = tokio::spawn(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            handle,
            socket,
            state,
        }
    }

    /// Returns the blob endpoint of the server.
    pub fn endpoint(&self) -> String {
        format!("http://{}/", self.socket)
    }

    /// Makes the next `count` uploads fail with `500 Internal Server Error`.
    pub fn fail_next_uploads(&self, count: usize) {
        self.state.blobs().failing_uploads = count;
    }

    /// Creates a container as if it had been left over from an earlier run.
    pub fn create_container(&self, container: &str) {
        self.state
            .blobs()
            .containers
            .entry(container.to_owned())
            .or_default();
    }

    /// Rejects creation of `container` with `409 ContainerBeingDeleted`, as the service does
    /// right after a container of the same name was deleted.
    pub fn mark_being_deleted(&self, container: &str) {
        self.state.blobs().deleting.insert(container.to_owned());
    }

    /// Returns whether the container currently exists.
    pub fn has_container(&self, container: &str) -> bool {
        self.state.blobs().containers.contains_key(container)
    }

    /// Returns the number of uploads that were accepted.
    pub fn upload_count(&self) -> usize {
        self.state.blobs().uploads
    }

    /// Returns the total size of all accepted uploads.
    pub fn uploaded_bytes(&self) -> usize {
        self.state.blobs().uploaded_bytes
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn error(status: StatusCode, code: &'static str) -> Response {
    (status, [("x-ms-error-code", code)], code).into_response()
}

fn authenticate(headers: &HeaderMap) -> Result<(), Response> {
    let prefix = format!("SharedKey {ACCOUNT_NAME}:");
    let signed = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix(&prefix))
        .is_some_and(|signature| !signature.is_empty());

    if signed && headers.contains_key("x-ms-date") && headers.contains_key("x-ms-version") {
        Ok(())
    } else {
        Err(error(StatusCode::FORBIDDEN, "AuthenticationFailed"))
    }
}

fn is_container_request(query: &HashMap<String, String>) -> bool {
    query.get("restype").map(String::as_str) == Some("container")
}

async fn create_container(
    State(state): State<SharedState>,
    Path(container): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if let Err(response) = authenticate(&headers) {
        return response;
    }
    if !is_container_request(&query) {
        return error(StatusCode::BAD_REQUEST, "InvalidQueryParameterValue");
    }

    let mut blobs = state.blobs();
    if blobs.deleting.contains(&container) {
        return error(StatusCode::CONFLICT, "ContainerBeingDeleted");
    }
    if blobs.containers.contains_key(&container) {
        return error(StatusCode::CONFLICT, "ContainerAlreadyExists");
    }
    blobs.containers.insert(container, HashMap::new());
    StatusCode::CREATED.into_response()
}

async fn delete_container(
    State(state): State<SharedState>,
    Path(container): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if let Err(response) = authenticate(&headers) {
        return response;
    }
    if !is_container_request(&query) {
        return error(StatusCode::BAD_REQUEST, "InvalidQueryParameterValue");
    }

    match state.blobs().containers.remove(&container) {
        Some(_) => StatusCode::ACCEPTED.into_response(),
        None => error(StatusCode::NOT_FOUND, "ContainerNotFound"),
    }
}

async fn put_blob(
    State(state): State<SharedState>,
    Path((container, blob)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(response) = authenticate(&headers) {
        return response;
    }
    let block_blob = headers
        .get("x-ms-blob-type")
        .is_some_and(|value| value == "BlockBlob");
    if !block_blob {
        return error(StatusCode::BAD_REQUEST, "MissingRequiredHeader");
    }

    let mut blobs = state.blobs();
    if blobs.failing_uploads > 0 {
        blobs.failing_uploads -= 1;
        return error(StatusCode::INTERNAL_SERVER_ERROR, "InternalError");
    }
    let Some(stored) = blobs.containers.get_mut(&container) else {
        return error(StatusCode::NOT_FOUND, "ContainerNotFound");
    };
    stored.insert(blob, body.len());
    blobs.uploads += 1;
    blobs.uploaded_bytes += body.len();
    StatusCode::CREATED.into_response()
}
