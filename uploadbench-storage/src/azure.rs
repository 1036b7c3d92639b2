//! Azure Blob storage over HTTP, authenticated with Shared Key signatures.
//!
//! This works against Azure public cloud, Azure Stack deployments and local emulators. Requests are
//! signed as described in the [Shared Key] documentation: an HMAC-SHA256 over a canonical
//! representation of the request, keyed with the base64-decoded account key.
//!
//! [Shared Key]: https://learn.microsoft.com/en-us/rest/api/storageservices/authorize-with-shared-key

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use bytes::Bytes;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::header::AUTHORIZATION;
use reqwest::{Method, Response, StatusCode};
use sha2::Sha256;
use url::Url;

use crate::{ContainerStatus, Storage, StorageError, StorageResult, USER_AGENT};

type HmacSha256 = Hmac<Sha256>;

/// Error code returned with `409 Conflict` when creating a container that exists.
const CONTAINER_ALREADY_EXISTS: &str = "ContainerAlreadyExists";

/// Header carrying the service-specific error code.
const ERROR_CODE_HEADER: &str = "x-ms-error-code";

/// Connection parameters for [`AzureBlobStorage`].
#[derive(Clone)]
pub struct AzureConfig {
    /// Name of the storage account.
    pub account_name: String,
    /// Base64 encoded account key.
    pub access_key: String,
    /// Base address of the storage service, e.g. `core.windows.net`.
    ///
    /// The blob endpoint is derived as `{scheme}://{account}.blob.{base}`.
    pub base_service_url: String,
    /// Value of the `x-ms-version` header sent with every request.
    pub api_version: String,
    /// Whether the derived blob endpoint uses `https`.
    pub use_https: bool,
    /// Explicit blob endpoint, which takes precedence over the derived one.
    ///
    /// Useful for emulators that use path-style addressing, such as
    /// `http://127.0.0.1:10000/devstoreaccount1`.
    pub endpoint: Option<String>,
}

impl fmt::Debug for AzureConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureConfig")
            .field("account_name", &self.account_name)
            .field("access_key", &"[redacted]")
            .field("base_service_url", &self.base_service_url)
            .field("api_version", &self.api_version)
            .field("use_https", &self.use_https)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// A [`Storage`] talking to the Azure Blob REST API.
pub struct AzureBlobStorage {
    client: reqwest::Client,
    account: String,
    mac: HmacSha256,
    endpoint: Url,
    api_version: String,
}

impl AzureBlobStorage {
    /// Validates the configuration and prepares a client for the blob endpoint.
    ///
    /// This does not perform any network I/O. Malformed credentials or addresses are reported
    /// here, while an unreachable service only shows up with the first request.
    pub fn connect(config: AzureConfig) -> StorageResult<Self> {
        if config.account_name.is_empty() {
            return Err(StorageError::Config("account name must not be empty".into()));
        }

        let key = BASE64_STANDARD.decode(config.access_key.trim())?;
        let mac = HmacSha256::new_from_slice(&key)
            .map_err(|_| StorageError::Config("access key cannot be used for signing".into()))?;
        let endpoint = blob_endpoint(&config)?;

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|cause| StorageError::reqwest("failed to build HTTP client", cause))?;

        Ok(Self {
            client,
            account: config.account_name,
            mac,
            endpoint,
            api_version: config.api_version,
        })
    }

    /// The blob endpoint all requests are sent to.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn resource_url(&self, segments: &[&str]) -> Url {
        let mut url = self.endpoint.clone();
        // `blob_endpoint` guarantees a base URL, so this never fails.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn container_url(&self, container: &str, timeout: Duration) -> Url {
        let mut url = self.resource_url(&[container]);
        url.query_pairs_mut()
            .append_pair("restype", "container")
            .append_pair("timeout", &timeout.as_secs().max(1).to_string());
        url
    }

    fn sign(&self, string_to_sign: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(string_to_sign.as_bytes());
        BASE64_STANDARD.encode(mac.finalize().into_bytes())
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Bytes,
        ms_headers: &[(&str, &str)],
        timeout: Option<Duration>,
        context: &str,
    ) -> StorageResult<Response> {
        let mut headers = BTreeMap::new();
        headers.insert("x-ms-date".to_owned(), http_date());
        headers.insert("x-ms-version".to_owned(), self.api_version.clone());
        for (name, value) in ms_headers {
            headers.insert(name.to_ascii_lowercase(), (*value).to_owned());
        }

        let resource = canonicalized_resource(&self.account, &url);
        let string_to_sign = string_to_sign(method.as_str(), body.len(), &headers, &resource);
        let authorization = format!("SharedKey {}:{}", self.account, self.sign(&string_to_sign));

        let mut request = self
            .client
            .request(method, url)
            .header(AUTHORIZATION, authorization);
        for (name, value) in &headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        request
            .body(body)
            .send()
            .await
            .map_err(|cause| StorageError::reqwest(context, cause))
    }
}

impl fmt::Debug for AzureBlobStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureBlobStorage")
            .field("account", &self.account)
            .field("endpoint", &self.endpoint.as_str())
            .field("api_version", &self.api_version)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Storage for AzureBlobStorage {
    fn name(&self) -> &'static str {
        "azure-blob"
    }

    #[tracing::instrument(level = "trace", skip_all, fields(container))]
    async fn create_container(
        &self,
        container: &str,
        timeout: Duration,
    ) -> StorageResult<ContainerStatus> {
        let url = self.container_url(container, timeout);
        let response = self
            .send(
                Method::PUT,
                url,
                Bytes::new(),
                &[],
                Some(timeout),
                "failed to send create container request",
            )
            .await?;

        let status = response.status();
        let code = error_code(&response);
        if status.is_success() {
            return Ok(ContainerStatus::Created);
        }
        if status == StatusCode::CONFLICT && code.as_deref() == Some(CONTAINER_ALREADY_EXISTS) {
            return Ok(ContainerStatus::AlreadyExists);
        }

        Err(StorageError::Status {
            context: format!("failed to create container `{container}`"),
            status,
            code,
        })
    }

    #[tracing::instrument(level = "trace", skip_all, fields(container))]
    async fn delete_container(&self, container: &str, timeout: Duration) -> StorageResult<()> {
        let url = self.container_url(container, timeout);
        let response = self
            .send(
                Method::DELETE,
                url,
                Bytes::new(),
                &[],
                Some(timeout),
                "failed to send delete container request",
            )
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        Err(StorageError::Status {
            context: format!("failed to delete container `{container}`"),
            code: error_code(&response),
            status,
        })
    }

    #[tracing::instrument(level = "trace", skip_all, fields(container, object))]
    async fn create_object(
        &self,
        container: &str,
        object: &str,
        payload: Bytes,
    ) -> StorageResult<()> {
        let url = self.resource_url(&[container, object]);
        let response = self
            .send(
                Method::PUT,
                url,
                payload,
                &[("x-ms-blob-type", "BlockBlob")],
                None,
                "failed to send upload request",
            )
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        Err(StorageError::Status {
            context: format!("failed to upload `{object}`"),
            code: error_code(&response),
            status,
        })
    }
}

fn blob_endpoint(config: &AzureConfig) -> StorageResult<Url> {
    let address = match &config.endpoint {
        Some(endpoint) => endpoint.clone(),
        None => {
            let base = config
                .base_service_url
                .trim_start_matches("https://")
                .trim_start_matches("http://")
                .trim_matches('/');
            if base.is_empty() {
                return Err(StorageError::Config(
                    "base service address must not be empty".into(),
                ));
            }
            let scheme = if config.use_https { "https" } else { "http" };
            format!("{scheme}://{}.blob.{base}/", config.account_name)
        }
    };

    let mut url = match Url::parse(&address) {
        Ok(url) => url,
        Err(cause) => return Err(StorageError::InvalidAddress { address, cause }),
    };
    if url.cannot_be_a_base() {
        return Err(StorageError::Config(format!(
            "`{address}` cannot be used as a blob endpoint"
        )));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url.set_query(None);

    Ok(url)
}

fn error_code(response: &Response) -> Option<String> {
    response
        .headers()
        .get(ERROR_CODE_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}

/// Formats the current time as an RFC 1123 date, as required by `x-ms-date`.
fn http_date() -> String {
    Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Builds the canonicalized resource: `/{account}{path}` followed by one line per query
/// parameter, sorted by lowercase name.
fn canonicalized_resource(account: &str, url: &Url) -> String {
    let mut resource = format!("/{account}{}", url.path());

    let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in url.query_pairs() {
        params
            .entry(name.to_lowercase())
            .or_default()
            .push(value.into_owned());
    }
    for (name, mut values) in params {
        values.sort();
        resource.push('\n');
        resource.push_str(&name);
        resource.push(':');
        resource.push_str(&values.join(","));
    }

    resource
}

/// Builds the Shared Key string-to-sign.
///
/// `ms_headers` must contain lowercase `x-ms-*` header names. Standard headers other than
/// `Content-Length` are never sent by this client and are therefore empty. A zero content length
/// is signed as an empty string.
fn string_to_sign(
    method: &str,
    content_length: usize,
    ms_headers: &BTreeMap<String, String>,
    canonicalized_resource: &str,
) -> String {
    let content_length = match content_length {
        0 => String::new(),
        len => len.to_string(),
    };

    // VERB, Content-Encoding, Content-Language, Content-Length, Content-MD5, Content-Type, Date,
    // If-Modified-Since, If-Match, If-None-Match, If-Unmodified-Since, Range
    let mut signed = format!("{method}\n\n\n{content_length}\n\n\n\n\n\n\n\n\n");
    for (name, value) in ms_headers {
        signed.push_str(name);
        signed.push(':');
        signed.push_str(value.trim());
        signed.push('\n');
    }
    signed.push_str(canonicalized_resource);

    signed
}
