use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

/// Errors returned by [`Storage`](crate::Storage) implementations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The storage configuration is incomplete or malformed.
    #[error("invalid storage configuration: {0}")]
    Config(String),

    /// The access key is not valid base64.
    #[error("invalid access key")]
    InvalidAccessKey(#[from] base64::DecodeError),

    /// The service address could not be turned into a URL.
    #[error("invalid service address `{address}`")]
    InvalidAddress {
        /// The address as configured.
        address: String,
        /// The reason the address could not be parsed.
        #[source]
        cause: url::ParseError,
    },

    /// Errors stemming from the reqwest client.
    ///
    /// These are network errors encountered while sending the request or reading the response.
    #[error("reqwest error: {context}")]
    Reqwest {
        /// The operation that failed.
        context: String,
        /// The underlying client error.
        #[source]
        cause: reqwest::Error,
    },

    /// The service answered with an unexpected status.
    #[error("{context}: service responded with {status} ({})", .code.as_deref().unwrap_or("no error code"))]
    Status {
        /// The operation that failed.
        context: String,
        /// The HTTP status of the response.
        status: StatusCode,
        /// The service-specific error code, if the response carried one.
        code: Option<String>,
    },

    /// The operation did not finish within its deadline.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Any other error, which might be specific to a storage implementation.
    #[error("storage error: {context}")]
    Generic {
        /// The operation that failed.
        context: String,
        /// The underlying error.
        #[source]
        cause: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl StorageError {
    pub(crate) fn reqwest(context: impl Into<String>, cause: reqwest::Error) -> Self {
        Self::Reqwest {
            context: context.into(),
            cause,
        }
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
