//! Error taxonomy.
//!
//! [`FetchError`] is the only failure the query layer produces. It is `Clone`
//! because a single in-flight fetch hands the same outcome to every caller
//! attached to it.

use thiserror::Error;

/// Failure of an underlying data fetch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The request never produced a response (connect, timeout, DNS).
    #[error("transport error: {0}")]
    Transport(String),

    /// The server answered with a non-success status.
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// The response body could not be decoded into the expected type.
    #[error("decode error: {0}")]
    Decode(String),

    /// A value cached under this key has a different type than requested.
    #[error("cached value for {key} has an unexpected type")]
    TypeMismatch { key: String },

    /// The fetch task panicked or was cancelled before completing.
    #[error("fetch aborted: {0}")]
    Aborted(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            FetchError::Server {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else if e.is_decode() {
            FetchError::Decode(e.to_string())
        } else {
            FetchError::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(e: serde_json::Error) -> Self {
        FetchError::Decode(e.to_string())
    }
}

/// Failure while navigating to a route.
#[derive(Error, Debug, Clone)]
pub enum RouteError {
    #[error("no route registered for {0}")]
    NotFound(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("loader data could not be serialized: {0}")]
    Serialize(String),
}

pub type FetchResult<T> = std::result::Result<T, FetchError>;
