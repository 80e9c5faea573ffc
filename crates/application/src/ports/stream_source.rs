//! Response stream ports
//!
//! A [`StreamFetcher`] opens a request and hands back a [`ChunkReader`] over
//! the response body; the body is consumed chunk by chunk.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::ApplicationError;

/// Errors raised while opening or reading a response stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// The request could not be built.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The request failed before a response arrived.
    #[error("Request failed: {0}")]
    Request(String),

    /// The backend answered with a status outside the expected set.
    #[error("Unexpected HTTP response code {0} from API")]
    UnexpectedStatus(u16),

    /// The request or a read exceeded the timeout.
    #[error("Request timed out after {timeout_ms}ms")]
    Timeout {
        /// The timeout that was exceeded.
        timeout_ms: u64,
    },

    /// Reading the body failed.
    #[error("Stream read failed: {0}")]
    Read(String),
}

impl From<StreamError> for ApplicationError {
    fn from(error: StreamError) -> Self {
        match error {
            StreamError::UnexpectedStatus(status) => Self::UnexpectedStatus(status),
            StreamError::Timeout { .. } => Self::Timeout,
            other => Self::Http(other.to_string()),
        }
    }
}

/// A request whose response body is a command stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRequest {
    /// HTTP method.
    pub method: String,
    /// Absolute URL.
    pub url: String,
    /// Query parameters appended to the URL.
    #[serde(default)]
    pub query: Vec<(String, String)>,
    /// Extra headers.
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    /// Request body.
    #[serde(default)]
    pub body: Option<String>,
    /// Accepted response codes.
    pub expected_status: Vec<u16>,
    /// Timeout of the whole exchange.
    pub timeout: Duration,
}

/// A chunked byte stream.
#[async_trait]
pub trait ChunkReader: Send {
    /// Reads the next chunk; `None` once the stream is exhausted.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying transport fails.
    async fn read(&mut self) -> Result<Option<Vec<u8>>, StreamError>;
}

/// Opens response streams.
#[async_trait]
pub trait StreamFetcher: Send + Sync {
    /// Sends `request` and returns a reader over the response body.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response status is not
    /// expected.
    async fn open(&self, request: &StreamRequest) -> Result<Box<dyn ChunkReader>, StreamError>;
}
