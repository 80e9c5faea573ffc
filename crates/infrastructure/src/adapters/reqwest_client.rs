//! Streaming HTTP fetcher using reqwest.
//!
//! This adapter implements the `StreamFetcher` port. The response body is
//! not buffered: the returned reader yields chunks as they arrive.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, Response, Url};
use tracing::debug;

use apixt_application::ports::{ChunkReader, StreamError, StreamFetcher, StreamRequest};

/// Stream fetcher backed by `reqwest::Client`.
pub struct ReqwestStreamFetcher {
    client: Client,
}

impl ReqwestStreamFetcher {
    /// Creates a fetcher with default settings.
    ///
    /// Default configuration:
    /// - Follow redirects: up to 10
    /// - TLS verification: enabled
    /// - User-Agent: "Apixt/<version>"
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be created.
    pub fn new() -> Result<Self, StreamError> {
        let client = Client::builder()
            .user_agent(concat!("Apixt/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| StreamError::Request(e.to_string()))?;

        Ok(Self { client })
    }

    /// Creates a fetcher over a custom reqwest client.
    #[must_use]
    pub const fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn method(request: &StreamRequest) -> Result<Method, StreamError> {
        Method::from_bytes(request.method.to_uppercase().as_bytes())
            .map_err(|_| StreamError::InvalidRequest(format!("invalid method: {}", request.method)))
    }

    /// The request URL with its query parameters appended.
    fn url(request: &StreamRequest) -> Result<Url, StreamError> {
        let mut url = Url::parse(&request.url)
            .map_err(|e| StreamError::InvalidRequest(format!("{e}: {}", request.url)))?;
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&request.query);
        }
        Ok(url)
    }

    /// Maps reqwest errors to stream errors.
    fn map_error(error: &reqwest::Error, timeout: Duration) -> StreamError {
        if error.is_timeout() {
            return StreamError::Timeout {
                timeout_ms: millis(timeout),
            };
        }
        if error.is_body() || error.is_decode() {
            return StreamError::Read(error.to_string());
        }
        StreamError::Request(error.to_string())
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[async_trait]
impl StreamFetcher for ReqwestStreamFetcher {
    async fn open(&self, request: &StreamRequest) -> Result<Box<dyn ChunkReader>, StreamError> {
        let url = Self::url(request)?;

        let mut builder = self
            .client
            .request(Self::method(request)?, url)
            .timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            let has_content_type = request
                .headers
                .iter()
                .any(|(name, _)| name.eq_ignore_ascii_case("content-type"));
            if !has_content_type && serde_json::from_str::<serde_json::Value>(body).is_ok() {
                builder = builder.header("Content-Type", "application/json");
            }
            builder = builder.body(body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Self::map_error(&e, request.timeout))?;

        let status = response.status().as_u16();
        debug!(status, url = %request.url, "response received");
        if !request.expected_status.contains(&status) {
            return Err(StreamError::UnexpectedStatus(status));
        }

        Ok(Box::new(ReqwestChunkReader {
            response,
            timeout: request.timeout,
        }))
    }
}

/// Reads a response body chunk by chunk.
pub struct ReqwestChunkReader {
    response: Response,
    timeout: Duration,
}

#[async_trait]
impl ChunkReader for ReqwestChunkReader {
    async fn read(&mut self) -> Result<Option<Vec<u8>>, StreamError> {
        let chunk = self
            .response
            .chunk()
            .await
            .map_err(|e| ReqwestStreamFetcher::map_error(&e, self.timeout))?;
        Ok(chunk.map(|bytes| bytes.to_vec()))
    }
}
