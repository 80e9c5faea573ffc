//! Recorded stream replay.
//!
//! Serves a scripted command stream without a backend, one line per read,
//! optionally spaced by an interval so a renderer sees the tree grow.

use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::fs;
use tracing::debug;

use apixt_application::ports::{ChunkReader, StreamError, StreamFetcher, StreamRequest};

/// A scripted stream of lines.
#[derive(Debug, Clone, Default)]
pub struct ReplayReader {
    lines: VecDeque<String>,
    interval: Duration,
    started: bool,
}

impl ReplayReader {
    /// Creates a reader serving `lines` as they are.
    pub fn new(lines: impl IntoIterator<Item = String>) -> Self {
        Self {
            lines: lines.into_iter().collect(),
            interval: Duration::ZERO,
            started: false,
        }
    }

    /// Creates a reader from JSON values: strings are served raw, anything
    /// else as its compact JSON text.
    #[must_use]
    pub fn from_values(values: &[Value]) -> Self {
        Self::new(values.iter().map(|value| match value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        }))
    }

    /// Parses a recording: a JSON array of values, or one line per entry.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        if text.trim_start().starts_with('[')
            && let Ok(Value::Array(values)) = serde_json::from_str(text)
        {
            return Self::from_values(&values);
        }
        Self::new(
            text.lines()
                .filter(|line| !line.trim().is_empty())
                .map(str::to_string),
        )
    }

    /// Loads a recording from `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub async fn load(path: &Path) -> std::io::Result<Self> {
        let text = fs::read_to_string(path).await?;
        let reader = Self::parse(&text);
        debug!(path = %path.display(), lines = reader.remaining(), "recording loaded");
        Ok(reader)
    }

    /// Waits `interval` before every line but the first.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Lines not served yet.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.lines.len()
    }
}

#[async_trait]
impl ChunkReader for ReplayReader {
    async fn read(&mut self) -> Result<Option<Vec<u8>>, StreamError> {
        let Some(mut line) = self.lines.pop_front() else {
            return Ok(None);
        };
        if self.started && !self.interval.is_zero() {
            tokio::time::sleep(self.interval).await;
        }
        self.started = true;
        line.push('\n');
        Ok(Some(line.into_bytes()))
    }
}

/// Answers every request with the same recording.
#[derive(Debug, Clone)]
pub struct ReplayFetcher {
    recording: ReplayReader,
}

impl ReplayFetcher {
    /// Creates a fetcher replaying `recording`.
    #[must_use]
    pub const fn new(recording: ReplayReader) -> Self {
        Self { recording }
    }
}

#[async_trait]
impl StreamFetcher for ReplayFetcher {
    async fn open(&self, request: &StreamRequest) -> Result<Box<dyn ChunkReader>, StreamError> {
        debug!(url = %request.url, lines = self.recording.remaining(), "replaying recording");
        Ok(Box::new(self.recording.clone()))
    }
}
