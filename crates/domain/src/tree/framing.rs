//! Newline framing over a chunked byte stream.
//!
//! Chunks may end anywhere, including inside a line or inside a multi-byte
//! character. Framing works on bytes: `\n` never occurs inside a UTF-8
//! sequence, so every complete line is decodable on its own.

/// Accumulates chunks and yields complete lines.
#[derive(Debug, Default)]
pub struct LineFramer {
    buffer: Vec<u8>,
    bytes: usize,
}

impl LineFramer {
    /// Creates an empty framer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk and drains every line it completes.
    ///
    /// Lines are returned without their terminator (`\n` or `\r\n`); blank
    /// lines are dropped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.bytes += chunk.len();
        self.buffer.extend_from_slice(chunk);

        let Some(last) = self.buffer.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };
        let rest = self.buffer.split_off(last + 1);
        let complete = std::mem::replace(&mut self.buffer, rest);
        complete.split(|&b| b == b'\n').filter_map(decode).collect()
    }

    /// Drains the trailing unterminated line, if any.
    pub fn finish(&mut self) -> Option<String> {
        decode(&std::mem::take(&mut self.buffer))
    }

    /// Bytes of the current partial line.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Total bytes pushed so far.
    #[must_use]
    pub const fn bytes(&self) -> usize {
        self.bytes
    }
}

fn decode(line: &[u8]) -> Option<String> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    if line.iter().all(u8::is_ascii_whitespace) {
        return None;
    }
    Some(String::from_utf8_lossy(line).into_owned())
}
