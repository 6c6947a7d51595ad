use bytes::Bytes;

/// Initial scanner capacity; large `data:` payloads grow the buffer up
/// to [`MAX_LINE_BYTES`].
pub const INITIAL_BUF_BYTES: usize = 64 * 1024;
/// Hard ceiling for a single SSE line.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum SseError {
    #[error("sse line exceeds {MAX_LINE_BYTES} bytes")]
    LineTooLong,
}

/// What one SSE line means to the proxy pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseLine {
    Blank,
    /// JSON payload of a `data:` line (the `[DONE]` sentinel excluded).
    Data(String),
    Done,
    /// `event:`, `id:`, `retry:` and comment lines, passed through verbatim.
    Other(String),
}

impl SseLine {
    fn classify(line: String) -> Self {
        if line.trim().is_empty() {
            return SseLine::Blank;
        }
        // The space after the field name is optional in event streams.
        if let Some(payload) = line.strip_prefix("data:") {
            let payload = payload.strip_prefix(' ').unwrap_or(payload);
            if payload == "[DONE]" {
                return SseLine::Done;
            }
            return SseLine::Data(payload.to_string());
        }
        SseLine::Other(line)
    }
}

/// Incremental line scanner over an SSE byte stream.
///
/// The upstream contract guarantees `data:` payloads contain no raw
/// newlines, so plain `\n` splitting is frame-accurate.
#[derive(Debug)]
pub struct SseScanner {
    buffer: String,
}

impl Default for SseScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl SseScanner {
    pub fn new() -> Self {
        Self {
            buffer: String::with_capacity(INITIAL_BUF_BYTES),
        }
    }

    pub fn push_bytes(&mut self, chunk: &Bytes) -> Result<Vec<SseLine>, SseError> {
        match std::str::from_utf8(chunk) {
            Ok(text) => self.push_str(text),
            // Non-UTF-8 noise is dropped rather than aborting the stream.
            Err(_) => Ok(Vec::new()),
        }
    }

    pub fn push_str(&mut self, chunk: &str) -> Result<Vec<SseLine>, SseError> {
        self.buffer.push_str(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let mut line = self.buffer[..pos].to_string();
            self.buffer.drain(..=pos);
            if line.ends_with('\r') {
                line.pop();
            }
            lines.push(SseLine::classify(line));
        }

        if self.buffer.len() > MAX_LINE_BYTES {
            return Err(SseError::LineTooLong);
        }
        Ok(lines)
    }

    /// Flush a trailing line without a terminator at stream end.
    pub fn finish(&mut self) -> Option<SseLine> {
        if self.buffer.is_empty() {
            return None;
        }
        let mut line = std::mem::take(&mut self.buffer);
        if line.ends_with('\r') {
            line.pop();
        }
        Some(SseLine::classify(line))
    }
}
