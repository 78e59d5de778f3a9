//! Shared SSE (Server-Sent Events) stream parser.

use futures::{Stream, StreamExt};
use tracing::warn;

use vertex_core::error::{ModelError, Result, VertexError};

/// Prefix of the SSE lines that carry a payload.
pub const DATA_PREFIX: &str = "data: ";

/// Payload that marks the end of an OpenAI-compatible stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Parse SSE data lines from a reqwest response.
pub fn sse_data_stream(response: reqwest::Response) -> impl Stream<Item = Result<String>> + Send {
    sse_data_lines(response.bytes_stream())
}

/// Parse SSE data lines from any stream of byte chunks.
///
/// Buffers incoming bytes, splits lines on `\n`, `\r\n` or a bare `\r`, and
/// yields the payload after each `data: ` prefix in arrival order. Blank
/// lines and other SSE fields are skipped. A read error is yielded once as a
/// transport error and ends the stream. A final line without a terminator
/// is still yielded.
pub fn sse_data_lines<S, B, E>(byte_stream: S) -> impl Stream<Item = Result<String>> + Send
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    async_stream::stream! {
        // Bytes, not chars: a multi-byte character may straddle two chunks.
        let mut lines = LineBuffer::default();
        let mut byte_stream = Box::pin(byte_stream);
        let mut failed = false;

        while let Some(result) = byte_stream.next().await {
            let chunk = match result {
                Ok(chunk) => chunk,
                Err(e) => {
                    warn!(error = %e, "SSE body read failed");
                    yield Err(VertexError::Model(ModelError::Transport(e.to_string())));
                    failed = true;
                    break;
                }
            };
            lines.push(chunk.as_ref());

            while let Some(line) = lines.next_line() {
                if let Some(data) = data_payload(&line) {
                    yield Ok(data);
                }
            }
        }

        if !failed {
            if let Some(rest) = lines.finish() {
                if let Some(data) = data_payload(&rest) {
                    yield Ok(data);
                }
            }
        }
    }
}

/// Byte buffer that hands out complete lines.
///
/// `start` marks the first unconsumed byte and `scanned` how far the search
/// for a terminator has got, so each byte is inspected once.
#[derive(Debug, Default)]
struct LineBuffer {
    buf: Vec<u8>,
    start: usize,
    scanned: usize,
}

impl LineBuffer {
    fn push(&mut self, chunk: &[u8]) {
        if self.start > 0 {
            self.buf.drain(..self.start);
            self.scanned -= self.start;
            self.start = 0;
        }
        self.buf.extend_from_slice(chunk);
    }

    /// Next complete line without its terminator.
    fn next_line(&mut self) -> Option<Vec<u8>> {
        let Some(offset) = self.buf[self.scanned..]
            .iter()
            .position(|&b| b == b'\n' || b == b'\r')
        else {
            self.scanned = self.buf.len();
            return None;
        };
        let pos = self.scanned + offset;
        let end = match (self.buf[pos], self.buf.get(pos + 1).copied()) {
            (b'\r', Some(b'\n')) => pos + 2,
            // A trailing `\r` may be the first half of `\r\n`; wait for more.
            (b'\r', None) => {
                self.scanned = pos;
                return None;
            }
            _ => pos + 1,
        };

        let line = self.buf[self.start..pos].to_vec();
        self.start = end;
        self.scanned = end;
        Some(line)
    }

    /// Whatever is left once the body has ended.
    fn finish(&mut self) -> Option<Vec<u8>> {
        if self.start >= self.buf.len() {
            return None;
        }
        let mut rest = self.buf.split_off(self.start);
        if rest.last() == Some(&b'\r') {
            rest.pop();
        }
        self.start = 0;
        self.scanned = 0;
        self.buf.clear();
        Some(rest)
    }
}

/// Extract the payload of a single raw line, or `None` if it is not a data line.
pub fn data_payload(raw: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim_end_matches('\n').trim_end_matches('\r');
    if line.trim().is_empty() {
        return None;
    }
    line.strip_prefix(DATA_PREFIX).map(str::to_string)
}
