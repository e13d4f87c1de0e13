//! Wire-level framing shared by the provider decoders.

use memchr::memchr;

/// What one line of a response body means to the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    Fragment(String),
    /// Blank, keep-alive, unparseable or otherwise uninteresting.
    Skip,
    /// End-of-turn sentinel; nothing after it is read.
    Done,
}

/// Per-backend interpretation of response lines.
///
/// Decoding never fails: a line that cannot be understood is [`Decoded::Skip`].
pub trait FrameDecoder: Send {
    fn decode_line(&mut self, line: &str) -> Decoded;

    /// Called once when the connection closes without a sentinel.
    fn finish(&mut self) {}
}

/// Reassembles lines from arbitrarily split network chunks.
#[derive(Debug, Default)]
pub struct LineSplitter {
    buffer: Vec<u8>,
}

impl LineSplitter {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = memchr(b'\n', &self.buffer) {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            lines.push(to_line(&raw[..raw.len() - 1]));
        }
        lines
    }

    /// Whatever trails the last newline, if anything.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let raw = std::mem::take(&mut self.buffer);
        Some(to_line(&raw))
    }
}

fn to_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

/// Payload of an event-stream `data:` line; `None` for every other line.
pub fn sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim)
}

pub const SSE_DONE: &str = "[DONE]";
