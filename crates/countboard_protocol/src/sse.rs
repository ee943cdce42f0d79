//! Server-sent event decoding.
//!
//! Only the subset used by the gateway is understood: `data:` lines and
//! `:` comment lines. `event:`, `id:` and `retry:` fields are skipped.

use crate::error::{ProtocolError, ProtocolResult};

/// A decoded event-stream block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    /// A comment block (`: connected`, `: keepalive`).
    Comment(String),
    /// A data block; multi-line data is joined with `\n`.
    Data(String),
}

/// Incremental decoder for an event stream delivered in arbitrary chunks.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Creates an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns every block completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> ProtocolResult<Vec<SseFrame>> {
        self.buffer.extend(chunk.iter().copied().filter(|b| *b != b'\r'));

        let mut frames = Vec::new();
        while let Some(end) = find_block_end(&self.buffer) {
            let block: Vec<u8> = self.buffer.drain(..end + 2).collect();
            let text = std::str::from_utf8(&block[..end])
                .map_err(|e| ProtocolError::InvalidFrame(e.to_string()))?;
            if let Some(frame) = parse_block(text) {
                frames.push(frame);
            }
        }
        Ok(frames)
    }

    /// Returns the number of buffered bytes not yet forming a block.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

fn find_block_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}

fn parse_block(block: &str) -> Option<SseFrame> {
    let mut data: Vec<&str> = Vec::new();
    let mut comment: Option<&str> = None;

    for line in block.split('\n') {
        if let Some(text) = line.strip_prefix(':') {
            comment.get_or_insert(strip_space(text));
        } else if let Some(value) = line.strip_prefix("data:") {
            data.push(strip_space(value));
        } else if line == "data" {
            data.push("");
        }
    }

    if !data.is_empty() {
        Some(SseFrame::Data(data.join("\n")))
    } else {
        comment.map(|c| SseFrame::Comment(c.to_string()))
    }
}

fn strip_space(value: &str) -> &str {
    value.strip_prefix(' ').unwrap_or(value)
}
