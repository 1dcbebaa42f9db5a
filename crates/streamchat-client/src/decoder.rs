//! Event frame decoder for the `data: `-prefixed line protocol.
//!
//! Turns raw body fragments into [`StreamChunk`]s. Fragments arrive at
//! arbitrary byte boundaries, so a partial trailing line is buffered until
//! the rest of it shows up. The buffer holds bytes, not text: `\n` is an
//! unambiguous byte in UTF-8, and converting only complete lines means a
//! multi-byte character split across two fragments is reassembled intact
//! instead of turning into replacement characters.

use tracing::{debug, warn};

use crate::types::StreamChunk;

const EVENT_MARKER: &str = "data: ";

/// Incremental line-frame decoder with a residual buffer.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    residual: Vec<u8>,
    finished: bool,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a terminal chunk has been decoded. Once set, all further
    /// input is discarded.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Feed one raw fragment, returning every chunk completed by it.
    ///
    /// The fragment is appended to the residual buffer and the buffer is
    /// split on `\n`; all but the final split element are complete lines,
    /// the final element becomes the new residual. Decoding stops at the
    /// first `complete` or `error` chunk even if more bytes remain.
    pub fn push(&mut self, fragment: &[u8]) -> Vec<StreamChunk> {
        if self.finished {
            return Vec::new();
        }

        self.residual.extend_from_slice(fragment);

        let mut chunks = Vec::new();
        while let Some(pos) = self.residual.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.residual.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line[..line.len() - 1]);

            if let Some(chunk) = self.decode_line(&line) {
                let terminal = chunk.is_terminal();
                chunks.push(chunk);
                if terminal {
                    self.finished = true;
                    self.residual.clear();
                    break;
                }
            }
        }

        chunks
    }

    /// Flush at end-of-stream.
    ///
    /// A non-empty residual is decoded as a final unterminated line (the
    /// transport may drop the trailing newline on interruption). If no
    /// terminal chunk was ever seen, an implicit `complete` is synthesized
    /// so the consumer never hangs waiting for one.
    pub fn finish(&mut self) -> Vec<StreamChunk> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;

        let mut chunks = Vec::new();
        let line = String::from_utf8_lossy(&std::mem::take(&mut self.residual)).into_owned();
        if let Some(chunk) = self.decode_line(line.trim_end()) {
            let terminal = chunk.is_terminal();
            chunks.push(chunk);
            if terminal {
                return chunks;
            }
        }

        debug!("stream ended without a terminal chunk, synthesizing complete");
        chunks.push(StreamChunk::Complete);
        chunks
    }

    fn decode_line(&self, line: &str) -> Option<StreamChunk> {
        let payload = line.strip_prefix(EVENT_MARKER)?;
        if payload.trim().is_empty() {
            return None;
        }

        match serde_json::from_str(payload) {
            Ok(chunk) => Some(chunk),
            Err(e) => {
                // Malformed single line: skip it, keep the stream alive.
                warn!(error = %e, line = payload, "skipping undecodable stream line");
                None
            }
        }
    }
}
