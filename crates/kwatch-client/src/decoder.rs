//! Newline-delimited JSON frame decoder
//!
//! Splits the response body into frames on line terminators and decodes
//! each frame as one `{"type": ..., "object": ...}` record. Blank frames
//! (keep-alives) and malformed frames are dropped without interrupting the
//! stream.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use crate::event::WatchEvent;

/// Upper bound for a single frame before it is discarded (16 MiB)
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Incremental frame decoder state
#[derive(Debug)]
pub struct FrameDecoder<T> {
    /// Bytes of the current, not yet terminated frame
    buffer: Vec<u8>,
    /// Frames longer than this are dropped
    max_frame_len: usize,
    /// Set while skipping the rest of an oversized frame
    discarding: bool,
    /// Number of frames dropped as malformed or oversized
    dropped: u64,
    _payload: PhantomData<fn() -> T>,
}

impl<T> Default for FrameDecoder<T> {
    fn default() -> Self {
        Self::with_max_frame_len(DEFAULT_MAX_FRAME_LEN)
    }
}

impl<T> FrameDecoder<T> {
    /// Create a new decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a decoder with a custom frame size limit
    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_frame_len,
            discarding: false,
            dropped: 0,
            _payload: PhantomData,
        }
    }

    /// Number of frames dropped so far
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Bytes held for the current unterminated frame
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    fn drop_oversized(&mut self, len: usize) {
        debug!(
            "Dropping {} byte frame exceeding {} bytes",
            len, self.max_frame_len
        );
        self.dropped += 1;
    }
}

impl<T: DeserializeOwned> FrameDecoder<T> {
    /// Feed a chunk and extract every event completed by it
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<WatchEvent<T>> {
        let mut events = Vec::new();
        let mut rest = chunk;

        while let Some(pos) = rest.iter().position(|&b| b == b'\n' || b == b'\r') {
            let (head, tail) = rest.split_at(pos);
            rest = &tail[1..];

            if self.discarding {
                // Terminator found: the oversized frame is over
                self.discarding = false;
                self.buffer.clear();
                continue;
            }

            let len = self.buffer.len() + head.len();
            if len > self.max_frame_len {
                self.buffer = Vec::new();
                self.drop_oversized(len);
                continue;
            }

            let event = if self.buffer.is_empty() {
                self.decode_frame(head)
            } else {
                self.buffer.extend_from_slice(head);
                let frame = std::mem::take(&mut self.buffer);
                self.decode_frame(&frame)
            };
            events.extend(event);
        }

        if !self.discarding {
            self.buffer.extend_from_slice(rest);
            if self.buffer.len() > self.max_frame_len {
                let len = self.buffer.len();
                self.buffer = Vec::new();
                self.discarding = true;
                self.drop_oversized(len);
            }
        }

        events
    }

    /// Handle end of body
    ///
    /// An unterminated trailing fragment is only decoded when `complete` is
    /// set, i.e. the transport guarantees the body was read in full.
    /// Otherwise it is discarded.
    pub fn finish(&mut self, complete: bool) -> Option<WatchEvent<T>> {
        let fragment = std::mem::take(&mut self.buffer);
        let discarding = std::mem::replace(&mut self.discarding, false);
        if fragment.is_empty() || discarding {
            return None;
        }

        if complete {
            self.decode_frame(&fragment)
        } else {
            debug!(
                "Discarding {} bytes of unterminated trailing frame",
                fragment.len()
            );
            None
        }
    }

    /// Decode a single frame, dropping blank and malformed ones
    fn decode_frame(&mut self, frame: &[u8]) -> Option<WatchEvent<T>> {
        let text = match std::str::from_utf8(frame) {
            Ok(s) => s.trim(),
            Err(_) => {
                debug!("Dropping frame with invalid UTF-8");
                self.dropped += 1;
                return None;
            }
        };

        if text.is_empty() {
            trace!("Watch keep-alive line");
            return None;
        }

        match serde_json::from_str::<WatchEvent<T>>(text) {
            Ok(event) => Some(event),
            Err(e) => {
                let preview = if text.len() > 100 {
                    let mut end = 100;
                    while !text.is_char_boundary(end) {
                        end -= 1;
                    }
                    format!("{}...", &text[..end])
                } else {
                    text.to_string()
                };
                debug!("Dropping malformed watch frame: {} (data: {})", e, preview);
                self.dropped += 1;
                None
            }
        }
    }
}
