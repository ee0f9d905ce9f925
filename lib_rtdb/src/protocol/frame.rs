//! # Frame Reassembly and Chunking
//!
//! Clients may split one JSON message across several WebSocket frames. The
//! [`FrameAssembler`] buffers partial text until it parses as a complete JSON
//! document. Outbound, [`chunk_payload`] splits a serialized message into a
//! count frame followed by that many pieces.
//!
//! The buffer is capped per session and, when a [`BufferGuard`] is attached,
//! against a process-wide budget as well. Crossing either cap is a hard error;
//! the transport is expected to drop the connection.

use std::sync::Arc;

use serde_json::Value;

use crate::core::memory_guard::BufferGuard;
use crate::error::FrameError;

/// Frame sent by clients to keep the socket alive. Only recognised between
/// messages; inside a split message it is ordinary payload.
pub const KEEPALIVE_FRAME: &str = "0";

/// Default cap on partial-frame bytes held for a single session.
pub const DEFAULT_MAX_BUFFERED_BYTES: usize = 10 * 1024 * 1024;

/// Default outbound chunk size, in characters.
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 16384;

/// Accumulates inbound frames until they form a complete JSON document.
#[derive(Debug)]
pub struct FrameAssembler {
    buffer: String,
    max_buffered_bytes: usize,
    guard: Option<Arc<BufferGuard>>,
    /// Bytes currently counted against `guard`.
    charged: u64,
}

impl FrameAssembler {
    pub fn new(max_buffered_bytes: usize) -> Self {
        Self {
            buffer: String::new(),
            max_buffered_bytes,
            guard: None,
            charged: 0,
        }
    }

    /// Charges buffered bytes against a shared budget.
    pub fn with_guard(mut self, guard: Arc<BufferGuard>) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Feeds one frame. Returns the parsed document once the buffer parses,
    /// `Ok(None)` while it is still incomplete.
    ///
    /// Completion is detected by parsing, so a split is only recoverable when
    /// no leading piece is itself valid JSON. That holds for object messages
    /// at any split point. A top-level scalar such as `12345` sent as `12`
    /// then `345` comes out as two documents.
    pub fn push(&mut self, frame: &str) -> Result<Option<Value>, FrameError> {
        if self.buffer.is_empty() {
            if let Ok(value) = serde_json::from_str::<Value>(frame) {
                return Ok(Some(value));
            }
            self.buffer.push_str(frame);
        } else {
            self.buffer.push_str(frame);
            if let Ok(value) = serde_json::from_str::<Value>(&self.buffer) {
                self.clear();
                return Ok(Some(value));
            }
        }

        if self.buffer.len() > self.max_buffered_bytes {
            log::warn!(
                "Dropping {} buffered bytes: per-session cap of {} exceeded",
                self.buffer.len(),
                self.max_buffered_bytes
            );
            self.clear();
            return Err(FrameError::BufferOverflow {
                limit: self.max_buffered_bytes,
            });
        }

        if let Some(guard) = &self.guard {
            let added = frame.len() as u64;
            self.charged += added;
            if !guard.increment(added) {
                let limit = guard.capacity() as usize;
                log::warn!("Dropping buffered frame: global buffer budget of {limit} bytes exceeded");
                self.clear();
                return Err(FrameError::BufferOverflow { limit });
            }
        }
        Ok(None)
    }

    /// Bytes currently held for this session.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    fn clear(&mut self) {
        if let Some(guard) = &self.guard {
            guard.decrement(self.charged);
        }
        self.charged = 0;
        self.buffer.clear();
    }
}

impl Drop for FrameAssembler {
    fn drop(&mut self) {
        self.clear();
    }
}

/// Splits `payload` into a count frame followed by chunks of at most
/// `max_frame_length` characters. The count frame is always sent, even for a
/// single chunk. Splitting is by character so UTF-8 sequences stay intact.
pub fn chunk_payload(payload: &str, max_frame_length: usize) -> Vec<String> {
    let max = max_frame_length.max(1);
    let chars: Vec<char> = payload.chars().collect();
    let chunks: Vec<String> = chars.chunks(max).map(|c| c.iter().collect()).collect();

    let mut frames = Vec::with_capacity(chunks.len() + 1);
    frames.push(chunks.len().to_string());
    frames.extend(chunks);
    frames
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_complete_frame_parses_immediately() {
        let mut asm = FrameAssembler::new(1024);
        let v = asm.push(r#"{"t":"d","d":{}}"#).unwrap();
        assert_eq!(v, Some(json!({"t": "d", "d": {}})));
        assert_eq!(asm.buffered_len(), 0);
    }

    #[test]
    fn test_fragments_reassemble() {
        let mut asm = FrameAssembler::new(1024);
        assert_eq!(asm.push(r#"{"t":"d","#).unwrap(), None);
        assert_eq!(asm.push(r#""d":{"r":1,"#).unwrap(), None);
        let v = asm.push(r#""a":"q"}}"#).unwrap();
        assert_eq!(v, Some(json!({"t": "d", "d": {"r": 1, "a": "q"}})));
        assert_eq!(asm.buffered_len(), 0);
    }

    #[test]
    fn test_split_scalar_completes_early() {
        let mut asm = FrameAssembler::new(1024);
        assert_eq!(asm.push("12").unwrap(), Some(json!(12)));
        assert_eq!(asm.push("345").unwrap(), Some(json!(345)));
    }

    #[test]
    fn test_overflow_clears_buffer() {
        let mut asm = FrameAssembler::new(16);
        assert_eq!(asm.push(r#"{"t":"d","#).unwrap(), None);
        let err = asm.push(r#""d":{"r":1,"a":"q"#).unwrap_err();
        assert_eq!(err, FrameError::BufferOverflow { limit: 16 });
        assert_eq!(asm.buffered_len(), 0);
    }

    #[test]
    fn test_global_guard_is_charged_and_released() {
        let guard = Arc::new(BufferGuard::new(1024));
        let mut asm = FrameAssembler::new(1024).with_guard(guard.clone());
        asm.push(r#"{"a":"#).unwrap();
        assert_eq!(guard.current_usage(), 5);
        asm.push("1}").unwrap();
        assert_eq!(guard.current_usage(), 0);

        asm.push(r#"{"b":"#).unwrap();
        drop(asm);
        assert_eq!(guard.current_usage(), 0);
    }

    #[test]
    fn test_global_guard_overflow() {
        let guard = Arc::new(BufferGuard::new(8));
        let mut asm = FrameAssembler::new(1024).with_guard(guard.clone());
        asm.push(r#"{"a":"#).unwrap();
        let err = asm.push(r#""bbbbbb"#).unwrap_err();
        assert_eq!(err, FrameError::BufferOverflow { limit: 8 });
        assert_eq!(guard.current_usage(), 0);
    }

    #[test]
    fn test_chunking_always_sends_count() {
        assert_eq!(chunk_payload("abc", 16384), vec!["1", "abc"]);
        assert_eq!(chunk_payload("abcdefg", 3), vec!["3", "abc", "def", "g"]);
    }

    #[test]
    fn test_chunking_respects_char_boundaries() {
        let frames = chunk_payload("héllo", 2);
        assert_eq!(frames, vec!["3", "hé", "ll", "o"]);
        assert_eq!(frames[1..].concat(), "héllo");
    }
}
