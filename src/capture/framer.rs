//! # Line Framer
//!
//! Converts the raw serial byte stream into decoded text lines.
//!
//! Bytes accumulate until a newline marker arrives; the accumulated buffer is
//! then decoded and emitted as one line. Decoding tries UTF-8 first and falls
//! back to a lossy Latin-1 decode that cannot fail, so a burst of line noise
//! never drops a line or panics the pipeline.

use bytes::{BufMut, BytesMut};

/// Newline marker terminating each device line
const LINE_TERMINATOR: u8 = b'\n';

/// Incremental byte-to-line framer
///
/// One framer instance exists per connection; its partial-line buffer is
/// discarded when the connection ends.
#[derive(Debug, Default)]
pub struct LineFramer {
    buf: BytesMut,
}

impl LineFramer {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(256),
        }
    }

    /// Feed received bytes, returning every completed line
    ///
    /// Emits exactly one line per newline byte in `bytes`, in arrival order.
    /// Trailing whitespace (including `\r`) is trimmed from each line.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in bytes {
            if byte == LINE_TERMINATOR {
                lines.push(decode_line(&self.buf));
                self.buf.clear();
            } else {
                self.buf.put_u8(byte);
            }
        }
        lines
    }

    /// Number of bytes held for the current partial line
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

/// Decode a raw line buffer, never failing
///
/// UTF-8 is the primary encoding; invalid sequences fall back to Latin-1,
/// which maps every byte to a character (the legacy firmware occasionally
/// emits Latin-1 accented text in status messages).
fn decode_line(raw: &[u8]) -> String {
    match std::str::from_utf8(raw) {
        Ok(text) => text.trim_end().to_string(),
        Err(_) => encoding_rs::mem::decode_latin1(raw).trim_end().to_string(),
    }
}
