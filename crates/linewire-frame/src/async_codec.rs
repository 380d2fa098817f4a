//! `tokio_util::codec` adapter for linewire lines.
//!
//! Applies the same rules as [`LineReader`](crate::LineReader) and
//! [`LineWriter`](crate::LineWriter), for callers that drive connections from
//! a tokio runtime with `Framed`.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{decode_line, decode_line_eof, encode_line, DEFAULT_MAX_LINE_LENGTH};
use crate::error::{LineError, Result};

/// Line codec for `FramedRead`/`FramedWrite`.
#[derive(Debug, Clone)]
pub struct LineCodec {
    max_line_length: usize,
}

impl LineCodec {
    /// Codec with the default maximum line length.
    pub fn new() -> Self {
        Self::with_max_line_length(DEFAULT_MAX_LINE_LENGTH)
    }

    /// Codec with an explicit maximum line length.
    pub fn with_max_line_length(max_line_length: usize) -> Self {
        Self { max_line_length }
    }

    pub fn max_line_length(&self) -> usize {
        self.max_line_length
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = LineError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        decode_line(src, self.max_line_length)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        match self.decode(src)? {
            Some(line) => Ok(Some(line)),
            None => Ok(decode_line_eof(src)),
        }
    }
}

impl Encoder<&str> for LineCodec {
    type Error = LineError;

    fn encode(&mut self, item: &str, dst: &mut BytesMut) -> Result<()> {
        if item.len() > self.max_line_length {
            return Err(LineError::LineTooLong {
                size: item.len(),
                max: self.max_line_length,
            });
        }
        encode_line(item, dst)
    }
}

impl Encoder<String> for LineCodec {
    type Error = LineError;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<()> {
        Encoder::<&str>::encode(self, item.as_str(), dst)
    }
}
