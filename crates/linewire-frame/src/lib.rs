//! Newline-delimited text framing for linewire.
//!
//! Every protocol message is one line of UTF-8 text. This crate turns a byte
//! stream into complete lines and back:
//! - lines end with the platform line ending on write (`\n`, or `\r\n` on Windows)
//! - both `\n` and `\r\n` are accepted on read, and the terminator is stripped
//! - invalid UTF-8 is decoded lossily rather than failing the connection
//!
//! No partial reads, no buffer management in user code.

pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub mod async_codec;

#[cfg(feature = "async")]
pub use async_codec::LineCodec;
pub use codec::{
    decode_line, decode_line_eof, encode_line, LineConfig, DEFAULT_MAX_LINE_LENGTH, LINE_ENDING,
};
pub use error::{LineError, Result};
pub use reader::LineReader;
pub use writer::LineWriter;
