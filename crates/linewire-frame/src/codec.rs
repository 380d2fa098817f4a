use bytes::{Buf, BufMut, BytesMut};

use crate::error::{LineError, Result};

/// Line terminator appended to every written line.
#[cfg(windows)]
pub const LINE_ENDING: &str = "\r\n";
/// Line terminator appended to every written line.
#[cfg(not(windows))]
pub const LINE_ENDING: &str = "\n";

/// Default maximum line length (terminator excluded): 1 MiB.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Encode one message as a terminated line.
///
/// Text containing `\n` or `\r` is rejected: it would reach the peer as more
/// than one message.
pub fn encode_line(text: &str, dst: &mut BytesMut) -> Result<()> {
    if text.bytes().any(|b| b == b'\n' || b == b'\r') {
        return Err(LineError::EmbeddedNewline);
    }
    dst.reserve(text.len() + LINE_ENDING.len());
    dst.put_slice(text.as_bytes());
    dst.put_slice(LINE_ENDING.as_bytes());
    Ok(())
}

/// Decode one line from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete line yet.
/// On success, consumes the line and its terminator from the buffer.
pub fn decode_line(src: &mut BytesMut, max_line_length: usize) -> Result<Option<String>> {
    let Some(newline) = src.iter().position(|&b| b == b'\n') else {
        if src.len() > max_line_length {
            return Err(LineError::LineTooLong {
                size: src.len(),
                max: max_line_length,
            });
        }
        return Ok(None); // Need more data
    };

    let content_len = if newline > 0 && src[newline - 1] == b'\r' {
        newline - 1
    } else {
        newline
    };

    if content_len > max_line_length {
        return Err(LineError::LineTooLong {
            size: content_len,
            max: max_line_length,
        });
    }

    let line = String::from_utf8_lossy(&src[..content_len]).into_owned();
    src.advance(newline + 1);
    Ok(Some(line))
}

/// Drain a trailing unterminated line once the stream has ended.
///
/// Returns `None` when nothing is left in the buffer.
pub fn decode_line_eof(src: &mut BytesMut) -> Option<String> {
    if src.is_empty() {
        return None;
    }
    let mut content_len = src.len();
    if src[content_len - 1] == b'\r' {
        content_len -= 1;
    }
    let line = String::from_utf8_lossy(&src[..content_len]).into_owned();
    src.clear();
    Some(line)
}

/// Configuration for line reading and writing.
#[derive(Debug, Clone)]
pub struct LineConfig {
    /// Maximum line length in bytes, terminator excluded. Default: 1 MiB.
    pub max_line_length: usize,
    /// Read timeout for blocking operations. Default: none (block indefinitely).
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations. Default: none.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            read_timeout: None,
            write_timeout: None,
        }
    }
}
