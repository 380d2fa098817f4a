//! Identity handshake.
//!
//! The first line a server writes on a fresh connection is the client's
//! [`ClientId`] in hyphenated form. Nothing is sent in the other direction.

use std::io::{Read, Write};
use std::time::{Duration, Instant};

use linewire_frame::{LineError, LineReader, LineWriter};

use crate::error::{PeerError, Result};
use crate::protocol::ClientId;

/// Longest handshake line echoed back in an error message.
const MAX_ECHOED_LEN: usize = 64;

/// Server side: announce the assigned identity.
pub fn send_identity<W: Write>(writer: &mut LineWriter<W>, id: ClientId) -> Result<()> {
    writer.send(&id.to_string())?;
    Ok(())
}

/// Client side: read the identity line.
///
/// Read timeouts on the underlying stream are retried until `timeout` has
/// elapsed since the call started.
pub fn read_identity<R: Read>(reader: &mut LineReader<R>, timeout: Duration) -> Result<ClientId> {
    let deadline = Instant::now() + timeout;
    let line = loop {
        match reader.read_line() {
            Ok(line) => break line,
            Err(err) if err.is_timeout() => {
                if Instant::now() >= deadline {
                    return Err(PeerError::Timeout(timeout));
                }
            }
            Err(LineError::ConnectionClosed) => {
                return Err(PeerError::Disconnected(
                    "connection closed during handshake".to_string(),
                ));
            }
            Err(err) => return Err(PeerError::Line(err)),
        }
    };

    line.trim().parse().map_err(|_| {
        PeerError::HandshakeFailed(format!(
            "expected client id, got '{}'",
            truncate(&line, MAX_ECHOED_LEN)
        ))
    })
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}
