use std::fmt;
use std::io;

use linewire_frame::LineError;
use linewire_peer::PeerError;
use linewire_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

fn io_code(kind: io::ErrorKind) -> i32 {
    match kind {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused | io::ErrorKind::AddrInUse => FAILURE,
        _ => INTERNAL,
    }
}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    CliError::new(io_code(err.kind()), format!("{context}: {err}"))
}

/// The exit code follows the wrapped I/O error; the message keeps the address.
pub fn transport_error(context: &str, err: TransportError) -> CliError {
    let code = err
        .io_source()
        .map_or(TRANSPORT_ERROR, |source| io_code(source.kind()));
    CliError::new(code, format!("{context}: {err}"))
}

pub fn line_error(context: &str, err: LineError) -> CliError {
    match err {
        LineError::Io(source) => io_error(context, source),
        LineError::LineTooLong { .. } | LineError::EmbeddedNewline => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        LineError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}

pub fn peer_error(context: &str, err: PeerError) -> CliError {
    match err {
        PeerError::Transport(err) => transport_error(context, err),
        PeerError::Line(err) => line_error(context, err),
        PeerError::Timeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        PeerError::HandshakeFailed(_) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        PeerError::Disconnected(_)
        | PeerError::NotConnected
        | PeerError::RetriesExhausted { .. } => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        PeerError::AlreadyConnected(_)
        | PeerError::AlreadyRunning(_)
        | PeerError::ConnectInProgress => CliError::new(USAGE, format!("{context}: {err}")),
        PeerError::Spawn(_) => CliError::new(INTERNAL, format!("{context}: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn exhausted_retries_are_plain_failures() {
        let err = peer_error(
            "connect failed",
            PeerError::RetriesExhausted {
                attempts: 3,
                last_error: "refused".to_string(),
            },
        );
        assert_eq!(err.code, FAILURE);
        assert!(err.message.starts_with("connect failed: "));
    }

    #[test]
    fn timeouts_map_to_124() {
        let err = peer_error("handshake", PeerError::Timeout(Duration::from_secs(1)));
        assert_eq!(err.code, TIMEOUT);

        let io = io::Error::from(io::ErrorKind::WouldBlock);
        assert_eq!(line_error("recv", LineError::Io(io)).code, TIMEOUT);
    }

    #[test]
    fn bind_in_use_is_failure() {
        let err = transport_error(
            "bind failed",
            TransportError::Bind {
                addr: "127.0.0.1:1".to_string(),
                source: io::Error::from(io::ErrorKind::AddrInUse),
            },
        );
        assert_eq!(err.code, FAILURE);
        assert!(err.message.contains("127.0.0.1:1"));

        let unresolved = transport_error("connect failed", TransportError::Unresolved("x".into()));
        assert_eq!(unresolved.code, TRANSPORT_ERROR);
    }

    #[test]
    fn bad_payload_is_data_invalid() {
        let err = peer_error("send failed", PeerError::Line(LineError::EmbeddedNewline));
        assert_eq!(err.code, DATA_INVALID);
    }
}
