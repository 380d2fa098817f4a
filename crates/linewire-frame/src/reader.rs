use std::io::{ErrorKind, Read};

use bytes::BytesMut;
use linewire_transport::NetStream;

use crate::codec::{decode_line, decode_line_eof, LineConfig};
use crate::error::{LineError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete lines from any `Read` stream.
///
/// Handles partial reads internally; callers always get complete lines.
pub struct LineReader<T> {
    inner: T,
    buf: BytesMut,
    config: LineConfig,
    eof: bool,
}

impl<T: Read> LineReader<T> {
    /// Create a new line reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, LineConfig::default())
    }

    /// Create a new line reader with explicit configuration.
    pub fn with_config(inner: T, config: LineConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
            eof: false,
        }
    }

    /// Read the next complete line (blocking), terminator stripped.
    ///
    /// A final line without terminator is returned once at end of stream;
    /// after that, `Err(LineError::ConnectionClosed)`.
    pub fn read_line(&mut self) -> Result<String> {
        loop {
            match decode_line(&mut self.buf, self.config.max_line_length) {
                Ok(Some(line)) => return Ok(line),
                Ok(None) => {}
                Err(err) => {
                    tracing::debug!(error = %err, buffered = self.buf.len(), "line rejected");
                    return Err(err);
                }
            }

            if self.eof {
                return decode_line_eof(&mut self.buf).ok_or(LineError::ConnectionClosed);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(LineError::Io(err)),
            };

            if read == 0 {
                self.eof = true;
                continue;
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }
}

impl LineReader<NetStream> {
    /// Create a line reader for `NetStream` and apply read timeout from config.
    pub fn with_config_net(inner: NetStream, config: LineConfig) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_line_error)?;
        Ok(Self::with_config(inner, config))
    }

    /// Change the read timeout of the underlying socket.
    pub fn set_read_timeout(&mut self, timeout: Option<std::time::Duration>) -> Result<()> {
        self.inner
            .set_read_timeout(timeout)
            .map_err(transport_to_line_error)?;
        self.config.read_timeout = timeout;
        Ok(())
    }
}

pub(crate) fn transport_to_line_error(err: linewire_transport::TransportError) -> LineError {
    match err {
        linewire_transport::TransportError::Io(io)
        | linewire_transport::TransportError::Accept(io) => LineError::Io(io),
        linewire_transport::TransportError::Bind { source, .. }
        | linewire_transport::TransportError::Connect { source, .. } => LineError::Io(source),
        other => LineError::Io(std::io::Error::other(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};
    use std::net::TcpListener;
    use std::time::Duration;

    use super::*;

    #[test]
    fn read_single_line() {
        let mut reader = LineReader::new(Cursor::new(b"hello\n".to_vec()));
        assert_eq!(reader.read_line().unwrap(), "hello");
    }

    #[test]
    fn read_multiple_lines() {
        let wire = b"TO x: one\nGLOBAL: two\r\nDISCONNECT\n".to_vec();
        let mut reader = LineReader::new(Cursor::new(wire));

        assert_eq!(reader.read_line().unwrap(), "TO x: one");
        assert_eq!(reader.read_line().unwrap(), "GLOBAL: two");
        assert_eq!(reader.read_line().unwrap(), "DISCONNECT");
        assert!(matches!(
            reader.read_line().unwrap_err(),
            LineError::ConnectionClosed
        ));
    }

    #[test]
    fn read_long_line_across_chunks() {
        let payload = "x".repeat(64 * 1024);
        let wire = format!("{payload}\n").into_bytes();

        let mut reader = LineReader::new(Cursor::new(wire));
        assert_eq!(reader.read_line().unwrap(), payload);
    }

    #[test]
    fn partial_read_handling() {
        let byte_reader = ByteByByteReader {
            bytes: b"slow line\n".to_vec(),
            pos: 0,
        };
        let mut reader = LineReader::new(byte_reader);
        assert_eq!(reader.read_line().unwrap(), "slow line");
    }

    #[test]
    fn connection_closed_cleanly() {
        let mut reader = LineReader::new(Cursor::new(Vec::<u8>::new()));
        let err = reader.read_line().unwrap_err();
        assert!(matches!(err, LineError::ConnectionClosed));
    }

    #[test]
    fn unterminated_tail_returned_once() {
        let mut reader = LineReader::new(Cursor::new(b"first\nlast".to_vec()));

        assert_eq!(reader.read_line().unwrap(), "first");
        assert_eq!(reader.read_line().unwrap(), "last");
        assert!(matches!(
            reader.read_line().unwrap_err(),
            LineError::ConnectionClosed
        ));
    }

    #[test]
    fn oversized_line_in_stream() {
        let cfg = LineConfig {
            max_line_length: 16,
            ..LineConfig::default()
        };
        let wire = format!("{}\n", "y".repeat(1024)).into_bytes();
        let mut reader = LineReader::with_config(Cursor::new(wire), cfg);
        let err = reader.read_line().unwrap_err();
        assert!(matches!(err, LineError::LineTooLong { .. }));
    }

    #[test]
    fn interrupted_read_retries() {
        let reader = InterruptedThenData {
            interrupted: false,
            inner: Cursor::new(b"ok\n".to_vec()),
        };
        let mut lines = LineReader::new(reader);
        assert_eq!(lines.read_line().unwrap(), "ok");
    }

    #[test]
    fn read_timeout_surfaces_as_timeout_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let stream = linewire_transport::TcpTransport::connect(&addr, None).unwrap();
        let _accepted = listener.accept().unwrap();

        let cfg = LineConfig {
            read_timeout: Some(Duration::from_millis(20)),
            ..LineConfig::default()
        };
        let mut reader = LineReader::with_config_net(stream, cfg).unwrap();

        let err = reader.read_line().unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn roundtrip_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let writer_thread = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream.write_all(b"KICK\n").unwrap();
        });

        let stream = linewire_transport::TcpTransport::connect(&addr.to_string(), None).unwrap();
        let mut reader = LineReader::with_config_net(stream, LineConfig::default()).unwrap();
        assert_eq!(reader.read_line().unwrap(), "KICK");

        writer_thread.join().unwrap();
        assert!(matches!(
            reader.read_line().unwrap_err(),
            LineError::ConnectionClosed
        ));
    }

    #[derive(Debug)]
    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    struct InterruptedThenData {
        interrupted: bool,
        inner: Cursor<Vec<u8>>,
    }

    impl Read for InterruptedThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.inner.read(buf)
        }
    }
}
