use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use crate::error::Result;

/// A connected TCP stream: implements Read + Write.
///
/// This is the fundamental I/O type returned by transport operations. Clones
/// made with [`NetStream::try_clone`] share the same socket, so shutting one
/// handle down unblocks a reader parked on another.
pub struct NetStream {
    inner: TcpStream,
}

impl Read for NetStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for NetStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl NetStream {
    pub(crate) fn from_tcp(stream: TcpStream) -> Self {
        Self { inner: stream }
    }

    /// Set read timeout on the underlying stream. `None` blocks indefinitely.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.inner.set_read_timeout(timeout).map_err(Into::into)
    }

    /// Set write timeout on the underlying stream.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.inner.set_write_timeout(timeout).map_err(Into::into)
    }

    /// Enable or disable Nagle's algorithm.
    pub fn set_nodelay(&self, nodelay: bool) -> Result<()> {
        self.inner.set_nodelay(nodelay).map_err(Into::into)
    }

    /// Try to clone this stream (creates a new file descriptor for the same socket).
    pub fn try_clone(&self) -> Result<Self> {
        let cloned = self.inner.try_clone()?;
        Ok(Self::from_tcp(cloned))
    }

    /// Shut down both halves of the connection.
    ///
    /// Safe to call more than once; a socket the peer already closed is not an error.
    pub fn shutdown(&self) -> Result<()> {
        match self.inner.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotConnected => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Address of the remote end.
    pub fn peer_addr(&self) -> Result<SocketAddr> {
        self.inner.peer_addr().map_err(Into::into)
    }

    /// Address of the local end.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.inner.local_addr().map_err(Into::into)
    }
}

impl std::fmt::Debug for NetStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut dbg = f.debug_struct("NetStream");
        dbg.field("type", &"tcp");
        if let Ok(peer) = self.inner.peer_addr() {
            dbg.field("peer", &peer);
        }
        dbg.finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpListener;

    use super::*;

    fn pair() -> (NetStream, NetStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (NetStream::from_tcp(client), NetStream::from_tcp(server))
    }

    #[test]
    fn clone_shares_socket() {
        let (mut client, server) = pair();
        let mut server_reader = server.try_clone().unwrap();

        client.write_all(b"ping").unwrap();
        let mut buf = [0u8; 4];
        server_reader.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");
    }

    #[test]
    fn shutdown_unblocks_cloned_reader() {
        let (_client, server) = pair();
        let mut reader = server.try_clone().unwrap();

        let handle = std::thread::spawn(move || {
            let mut buf = [0u8; 8];
            reader.read(&mut buf)
        });

        std::thread::sleep(Duration::from_millis(20));
        server.shutdown().unwrap();

        let read = handle.join().unwrap();
        assert!(matches!(read, Ok(0) | Err(_)));
    }

    #[test]
    fn shutdown_twice_is_ok() {
        let (_client, server) = pair();
        server.shutdown().unwrap();
        assert!(server.shutdown().is_ok());
    }

    #[test]
    fn debug_names_transport() {
        let (client, _server) = pair();
        let dbg = format!("{client:?}");
        assert!(dbg.contains("tcp"));
    }
}
