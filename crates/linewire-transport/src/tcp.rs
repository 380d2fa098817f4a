use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::NetStream;

/// TCP listener transport.
///
/// Provides bind/accept over a TCP socket plus the matching `connect` used by
/// clients.
pub struct TcpTransport {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TcpTransport {
    /// Bind and listen on `addr` (for example `0.0.0.0:4000` or `127.0.0.1:0`).
    pub fn bind(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr).map_err(|e| TransportError::Bind {
            addr: addr.to_string(),
            source: e,
        })?;
        let local_addr = listener.local_addr().map_err(|e| TransportError::Bind {
            addr: addr.to_string(),
            source: e,
        })?;

        info!(%local_addr, "listening on tcp socket");

        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Accept an incoming connection (blocking).
    pub fn accept(&self) -> Result<(NetStream, SocketAddr)> {
        let (stream, peer) = self.listener.accept().map_err(TransportError::Accept)?;
        debug!(%peer, "accepted connection");
        Ok((NetStream::from_tcp(stream), peer))
    }

    /// Connect to a listening TCP socket (blocking).
    ///
    /// Every address `addr` resolves to is tried in order; the last error is
    /// reported if none accepts. With `timeout` set, each attempt is bounded.
    pub fn connect(addr: &str, timeout: Option<Duration>) -> Result<NetStream> {
        let candidates: Vec<SocketAddr> = addr
            .to_socket_addrs()
            .map_err(|e| TransportError::Connect {
                addr: addr.to_string(),
                source: e,
            })?
            .collect();

        let mut last_err = None;
        for candidate in candidates {
            let attempt = match timeout {
                Some(timeout) => TcpStream::connect_timeout(&candidate, timeout),
                None => TcpStream::connect(candidate),
            };
            match attempt {
                Ok(stream) => {
                    debug!(addr, resolved = %candidate, "connected to tcp socket");
                    return Ok(NetStream::from_tcp(stream));
                }
                Err(err) => last_err = Some(err),
            }
        }

        match last_err {
            Some(source) => Err(TransportError::Connect {
                addr: addr.to_string(),
                source,
            }),
            None => Err(TransportError::Unresolved(addr.to_string())),
        }
    }

    /// Unblock a thread parked in [`TcpTransport::accept`] on the listener bound to `addr`.
    ///
    /// Dials the listener once and drops the connection. Unspecified bind
    /// addresses are dialed through loopback.
    pub fn wake(addr: SocketAddr) -> Result<()> {
        let target = SocketAddr::new(dialable_ip(addr.ip()), addr.port());
        let stream = TcpStream::connect_timeout(&target, Duration::from_secs(1))?;
        drop(stream);
        Ok(())
    }

    /// The address this listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

fn dialable_ip(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V4(v4) if v4.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V6(v6) if v6.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
        other => other,
    }
}
