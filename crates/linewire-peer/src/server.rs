use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use linewire_frame::{LineConfig, LineError, LineReader, DEFAULT_MAX_LINE_LENGTH};
use linewire_transport::{NetStream, TcpTransport};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use crate::callbacks::CallbackList;
use crate::error::{PeerError, Result};
use crate::protocol::{self, ClientId, Request, DEFAULT_PORT, INVALID_UUID_REPLY, KICK};
use crate::registry::{Connection, Registry};

const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);
/// Upper bound for `stop()` waiting on the accept loop to drop the listener.
const LISTENER_RELEASE_WAIT: Duration = Duration::from_secs(2);
/// Upper bound for writing `KICK` to a client that is about to be closed.
const KICK_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

type ClientFn = dyn Fn(ClientId) + Send + Sync;
type MessageFn = dyn Fn(ClientId, &str) + Send + Sync;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address. Default: `0.0.0.0:4000`.
    pub bind_addr: String,
    /// Close clients silent for this long. Default: none (never reaped).
    pub read_timeout: Option<Duration>,
    /// Write timeout per connection. Default: none.
    pub write_timeout: Option<Duration>,
    /// Maximum accepted line length in bytes.
    pub max_line_length: usize,
    /// Disable Nagle on accepted sockets. Default: true.
    pub nodelay: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("0.0.0.0:{DEFAULT_PORT}"),
            read_timeout: None,
            write_timeout: None,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            nodelay: true,
        }
    }
}

impl ServerConfig {
    /// Default configuration listening on every interface at `port`.
    pub fn with_port(port: u16) -> Self {
        Self {
            bind_addr: format!("0.0.0.0:{port}"),
            ..Self::default()
        }
    }

    fn line_config(&self) -> LineConfig {
        LineConfig {
            max_line_length: self.max_line_length,
            read_timeout: self.read_timeout,
            write_timeout: self.write_timeout,
        }
    }
}

/// Why a connection's receive loop ended.
#[derive(Debug)]
enum DisconnectReason {
    Eof,
    Requested,
    Closed,
    IdleTimeout,
    Io(LineError),
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eof => f.write_str("eof"),
            Self::Requested => f.write_str("disconnect-request"),
            Self::Closed => f.write_str("kicked/closed"),
            Self::IdleTimeout => f.write_str("idle-timeout"),
            Self::Io(err) => write!(f, "io-error: {err}"),
        }
    }
}

/// Shared between `stop()` and one run of the accept loop.
#[derive(Default)]
struct Run {
    stopped: AtomicBool,
    released: Mutex<bool>,
    released_cv: Condvar,
}

impl Run {
    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    /// Called by the accept loop after the listener has been dropped.
    fn release(&self) {
        *self.released.lock() = true;
        self.released_cv.notify_all();
    }

    fn wait_released(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut released = self.released.lock();
        while !*released {
            if self
                .released_cv
                .wait_until(&mut released, deadline)
                .timed_out()
            {
                return *released;
            }
        }
        true
    }
}

/// The accept loop currently bound, if any.
struct Listening {
    addr: SocketAddr,
    run: Arc<Run>,
}

struct Inner {
    config: ServerConfig,
    registry: Registry,
    listening: Mutex<Option<Listening>>,
    on_connect: CallbackList<ClientFn>,
    on_disconnect: CallbackList<ClientFn>,
    on_message: CallbackList<MessageFn>,
}

/// Accepts clients, assigns identities and routes lines between them.
///
/// Cloning is cheap and every clone drives the same server, so a clone can
/// be moved into callbacks or other threads.
#[derive(Clone)]
pub struct Server {
    inner: Arc<Inner>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                registry: Registry::new(),
                listening: Mutex::new(None),
                on_connect: CallbackList::new(),
                on_disconnect: CallbackList::new(),
                on_message: CallbackList::new(),
            }),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Called with the identity of each client after its handshake.
    pub fn on_client_connect<F>(&self, callback: F)
    where
        F: Fn(ClientId) + Send + Sync + 'static,
    {
        self.inner.on_connect.register(Arc::new(callback));
    }

    /// Called exactly once per connected client when it goes away.
    pub fn on_client_disconnect<F>(&self, callback: F)
    where
        F: Fn(ClientId) + Send + Sync + 'static,
    {
        self.inner.on_disconnect.register(Arc::new(callback));
    }

    /// Called with every line that is not part of the routing protocol.
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(ClientId, &str) + Send + Sync + 'static,
    {
        self.inner.on_message.register(Arc::new(callback));
    }

    /// Bind and run the accept loop on the calling thread until [`stop`](Self::stop).
    pub fn start(&self) -> Result<()> {
        let (transport, run) = self.bind()?;
        self.accept_loop(transport, run);
        Ok(())
    }

    /// Bind on the calling thread, then run the accept loop in the background.
    pub fn spawn(&self) -> Result<JoinHandle<()>> {
        let (transport, run) = self.bind()?;
        let server = self.clone();
        let loop_run = Arc::clone(&run);
        thread::Builder::new()
            .name("linewire-accept".to_string())
            .spawn(move || server.accept_loop(transport, loop_run))
            .map_err(|err| {
                run.stop();
                self.inner.listening.lock().take();
                PeerError::Spawn(err)
            })
    }

    /// Close the listening socket and kick every connected client.
    ///
    /// The listener is released before this returns, so the address can be
    /// bound again right away. Receive loops finish on their own threads.
    /// Each kick waits at most about a second on a client that stopped
    /// reading. Calling it on a stopped server does nothing.
    pub fn stop(&self) {
        let Some(listening) = self.inner.listening.lock().take() else {
            return;
        };
        listening.run.stop();
        info!(addr = %listening.addr, "stopping server");

        if let Err(err) = TcpTransport::wake(listening.addr) {
            debug!(addr = %listening.addr, error = %err, "accept wake-up failed");
        }
        if !listening.run.wait_released(LISTENER_RELEASE_WAIT) {
            warn!(addr = %listening.addr, "accept loop still holds the listener");
        }

        for conn in self.inner.registry.drain() {
            kick(&conn);
        }
    }

    /// Write `message` to one client.
    ///
    /// Returns `false` when the message was not delivered. An unknown client
    /// is not an error: the message is dropped with a warning.
    pub fn send_to_client(&self, id: ClientId, message: &str) -> bool {
        let Some(conn) = self.inner.registry.get(&id) else {
            warn!(client_id = %id, "dropping message for unknown client");
            return false;
        };
        self.deliver(&conn, message)
    }

    /// Send `KICK` to a client, unregister it and close its socket.
    pub fn kick_client(&self, id: ClientId) -> bool {
        let Some(conn) = self.inner.registry.remove(&id) else {
            warn!(client_id = %id, "cannot kick unknown client");
            return false;
        };
        kick(&conn);
        true
    }

    /// Bound address while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.listening.lock().as_ref().map(|l| l.addr)
    }

    pub fn is_running(&self) -> bool {
        self.inner.listening.lock().is_some()
    }

    /// Identities of the clients registered right now.
    pub fn clients(&self) -> Vec<ClientId> {
        self.inner.registry.ids()
    }

    pub fn client_count(&self) -> usize {
        self.inner.registry.count()
    }

    pub fn is_connected(&self, id: ClientId) -> bool {
        self.inner.registry.contains(&id)
    }

    fn bind(&self) -> Result<(TcpTransport, Arc<Run>)> {
        let mut listening = self.inner.listening.lock();
        if let Some(current) = listening.as_ref() {
            return Err(PeerError::AlreadyRunning(current.addr));
        }

        let transport = TcpTransport::bind(&self.inner.config.bind_addr)?;
        let run = Arc::new(Run::default());
        *listening = Some(Listening {
            addr: transport.local_addr(),
            run: Arc::clone(&run),
        });
        Ok((transport, run))
    }

    fn accept_loop(&self, transport: TcpTransport, run: Arc<Run>) {
        let addr = transport.local_addr();
        info!(addr = %addr, "server listening");

        loop {
            let accepted = transport.accept();
            if run.is_stopped() {
                break;
            }
            match accepted {
                Ok((stream, peer)) => self.dispatch(stream, peer, Arc::clone(&run)),
                Err(err) => {
                    warn!(error = %err, "accept failed");
                    thread::sleep(ACCEPT_BACKOFF);
                }
            }
        }

        drop(transport);
        run.release();
        info!(addr = %addr, "server stopped");
    }

    fn dispatch(&self, stream: NetStream, peer: SocketAddr, run: Arc<Run>) {
        let id = ClientId::new_v4();
        let server = self.clone();
        let spawned = thread::Builder::new()
            .name("linewire-conn".to_string())
            .spawn(move || server.serve(id, stream, peer, &run));
        if let Err(err) = spawned {
            warn!(peer = %peer, error = %err, "failed to spawn connection thread");
        }
    }

    fn serve(&self, id: ClientId, stream: NetStream, peer: SocketAddr, run: &Run) {
        let (conn, mut reader) = match self.open(id, stream, peer) {
            Ok(parts) => parts,
            Err(err) => {
                warn!(client_id = %id, peer = %peer, error = %err, "connection setup failed");
                return;
            }
        };

        // Registered before the identity goes out: once the client holds
        // its id, the server can already route to it.
        let announced = conn.announce(|| {
            if !self.inner.registry.insert(Arc::clone(&conn)) {
                warn!(client_id = %id, "duplicate client id, closing");
                return false;
            }
            if run.is_stopped() {
                self.inner.registry.remove(&id);
                return false;
            }
            true
        });
        match announced {
            Ok(true) => {}
            Ok(false) => {
                conn.close();
                return;
            }
            Err(err) => {
                self.inner.registry.remove(&id);
                warn!(client_id = %id, peer = %peer, error = %err, "handshake failed");
                conn.close();
                return;
            }
        }

        info!(client_id = %id, peer = %peer, "client connected");
        self.inner.on_connect.dispatch("connect", |cb| cb(id));

        let reason = self.receive_loop(&conn, &mut reader);

        self.inner.registry.remove(&id);
        info!(client_id = %id, peer = %peer, reason = %reason, "client disconnected");
        self.inner.on_disconnect.dispatch("disconnect", |cb| cb(id));
        conn.close();
    }

    fn open(
        &self,
        id: ClientId,
        stream: NetStream,
        peer: SocketAddr,
    ) -> Result<(Arc<Connection>, LineReader<NetStream>)> {
        let config = self.inner.config.line_config();
        stream.set_nodelay(self.inner.config.nodelay)?;
        let reader = LineReader::with_config_net(stream.try_clone()?, config.clone())?;
        let conn = Connection::new(id, stream, peer, &config)?;
        Ok((Arc::new(conn), reader))
    }

    fn receive_loop(
        &self,
        conn: &Arc<Connection>,
        reader: &mut LineReader<NetStream>,
    ) -> DisconnectReason {
        let id = conn.id();
        loop {
            if conn.is_closed() {
                return DisconnectReason::Closed;
            }

            let line = match reader.read_line() {
                Ok(line) => line,
                Err(_) if conn.is_closed() => return DisconnectReason::Closed,
                Err(LineError::ConnectionClosed) => return DisconnectReason::Eof,
                Err(err) if err.is_timeout() => return DisconnectReason::IdleTimeout,
                Err(err) => return DisconnectReason::Io(err),
            };

            match Request::parse(&line) {
                Request::Direct { target, payload } => {
                    debug!(client_id = %id, to = %target, "direct message");
                    self.send_to_client(target, &protocol::routed_direct(id, payload));
                }
                Request::InvalidTarget { raw } => {
                    warn!(client_id = %id, raw_target = raw, "invalid direct message target");
                    self.deliver(conn, INVALID_UUID_REPLY);
                }
                Request::Broadcast { payload } => {
                    self.broadcast_from(id, payload);
                }
                Request::Disconnect => return DisconnectReason::Requested,
                Request::Opaque(raw) => {
                    self.inner.on_message.dispatch("message", |cb| cb(id, raw));
                }
            }
        }
    }

    fn broadcast_from(&self, sender: ClientId, payload: &str) {
        let line = protocol::routed_broadcast(sender, payload);
        let mut delivered = 0usize;
        for conn in self.inner.registry.connections() {
            if conn.id() != sender && self.deliver(&conn, &line) {
                delivered += 1;
            }
        }
        debug!(client_id = %sender, delivered, "broadcast");
    }

    /// Write one line; a failed write drops the client.
    fn deliver(&self, conn: &Arc<Connection>, line: &str) -> bool {
        match conn.send(line) {
            Ok(()) => true,
            Err(PeerError::Line(
                err @ (LineError::EmbeddedNewline | LineError::LineTooLong { .. }),
            )) => {
                warn!(client_id = %conn.id(), error = %err, "message rejected");
                false
            }
            Err(err) => {
                warn!(client_id = %conn.id(), error = %err, "write failed, dropping client");
                self.inner.registry.remove(&conn.id());
                conn.close();
                false
            }
        }
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("bind_addr", &self.inner.config.bind_addr)
            .field("local_addr", &self.local_addr())
            .field("clients", &self.client_count())
            .finish()
    }
}

fn kick(conn: &Connection) {
    if let Err(err) = conn.send_bounded(KICK, KICK_WRITE_TIMEOUT) {
        debug!(client_id = %conn.id(), error = %err, "kick notice not delivered");
    }
    conn.close();
    info!(client_id = %conn.id(), "client kicked");
}
