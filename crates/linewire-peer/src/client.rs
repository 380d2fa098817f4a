use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use linewire_frame::{LineConfig, LineError, LineReader, DEFAULT_MAX_LINE_LENGTH};
use linewire_transport::{NetStream, TcpTransport};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use crate::callbacks::CallbackList;
use crate::error::{PeerError, Result};
use crate::handshake::read_identity;
use crate::protocol::{self, ClientId, DEFAULT_PORT, DISCONNECT, KICK};
use crate::registry::Connection;
use crate::retry::RetryPolicy;

type MessageFn = dyn Fn(&str) + Send + Sync;
type KickFn = dyn Fn() + Send + Sync;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server address, `host:port`.
    pub addr: String,
    /// Connection attempts per `connect()` call. Default: 3.
    pub max_retries: u32,
    /// Sleep between two attempts. Default: 1 s.
    pub retry_delay: Duration,
    /// Timeout for each TCP dial. Default: none (OS default).
    pub connect_timeout: Option<Duration>,
    /// Time allowed for the server to announce our identity. Default: 5 s.
    pub handshake_timeout: Duration,
    /// Read timeout once connected. Default: none.
    pub read_timeout: Option<Duration>,
    /// Write timeout once connected. Default: none.
    pub write_timeout: Option<Duration>,
    pub max_line_length: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            addr: format!("127.0.0.1:{DEFAULT_PORT}"),
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            connect_timeout: None,
            handshake_timeout: Duration::from_secs(5),
            read_timeout: None,
            write_timeout: None,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }
}

impl ClientConfig {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            ..Self::default()
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.retry_delay)
    }

    fn line_config(&self) -> LineConfig {
        LineConfig {
            max_line_length: self.max_line_length,
            read_timeout: self.read_timeout,
            write_timeout: self.write_timeout,
        }
    }
}

/// Client lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// The server sent `KICK`. `connect()` may be called again.
    Kicked,
}

/// One established connection and the completion flag of its receive loop.
struct Session {
    conn: Connection,
    finished: Mutex<bool>,
    finished_cv: Condvar,
}

impl Session {
    fn new(conn: Connection) -> Self {
        Self {
            conn,
            finished: Mutex::new(false),
            finished_cv: Condvar::new(),
        }
    }

    fn finish(&self) {
        *self.finished.lock() = true;
        self.finished_cv.notify_all();
    }

    fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut finished = self.finished.lock();
        while !*finished {
            if self
                .finished_cv
                .wait_until(&mut finished, deadline)
                .timed_out()
            {
                return *finished;
            }
        }
        true
    }

    fn is_live(&self) -> bool {
        !self.conn.is_closed()
    }
}

struct Inner {
    config: ClientConfig,
    // Lock order: `state` before `session`.
    state: Mutex<ConnectionState>,
    session: Mutex<Option<Arc<Session>>>,
    on_message: CallbackList<MessageFn>,
    on_kick: CallbackList<KickFn>,
}

impl Inner {
    fn is_current(&self, session: &Arc<Session>) -> bool {
        self.session
            .lock()
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, session))
    }

    fn live_session(&self) -> Option<Arc<Session>> {
        self.session
            .lock()
            .as_ref()
            .filter(|session| session.is_live())
            .cloned()
    }
}

/// One outbound connection to a linewire server.
///
/// Cheap to clone; clones share the connection.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(ConnectionState::Disconnected),
                session: Mutex::new(None),
                on_message: CallbackList::new(),
                on_kick: CallbackList::new(),
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Called with every line received from the server except `KICK`.
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.inner.on_message.register(Arc::new(callback));
    }

    /// Called when the server kicks this client, before the socket is closed.
    pub fn on_kick<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.on_kick.register(Arc::new(callback));
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.lock()
    }

    /// Identity assigned by the server for the live session.
    pub fn id(&self) -> Option<ClientId> {
        self.inner.live_session().map(|session| session.conn.id())
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected && self.inner.live_session().is_some()
    }

    /// Dial the server, read the assigned identity and start receiving.
    ///
    /// Failed dials and failed handshakes are retried per
    /// [`ClientConfig::max_retries`]. On exhaustion the client is left
    /// disconnected and [`PeerError::RetriesExhausted`] is returned.
    pub fn connect(&self) -> Result<ClientId> {
        {
            let mut state = self.inner.state.lock();
            match *state {
                ConnectionState::Connecting => return Err(PeerError::ConnectInProgress),
                ConnectionState::Connected => {
                    if let Some(session) = self.inner.live_session() {
                        return Err(PeerError::AlreadyConnected(session.conn.id()));
                    }
                }
                ConnectionState::Disconnected | ConnectionState::Kicked => {}
            }
            *state = ConnectionState::Connecting;
        }

        let config = &self.inner.config;
        info!(addr = %config.addr, max_attempts = config.retry_policy().attempts(), "connecting");

        let opened = config.retry_policy().run(|attempt| {
            debug!(addr = %config.addr, attempt, "dialing");
            self.open_session()
        });

        let mut state = self.inner.state.lock();
        let (session, reader) = match opened {
            Ok(parts) => parts,
            Err(err) => {
                *state = ConnectionState::Disconnected;
                return Err(err);
            }
        };
        let id = session.conn.id();
        *self.inner.session.lock() = Some(Arc::clone(&session));
        *state = ConnectionState::Connected;

        let inner = Arc::clone(&self.inner);
        let loop_session = Arc::clone(&session);
        let spawned = thread::Builder::new()
            .name("linewire-client".to_string())
            .spawn(move || receive_loop(&inner, &loop_session, reader));
        if let Err(err) = spawned {
            session.conn.close();
            session.finish();
            *state = ConnectionState::Disconnected;
            return Err(PeerError::Spawn(err));
        }

        info!(client_id = %id, addr = %config.addr, "connected");
        Ok(id)
    }

    /// Send `DISCONNECT` and close the socket.
    ///
    /// The socket is closed even if the request could not be written. Does
    /// nothing when there is no live session.
    pub fn disconnect(&self) -> Result<()> {
        let mut state = self.inner.state.lock();
        let Some(session) = self.inner.live_session() else {
            return Ok(());
        };

        if let Err(err) = session.conn.send(DISCONNECT) {
            warn!(client_id = %session.conn.id(), error = %err, "disconnect request not delivered");
        }
        session.conn.close();
        *state = ConnectionState::Disconnected;
        info!(client_id = %session.conn.id(), "disconnected");
        Ok(())
    }

    /// Write one raw line to the server.
    pub fn send_message(&self, text: &str) -> Result<()> {
        let session = self.inner.live_session().ok_or(PeerError::NotConnected)?;
        session.conn.send(text)
    }

    /// `TO <target>: <text>`
    pub fn send_message_to_client(&self, target: ClientId, text: &str) -> Result<()> {
        self.send_message(&protocol::direct(target, text))
    }

    /// `GLOBAL: <text>`
    pub fn send_broadcast_message(&self, text: &str) -> Result<()> {
        self.send_message(&protocol::broadcast(text))
    }

    /// Block until the receive loop of the latest session has ended.
    ///
    /// Returns `false` on timeout. Returns `true` immediately if no session
    /// was ever established.
    pub fn wait_closed(&self, timeout: Duration) -> bool {
        let session = self.inner.session.lock().clone();
        match session {
            Some(session) => session.wait(timeout),
            None => true,
        }
    }

    fn open_session(&self) -> Result<(Arc<Session>, LineReader<NetStream>)> {
        let config = &self.inner.config;
        let stream = TcpTransport::connect(&config.addr, config.connect_timeout)?;
        let peer_addr = stream.peer_addr()?;
        let line_config = config.line_config();

        let handshake_config = LineConfig {
            read_timeout: Some(config.handshake_timeout),
            ..line_config.clone()
        };
        let mut reader = LineReader::with_config_net(stream.try_clone()?, handshake_config)?;
        let id = read_identity(&mut reader, config.handshake_timeout)?;
        reader.set_read_timeout(config.read_timeout)?;

        let conn = Connection::new(id, stream, peer_addr, &line_config)?;
        Ok((Arc::new(Session::new(conn)), reader))
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("addr", &self.inner.config.addr)
            .field("state", &self.state())
            .field("id", &self.id())
            .finish()
    }
}

fn receive_loop(inner: &Inner, session: &Arc<Session>, mut reader: LineReader<NetStream>) {
    let id = session.conn.id();
    let mut kicked = false;

    loop {
        match reader.read_line() {
            Ok(line) if line == KICK => {
                info!(client_id = %id, "kicked by server");
                inner.on_kick.dispatch("kick", |cb| cb());
                kicked = true;
                break;
            }
            Ok(line) => {
                inner.on_message.dispatch("message", |cb| cb(&line));
            }
            Err(_) if session.conn.is_closed() => {
                debug!(client_id = %id, "session closed locally");
                break;
            }
            Err(LineError::ConnectionClosed) => {
                info!(client_id = %id, "server closed the connection");
                break;
            }
            Err(err) => {
                warn!(client_id = %id, error = %err, "receive failed");
                break;
            }
        }
    }

    session.conn.close();
    {
        let mut state = inner.state.lock();
        if inner.is_current(session) && *state == ConnectionState::Connected {
            *state = if kicked {
                ConnectionState::Kicked
            } else {
                ConnectionState::Disconnected
            };
        }
    }
    session.finish();
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::server::{Server, ServerConfig};

    const WAIT: Duration = Duration::from_secs(5);

    fn wait_until(cond: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + WAIT;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    fn loopback_server() -> Server {
        let server = Server::new(ServerConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            ..ServerConfig::default()
        });
        server.spawn().unwrap();
        server
    }

    fn client_for(server: &Server) -> Client {
        let addr = server.local_addr().unwrap().to_string();
        Client::new(ClientConfig {
            retry_delay: Duration::from_millis(10),
            ..ClientConfig::new(addr)
        })
    }

    /// An address nothing is listening on.
    fn dead_addr() -> String {
        let transport = TcpTransport::bind("127.0.0.1:0").unwrap();
        transport.local_addr().to_string()
    }

    #[test]
    fn config_defaults() {
        let config = ClientConfig::new("example:1");
        assert_eq!(config.addr, "example:1");
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay, Duration::from_secs(1));
        assert_eq!(config.handshake_timeout, Duration::from_secs(5));
        assert!(config.read_timeout.is_none());
    }

    #[test]
    fn connect_receives_server_assigned_id() {
        let server = loopback_server();
        let client = client_for(&server);
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(client.id().is_none());

        let id = client.connect().unwrap();
        assert_eq!(client.id(), Some(id));
        assert!(client.is_connected());
        assert!(server.is_connected(id));

        client.disconnect().unwrap();
        server.stop();
    }

    #[test]
    fn connect_twice_is_rejected() {
        let server = loopback_server();
        let client = client_for(&server);
        let id = client.connect().unwrap();

        let err = client.connect().unwrap_err();
        assert!(matches!(err, PeerError::AlreadyConnected(existing) if existing == id));
        server.stop();
    }

    #[test]
    fn retries_exhausted_against_dead_port() {
        let client = Client::new(ClientConfig {
            max_retries: 3,
            retry_delay: Duration::from_millis(30),
            ..ClientConfig::new(dead_addr())
        });

        let start = Instant::now();
        let err = client.connect().unwrap_err();

        assert!(matches!(err, PeerError::RetriesExhausted { attempts: 3, .. }));
        assert!(start.elapsed() >= Duration::from_millis(60));
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(!client.is_connected());
        assert!(client.wait_closed(Duration::from_millis(10)));
    }

    #[test]
    fn garbage_handshake_counts_as_failed_attempt() {
        let transport = TcpTransport::bind("127.0.0.1:0").unwrap();
        let addr = transport.local_addr().to_string();
        let accepts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&accepts);
        let fake = thread::spawn(move || {
            for _ in 0..2 {
                let (stream, _) = transport.accept().unwrap();
                counter.fetch_add(1, Ordering::SeqCst);
                let mut writer = linewire_frame::LineWriter::new(stream);
                writer.send("welcome!").unwrap();
            }
        });

        let client = Client::new(ClientConfig {
            max_retries: 2,
            retry_delay: Duration::from_millis(10),
            ..ClientConfig::new(addr)
        });
        let err = client.connect().unwrap_err();
        fake.join().unwrap();

        match err {
            PeerError::RetriesExhausted {
                attempts,
                last_error,
            } => {
                assert_eq!(attempts, 2);
                assert!(last_error.contains("handshake"), "{last_error}");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(accepts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn send_requires_connection() {
        let client = Client::new(ClientConfig::new(dead_addr()));
        assert!(matches!(
            client.send_message("hi").unwrap_err(),
            PeerError::NotConnected
        ));
        assert!(matches!(
            client.send_broadcast_message("hi").unwrap_err(),
            PeerError::NotConnected
        ));
        client.disconnect().unwrap();
    }

    #[test]
    fn direct_and_broadcast_between_clients() {
        let server = loopback_server();
        let alice = client_for(&server);
        let bob = client_for(&server);

        let inbox = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&inbox);
        alice.subscribe(move |line| sink.lock().push(line.to_string()));

        let alice_id = alice.connect().unwrap();
        let bob_id = bob.connect().unwrap();
        assert_eq!(server.client_count(), 2);

        bob.send_message_to_client(alice_id, "psst").unwrap();
        bob.send_broadcast_message("hello all").unwrap();

        assert!(wait_until(|| inbox.lock().len() == 2));
        assert_eq!(
            *inbox.lock(),
            vec![
                format!("FROM {bob_id}: psst"),
                format!("GLOBAL {bob_id}: hello all"),
            ]
        );
        server.stop();
    }

    #[test]
    fn invalid_target_reply_reaches_subscriber() {
        let server = loopback_server();
        let client = client_for(&server);
        let inbox = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&inbox);
        client.subscribe(move |line| sink.lock().push(line.to_string()));
        client.connect().unwrap();

        client.send_message("TO nobody: hi").unwrap();

        assert!(wait_until(|| !inbox.lock().is_empty()));
        assert_eq!(inbox.lock()[0], protocol::INVALID_UUID_REPLY);
        assert!(client.is_connected());
        server.stop();
    }

    #[test]
    fn kick_fires_callbacks_and_closes() {
        let server = loopback_server();
        let client = client_for(&server);
        let kicks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&kicks);
        client.on_kick(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let messages = Arc::new(AtomicUsize::new(0));
        let m = Arc::clone(&messages);
        client.subscribe(move |_| {
            m.fetch_add(1, Ordering::SeqCst);
        });

        let id = client.connect().unwrap();
        assert!(server.is_connected(id));
        assert!(server.kick_client(id));

        assert!(client.wait_closed(WAIT));
        assert_eq!(kicks.load(Ordering::SeqCst), 1);
        assert_eq!(messages.load(Ordering::SeqCst), 0);
        assert_eq!(client.state(), ConnectionState::Kicked);
        assert!(!client.is_connected());
        assert!(matches!(
            client.send_message("still there?").unwrap_err(),
            PeerError::NotConnected
        ));
        server.stop();
    }

    #[test]
    fn disconnect_round_trip() {
        let server = loopback_server();
        let disconnects = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&disconnects);
        server.on_client_disconnect(move |id| sink.lock().push(id));

        let client = client_for(&server);
        let id = client.connect().unwrap();
        client.disconnect().unwrap();

        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(client.wait_closed(WAIT));
        assert!(wait_until(|| !server.is_connected(id)));
        assert!(wait_until(|| disconnects.lock().len() == 1));
        thread::sleep(Duration::from_millis(50));
        assert_eq!(*disconnects.lock(), vec![id]);
        server.stop();
    }

    #[test]
    fn reconnect_after_kick_gets_new_identity() {
        let server = loopback_server();
        let client = client_for(&server);
        let first = client.connect().unwrap();
        assert!(server.is_connected(first));
        server.kick_client(first);
        assert!(client.wait_closed(WAIT));

        let second = client.connect().unwrap();
        assert_ne!(first, second);
        assert_eq!(client.state(), ConnectionState::Connected);
        assert_eq!(client.id(), Some(second));
        server.stop();
    }

    #[test]
    fn server_stop_leaves_client_kicked() {
        let server = loopback_server();
        let client = client_for(&server);
        client.connect().unwrap();
        assert_eq!(server.client_count(), 1);

        server.stop();

        assert!(client.wait_closed(WAIT));
        assert_eq!(client.state(), ConnectionState::Kicked);
    }
}
