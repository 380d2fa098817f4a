/// Errors that can occur in server and client operations.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] linewire_transport::TransportError),

    /// Line-level error.
    #[error("line error: {0}")]
    Line(#[from] linewire_frame::LineError),

    /// Handshake failed.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// Peer disconnected.
    #[error("peer disconnected: {0}")]
    Disconnected(String),

    /// The client has no live session to send on.
    #[error("not connected")]
    NotConnected,

    /// `connect()` called on a client that already holds a session.
    #[error("already connected as {0}")]
    AlreadyConnected(crate::protocol::ClientId),

    /// `connect()` called while another attempt is still running.
    #[error("connection attempt already in progress")]
    ConnectInProgress,

    /// `start()` called on a server whose accept loop is already running.
    #[error("server already running on {0}")]
    AlreadyRunning(std::net::SocketAddr),

    /// Every connection attempt failed.
    #[error("failed to connect after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    /// A blocking operation timed out.
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// A worker thread could not be spawned.
    #[error("failed to spawn thread: {0}")]
    Spawn(std::io::Error),
}

pub type Result<T> = std::result::Result<T, PeerError>;
