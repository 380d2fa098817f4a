/// Errors that can occur in transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind to the specified address.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    /// Failed to connect to the specified address.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The address resolved to no usable socket address.
    #[error("address {0} did not resolve to any socket address")]
    Unresolved(String),
}

impl TransportError {
    /// The underlying I/O error, if this error wraps one.
    pub fn io_source(&self) -> Option<&std::io::Error> {
        match self {
            TransportError::Bind { source, .. } | TransportError::Connect { source, .. } => {
                Some(source)
            }
            TransportError::Accept(source) | TransportError::Io(source) => Some(source),
            TransportError::Unresolved(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
