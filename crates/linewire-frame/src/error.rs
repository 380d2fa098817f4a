/// Errors that can occur while reading or writing lines.
#[derive(Debug, thiserror::Error)]
pub enum LineError {
    /// A line exceeded the configured maximum length.
    #[error("line too long ({size} bytes, max {max})")]
    LineTooLong { size: usize, max: usize },

    /// Outgoing text contained a line break and would split into several messages.
    #[error("message contains an embedded line break")]
    EmbeddedNewline,

    /// An I/O error occurred while reading or writing lines.
    #[error("line I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed.
    #[error("connection closed")]
    ConnectionClosed,
}

impl LineError {
    /// True when the error is a read/write timeout on the underlying socket.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            LineError::Io(err)
                if err.kind() == std::io::ErrorKind::WouldBlock
                    || err.kind() == std::io::ErrorKind::TimedOut
        )
    }
}

pub type Result<T> = std::result::Result<T, LineError>;
