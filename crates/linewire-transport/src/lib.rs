//! TCP transport for linewire.
//!
//! This is the lowest layer of linewire: it binds listeners, accepts and
//! dials connections, and hands out [`NetStream`] handles. Everything else
//! (line framing, the message protocol, server and client) builds on top of
//! the types provided here.

pub mod error;
pub mod stream;
pub mod tcp;

pub use error::{Result, TransportError};
pub use stream::NetStream;
pub use tcp::TcpTransport;
