//! Connection management for linewire.
//!
//! A [`Server`] accepts TCP clients, hands each one a fresh [`ClientId`] and
//! routes newline-delimited messages between them (direct, broadcast or
//! application-defined). A [`Client`] dials a server with bounded retries,
//! learns its identity from the handshake line and exchanges messages with
//! it. The two only share the message protocol in [`protocol`].

pub mod callbacks;
pub mod client;
pub mod error;
pub mod handshake;
pub mod protocol;
pub mod registry;
pub mod retry;
pub mod server;

pub use callbacks::CallbackList;
pub use client::{Client, ClientConfig, ConnectionState};
pub use error::{PeerError, Result};
pub use handshake::{read_identity, send_identity};
pub use protocol::{
    ClientId, Notice, ParseClientIdError, Request, DEFAULT_PORT, DISCONNECT, INVALID_UUID_REPLY,
    KICK,
};
pub use registry::{Connection, Registry};
pub use retry::RetryPolicy;
pub use server::{Server, ServerConfig};
