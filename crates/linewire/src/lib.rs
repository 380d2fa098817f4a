//! Newline-delimited TCP messaging.
//!
//! A server hands every client a UUID on connect and routes text lines
//! between clients: direct (`TO <id>: ...`), broadcast (`GLOBAL: ...`) or
//! application-defined lines delivered to subscribers.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP listener/stream handles
//! - [`frame`]: Line reading and writing, plus a tokio codec (behind `async`)
//! - [`peer`]: Protocol, server, client and registry (behind `peer` feature)

/// Re-export transport types.
pub mod transport {
    pub use linewire_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use linewire_frame::*;
}

/// Re-export peer types (requires `peer` feature).
#[cfg(feature = "peer")]
pub mod peer {
    pub use linewire_peer::*;
}
