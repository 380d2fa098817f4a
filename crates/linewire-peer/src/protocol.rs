//! The linewire message protocol.
//!
//! One message per line. Client → server:
//!
//! ```text
//! direct      := "TO" <ws>+ <uuid> ":" <ws>* <payload>
//! broadcast   := "GLOBAL:" <ws>* <payload>
//! disconnect  := "DISCONNECT"
//! opaque      := <any other line>
//! ```
//!
//! Server → client:
//!
//! ```text
//! handshake   := <uuid>                      ; first line after accept
//! routed-dm   := "FROM" <ws>+ <uuid> ":" <ws>* <payload>
//! routed-bc   := "GLOBAL" <ws>+ <uuid> ":" <ws>* <payload>
//! kick        := "KICK"
//! error-reply := "Invalid UUID format."
//! ```

use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

/// Port servers listen on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 4000;

/// Server → client: the connection is being closed by the server.
pub const KICK: &str = "KICK";
/// Client → server: orderly disconnection request.
pub const DISCONNECT: &str = "DISCONNECT";
/// Server → client: reply to a direct message whose target is not a UUID.
pub const INVALID_UUID_REPLY: &str = "Invalid UUID format.";

const DIRECT_PREFIX: &str = "TO";
const BROADCAST_PREFIX: &str = "GLOBAL";
const ROUTED_DIRECT_PREFIX: &str = "FROM";

/// Length of a hyphenated UUID string.
const HYPHENATED_LEN: usize = 36;

/// Server-assigned identity of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(Uuid);

impl ClientId {
    /// Generate a fresh random identity.
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.hyphenated(), f)
    }
}

/// The text is not a hyphenated UUID.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid client id '{input}'")]
pub struct ParseClientIdError {
    pub input: String,
}

impl FromStr for ClientId {
    type Err = ParseClientIdError;

    /// Only the 36-character hyphenated form is accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != HYPHENATED_LEN {
            return Err(ParseClientIdError {
                input: s.to_string(),
            });
        }
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| ParseClientIdError {
                input: s.to_string(),
            })
    }
}

/// A line received by the server, classified by its first token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request<'a> {
    /// `TO <uuid>: <payload>` with a well-formed target.
    Direct { target: ClientId, payload: &'a str },
    /// `TO ...` whose target is missing or not a UUID.
    InvalidTarget { raw: &'a str },
    /// `GLOBAL: <payload>`.
    Broadcast { payload: &'a str },
    /// `DISCONNECT`.
    Disconnect,
    /// Anything else, untouched.
    Opaque(&'a str),
}

impl<'a> Request<'a> {
    /// Classify one received line.
    pub fn parse(line: &'a str) -> Self {
        match first_token(line) {
            DIRECT_PREFIX => parse_direct(&line[DIRECT_PREFIX.len()..]),
            BROADCAST_PREFIX => match line[BROADCAST_PREFIX.len()..].strip_prefix(':') {
                Some(payload) => Request::Broadcast {
                    payload: payload.trim(),
                },
                None => Request::Opaque(line),
            },
            DISCONNECT => Request::Disconnect,
            _ => Request::Opaque(line),
        }
    }
}

/// Text before the first `:` or whitespace.
fn first_token(line: &str) -> &str {
    match line.find(|c: char| c == ':' || c.is_whitespace()) {
        Some(end) => &line[..end],
        None => line,
    }
}

fn parse_direct(rest: &str) -> Request<'_> {
    let Some((raw, payload)) = rest.split_once(':') else {
        return Request::InvalidTarget { raw: rest.trim() };
    };
    let raw = raw.trim();
    match raw.parse::<ClientId>() {
        Ok(target) => Request::Direct {
            target,
            payload: payload.trim(),
        },
        Err(_) => Request::InvalidTarget { raw },
    }
}

/// A line received by a client, classified for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice<'a> {
    /// The server closed this connection.
    Kick,
    /// A direct message we sent had a malformed target.
    InvalidTarget,
    /// Direct message routed from another client.
    Direct { from: ClientId, payload: &'a str },
    /// Broadcast from another client.
    Broadcast { from: ClientId, payload: &'a str },
    /// Any other line.
    Other(&'a str),
}

impl<'a> Notice<'a> {
    pub fn parse(line: &'a str) -> Self {
        if line == KICK {
            return Notice::Kick;
        }
        if line == INVALID_UUID_REPLY {
            return Notice::InvalidTarget;
        }
        if let Some((from, payload)) = routed(line, ROUTED_DIRECT_PREFIX) {
            return Notice::Direct { from, payload };
        }
        if let Some((from, payload)) = routed(line, BROADCAST_PREFIX) {
            return Notice::Broadcast { from, payload };
        }
        Notice::Other(line)
    }
}

fn routed<'a>(line: &'a str, prefix: &str) -> Option<(ClientId, &'a str)> {
    let rest = line.strip_prefix(prefix)?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let (from, payload) = rest.split_once(':')?;
    let from = from.trim().parse().ok()?;
    Some((from, payload.trim_start()))
}

/// `TO <target>: <text>`
pub fn direct(target: ClientId, text: &str) -> String {
    format!("{DIRECT_PREFIX} {target}: {text}")
}

/// `GLOBAL: <text>`
pub fn broadcast(text: &str) -> String {
    format!("{BROADCAST_PREFIX}: {text}")
}

/// `FROM <from>: <payload>`
pub fn routed_direct(from: ClientId, payload: &str) -> String {
    format!("{ROUTED_DIRECT_PREFIX} {from}: {payload}")
}

/// `GLOBAL <from>: <payload>`
pub fn routed_broadcast(from: ClientId, payload: &str) -> String {
    format!("{BROADCAST_PREFIX} {from}: {payload}")
}
