use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use linewire_frame::{LineConfig, LineWriter};
use linewire_transport::NetStream;
use parking_lot::{Mutex, RwLock};

use crate::error::{PeerError, Result};
use crate::handshake;
use crate::protocol::ClientId;

/// Server-side state of one accepted connection.
///
/// Owns the write half. Writers are serialized through a mutex so lines
/// from concurrent senders never interleave. The read half belongs to the
/// connection's receive loop.
pub struct Connection {
    id: ClientId,
    peer_addr: SocketAddr,
    stream: NetStream,
    writer: Mutex<LineWriter<NetStream>>,
    closed: AtomicBool,
}

impl Connection {
    /// Wrap an accepted stream. The write timeout from `config` is applied.
    pub fn new(
        id: ClientId,
        stream: NetStream,
        peer_addr: SocketAddr,
        config: &LineConfig,
    ) -> Result<Self> {
        let writer = LineWriter::with_config_net(stream.try_clone()?, config.clone())?;
        Ok(Self {
            id,
            peer_addr,
            stream,
            writer: Mutex::new(writer),
            closed: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Run `register`, then write the handshake line carrying this
    /// connection's identity.
    ///
    /// The writer stays locked throughout, so once `register` has made the
    /// connection reachable no other line can be written ahead of the
    /// identity. Returns `Ok(false)` without writing if `register` declines.
    pub fn announce(&self, register: impl FnOnce() -> bool) -> Result<bool> {
        let mut writer = self.writer.lock();
        if !register() {
            return Ok(false);
        }
        handshake::send_identity(&mut *writer, self.id)?;
        Ok(true)
    }

    /// Write one line and flush.
    pub fn send(&self, line: &str) -> Result<()> {
        self.writer.lock().send(line)?;
        Ok(())
    }

    /// Write one line, giving up after roughly `timeout`.
    ///
    /// Meant for a last notice before [`close`](Self::close): waiting for the
    /// writer is bounded, and the write timeout set on the socket stays in
    /// place afterwards.
    pub fn send_bounded(&self, line: &str, timeout: Duration) -> Result<()> {
        let Some(mut writer) = self.writer.try_lock_for(timeout) else {
            return Err(PeerError::Timeout(timeout));
        };
        self.stream.set_write_timeout(Some(timeout))?;
        writer.send(line)?;
        Ok(())
    }

    /// Shut the socket down. Returns `true` only for the call that closed it.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        if let Err(err) = self.stream.shutdown() {
            tracing::debug!(client_id = %self.id, error = %err, "socket shutdown failed");
        }
        true
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Live connections keyed by identity.
#[derive(Debug, Default)]
pub struct Registry {
    entries: RwLock<HashMap<ClientId, Arc<Connection>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection. An existing entry is never overwritten.
    pub fn insert(&self, conn: Arc<Connection>) -> bool {
        match self.entries.write().entry(conn.id()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(conn);
                true
            }
        }
    }

    pub fn remove(&self, id: &ClientId) -> Option<Arc<Connection>> {
        self.entries.write().remove(id)
    }

    pub fn get(&self, id: &ClientId) -> Option<Arc<Connection>> {
        self.entries.read().get(id).cloned()
    }

    pub fn contains(&self, id: &ClientId) -> bool {
        self.entries.read().contains_key(id)
    }

    /// Identities registered at the time of the call.
    pub fn ids(&self) -> Vec<ClientId> {
        self.entries.read().keys().copied().collect()
    }

    /// Connections registered at the time of the call.
    pub fn connections(&self) -> Vec<Arc<Connection>> {
        self.entries.read().values().cloned().collect()
    }

    /// Number of registered connections.
    pub fn count(&self) -> usize {
        self.entries.read().len()
    }

    /// Remove and return every entry.
    pub fn drain(&self) -> Vec<Arc<Connection>> {
        self.entries.write().drain().map(|(_, conn)| conn).collect()
    }
}
