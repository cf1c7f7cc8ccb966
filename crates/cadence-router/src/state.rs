//! Shared hub state
//!
//! Everything handlers mutate lives here, constructed once per [`Hub`](crate::Hub)
//! and passed around by `Arc`. Tests can [`reset`](HubState::reset) it between cases.

use cadence_core::ConnectionId;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::config::HubConfig;
use crate::connection::Connection;
use crate::directory::ConnectionDirectory;
use crate::profile::ProfileStore;
use crate::session::SessionStore;
use crate::writer::PlaylistWriter;

pub struct HubState {
    config: HubConfig,
    connections: DashMap<ConnectionId, Arc<Connection>>,
    reserved: AtomicUsize,
    directory: ConnectionDirectory,
    sessions: SessionStore,
    writer: PlaylistWriter,
}

impl HubState {
    pub fn new(config: HubConfig, profiles: Arc<dyn ProfileStore>) -> Self {
        Self {
            sessions: SessionStore::new(config.guest_session_ttl()),
            writer: PlaylistWriter::new(profiles, config.retry_policy()),
            connections: DashMap::new(),
            reserved: AtomicUsize::new(0),
            directory: ConnectionDirectory::new(),
            config,
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn connection(&self, id: &str) -> Option<Arc<Connection>> {
        self.connections.get(id).map(|c| c.clone())
    }

    pub fn insert_connection(&self, conn: Arc<Connection>) {
        self.connections.insert(conn.id.clone(), conn);
    }

    pub fn remove_connection(&self, id: &str) -> Option<Arc<Connection>> {
        self.connections.remove(id).map(|(_, c)| c)
    }

    /// Snapshot of every live connection
    pub fn connections(&self) -> Vec<Arc<Connection>> {
        self.connections.iter().map(|c| c.value().clone()).collect()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Claim one of `max_connections` slots; `None` when the hub is full.
    /// The slot is released when the returned guard drops.
    pub fn reserve_slot(self: &Arc<Self>) -> Option<ConnectionSlot> {
        let max = self.config.max_connections;
        self.reserved
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (max == 0 || n < max).then_some(n + 1)
            })
            .ok()?;
        Some(ConnectionSlot {
            state: Arc::clone(self),
        })
    }

    /// Slots currently held, including connections still authenticating
    pub fn reserved_slots(&self) -> usize {
        self.reserved.load(Ordering::Acquire)
    }

    pub fn directory(&self) -> &ConnectionDirectory {
        &self.directory
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn writer(&self) -> &PlaylistWriter {
        &self.writer
    }

    pub fn profiles(&self) -> &Arc<dyn ProfileStore> {
        self.writer.store()
    }

    /// Forget all connections, bindings and sessions
    pub fn reset(&self) {
        self.connections.clear();
        self.directory.clear();
        self.sessions.clear();
    }
}

/// A held connection slot, see [`HubState::reserve_slot`]
pub struct ConnectionSlot {
    state: Arc<HubState>,
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.state.reserved.fetch_sub(1, Ordering::AcqRel);
    }
}

/// What a handler runs against: the hub and the connection the event came from
#[derive(Clone)]
pub struct HubContext {
    pub hub: Arc<HubState>,
    pub conn: Arc<Connection>,
}

impl HubContext {
    pub fn new(hub: Arc<HubState>, conn: Arc<Connection>) -> Self {
        Self { hub, conn }
    }
}
