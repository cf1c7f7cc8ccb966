//! A live client connection as seen by handlers

use bytes::Bytes;
use cadence_core::{codec, ConnectionId, Envelope, SessionId};
use cadence_transport::TransportSender;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::Result;
use crate::identity::Identity;

/// One transport connection, bound to a session and maybe an identity
pub struct Connection {
    pub id: ConnectionId,
    pub session_id: SessionId,
    identity: Option<Identity>,
    pub addr: Option<SocketAddr>,
    sender: Arc<dyn TransportSender>,
    shutdown: CancellationToken,
    pub created_at: Instant,
}

impl Connection {
    pub fn new(
        id: impl Into<ConnectionId>,
        session_id: impl Into<SessionId>,
        identity: Option<Identity>,
        sender: Arc<dyn TransportSender>,
    ) -> Self {
        Self {
            id: id.into(),
            session_id: session_id.into(),
            identity,
            addr: None,
            sender,
            shutdown: CancellationToken::new(),
            created_at: Instant::now(),
        }
    }

    pub fn with_addr(mut self, addr: Option<SocketAddr>) -> Self {
        self.addr = addr;
        self
    }

    /// Logged-in user, `None` for guests
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn is_guest(&self) -> bool {
        self.identity.is_none()
    }

    /// Send one event to this client
    pub async fn emit(&self, envelope: &Envelope) -> Result<()> {
        let frame = codec::encode(envelope)?;
        self.send_raw(frame).await
    }

    /// Send `event` with a serializable payload
    pub async fn emit_json<T: Serialize>(&self, event: &str, data: &T) -> Result<()> {
        self.emit(&Envelope::with(event, data)?).await
    }

    pub async fn send_raw(&self, frame: Bytes) -> Result<()> {
        self.sender.send(frame).await?;
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.sender.is_connected() && !self.shutdown.is_cancelled()
    }

    /// Close the transport and stop this connection's read loop
    pub async fn terminate(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        debug!("Terminating connection {}", self.id);
        self.shutdown.cancel();
        let _ = self.sender.close().await;
    }

    /// Resolves once [`terminate`](Self::terminate) has been called
    pub async fn closed(&self) {
        self.shutdown.cancelled().await
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("session_id", &self.session_id)
            .field("identity", &self.identity)
            .field("addr", &self.addr)
            .finish()
    }
}
