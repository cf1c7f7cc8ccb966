//! The event hub
//!
//! The hub is transport-agnostic: it serves any [`TransportServer`]. Each
//! accepted link becomes a [`Connection`] whose frames are decoded into
//! envelopes and dispatched through the [`EventTable`] in arrival order.
//!
//! # Example
//!
//! ```no_run
//! use cadence_router::{Hub, HubConfig, MemoryProfileStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let hub = Hub::new(HubConfig::default(), Arc::new(MemoryProfileStore::new())).unwrap();
//!     hub.serve_websocket("0.0.0.0:7440").await.unwrap();
//! }
//! ```

use cadence_core::{codec, events, Envelope};
use cadence_transport::{
    Handshake, TransportError, TransportEvent, TransportReceiver, TransportSender,
    TransportServer,
};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[cfg(feature = "websocket")]
use cadence_transport::WebSocketServer;

use crate::config::HubConfig;
use crate::connection::Connection;
use crate::dispatch::{EventTable, Handler};
use crate::error::{Result, RouterError};
use crate::handlers;
use crate::identity::{Authenticator, GuestOnly};
use crate::profile::ProfileStore;
use crate::state::{HubContext, HubState};

pub struct Hub {
    state: Arc<HubState>,
    table: Arc<EventTable<HubContext>>,
    authenticator: Arc<dyn Authenticator>,
    running: Arc<RwLock<bool>>,
    shutdown: CancellationToken,
    // one task per connection, awaited on shutdown
    tasks: TaskTracker,
}

impl Hub {
    /// Build a hub with the built-in handlers installed; every connection is a guest
    /// until [`with_authenticator`](Self::with_authenticator) says otherwise
    pub fn new(config: HubConfig, profiles: Arc<dyn ProfileStore>) -> Result<Self> {
        config.validate()?;

        let mut table = EventTable::new();
        handlers::register_all(&mut table)?;

        Ok(Self {
            state: Arc::new(HubState::new(config, profiles)),
            table: Arc::new(table),
            authenticator: Arc::new(GuestOnly),
            running: Arc::new(RwLock::new(false)),
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
        })
    }

    pub fn with_authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = authenticator;
        self
    }

    /// Add a handler; only possible before the hub starts serving
    pub fn register(&mut self, event: &str, handler: Handler<HubContext>) -> Result<()> {
        Arc::get_mut(&mut self.table)
            .ok_or_else(|| RouterError::Config("handlers are fixed once serving".into()))?
            .register(event, handler)
    }

    /// Accept connections from `server` until it closes or the hub stops
    pub async fn serve_on<S>(&self, mut server: S) -> Result<()>
    where
        S: TransportServer + 'static,
        S::Sender: 'static,
        S::Receiver: 'static,
    {
        info!(
            "{} accepting connections ({} auth)",
            self.state.config().name,
            self.authenticator.name()
        );
        *self.running.write() = true;
        let sweeper = self.spawn_sweeper();

        loop {
            let accepted = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = server.accept() => accepted,
            };

            match accepted {
                Ok((sender, receiver, handshake)) => {
                    self.handle_connection(Arc::new(sender), receiver, handshake);
                }
                Err(TransportError::ConnectionClosed) => {
                    info!("Listener closed");
                    break;
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            }
        }

        sweeper.abort();
        *self.running.write() = false;
        let _ = server.close().await;
        Ok(())
    }

    /// Serve WebSocket clients on `addr`
    #[cfg(feature = "websocket")]
    pub async fn serve_websocket(&self, addr: &str) -> Result<()> {
        let server = WebSocketServer::bind(addr).await?;
        self.serve_on(server).await
    }

    fn spawn_sweeper(&self) -> JoinHandle<()> {
        let state = Arc::clone(&self.state);
        let every = state.config().sweep_interval();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                state.sessions().evict_expired();
            }
        })
    }

    fn handle_connection(
        &self,
        sender: Arc<dyn TransportSender>,
        mut receiver: impl TransportReceiver + 'static,
        handshake: Handshake,
    ) {
        let state = Arc::clone(&self.state);
        let table = Arc::clone(&self.table);
        let authenticator = Arc::clone(&self.authenticator);
        let shutdown = self.shutdown.clone();

        self.tasks.spawn(async move {
            let Some(_slot) = state.reserve_slot() else {
                warn!(
                    "Connection limit ({}) reached, rejecting {:?}",
                    state.config().max_connections,
                    handshake.addr
                );
                let _ = sender.close().await;
                return;
            };

            let identity = authenticator.authenticate(&handshake);
            let session = handshake
                .session
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string());
            let conn = Arc::new(
                Connection::new(Uuid::new_v4().to_string(), session, identity, sender)
                    .with_addr(handshake.addr),
            );
            state.insert_connection(Arc::clone(&conn));
            info!(
                "Connection {} (session {}, {}) from {:?}",
                conn.id,
                conn.session_id,
                conn.identity()
                    .map(|i| i.id.as_str())
                    .unwrap_or("guest"),
                conn.addr
            );

            let ctx = HubContext::new(Arc::clone(&state), Arc::clone(&conn));
            if let Err(e) = table.dispatch(events::CONNECTION, ctx.clone(), None).await {
                report(&conn, events::CONNECTION, &e).await;
            }

            loop {
                let event = tokio::select! {
                    _ = conn.closed() => break,
                    _ = shutdown.cancelled() => break,
                    event = receiver.recv() => event,
                };

                match event {
                    Some(TransportEvent::Data(data)) => match codec::decode(&data) {
                        Ok(envelope) => handle_envelope(&table, &ctx, envelope).await,
                        Err(e) => warn!("Dropping malformed frame from {}: {}", conn.id, e),
                    },
                    Some(TransportEvent::Disconnected { reason }) => {
                        info!("Connection {} closed: {:?}", conn.id, reason);
                        break;
                    }
                    Some(TransportEvent::Error(e)) => {
                        error!("Transport error on {}: {}", conn.id, e);
                        break;
                    }
                    Some(TransportEvent::Connected) => {}
                    None => break,
                }
            }

            if let Err(e) = table.dispatch(events::DISCONNECT, ctx, None).await {
                warn!("Teardown of {} failed: {}", conn.id, e);
            }
        });
    }

    /// Stop accepting and end every connection's read loop
    pub fn stop(&self) {
        self.shutdown.cancel();
        *self.running.write() = false;
    }

    /// Stop, close every connection and let its teardown run, then wait for
    /// pending profile writes. Both waits are bounded by `flush_timeout`.
    pub async fn shutdown(&self) -> Result<()> {
        self.stop();
        for conn in self.state.connections() {
            conn.terminate().await;
        }

        let deadline = self.state.config().flush_timeout();
        self.tasks.close();
        if tokio::time::timeout(deadline, self.tasks.wait()).await.is_err() {
            warn!(
                "{} connections still tearing down after {:?}",
                self.state.connection_count(),
                deadline
            );
        }

        self.state.writer().flush_all(deadline).await
    }

    pub fn is_running(&self) -> bool {
        *self.running.read()
    }

    pub fn connection_count(&self) -> usize {
        self.state.connection_count()
    }

    pub fn config(&self) -> &HubConfig {
        self.state.config()
    }

    pub fn state(&self) -> &Arc<HubState> {
        &self.state
    }
}

async fn handle_envelope(table: &EventTable<HubContext>, ctx: &HubContext, envelope: Envelope) {
    if events::is_reserved(&envelope.event) {
        warn!("{} sent reserved event `{}`, dropping", ctx.conn.id, envelope.event);
        return;
    }
    // teardown is only ever raised by the hub itself
    if envelope.event == events::DISCONNECT && envelope.is_shapeless() {
        warn!("{} sent bare `disconnect`, dropping", ctx.conn.id);
        return;
    }

    debug!("{} <- {}", ctx.conn.id, envelope.event);
    if let Err(e) = table
        .dispatch(&envelope.event, ctx.clone(), envelope.data)
        .await
    {
        report(&ctx.conn, &envelope.event, &e).await;
    }
}

// Per-event failures are logged and echoed to the sender; the connection stays up
async fn report(conn: &Connection, event: &str, err: &RouterError) {
    warn!("`{}` from {} failed: {}", event, conn.id, err);
    if let Err(e) = conn.emit(&Envelope::error(event, err.to_string())).await {
        debug!("Could not report error to {}: {}", conn.id, e);
    }
}
