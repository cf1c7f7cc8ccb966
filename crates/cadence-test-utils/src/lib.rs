//! Common test helpers for cadence tests
//!
//! - Condition-based waiting (no hardcoded sleeps)
//! - [`TestHub`]: a hub served over the in-process channel transport, cleaned up on drop
//! - [`TestClient`]: a scripted client speaking envelopes
//! - [`FlakyProfileStore`]: a profile store with injectable failures and latency

use async_trait::async_trait;
use bytes::Bytes;
use cadence_core::{codec, ConnectionId, Envelope, PlaylistState};
use cadence_router::{
    Hub, HubConfig, Identity, MemoryProfileStore, ProfileStore, RouterError, StaticTokens,
};
use cadence_transport::{channel_server, ChannelClient, ChannelConnector, Handshake};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;

/// Default test timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default condition check interval
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_millis(10);

// ============================================================================
// Condition-Based Waiting
// ============================================================================

/// Wait for a condition with timeout - condition-based, not time-based
pub async fn wait_for<F, Fut>(check: F, interval: Duration, max_wait: Duration) -> bool
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = Instant::now();
    while start.elapsed() < max_wait {
        if check().await {
            return true;
        }
        tokio::time::sleep(interval).await;
    }
    false
}

/// Wait for an atomic counter to reach a target value
pub async fn wait_for_count(counter: &AtomicU32, target: u32, max_wait: Duration) -> bool {
    wait_for(
        || async { counter.load(Ordering::SeqCst) >= target },
        DEFAULT_CHECK_INTERVAL,
        max_wait,
    )
    .await
}

// ============================================================================
// Test Hub - RAII wrapper with proper cleanup
// ============================================================================

/// A hub served over in-process channels that stops on drop
pub struct TestHub {
    hub: Arc<Hub>,
    connector: ChannelConnector,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl TestHub {
    /// Guests only, in-memory profiles, short timeouts
    pub async fn start() -> Self {
        Self::start_with(
            Self::test_config(),
            Arc::new(MemoryProfileStore::new()),
            StaticTokens::new(),
        )
        .await
    }

    /// Config used by [`start`](Self::start)
    pub fn test_config() -> HubConfig {
        HubConfig {
            name: "Test Hub".to_string(),
            handoff_timeout_ms: 2_000,
            flush_timeout_ms: 1_000,
            persist_backoff_ms: 5,
            ..Default::default()
        }
    }

    pub async fn start_with(
        config: HubConfig,
        profiles: Arc<dyn ProfileStore>,
        tokens: StaticTokens,
    ) -> Self {
        let hub = Arc::new(
            Hub::new(config, profiles)
                .expect("hub config rejected")
                .with_authenticator(Arc::new(tokens)),
        );
        let (connector, server) = channel_server();

        let serving = Arc::clone(&hub);
        let handle = tokio::spawn(async move {
            let _ = serving.serve_on(server).await;
        });

        wait_for(
            || {
                let hub = Arc::clone(&hub);
                async move { hub.is_running() }
            },
            DEFAULT_CHECK_INTERVAL,
            DEFAULT_TIMEOUT,
        )
        .await;

        Self {
            hub,
            connector,
            handle: Some(handle),
        }
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Open a connection with an arbitrary handshake
    pub fn connect(&self, handshake: Handshake) -> TestClient {
        let client = self
            .connector
            .connect(handshake)
            .expect("test hub is not accepting");
        TestClient::new(client)
    }

    /// Connect as a guest in `session`
    pub fn connect_guest(&self, session: &str) -> TestClient {
        self.connect(Handshake::new().with_session(session))
    }

    /// Connect with bearer `token` in `session`
    pub fn connect_as(&self, token: &str, session: &str) -> TestClient {
        self.connect(
            Handshake::new()
                .with_session(session)
                .with_credential(token),
        )
    }

    /// Wait until the hub tracks exactly `count` connections
    pub async fn wait_for_connections(&self, count: usize) -> bool {
        let hub = Arc::clone(&self.hub);
        wait_for(
            move || {
                let hub = Arc::clone(&hub);
                async move { hub.connection_count() == count }
            },
            DEFAULT_CHECK_INTERVAL,
            DEFAULT_TIMEOUT,
        )
        .await
    }

    /// Stop the hub explicitly (also happens on drop)
    pub fn stop(&mut self) {
        self.hub.stop();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for TestHub {
    fn drop(&mut self) {
        self.stop();
    }
}

// ============================================================================
// Test Client
// ============================================================================

/// Client side of one channel connection, speaking envelopes
pub struct TestClient {
    inner: ChannelClient,
}

impl TestClient {
    pub fn new(inner: ChannelClient) -> Self {
        Self { inner }
    }

    /// Send `event` with an optional payload
    pub fn send(&self, event: &str, data: Option<Value>) {
        let frame = codec::encode(&Envelope::new(event, data)).expect("encode failed");
        self.inner.send(frame).expect("send failed");
    }

    /// Send raw bytes, e.g. a malformed frame
    pub fn send_raw(&self, frame: &[u8]) {
        self.inner
            .send(Bytes::copy_from_slice(frame))
            .expect("send failed");
    }

    /// Next envelope, `None` on timeout or once the hub closed the link
    pub async fn next_event(&mut self, max_wait: Duration) -> Option<Envelope> {
        let frame = timeout(max_wait, self.inner.recv()).await.ok()??;
        Some(codec::decode(&frame).expect("hub sent an undecodable frame"))
    }

    /// Skip envelopes until one named `event` arrives; panics if none does
    pub async fn expect_event(&mut self, event: &str) -> Envelope {
        let deadline = Instant::now() + DEFAULT_TIMEOUT;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.next_event(remaining).await {
                Some(envelope) if envelope.event == event => return envelope,
                Some(_) => continue,
                None => panic!("expected `{}` event, got nothing", event),
            }
        }
    }

    /// True if no `event` arrives within `window`
    pub async fn expect_no_event(&mut self, event: &str, window: Duration) -> bool {
        let deadline = Instant::now() + window;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return true;
            }
            match self.next_event(remaining).await {
                Some(envelope) if envelope.event == event => return false,
                Some(_) => continue,
                None => return true,
            }
        }
    }

    /// Wait until the hub closes this link
    pub async fn expect_closed(&mut self) -> bool {
        let deadline = Instant::now() + DEFAULT_TIMEOUT;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match timeout(remaining, self.inner.recv()).await {
                Ok(Some(_)) => continue,
                Ok(None) => return true,
                Err(_) => return false,
            }
        }
    }

    pub fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    pub fn close(&self) {
        self.inner.close();
    }
}

// ============================================================================
// Fault-injecting profile store
// ============================================================================

/// In-memory store that can fail or stall writes on demand
#[derive(Default)]
pub struct FlakyProfileStore {
    inner: MemoryProfileStore,
    failures_left: AtomicU32,
    delay: Mutex<Option<Duration>>,
    playlist_writes: AtomicU32,
    connection_writes: AtomicU32,
    gets: AtomicU32,
    history: Mutex<Vec<(String, PlaylistState)>>,
}

impl FlakyProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` write calls
    pub fn fail_next(&self, n: u32) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    /// Sleep this long inside every write
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock() = delay;
    }

    /// Successful playlist writes
    pub fn playlist_writes(&self) -> u32 {
        self.playlist_writes.load(Ordering::SeqCst)
    }

    /// Successful connection id writes
    pub fn connection_writes(&self) -> u32 {
        self.connection_writes.load(Ordering::SeqCst)
    }

    pub fn gets(&self) -> u32 {
        self.gets.load(Ordering::SeqCst)
    }

    /// Every playlist stored, in the order the writes landed
    pub fn history(&self) -> Vec<(String, PlaylistState)> {
        self.history.lock().clone()
    }

    pub fn connection_id(&self, identity: &Identity) -> Option<ConnectionId> {
        self.inner.connection_id(identity)
    }

    /// Seed a stored playlist without counting it as a write
    pub async fn seed(&self, identity: &Identity, playlist: &PlaylistState) {
        let _ = self.inner.update_playlist(identity, playlist).await;
    }

    async fn before_write(&self) -> Result<(), RouterError> {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let injected = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(RouterError::Persistence("injected failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for FlakyProfileStore {
    async fn get_playlist(&self, identity: &Identity) -> Result<Option<PlaylistState>, RouterError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get_playlist(identity).await
    }

    async fn update_playlist(
        &self,
        identity: &Identity,
        playlist: &PlaylistState,
    ) -> Result<(), RouterError> {
        self.before_write().await?;
        self.inner.update_playlist(identity, playlist).await?;
        self.history
            .lock()
            .push((identity.id.clone(), playlist.clone()));
        self.playlist_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn update_connection_id(
        &self,
        identity: &Identity,
        connection: Option<&ConnectionId>,
    ) -> Result<(), RouterError> {
        self.before_write().await?;
        self.inner.update_connection_id(identity, connection).await?;
        self.connection_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
