//! In-process transport
//!
//! Pairs a [`ChannelServer`] with a [`ChannelConnector`]: every
//! [`ChannelConnector::connect`] call shows up as an accepted connection on the
//! server side, and the returned [`ChannelClient`] is the far end of that link.
//! Used by tests and by applications that embed the hub next to their own
//! transport.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::{Result, TransportError};
use crate::handshake::Handshake;
use crate::traits::{TransportEvent, TransportReceiver, TransportSender, TransportServer};

type Pending = (ChannelSender, ChannelReceiver, Handshake);

/// Create a connected server/connector pair
pub fn channel_server() -> (ChannelConnector, ChannelServer) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelConnector { tx }, ChannelServer { incoming: rx })
}

/// Server half of a channel connection
pub struct ChannelSender {
    tx: Mutex<Option<mpsc::UnboundedSender<Bytes>>>,
    connected: Arc<AtomicBool>,
}

#[async_trait]
impl TransportSender for ChannelSender {
    async fn send(&self, data: Bytes) -> Result<()> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        match self.tx.lock().as_ref() {
            Some(tx) => tx.send(data).map_err(|_| TransportError::ConnectionClosed),
            None => Err(TransportError::NotConnected),
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        // Dropping the sender ends the client's inbox once drained
        self.tx.lock().take();
        Ok(())
    }
}

/// Server-side event stream of a channel connection
pub struct ChannelReceiver {
    rx: mpsc::UnboundedReceiver<TransportEvent>,
}

#[async_trait]
impl TransportReceiver for ChannelReceiver {
    async fn recv(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }
}

/// Client end of a channel connection
pub struct ChannelClient {
    events: mpsc::UnboundedSender<TransportEvent>,
    inbox: mpsc::UnboundedReceiver<Bytes>,
    connected: Arc<AtomicBool>,
    closed: AtomicBool,
}

impl ChannelClient {
    /// Send a frame to the server
    pub fn send(&self, data: Bytes) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        self.events
            .send(TransportEvent::Data(data))
            .map_err(|_| TransportError::ConnectionClosed)
    }

    /// Next frame from the server; `None` once the server closed the link
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.inbox.recv().await
    }

    /// Next frame if one is already queued
    pub fn try_recv(&mut self) -> Option<Bytes> {
        self.inbox.try_recv().ok()
    }

    /// False once either side closed the link
    pub fn is_open(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && !self.closed.load(Ordering::SeqCst)
    }

    /// Close from the client side (the server sees `Disconnected`)
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.connected.store(false, Ordering::SeqCst);
        let _ = self.events.send(TransportEvent::Disconnected {
            reason: Some("client closed".to_string()),
        });
    }
}

impl Drop for ChannelClient {
    fn drop(&mut self) {
        self.close();
    }
}

/// Opens connections to a [`ChannelServer`]
#[derive(Clone)]
pub struct ChannelConnector {
    tx: mpsc::UnboundedSender<Pending>,
}

impl ChannelConnector {
    pub fn connect(&self, handshake: Handshake) -> Result<ChannelClient> {
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(true));

        let _ = event_tx.send(TransportEvent::Connected);

        let sender = ChannelSender {
            tx: Mutex::new(Some(frame_tx)),
            connected: connected.clone(),
        };
        let receiver = ChannelReceiver { rx: event_rx };

        self.tx
            .send((sender, receiver, handshake))
            .map_err(|_| TransportError::ConnectionFailed("server is gone".to_string()))?;

        Ok(ChannelClient {
            events: event_tx,
            inbox: frame_rx,
            connected,
            closed: AtomicBool::new(false),
        })
    }
}

/// Accepts connections opened through a [`ChannelConnector`]
pub struct ChannelServer {
    incoming: mpsc::UnboundedReceiver<Pending>,
}

#[async_trait]
impl TransportServer for ChannelServer {
    type Sender = ChannelSender;
    type Receiver = ChannelReceiver;

    async fn accept(&mut self) -> Result<(Self::Sender, Self::Receiver, Handshake)> {
        self.incoming
            .recv()
            .await
            .ok_or(TransportError::ConnectionClosed)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
