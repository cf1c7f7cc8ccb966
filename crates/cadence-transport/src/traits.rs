//! The link abstraction the hub is written against
//!
//! A link is split in two halves: a shared [`TransportSender`] that any task
//! may push frames through, and a [`TransportReceiver`] owned by the single
//! read loop of that connection. One frame carries one encoded envelope.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;
use crate::handshake::Handshake;

/// What a read loop sees on a link
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The link is up; always the first event
    Connected,
    /// Peer went away. `reason` is the close reason or the error text
    Disconnected { reason: Option<String> },
    /// One inbound frame
    Data(Bytes),
    /// Non-fatal link error, usually followed by `Disconnected`
    Error(String),
}

/// Outbound half of a link
#[async_trait]
pub trait TransportSender: Send + Sync {
    /// Queue one frame. Fails with `NotConnected` once the link is closed
    async fn send(&self, frame: Bytes) -> Result<()>;

    fn is_connected(&self) -> bool;

    /// Close the link. Idempotent
    async fn close(&self) -> Result<()>;
}

/// Inbound half of a link
#[async_trait]
pub trait TransportReceiver: Send {
    /// Next event, or `None` once the link is fully torn down
    async fn recv(&mut self) -> Option<TransportEvent>;
}

/// Dialing side, used by clients and tests
#[async_trait]
pub trait Transport: Send + Sync {
    type Sender: TransportSender;
    type Receiver: TransportReceiver;

    async fn connect(url: &str) -> Result<(Self::Sender, Self::Receiver)>
    where
        Self: Sized;
}

/// Listening side, what the hub serves on
#[async_trait]
pub trait TransportServer: Send + Sync {
    type Sender: TransportSender;
    type Receiver: TransportReceiver;

    /// Wait for the next client, returning its link halves and what it
    /// presented when connecting.
    ///
    /// `Err(TransportError::ConnectionClosed)` means the listener itself is gone
    /// and no further connections will arrive.
    async fn accept(&mut self) -> Result<(Self::Sender, Self::Receiver, Handshake)>;

    /// Stop listening
    async fn close(&self) -> Result<()>;
}
