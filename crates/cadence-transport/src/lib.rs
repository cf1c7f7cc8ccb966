//! Cadence Transport Layer
//!
//! This crate provides the links the hub accepts connections on:
//! - WebSocket (primary, JSON text frames)
//! - In-process channels (tests and embedders)

pub mod channel;
pub mod error;
pub mod handshake;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use channel::{channel_server, ChannelClient, ChannelConnector, ChannelServer};
pub use error::{Result, TransportError};
pub use handshake::Handshake;
pub use traits::{Transport, TransportEvent, TransportReceiver, TransportSender, TransportServer};

#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConfig, WebSocketServer, WebSocketTransport};
