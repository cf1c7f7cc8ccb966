//! WebSocket transport implementation
//!
//! Frames are JSON text messages. Binary messages are accepted and treated as
//! UTF-8 JSON as well.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        handshake::server::{Request as HsRequest, Response as HsResponse},
        protocol::Message as WsMessage,
    },
};
use tracing::{debug, error, info, warn};

use crate::error::{Result, TransportError};
use crate::handshake::Handshake;
use crate::traits::{
    Transport, TransportEvent, TransportReceiver, TransportSender, TransportServer,
};

/// WebSocket configuration
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Frames larger than this are dropped
    pub max_message_size: usize,
    /// Outbound queue depth per connection
    pub channel_capacity: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            max_message_size: cadence_core::codec::MAX_FRAME_SIZE,
            channel_capacity: 100,
        }
    }
}

/// WebSocket client transport
pub struct WebSocketTransport;

/// WebSocket sender
pub struct WebSocketSender {
    tx: mpsc::Sender<WsMessage>,
    connected: Arc<Mutex<bool>>,
}

#[async_trait]
impl TransportSender for WebSocketSender {
    async fn send(&self, data: Bytes) -> Result<()> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        let text = String::from_utf8(data.to_vec())
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;

        self.tx
            .send(WsMessage::Text(text))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    fn is_connected(&self) -> bool {
        *self.connected.lock()
    }

    async fn close(&self) -> Result<()> {
        let _ = self.tx.send(WsMessage::Close(None)).await;
        *self.connected.lock() = false;
        Ok(())
    }
}

/// WebSocket receiver
pub struct WebSocketReceiver {
    rx: mpsc::Receiver<TransportEvent>,
}

#[async_trait]
impl TransportReceiver for WebSocketReceiver {
    async fn recv(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }
}

/// Split a websocket stream into a sender and a receiver backed by two tasks
fn spawn_io<S>(ws_stream: S, config: &WebSocketConfig) -> (WebSocketSender, WebSocketReceiver)
where
    S: futures_util::Stream<Item = std::result::Result<WsMessage, tokio_tungstenite::tungstenite::Error>>
        + futures_util::Sink<WsMessage, Error = tokio_tungstenite::tungstenite::Error>
        + Send
        + 'static,
{
    let (mut write, mut read) = ws_stream.split();

    let (send_tx, mut send_rx) = mpsc::channel::<WsMessage>(config.channel_capacity);
    let (event_tx, event_rx) = mpsc::channel::<TransportEvent>(config.channel_capacity);

    let connected = Arc::new(Mutex::new(true));
    let connected_write = connected.clone();
    let connected_read = connected.clone();
    let max_message_size = config.max_message_size;

    // Writer task
    tokio::spawn(async move {
        while let Some(msg) = send_rx.recv().await {
            let closing = matches!(msg, WsMessage::Close(_));
            if let Err(e) = write.send(msg).await {
                error!("WebSocket write error: {}", e);
                break;
            }
            if closing {
                break;
            }
        }
        *connected_write.lock() = false;
    });

    // Reader task
    tokio::spawn(async move {
        let _ = event_tx.send(TransportEvent::Connected).await;

        while let Some(result) = read.next().await {
            match result {
                Ok(msg) => {
                    let data = match msg {
                        WsMessage::Text(text) => Bytes::from(text),
                        WsMessage::Binary(data) => Bytes::from(data),
                        WsMessage::Close(frame) => {
                            let reason = frame.map(|f| f.reason.to_string());
                            debug!("WebSocket closed: {:?}", reason);
                            let _ = event_tx.send(TransportEvent::Disconnected { reason }).await;
                            break;
                        }
                        // Pong is handled automatically by tungstenite
                        _ => continue,
                    };

                    if data.len() > max_message_size {
                        warn!("Dropping {} byte frame (max {})", data.len(), max_message_size);
                        continue;
                    }

                    if event_tx.send(TransportEvent::Data(data)).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    let _ = event_tx.send(TransportEvent::Error(e.to_string())).await;
                    let _ = event_tx
                        .send(TransportEvent::Disconnected {
                            reason: Some(e.to_string()),
                        })
                        .await;
                    break;
                }
            }
        }

        *connected_read.lock() = false;
    });

    (
        WebSocketSender {
            tx: send_tx,
            connected,
        },
        WebSocketReceiver { rx: event_rx },
    )
}

#[async_trait]
impl Transport for WebSocketTransport {
    type Sender = WebSocketSender;
    type Receiver = WebSocketReceiver;

    async fn connect(url: &str) -> Result<(Self::Sender, Self::Receiver)> {
        info!("Connecting to WebSocket: {}", url);

        let (ws_stream, response) = connect_async(url)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        debug!("WebSocket connected, response: {:?}", response.status());

        Ok(spawn_io(ws_stream, &WebSocketConfig::default()))
    }
}

/// WebSocket server
pub struct WebSocketServer {
    listener: tokio::net::TcpListener,
    config: WebSocketConfig,
}

impl WebSocketServer {
    pub async fn bind(addr: &str) -> Result<Self> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        info!("WebSocket server listening on {}", addr);

        Ok(Self {
            listener,
            config: WebSocketConfig::default(),
        })
    }

    pub fn with_config(mut self, config: WebSocketConfig) -> Self {
        self.config = config;
        self
    }

    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        self.listener.local_addr().map_err(TransportError::Io)
    }
}

#[async_trait]
impl TransportServer for WebSocketServer {
    type Sender = WebSocketSender;
    type Receiver = WebSocketReceiver;

    async fn accept(&mut self) -> Result<(Self::Sender, Self::Receiver, Handshake)> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        debug!("Accepted TCP connection from {}", addr);

        let captured = Arc::new(Mutex::new(None::<Handshake>));
        let captured_cb = captured.clone();
        let ws_stream = tokio_tungstenite::accept_hdr_async(
            stream,
            move |req: &HsRequest, response: HsResponse| {
                let header = |name: &str| {
                    req.headers()
                        .get(name)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string)
                };
                *captured_cb.lock() = Some(Handshake::from_request(
                    Some(addr),
                    req.uri().query(),
                    header("cookie").as_deref(),
                    header("authorization").as_deref(),
                ));
                Ok(response)
            },
        )
        .await
        .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        let handshake = captured
            .lock()
            .take()
            .unwrap_or_else(|| Handshake::new().with_addr(addr));

        info!("WebSocket client connected from {}", addr);

        let (sender, receiver) = spawn_io(ws_stream, &self.config);
        Ok((sender, receiver, handshake))
    }

    async fn close(&self) -> Result<()> {
        // TCP listener doesn't need explicit close
        Ok(())
    }
}
