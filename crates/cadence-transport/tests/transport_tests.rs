//! Transport Layer Tests
//!
//! - WebSocket accept with handshake capture
//! - JSON text frame round-trips
//! - Close propagation

use bytes::Bytes;
use cadence_transport::{
    Transport, TransportEvent, TransportReceiver, TransportSender, TransportServer,
    WebSocketServer, WebSocketTransport,
};
use std::time::Duration;
use tokio::time::timeout;

async fn next_data(receiver: &mut impl TransportReceiver) -> Option<Bytes> {
    loop {
        match timeout(Duration::from_secs(5), receiver.recv()).await.ok()?? {
            TransportEvent::Data(data) => return Some(data),
            TransportEvent::Connected => continue,
            _ => return None,
        }
    }
}

#[tokio::test]
async fn test_websocket_handshake_and_roundtrip() {
    let mut server = WebSocketServer::bind("127.0.0.1:0").await.expect("bind failed");
    let addr = server.local_addr().expect("no local addr");

    let accept = tokio::spawn(async move { server.accept().await });

    let url = format!("ws://{}/?session=sess-1&token=secret", addr);
    let (client_tx, mut client_rx) = WebSocketTransport::connect(&url)
        .await
        .expect("connect failed");

    let (server_tx, mut server_rx, handshake) = timeout(Duration::from_secs(5), accept)
        .await
        .expect("accept timed out")
        .expect("accept task panicked")
        .expect("accept failed");

    assert_eq!(handshake.session.as_deref(), Some("sess-1"));
    assert_eq!(handshake.credential.as_deref(), Some("secret"));
    assert!(handshake.addr.is_some());

    client_tx
        .send(Bytes::from_static(br#"{"event":"playlist"}"#))
        .await
        .expect("client send failed");
    let received = next_data(&mut server_rx).await.expect("server got nothing");
    assert_eq!(&received[..], br#"{"event":"playlist"}"#);

    server_tx
        .send(Bytes::from_static(br#"{"event":"ready"}"#))
        .await
        .expect("server send failed");
    let received = next_data(&mut client_rx).await.expect("client got nothing");
    assert_eq!(&received[..], br#"{"event":"ready"}"#);
}

#[tokio::test]
async fn test_websocket_server_close_reaches_client() {
    let mut server = WebSocketServer::bind("127.0.0.1:0").await.expect("bind failed");
    let addr = server.local_addr().expect("no local addr");
    let accept = tokio::spawn(async move { server.accept().await });

    let (_client_tx, mut client_rx) = WebSocketTransport::connect(&format!("ws://{}", addr))
        .await
        .expect("connect failed");
    let (server_tx, _server_rx, handshake) = accept.await.unwrap().unwrap();
    assert_eq!(handshake.session, None);

    server_tx.close().await.expect("close failed");
    assert!(!server_tx.is_connected());

    let mut saw_disconnect = false;
    while let Ok(Some(event)) = timeout(Duration::from_secs(5), client_rx.recv()).await {
        if matches!(event, TransportEvent::Disconnected { .. }) {
            saw_disconnect = true;
            break;
        }
    }
    assert!(saw_disconnect, "client never saw the close frame");
}
