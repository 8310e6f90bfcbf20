//! Integration tests for the TCP transport.
//!
//! These bind real loopback sockets on port 0 so the OS picks a free
//! port, then connect to whatever `local_addr` reports.

use std::time::Duration;

use peerlink_transport::{connect, TcpTransport, TransportError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

#[tokio::test]
async fn test_tcp_accept_and_exchange_bytes() {
    let transport = TcpTransport::bind("127.0.0.1:0")
        .await
        .expect("should bind");
    let addr = transport.local_addr().expect("should have local addr");

    let server = tokio::spawn(async move {
        let mut conn = transport.accept().await.expect("should accept");
        let mut buf = [0u8; 5];
        conn.stream_mut().read_exact(&mut buf).await.unwrap();
        conn.stream_mut().write_all(b"pong!").await.unwrap();
        (conn.id(), buf)
    });

    let mut client = connect(addr, Duration::from_secs(2))
        .await
        .expect("should connect");
    client.stream_mut().write_all(b"ping!").await.unwrap();
    let mut reply = [0u8; 5];
    client.stream_mut().read_exact(&mut reply).await.unwrap();

    let (server_id, received) = server.await.unwrap();
    assert_eq!(&received, b"ping!");
    assert_eq!(&reply, b"pong!");
    assert_ne!(server_id, client.id());
    assert_eq!(client.peer_addr(), addr);
}

#[tokio::test]
async fn test_connect_refused_returns_connect_failed() {
    // Bind then drop to get a port that is (almost certainly) closed.
    let transport = TcpTransport::bind("127.0.0.1:0").await.unwrap();
    let addr = transport.local_addr().unwrap();
    drop(transport);

    let result = connect(addr, Duration::from_secs(2)).await;

    assert!(
        matches!(result, Err(TransportError::ConnectFailed { addr: a, .. }) if a == addr),
        "expected ConnectFailed, got {result:?}"
    );
}

#[test]
fn test_from_read_maps_unexpected_eof_to_connection_closed() {
    let eof = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
    assert!(matches!(
        TransportError::from_read(eof),
        TransportError::ConnectionClosed(_)
    ));

    let reset = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
    assert!(matches!(
        TransportError::from_read(reset),
        TransportError::ReceiveFailed(_)
    ));
}
