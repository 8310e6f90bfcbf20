//! Integration tests for the relay server, driven over raw sockets.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use peerlink::prelude::*;
use peerlink::RegistryStore;
use peerlink_protocol::{put_string, FrameReader, RelayRequest, Snapshot, WireEncode};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

// =========================================================================
// Helpers
// =========================================================================

async fn start_relay(config: RelayConfig) -> (SocketAddr, Arc<RegistryStore>) {
    let server = RelayServer::builder()
        .bind("127.0.0.1:0")
        .config(config)
        .build()
        .await
        .expect("relay should bind");
    let addr = server.local_addr().unwrap();
    let registry = server.registry();
    tokio::spawn(server.run());
    (addr, registry)
}

/// Writes raw bytes and half-closes, then waits for the relay to close
/// the connection. Returns whatever the relay wrote back.
async fn exchange(addr: SocketAddr, bytes: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(bytes).await.unwrap();
    stream.shutdown().await.unwrap();
    let mut reply = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut reply))
        .await
        .expect("relay should close the connection")
        .unwrap();
    reply
}

async fn send(addr: SocketAddr, request: RelayRequest) {
    let reply = exchange(addr, &request.to_bytes().unwrap()).await;
    assert!(reply.is_empty(), "{} has no reply", request.tag());
}

async fn request(addr: SocketAddr) -> Snapshot {
    let reply = exchange(addr, &RelayRequest::Request.to_bytes().unwrap()).await;
    let mut reader = FrameReader::new(reply.as_slice());
    Snapshot::read_from(&mut reader).await.unwrap()
}

async fn usernames(addr: SocketAddr) -> HashSet<String> {
    request(addr).await.0.into_iter().map(|e| e.username).collect()
}

fn register(username: &str, listen_port: u16) -> RelayRequest {
    RelayRequest::Register {
        listen_port,
        username: username.into(),
    }
}

fn set(names: &[&str]) -> HashSet<String> {
    names.iter().map(|n| n.to_string()).collect()
}

// =========================================================================
// Commands
// =========================================================================

#[tokio::test]
async fn test_relay_register_then_request_lists_user() {
    let (addr, _) = start_relay(RelayConfig::default()).await;

    send(addr, register("alice", 40001)).await;

    let Snapshot(entries) = request(addr).await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].username, "alice");
    assert_eq!(entries[0].listen_port, 40001);
}

#[tokio::test]
async fn test_relay_request_reply_bytes() {
    let (addr, registry) = start_relay(RelayConfig::default()).await;
    registry.upsert("al", 7);

    let reply = exchange(addr, &RelayRequest::Request.to_bytes().unwrap()).await;

    assert_eq!(reply, vec![0, 0, 0, 1, 0, 2, b'a', b'l', 0, 0, 0, 7]);
}

#[tokio::test]
async fn test_relay_command_sequence_membership() {
    let (addr, _) = start_relay(RelayConfig::default()).await;

    send(addr, register("alice", 1)).await;
    send(addr, register("bob", 2)).await;
    send(
        addr,
        RelayRequest::KeepAlive {
            username: "ghost".into(),
        },
    )
    .await;
    send(
        addr,
        RelayRequest::Remove {
            username: "alice".into(),
        },
    )
    .await;
    send(addr, register("carol", 3)).await;
    send(addr, register("bob", 4)).await;

    let Snapshot(entries) = request(addr).await;
    assert_eq!(entries.len(), 2, "no duplicates");
    let listed: HashSet<String> = entries.iter().map(|e| e.username.clone()).collect();
    assert_eq!(listed, set(&["bob", "carol"]));
    let bob = entries.iter().find(|e| e.username == "bob").unwrap();
    assert_eq!(bob.listen_port, 4, "re-registration replaces the port");
}

#[tokio::test]
async fn test_relay_keep_alive_for_unknown_user_creates_nothing() {
    let (addr, registry) = start_relay(RelayConfig::default()).await;

    send(
        addr,
        RelayRequest::KeepAlive {
            username: "ghost".into(),
        },
    )
    .await;

    assert!(registry.is_empty());
    assert!(usernames(addr).await.is_empty());
}

#[tokio::test]
async fn test_relay_request_on_empty_registry_returns_zero_count() {
    let (addr, _) = start_relay(RelayConfig::default()).await;

    let reply = exchange(addr, &RelayRequest::Request.to_bytes().unwrap()).await;

    assert_eq!(reply, vec![0, 0, 0, 0]);
}

// =========================================================================
// Failures stay local to one connection
// =========================================================================

#[tokio::test]
async fn test_relay_unknown_tag_closes_only_that_connection() {
    let (addr, _) = start_relay(RelayConfig::default()).await;
    send(addr, register("alice", 1)).await;

    let mut bogus = Vec::new();
    put_string(&mut bogus, "BOGUS").unwrap();
    let reply = exchange(addr, &bogus).await;
    assert!(reply.is_empty());

    assert_eq!(usernames(addr).await, set(&["alice"]));
}

#[tokio::test]
async fn test_relay_truncated_command_is_dropped() {
    let (addr, registry) = start_relay(RelayConfig::default()).await;

    // NEW with the port but no username.
    let mut partial = Vec::new();
    put_string(&mut partial, "NEW").unwrap();
    partial.extend_from_slice(&40001i32.to_be_bytes());
    exchange(addr, &partial).await;

    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_relay_silent_connection_times_out() {
    let (addr, _) = start_relay(RelayConfig {
        command_timeout: Duration::from_millis(100),
        ..RelayConfig::default()
    })
    .await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let mut buf = Vec::new();
    let closed = tokio::time::timeout(Duration::from_secs(2), stream.read_to_end(&mut buf)).await;

    assert!(closed.is_ok(), "relay should drop a connection that sends nothing");
}

#[tokio::test]
async fn test_relay_serves_concurrent_connections() {
    let (addr, registry) = start_relay(RelayConfig::default()).await;

    // A stalled connection must not block others.
    let _stalled = TcpStream::connect(addr).await.unwrap();

    let tasks: Vec<_> = (0..20u16)
        .map(|i| tokio::spawn(send(addr, register(&format!("user-{i}"), 1000 + i))))
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(registry.len(), 20);
    assert_eq!(request(addr).await.0.len(), 20);
}

// =========================================================================
// Expiry
// =========================================================================

#[tokio::test]
async fn test_relay_expires_silent_entries_and_keeps_live_ones() {
    let (addr, _) = start_relay(RelayConfig {
        entry_ttl: Duration::from_millis(300),
        sweep_interval: Duration::from_millis(25),
        ..RelayConfig::default()
    })
    .await;

    send(addr, register("silent", 1)).await;
    send(addr, register("chatty", 2)).await;

    for _ in 0..12 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        send(
            addr,
            RelayRequest::KeepAlive {
                username: "chatty".into(),
            },
        )
        .await;
    }

    assert_eq!(usernames(addr).await, set(&["chatty"]));
}
