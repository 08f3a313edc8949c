//! Integration tests for the session lifecycle through the public API.
//!
//! These tests wire a [`SessionRegistry`], [`LifecycleHandler`] and
//! [`ConnectionRelay`] together the way the bridge does and drive them with a
//! channel-backed connection instead of a real socket.
//!
//! # Scenarios
//!
//! - Full happy path: open, relay, close.
//! - Restart recovery: markers persisted in a TOML file survive a new registry
//!   instance and are reported as `ConnectionLost`, not `SessionUnknown`.
//! - Concurrent relays from many tasks to one session.

use std::sync::Arc;

use async_trait::async_trait;
use relay_core::{
    CloseInfo, Connection, ConnectionId, ConnectionRelay, Delivered, DurableStore, FileStore,
    LifecycleHandler, MemoryStore, RelayError, SessionId, SessionRegistry, SessionState,
    TransportError,
};
use serde_json::Value;
use tokio::sync::mpsc;

/// Connection that forwards each frame into an mpsc channel.
struct ChannelConnection {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelConnection {
    fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                id: ConnectionId::next(),
                tx,
            }),
            rx,
        )
    }
}

#[async_trait]
impl Connection for ChannelConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    async fn send_text(&self, text: String) -> Result<(), TransportError> {
        self.tx.send(text).map_err(|_| TransportError::Closed)
    }

    async fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

struct Harness {
    registry: Arc<SessionRegistry>,
    lifecycle: LifecycleHandler,
    relay: ConnectionRelay,
}

fn harness(store: Arc<dyn DurableStore>) -> Harness {
    let registry = Arc::new(SessionRegistry::new(store));
    Harness {
        lifecycle: LifecycleHandler::new(Arc::clone(&registry)),
        relay: ConnectionRelay::new(Arc::clone(&registry)),
        registry,
    }
}

fn parse(frame: &str) -> Value {
    serde_json::from_str(frame).expect("frames are JSON")
}

#[tokio::test]
async fn test_open_relay_close_happy_path() {
    // Arrange
    let h = harness(Arc::new(MemoryStore::new()));
    let id = SessionId::generate();
    let (conn, mut rx) = ChannelConnection::new();

    // Act 1: open
    h.lifecycle
        .on_open(id.clone(), Arc::clone(&conn) as Arc<dyn Connection>)
        .await
        .expect("open");

    // Assert 1: the peer sees the confirmed session id first
    let connected = parse(&rx.recv().await.unwrap());
    assert_eq!(connected["type"], "connected");
    assert_eq!(connected["sessionId"], id.as_str());
    assert_eq!(h.registry.state(&id).await.unwrap(), SessionState::Open);

    // Act 2: relay
    let result = h.relay.relay(&id, r#"{"hello":"world"}"#.to_string()).await;

    // Assert 2
    assert_eq!(result.unwrap(), Delivered);
    assert_eq!(rx.recv().await.unwrap(), r#"{"hello":"world"}"#);

    // Act 3: close
    h.lifecycle
        .on_close(
            conn.id(),
            CloseInfo {
                code: 1000,
                reason: String::new(),
                clean: true,
            },
        )
        .await;

    // Assert 3: closed is terminal
    assert_eq!(h.registry.state(&id).await.unwrap(), SessionState::Unknown);
    assert!(matches!(
        h.relay.relay(&id, "{}".to_string()).await,
        Err(RelayError::SessionUnknown(_))
    ));
}

#[tokio::test]
async fn test_restart_with_file_store_reports_connection_lost() {
    // Arrange: first process opens a session and then "crashes" (no close)
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("markers.toml");
    let id = SessionId::generate();
    {
        let store = Arc::new(FileStore::open(&path).await.unwrap());
        let h = harness(store);
        let (conn, _rx) = ChannelConnection::new();
        h.lifecycle
            .on_open(id.clone(), conn as Arc<dyn Connection>)
            .await
            .unwrap();
    }

    // Act: second process starts over the same marker file
    let store = Arc::new(FileStore::open(&path).await.unwrap());
    let h = harness(store);
    let result = h.relay.relay(&id, "{}".to_string()).await;

    // Assert
    assert!(matches!(result, Err(RelayError::ConnectionLost(_))));
    assert_eq!(
        h.registry.state(&id).await.unwrap(),
        SessionState::ReconnectRequired
    );
}

#[tokio::test]
async fn test_closed_peer_turns_into_relay_failed_then_connection_lost() {
    let h = harness(Arc::new(MemoryStore::new()));
    let id = SessionId::generate();
    let (conn, rx) = ChannelConnection::new();
    h.lifecycle
        .on_open(id.clone(), conn as Arc<dyn Connection>)
        .await
        .unwrap();
    // The peer goes away without a close event reaching the handler.
    drop(rx);

    let first = h.relay.relay(&id, "{}".to_string()).await;
    let second = h.relay.relay(&id, "{}".to_string()).await;

    assert!(matches!(first, Err(RelayError::RelayFailed { .. })));
    assert!(h.registry.is_durable(&id).await.unwrap());
    assert!(matches!(second, Err(RelayError::ConnectionLost(_))));
}

#[tokio::test]
async fn test_concurrent_relays_each_arrive_whole() {
    // Arrange
    let h = Arc::new(harness(Arc::new(MemoryStore::new())));
    let id = SessionId::generate();
    let (conn, mut rx) = ChannelConnection::new();
    h.lifecycle
        .on_open(id.clone(), conn as Arc<dyn Connection>)
        .await
        .unwrap();
    let _connected = rx.recv().await.unwrap();

    // Act: 16 tasks × 25 payloads each
    let mut tasks = Vec::new();
    for caller in 0..16 {
        let h = Arc::clone(&h);
        let id = id.clone();
        tasks.push(tokio::spawn(async move {
            for seq in 0..25 {
                let payload = serde_json::json!({"caller": caller, "seq": seq}).to_string();
                h.relay.relay(&id, payload).await.unwrap();
            }
        }));
    }
    for t in tasks {
        t.await.unwrap();
    }

    // Assert: every frame is a complete payload, per-caller order preserved
    let mut last_seq = vec![-1i64; 16];
    for _ in 0..(16 * 25) {
        let frame = parse(&rx.recv().await.unwrap());
        let caller = frame["caller"].as_u64().unwrap() as usize;
        let seq = frame["seq"].as_i64().unwrap();
        assert_eq!(seq, last_seq[caller] + 1, "caller {caller} out of order");
        last_seq[caller] = seq;
    }
    assert!(rx.try_recv().is_err());
}
