//! [`Connection`] implementation over the server side of an axum WebSocket.
//!
//! The write half of the socket is shared between the lifecycle handler
//! (acknowledgements, echoes) and any number of concurrent relay calls, so it
//! sits behind a `tokio::sync::Mutex`.  Holding the lock for the whole `send`
//! is what makes each payload one uninterrupted frame on the wire.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use tokio::sync::Mutex;

use relay_core::{Connection, ConnectionId, TransportError};

/// Write half of a server-side WebSocket, addressable by the registry.
pub struct WsConnection {
    id: ConnectionId,
    sink: Mutex<SplitSink<WebSocket, Message>>,
}

impl WsConnection {
    pub fn new(sink: SplitSink<WebSocket, Message>) -> Self {
        Self {
            id: ConnectionId::next(),
            sink: Mutex::new(sink),
        }
    }
}

#[async_trait]
impl Connection for WsConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    async fn send_text(&self, text: String) -> Result<(), TransportError> {
        let mut sink = self.sink.lock().await;
        sink.send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn close(&self) -> Result<(), TransportError> {
        let mut sink = self.sink.lock().await;
        sink.close().await.map_err(|_| TransportError::Closed)
    }
}
