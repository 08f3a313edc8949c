//! SSE stream → internal WebSocket bridge.
//!
//! Each `GET /events` mints a fresh session id and opens a WebSocket client
//! connection back to this server's `/ws?sessionId=<id>`.  The server side of
//! that socket (see `ws_session`) persists and registers the session, then
//! sends a `connected` frame.  Only once that frame has arrived does the
//! bridge hand the stream to axum, so by the time an SSE consumer learns its
//! session id, a relay to it can succeed.
//!
//! After the handshake a forwarder task copies every text frame into the SSE
//! stream.  It stops when:
//!
//! - the SSE consumer goes away (the event receiver is dropped),
//! - the server shuts down (the cancellation token fires), or
//! - the WebSocket ends.
//!
//! On the way out it closes the WebSocket, which the server side reports as
//! **Closed**, and the session is unregistered and its marker cleared.

use std::time::Duration;

use axum::response::sse::Event;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_stream::wrappers::ReceiverStream;
use tokio_tungstenite::tungstenite::{self, Message as WsMessage};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use relay_core::{ServerMessage, SessionId};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Events buffered between the WebSocket reader and a slow SSE consumer.
const EVENT_BUFFER: usize = 64;

/// Why an SSE stream could not be opened.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Connecting or waiting for `connected` took longer than allowed.
    #[error("internal WebSocket did not become ready within {0:?}")]
    ConnectTimeout(Duration),

    /// The WebSocket client connection failed.
    #[error("could not connect internal WebSocket to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: tungstenite::Error,
    },

    /// The socket opened but the first frame was not the expected `connected`.
    #[error("internal WebSocket handshake failed: {0}")]
    Handshake(String),
}

impl BridgeError {
    /// Every bridge failure is on our side of the boundary.
    pub fn status_code(&self) -> u16 {
        500
    }

    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::ConnectTimeout(_) => "connect_timeout",
            BridgeError::Connect { .. } => "connect_failed",
            BridgeError::Handshake(_) => "handshake_failed",
        }
    }
}

/// Opens internal WebSockets on behalf of SSE consumers.
#[derive(Debug, Clone)]
pub struct StreamBridge {
    ws_url: String,
    connect_timeout: Duration,
    shutdown: CancellationToken,
}

impl StreamBridge {
    pub fn new(ws_url: String, connect_timeout: Duration, shutdown: CancellationToken) -> Self {
        Self {
            ws_url,
            connect_timeout,
            shutdown,
        }
    }

    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    /// Opens the internal WebSocket for `session_id` and returns the SSE
    /// events fed from it.  Dropping the stream tears the session down.
    ///
    /// The first event on the stream is always the `connected` frame.
    ///
    /// # Errors
    ///
    /// See [`BridgeError`].  On error no forwarder task is left behind; the
    /// socket (if any) is dropped, which the server side sees as an abnormal
    /// close.
    pub async fn open(&self, session_id: &SessionId) -> Result<ReceiverStream<Event>, BridgeError> {
        let url = session_url(&self.ws_url, session_id);

        let (ws_tx, mut ws_rx, first) = timeout(self.connect_timeout, handshake(&url, session_id))
            .await
            .map_err(|_| BridgeError::ConnectTimeout(self.connect_timeout))??;

        let (tx, rx) = mpsc::channel::<Event>(EVENT_BUFFER);
        // Cannot fail: the receiver is still in hand and the buffer is empty.
        let _ = tx.try_send(Event::default().data(first));

        info!("session {session_id}: event stream open");

        let shutdown = self.shutdown.clone();
        let session_id = session_id.clone();
        tokio::spawn(async move {
            forward(&session_id, &mut ws_rx, &tx, &shutdown).await;
            close_socket(&session_id, ws_tx).await;
        });

        Ok(ReceiverStream::new(rx))
    }
}

/// Appends the `sessionId` query parameter to the base WebSocket URL.
fn session_url(base: &str, session_id: &SessionId) -> String {
    let sep = if base.contains('?') { '&' } else { '?' };
    format!("{base}{sep}sessionId={session_id}")
}

/// Connects and waits for the `connected` frame naming `session_id`.
///
/// Returns both socket halves and the raw text of the `connected` frame.
async fn handshake(
    url: &str,
    session_id: &SessionId,
) -> Result<(SplitSink<WsStream, WsMessage>, SplitStream<WsStream>, String), BridgeError> {
    let (socket, _response) = connect_async(url).await.map_err(|source| BridgeError::Connect {
        url: url.to_string(),
        source,
    })?;
    let (ws_tx, mut ws_rx) = socket.split();

    loop {
        match ws_rx.next().await {
            Some(Ok(WsMessage::Text(text))) => {
                return match serde_json::from_str::<ServerMessage>(&text) {
                    Ok(ServerMessage::Connected { session_id: got })
                        if got == session_id.as_str() =>
                    {
                        Ok((ws_tx, ws_rx, text))
                    }
                    Ok(other) => Err(BridgeError::Handshake(format!(
                        "expected `connected` for {session_id}, got `{}`",
                        other.kind()
                    ))),
                    Err(e) => Err(BridgeError::Handshake(format!("unreadable first frame: {e}"))),
                };
            }
            Some(Ok(WsMessage::Close(frame))) => {
                let reason = frame
                    .map(|f| format!("{} {}", u16::from(f.code), f.reason))
                    .unwrap_or_else(|| "no close frame".to_string());
                return Err(BridgeError::Handshake(format!(
                    "socket closed before `connected`: {reason}"
                )));
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                return Err(BridgeError::Handshake(format!(
                    "read failed before `connected`: {e}"
                )))
            }
            None => {
                return Err(BridgeError::Handshake(
                    "socket ended before `connected`".to_string(),
                ))
            }
        }
    }
}

/// Copies text frames into the event channel until one side goes away.
async fn forward(
    session_id: &SessionId,
    ws_rx: &mut SplitStream<WsStream>,
    tx: &mpsc::Sender<Event>,
    shutdown: &CancellationToken,
) {
    loop {
        tokio::select! {
            _ = tx.closed() => {
                info!("session {session_id}: event stream consumer disconnected");
                return;
            }
            _ = shutdown.cancelled() => {
                debug!("session {session_id}: closing event stream for shutdown");
                return;
            }
            frame = ws_rx.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    if tx.send(Event::default().data(text)).await.is_err() {
                        info!("session {session_id}: event stream consumer disconnected");
                        return;
                    }
                }
                Some(Ok(WsMessage::Close(_))) | None => {
                    debug!("session {session_id}: internal WebSocket closed by server");
                    return;
                }
                // Pings are answered by tungstenite on the next read.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("session {session_id}: internal WebSocket read failed: {e}");
                    return;
                }
            }
        }
    }
}

async fn close_socket(session_id: &SessionId, mut ws_tx: SplitSink<WsStream, WsMessage>) {
    if let Err(e) = ws_tx.close().await {
        debug!("session {session_id}: closing internal WebSocket: {e}");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
