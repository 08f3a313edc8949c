//! Server side of the internal WebSocket.
//!
//! One task per upgraded socket.  The task:
//!
//! 1. Splits the socket; the write half becomes a [`WsConnection`] that the
//!    registry (and therefore the relay) can address.
//! 2. Reports **Opened** to the lifecycle handler, which persists the session,
//!    registers the handle and sends the `connected` frame.
//! 3. Reads frames until the socket ends, reporting each text frame as
//!    **Message**, a close frame or end-of-stream as **Closed**, and a read
//!    error as **Errored**.
//!
//! The task never touches the registry itself.

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::StreamExt;
use tracing::{debug, warn};

use relay_core::{CloseInfo, Connection, LifecycleHandler, SessionId};

use crate::infrastructure::ws_connection::WsConnection;

/// Runs the lifecycle of one internal WebSocket tagged with `session_id`.
pub async fn run(socket: WebSocket, session_id: SessionId, lifecycle: Arc<LifecycleHandler>) {
    let (sink, mut stream) = socket.split();
    let handle: Arc<dyn Connection> = Arc::new(WsConnection::new(sink));
    let connection_id = handle.id();

    // ── Opened ────────────────────────────────────────────────────────────────
    if let Err(e) = lifecycle.on_open(session_id.clone(), Arc::clone(&handle)).await {
        warn!("session {session_id}: could not open on {connection_id}: {e}");
        // No-op if nothing was registered (refused or persist failure); cleans
        // up if the acknowledgement was what failed.
        lifecycle.on_error(connection_id, &e.to_string()).await;
        close_quietly(&*handle).await;
        return;
    }

    // ── Read loop ─────────────────────────────────────────────────────────────
    loop {
        let msg = match stream.next().await {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => {
                lifecycle.on_error(connection_id, &e.to_string()).await;
                break;
            }
            None => {
                debug!("session {session_id}: socket stream ended without close frame");
                lifecycle
                    .on_close(connection_id, CloseInfo::abnormal())
                    .await;
                break;
            }
        };

        match msg {
            Message::Text(text) => {
                if let Err(e) = lifecycle.on_message(&*handle, text.as_str()).await {
                    lifecycle.on_error(connection_id, &e.to_string()).await;
                    break;
                }
            }

            Message::Close(frame) => {
                lifecycle
                    .on_close(connection_id, close_info(frame.as_ref()))
                    .await;
                break;
            }

            Message::Binary(data) => {
                // Frames on this socket are JSON text; binary is ignored.
                debug!(
                    "session {session_id}: ignoring binary frame ({} bytes)",
                    data.len()
                );
            }

            Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    close_quietly(&*handle).await;
}

fn close_info(frame: Option<&CloseFrame>) -> CloseInfo {
    match frame {
        Some(frame) => CloseInfo {
            code: frame.code,
            reason: frame.reason.as_str().to_string(),
            clean: true,
        },
        None => CloseInfo {
            code: 1005,
            reason: String::new(),
            clean: true,
        },
    }
}

async fn close_quietly(handle: &dyn Connection) {
    if let Err(e) = handle.close().await {
        debug!("{}: close after session end: {e}", handle.id());
    }
}
