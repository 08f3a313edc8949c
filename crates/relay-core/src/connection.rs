//! The transport seam.
//!
//! The core never touches sockets.  It holds connections as
//! `Arc<dyn Connection>` and only ever asks them to send a text frame or to
//! close.  The bridge crate implements this trait over an axum WebSocket; tests
//! implement it over a `Vec<String>`.
//!
//! # Atomic frames
//!
//! Implementations must send each `send_text` payload as one unit (one
//! WebSocket frame), serialising concurrent callers internally.  That is what
//! guarantees two relays to the same session never interleave their bytes.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::session::ConnectionId;

/// Transport-level failure reported by a [`Connection`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The peer already closed the connection.
    #[error("connection closed")]
    Closed,

    /// The underlying transport rejected the write.
    #[error("send failed: {0}")]
    Send(String),

    /// The write did not complete within the allowed time.
    #[error("send timed out after {0:?}")]
    Timeout(Duration),
}

/// A live bidirectional connection that can carry text frames to its peer.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Process-local identity, used by the registry's reverse index.
    fn id(&self) -> ConnectionId;

    /// Sends `text` to the peer as a single frame.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the frame could not be written.
    async fn send_text(&self, text: String) -> Result<(), TransportError>;

    /// Starts a close handshake.  Closing an already-closed connection is not
    /// an error worth reporting to callers; implementations may return
    /// [`TransportError::Closed`] and callers log it at debug.
    async fn close(&self) -> Result<(), TransportError>;
}
