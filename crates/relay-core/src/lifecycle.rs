//! Connection lifecycle handler.
//!
//! The transport adapter reports four events per connection and this module
//! turns them into registry mutations.  It is the only writer of the registry
//! apart from the relay's cleanup after a failed send.
//!
//! # Per-session state machine
//!
//! ```text
//!            Opened                Closed / Errored
//! Unknown ───────────▶ Open ─────────────────────────▶ Closed
//! ```
//!
//! `Open` is entered only from `Unknown`.  An open is refused when the id
//! already has a live handle, is being opened by another connection, has
//! closed in this process, or already has a durable marker.  `Closed` is
//! terminal: session ids are never reused, so a later connection always
//! starts again from `Unknown` under a fresh id.
//!
//! # Ordering
//!
//! - **Open**: claim the id, then the durable flag, then the handle, then the
//!   acknowledgement.  While the claim is held no other connection can file a
//!   handle under the id, so the flag and the handle describe the same
//!   connection.  A peer that has seen `connected` can be relayed to
//!   immediately.
//! - **Close/Error**: handle first, then the flag.  If clearing the flag fails
//!   the handle is still gone; the stale flag later surfaces as
//!   `ConnectionLost`, which is the safe direction.
//!
//! Closing handles are matched to their session through the registry's
//! reverse index, never through state supplied by the transport.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::connection::{Connection, TransportError};
use crate::messages::{ServerMessage, MALFORMED_PAYLOAD};
use crate::registry::{OpenRefused, SessionRegistry};
use crate::session::{ConnectionId, SessionId};
use crate::store::StoreError;

/// Diagnostics carried by a close event.  Not used for any decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
    pub clean: bool,
}

impl CloseInfo {
    /// Close observed without a close frame (peer vanished).
    pub fn abnormal() -> Self {
        Self {
            code: 1006,
            reason: String::new(),
            clean: false,
        }
    }
}

/// Failures while handling lifecycle events.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The id is not in `Unknown`, so it cannot be opened.
    #[error("session {session_id} cannot be opened: {reason}")]
    Refused {
        session_id: SessionId,
        reason: OpenRefused,
    },

    /// The durable flag could not be written, so the session was not opened.
    #[error("could not persist session {session_id}: {source}")]
    Persist {
        session_id: SessionId,
        #[source]
        source: StoreError,
    },

    /// A frame could not be written back to the peer.
    #[error("could not reply on connection: {0}")]
    Reply(#[from] TransportError),

    /// A reply frame could not be encoded.
    #[error("could not encode reply: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Reacts to connection events and keeps the registry in step.
pub struct LifecycleHandler {
    registry: Arc<SessionRegistry>,
}

impl LifecycleHandler {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// The registry this handler mutates.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// A connection tagged with `session_id` has been accepted.
    ///
    /// # Errors
    ///
    /// - [`LifecycleError::Refused`] if the id is not in `Unknown`.  Nothing
    ///   is touched; the caller should close the connection.
    /// - [`LifecycleError::Persist`] if the durable flag cannot be written.
    ///   Nothing is registered; the caller should close the connection.
    /// - [`LifecycleError::Reply`] if the `connected` frame cannot be sent.
    ///   The session *is* registered; the caller should report the connection
    ///   as errored so it is cleaned up.
    pub async fn on_open(
        &self,
        session_id: SessionId,
        handle: Arc<dyn Connection>,
    ) -> Result<(), LifecycleError> {
        self.registry
            .claim(&session_id)
            .map_err(|reason| LifecycleError::Refused {
                session_id: session_id.clone(),
                reason,
            })?;

        if let Err(e) = self.persist(&session_id).await {
            self.registry.release_claim(&session_id);
            return Err(e);
        }

        // The claim keeps other opens out, so nothing should be displaced.
        if let Some(displaced) = self.registry.register(session_id.clone(), Arc::clone(&handle)) {
            warn!(
                "session {session_id}: replaced live handle {} with {}; closing it",
                displaced.id(),
                handle.id()
            );
            if let Err(e) = displaced.close().await {
                debug!("{}: close of displaced handle failed: {e}", displaced.id());
            }
        }

        let ack = ServerMessage::Connected {
            session_id: session_id.to_string(),
        }
        .to_json()?;
        handle.send_text(ack).await?;

        info!("session {session_id}: opened on {}", handle.id());
        Ok(())
    }

    /// Writes the durable flag for a freshly claimed id.
    ///
    /// A marker that is already present belongs to an earlier process and is
    /// never adopted.
    async fn persist(&self, session_id: &SessionId) -> Result<(), LifecycleError> {
        let persist_err = |source: StoreError| LifecycleError::Persist {
            session_id: session_id.clone(),
            source,
        };

        if self.registry.is_durable(session_id).await.map_err(persist_err)? {
            return Err(LifecycleError::Refused {
                session_id: session_id.clone(),
                reason: OpenRefused::Durable,
            });
        }
        self.registry
            .mark_durable(session_id)
            .await
            .map_err(persist_err)
    }

    /// A text payload arrived from the peer.
    ///
    /// Parses it as JSON and replies with an `ack` echoing the parsed value, or
    /// with exactly one `error` frame if it does not parse.  Registry state is
    /// never touched here.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Reply`] only when the reply cannot be written;
    /// a malformed payload is not an error for the caller.
    pub async fn on_message(
        &self,
        handle: &dyn Connection,
        payload: &str,
    ) -> Result<(), LifecycleError> {
        let reply = match serde_json::from_str::<Value>(payload) {
            Ok(received) => ServerMessage::Ack { received },
            Err(e) => {
                debug!(
                    "{}: malformed payload ({} bytes): {e}",
                    handle.id(),
                    payload.len()
                );
                ServerMessage::Error {
                    error: MALFORMED_PAYLOAD.to_string(),
                    detail: e.to_string(),
                }
            }
        };
        handle.send_text(reply.to_json()?).await?;
        Ok(())
    }

    /// The connection closed.  Returns the session that was cleaned up, or
    /// `None` if the handle was not tracked (already cleaned up).
    pub async fn on_close(&self, connection_id: ConnectionId, info: CloseInfo) -> Option<SessionId> {
        debug!(
            "{connection_id}: closed (code={}, clean={}, reason={:?})",
            info.code, info.clean, info.reason
        );
        self.terminate(connection_id).await
    }

    /// The connection failed.  Same cleanup as [`Self::on_close`].
    pub async fn on_error(&self, connection_id: ConnectionId, error: &str) -> Option<SessionId> {
        debug!("{connection_id}: errored: {error}");
        self.terminate(connection_id).await
    }

    async fn terminate(&self, connection_id: ConnectionId) -> Option<SessionId> {
        let session_id = self.registry.retire_connection(connection_id)?;

        if let Err(e) = self.registry.clear_durable(&session_id).await {
            warn!("session {session_id}: handle removed but durable marker not cleared: {e}");
        }

        info!("session {session_id}: closed");
        Some(session_id)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
