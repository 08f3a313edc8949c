//! The connection relay: deliver one payload to one session.
//!
//! # Algorithm
//!
//! ```text
//! relay(id, payload)
//!   is_durable(id)?  ── no ──▶ SessionUnknown      (404)
//!        │ yes
//!   lookup(id)?      ── no ──▶ ConnectionLost      (410)
//!        │ found
//!   send (bounded)   ── err ─▶ unregister handle,
//!        │ ok                  keep durable flag ─▶ RelayFailed (500)
//!   Delivered                                        (200)
//! ```
//!
//! The only side effect is the unregister on a failed send.  The durable flag
//! is left alone there: the session still exists until its own
//! close/error event arrives, and the next relay reports `ConnectionLost`.
//!
//! The durable check and the lookup are two separate reads, not one
//! snapshot.  A close that lands between them (handle removed, flag not yet
//! cleared) makes that one relay report `ConnectionLost` for a session that
//! is in fact ending.  Once the close has cleared the flag, every later relay
//! reports `SessionUnknown`.  The window is no wider than one close, and
//! both answers tell the caller to open a new stream, so it is accepted.
//!
//! There are no retries.  Backoff is the caller's business.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::connection::TransportError;
use crate::registry::SessionRegistry;
use crate::session::SessionId;
use crate::store::StoreError;

/// Default bound on a single relay send.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Successful relay outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivered;

/// Why a relay did not deliver.
#[derive(Debug, Error)]
pub enum RelayError {
    /// No durable record exists (never did, or already cleared).  Permanent
    /// for this identifier; the caller must open a new stream.
    #[error("session {0} is unknown")]
    SessionUnknown(SessionId),

    /// The session is durably valid but has no live transport in this
    /// process.  The caller should re-establish a stream.
    #[error("session {0} has no live connection; reconnect required")]
    ConnectionLost(SessionId),

    /// The handle was present but the send failed.  The handle has been
    /// unregistered; the durable flag is untouched.
    #[error("relay to session {session_id} failed: {source}")]
    RelayFailed {
        session_id: SessionId,
        #[source]
        source: TransportError,
    },

    /// The durable store could not answer whether the session exists.
    #[error("marker store unavailable while relaying to {session_id}: {source}")]
    StoreUnavailable {
        session_id: SessionId,
        #[source]
        source: StoreError,
    },
}

impl RelayError {
    /// HTTP status the boundary reports for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            RelayError::SessionUnknown(_) => 404,
            RelayError::ConnectionLost(_) => 410,
            RelayError::RelayFailed { .. } | RelayError::StoreUnavailable { .. } => 500,
        }
    }

    /// The session the failed relay was addressed to.
    pub fn session_id(&self) -> &SessionId {
        match self {
            RelayError::SessionUnknown(id) | RelayError::ConnectionLost(id) => id,
            RelayError::RelayFailed { session_id, .. }
            | RelayError::StoreUnavailable { session_id, .. } => session_id,
        }
    }

    /// Stable machine-readable name for response bodies and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::SessionUnknown(_) => "session_unknown",
            RelayError::ConnectionLost(_) => "connection_lost",
            RelayError::RelayFailed { .. } => "relay_failed",
            RelayError::StoreUnavailable { .. } => "store_unavailable",
        }
    }
}

/// Forwards payloads to live connections through the shared registry.
pub struct ConnectionRelay {
    registry: Arc<SessionRegistry>,
    send_timeout: Duration,
}

impl ConnectionRelay {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self::with_send_timeout(registry, DEFAULT_SEND_TIMEOUT)
    }

    pub fn with_send_timeout(registry: Arc<SessionRegistry>, send_timeout: Duration) -> Self {
        Self {
            registry,
            send_timeout,
        }
    }

    /// Relays `payload` to the connection filed under `session_id`.
    ///
    /// # Errors
    ///
    /// See [`RelayError`] for the classification.
    pub async fn relay(
        &self,
        session_id: &SessionId,
        payload: String,
    ) -> Result<Delivered, RelayError> {
        let durable = self.registry.is_durable(session_id).await.map_err(|source| {
            RelayError::StoreUnavailable {
                session_id: session_id.clone(),
                source,
            }
        })?;
        if !durable {
            debug!("relay to {session_id}: session unknown");
            return Err(RelayError::SessionUnknown(session_id.clone()));
        }

        let Some(handle) = self.registry.lookup(session_id) else {
            debug!("relay to {session_id}: no live connection");
            return Err(RelayError::ConnectionLost(session_id.clone()));
        };

        let len = payload.len();
        let outcome = match timeout(self.send_timeout, handle.send_text(payload)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(self.send_timeout)),
        };

        match outcome {
            Ok(()) => {
                debug!("relay to {session_id}: delivered {len} bytes");
                Ok(Delivered)
            }
            Err(source) => {
                warn!(
                    "relay to {session_id}: send on {} failed: {source}; unregistering handle",
                    handle.id()
                );
                self.registry.unregister_if(session_id, handle.id());
                Err(RelayError::RelayFailed {
                    session_id: session_id.clone(),
                    source,
                })
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
