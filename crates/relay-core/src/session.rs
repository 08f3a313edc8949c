//! Session and connection identity.
//!
//! # Two kinds of identifier
//!
//! - [`SessionId`] is the opaque string a relay caller holds.  It is minted
//!   from a UUID v4 (122 random bits), so two streams never collide in
//!   practice, and it is never reused: every new stream gets a fresh one.
//! - [`ConnectionId`] names one live transport handle inside this process.
//!   The registry uses it for the reverse index (handle → session) so that a
//!   closing socket can be matched back to its session in O(1).
//!
//! # Connection id allocation
//!
//! Connection ids come from a process-wide `AtomicU64`.  `fetch_add` reads and
//! increments as one indivisible step, so two sockets opening at the same
//! instant on different threads still receive different ids.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque, globally-unique session identifier.
///
/// The relay never interprets the contents; externally supplied identifiers
/// (for example from a query string) are accepted as-is as long as they are
/// non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Mints a fresh identifier from a random UUID v4.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use relay_core::SessionId;
    ///
    /// let a = SessionId::generate();
    /// let b = SessionId::generate();
    /// assert_ne!(a, b);
    /// ```
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wraps an externally supplied identifier.
    ///
    /// Returns `None` when `raw` is empty or only whitespace; the boundary layer
    /// turns that into a client error.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Process-local identity of one transport handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

impl ConnectionId {
    /// Allocates the next unused connection id.
    ///
    /// `Relaxed` ordering is enough: the value is only used as a map key, never
    /// to publish other memory between threads.
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw numeric value (for logging).
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Observable state of a session, combining both facets.
///
/// | durable flag | live handle | state               |
/// |--------------|-------------|---------------------|
/// | absent       | absent      | `Unknown`           |
/// | present      | present     | `Open`              |
/// | present      | absent      | `ReconnectRequired` |
///
/// The fourth combination (handle without flag) is excluded by the ordering
/// the lifecycle handler follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Never seen, or already closed.
    Unknown,
    /// Durable flag set and a live handle attached in this process.
    Open,
    /// Durable flag set but no live handle: the transport vanished without a
    /// close notification (e.g. process restart, failed send).
    ReconnectRequired,
}

impl SessionState {
    /// Stable snake_case name, as reported over HTTP.
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Unknown => "unknown",
            SessionState::Open => "open",
            SessionState::ReconnectRequired => "reconnect_required",
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_generated_session_ids_are_uuid_text() {
        // Arrange / Act
        let id = SessionId::generate();

        // Assert: the textual form parses back as a UUID
        assert!(Uuid::parse_str(id.as_str()).is_ok());
    }

    #[test]
    fn test_generated_session_ids_do_not_repeat() {
        let ids: HashSet<SessionId> = (0..1000).map(|_| SessionId::generate()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_parse_rejects_empty_and_blank() {
        assert!(SessionId::parse("").is_none());
        assert!(SessionId::parse("   ").is_none());
    }

    #[test]
    fn test_parse_trims_surrounding_whitespace() {
        let id = SessionId::parse("  abc-123 ").unwrap();
        assert_eq!(id.as_str(), "abc-123");
    }

    #[test]
    fn test_session_id_serializes_as_plain_string() {
        let id = SessionId::parse("abc").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc\"");
    }

    #[test]
    fn test_connection_ids_are_unique_across_threads() {
        // Arrange: 4 threads each allocate 500 ids
        let collected = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let collected = Arc::clone(&collected);
                thread::spawn(move || {
                    let local: Vec<_> = (0..500).map(|_| ConnectionId::next()).collect();
                    collected.lock().extend(local);
                })
            })
            .collect();

        // Act
        for h in handles {
            h.join().unwrap();
        }

        // Assert: no duplicates
        let all = collected.lock();
        let unique: HashSet<_> = all.iter().copied().collect();
        assert_eq!(unique.len(), 2000);
    }

    #[test]
    fn test_connection_id_display() {
        let id = ConnectionId(7);
        assert_eq!(id.to_string(), "conn-7");
    }

    #[test]
    fn test_session_state_names() {
        assert_eq!(SessionState::Unknown.as_str(), "unknown");
        assert_eq!(SessionState::Open.as_str(), "open");
        assert_eq!(SessionState::ReconnectRequired.as_str(), "reconnect_required");
    }
}
