//! Boundary rules between HTTP and the relay core.
//!
//! Pure functions, no I/O.  The infrastructure layer extracts raw strings from
//! the request and hands them here; the results are turned back into HTTP
//! responses over there.
//!
//! # Status mapping
//!
//! | Outcome            | Status |
//! |--------------------|--------|
//! | delivered          | 200    |
//! | missing session id | 400    |
//! | `SessionUnknown`   | 404    |
//! | `ConnectionLost`   | 410    |
//! | `RelayFailed`      | 500    |
//! | store unavailable  | 500    |

use serde_json::Value;
use thiserror::Error;

use relay_core::{RelayError, ServerMessage, SessionId};

use crate::domain::messages::ErrorBody;

/// Request header carrying the caller's session id.
pub const SESSION_HEADER: &str = "x-session-id";

/// Client errors detected before the relay core is involved.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BoundaryError {
    /// Neither the header nor the query string carried a non-empty id.
    #[error("a non-empty session id is required (header `x-session-id` or query `sessionId`)")]
    MissingSessionId,
}

impl BoundaryError {
    pub fn status_code(&self) -> u16 {
        match self {
            BoundaryError::MissingSessionId => 400,
        }
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            error: "missing_session_id".to_string(),
            message: self.to_string(),
            session_id: None,
        }
    }
}

/// Picks the caller's session id: header first, then query string.
///
/// Blank values count as absent.
///
/// # Errors
///
/// Returns [`BoundaryError::MissingSessionId`] when neither source has one.
pub fn resolve_session_id(
    header: Option<&str>,
    query: Option<&str>,
) -> Result<SessionId, BoundaryError> {
    header
        .and_then(SessionId::parse)
        .or_else(|| query.and_then(SessionId::parse))
        .ok_or(BoundaryError::MissingSessionId)
}

/// Wraps a caller's JSON body into the frame written to the session.
///
/// # Errors
///
/// Propagates `serde_json` encoding failures.
pub fn relay_frame(body: Value) -> Result<String, serde_json::Error> {
    ServerMessage::Message { data: body }.to_json()
}

/// Response body for a relay failure.
pub fn error_body(err: &RelayError) -> ErrorBody {
    ErrorBody {
        error: err.kind().to_string(),
        message: err.to_string(),
        session_id: Some(err.session_id().to_string()),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::TransportError;
    use serde_json::json;

    #[test]
    fn test_header_takes_precedence_over_query() {
        // Arrange / Act
        let id = resolve_session_id(Some("from-header"), Some("from-query")).unwrap();
        // Assert
        assert_eq!(id.as_str(), "from-header");
    }

    #[test]
    fn test_query_used_when_header_absent() {
        let id = resolve_session_id(None, Some("from-query")).unwrap();
        assert_eq!(id.as_str(), "from-query");
    }

    #[test]
    fn test_blank_header_falls_back_to_query() {
        let id = resolve_session_id(Some("  "), Some("q")).unwrap();
        assert_eq!(id.as_str(), "q");
    }

    #[test]
    fn test_missing_everywhere_is_400() {
        let err = resolve_session_id(None, Some("")).unwrap_err();
        assert_eq!(err, BoundaryError::MissingSessionId);
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.to_body().error, "missing_session_id");
    }

    #[test]
    fn test_relay_frame_wraps_body_as_message() {
        let frame = relay_frame(json!({"text": "hi"})).unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value, json!({"type": "message", "data": {"text": "hi"}}));
    }

    #[test]
    fn test_error_body_for_each_relay_error() {
        let id = SessionId::parse("abc").unwrap();
        let cases = [
            (RelayError::SessionUnknown(id.clone()), "session_unknown", 404),
            (RelayError::ConnectionLost(id.clone()), "connection_lost", 410),
            (
                RelayError::RelayFailed {
                    session_id: id.clone(),
                    source: TransportError::Closed,
                },
                "relay_failed",
                500,
            ),
        ];

        for (err, kind, status) in cases {
            let body = error_body(&err);
            assert_eq!(body.error, kind);
            assert_eq!(body.session_id.as_deref(), Some("abc"));
            assert_eq!(err.status_code(), status);
        }
    }
}
