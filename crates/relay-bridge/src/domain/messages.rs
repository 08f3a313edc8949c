//! JSON bodies exchanged at the HTTP boundary.
//!
//! ```json
//! POST /message  → 200 {"status":"delivered"}
//!                → 404 {"error":"session_unknown","message":"…","sessionId":"…"}
//!                → 410 {"error":"connection_lost","message":"…","sessionId":"…"}
//! GET  /health   → 200 {"status":"ok","liveSessions":3}
//! GET  /sessions/{id} → 200 {"sessionId":"…","state":"reconnect_required"}
//! ```
//!
//! Frames on the SSE stream itself are `relay_core::ServerMessage`, not these.

use serde::{Deserialize, Serialize};

/// Success body for a relayed message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveredBody {
    pub status: String,
}

impl DeliveredBody {
    pub fn delivered() -> Self {
        Self {
            status: "delivered".to_string(),
        }
    }
}

/// Error body for any non-2xx response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    /// Machine-readable kind (`session_unknown`, `connection_lost`, …).
    pub error: String,
    /// Human-readable description.
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthBody {
    pub status: String,
    pub live_sessions: usize,
}

/// Body of `GET /sessions/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStateBody {
    pub session_id: String,
    /// `unknown`, `open` or `reconnect_required`.
    pub state: String,
}

/// Query string accepted by `/ws` and `/message`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SessionQuery {
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_error_body_omits_missing_session_id() {
        let body = ErrorBody {
            error: "missing_session_id".into(),
            message: "x".into(),
            session_id: None,
        };
        let value: Value = serde_json::to_value(&body).unwrap();
        assert_eq!(value, json!({"error": "missing_session_id", "message": "x"}));
    }

    #[test]
    fn test_error_body_uses_camel_case_session_id() {
        let body = ErrorBody {
            error: "connection_lost".into(),
            message: "gone".into(),
            session_id: Some("abc".into()),
        };
        let value: Value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["sessionId"], "abc");
    }

    #[test]
    fn test_health_body_shape() {
        let body = HealthBody {
            status: "ok".into(),
            live_sessions: 2,
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({"status": "ok", "liveSessions": 2})
        );
    }
}
