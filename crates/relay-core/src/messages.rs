//! JSON frames the relay writes onto a connection.
//!
//! Every frame is a JSON object with a `"type"` discriminant:
//!
//! ```json
//! {"type":"connected","sessionId":"0b6f4c8e-…"}
//! {"type":"message","data":{"text":"hello"}}
//! {"type":"ack","received":{"ping":1}}
//! {"type":"error","error":"malformed payload","detail":"expected value at line 1 column 1"}
//! ```
//!
//! The bridge forwards frames onto the SSE stream verbatim, so this is also
//! the event format SSE consumers see.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Error string used for payloads that are not valid JSON.
pub const MALFORMED_PAYLOAD: &str = "malformed payload";

/// A frame sent from the relay to a connection peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    /// First frame on every connection: confirms the session id once the
    /// session is both persisted and registered.
    Connected {
        #[serde(rename = "sessionId")]
        session_id: String,
    },

    /// A payload relayed by an external caller.
    Message { data: Value },

    /// Echo of a structured payload the peer sent us.
    Ack { received: Value },

    /// The peer sent something we could not parse.
    Error { error: String, detail: String },
}

impl ServerMessage {
    /// Serializes the frame to its JSON text form.
    ///
    /// # Errors
    ///
    /// Only fails if a contained `Value` cannot be serialized, which
    /// `serde_json` does not do for values it produced itself.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Short variant name for log lines (never the payload itself).
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Connected { .. } => "connected",
            ServerMessage::Message { .. } => "message",
            ServerMessage::Ack { .. } => "ack",
            ServerMessage::Error { .. } => "error",
        }
    }
}
