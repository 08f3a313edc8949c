//! Durable existence-marker store.
//!
//! Only the *existence* of a session is persisted, never message payloads.
//! Every marker lives under the key `"session:" + session_id` and its value is
//! a presence marker with no meaning of its own.
//!
//! Two implementations ship with the crate:
//!
//! - [`MemoryStore`] – a map behind a lock.  Markers vanish with the process;
//!   used by default and in tests.
//! - [`FileStore`] – markers mirrored to a TOML file, so a restarted process
//!   still knows which sessions existed and reports them as
//!   "reconnect required" instead of "unknown".

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::session::SessionId;

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Prefix shared by every session marker key.
pub const SESSION_KEY_PREFIX: &str = "session:";

/// Value written for a present session.  Carries no payload semantics.
pub const PRESENCE_MARKER: &str = "1";

/// Builds the store key for `session_id`.
///
/// ```rust
/// use relay_core::{session_key, SessionId};
///
/// let id = SessionId::parse("abc").unwrap();
/// assert_eq!(session_key(&id), "session:abc");
/// ```
pub fn session_key(session_id: &SessionId) -> String {
    format!("{SESSION_KEY_PREFIX}{session_id}")
}

/// Error type for durable store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing marker store at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The marker file content could not be parsed.
    #[error("failed to parse marker store TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The markers could not be serialized to TOML.
    #[error("failed to serialize marker store: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// The operation did not finish within the configured bound.
    #[error("marker store operation timed out after {0:?}")]
    Timeout(Duration),

    /// The backing store refused the operation for another reason.
    #[error("marker store unavailable: {0}")]
    Unavailable(String),
}

/// Key/value contract consumed by the session registry.
///
/// Implementations must be safe to call concurrently.  `delete` of an absent
/// key succeeds.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Writes `value` under `key`, replacing any previous value.
    async fn put(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Reads the value under `key`, or `None` when absent.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Removes `key`.  Absent keys are not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}
