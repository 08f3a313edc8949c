//! # relay-core
//!
//! Session-addressable connection registry for the SSE relay.
//!
//! A browser can only *receive* on a Server-Sent Events stream.  To let other
//! parties push messages into that stream, the relay pairs every stream with
//! an internal WebSocket connection and files that connection under an opaque
//! session identifier.  Anyone holding the identifier can then relay a payload
//! to the stream through a plain request/response call.
//!
//! This crate holds everything that has real invariants and none of the HTTP
//! plumbing:
//!
//! - **`session`** – Session and connection identity types, plus the named
//!   [`SessionState`] classification.
//! - **`connection`** – The [`Connection`] trait: the seam between the core
//!   and whatever transport carries frames.
//! - **`store`** – The durable existence-marker store ([`DurableStore`]) with
//!   in-memory and TOML-file implementations.
//! - **`registry`** – The [`SessionRegistry`]: a bidirectional index of
//!   session id ⇄ live connection, backed by the durable store.
//! - **`relay`** – The [`ConnectionRelay`]: forwards one payload to one
//!   session and classifies every failure precisely.
//! - **`lifecycle`** – The [`LifecycleHandler`]: reacts to opened, message,
//!   closed and errored events and owns all mutation of the registry.
//! - **`messages`** – JSON frames the relay sends over a connection.
//!
//! # The two facets of a session (for beginners)
//!
//! Each session has a *durable* flag (persisted, survives restarts) and a
//! *volatile* handle (in memory, only while the socket is open).  The flag
//! may outlive the handle, for example after a process restart.  That state
//! is kept and reported as [`SessionState::ReconnectRequired`]
//! so relay callers can tell "never existed" apart from "existed, reconnect".
//! The opposite (a live handle without a durable flag) is never observable.

pub mod connection;
pub mod lifecycle;
pub mod messages;
pub mod registry;
pub mod relay;
pub mod session;
pub mod store;

pub use connection::{Connection, TransportError};
pub use lifecycle::{CloseInfo, LifecycleError, LifecycleHandler};
pub use messages::ServerMessage;
pub use registry::{OpenRefused, SessionRegistry};
pub use relay::{ConnectionRelay, Delivered, RelayError};
pub use session::{ConnectionId, SessionId, SessionState};
pub use store::{session_key, DurableStore, FileStore, MemoryStore, StoreError, PRESENCE_MARKER};

#[cfg(test)]
pub(crate) mod test_support;
