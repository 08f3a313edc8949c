//! Application layer for relay-bridge.
//!
//! Knows *what* the HTTP boundary means in terms of the relay core, without
//! touching sockets or axum types:
//!
//! - Where a caller's session id comes from and when its absence is an error.
//! - How relay outcomes map onto status codes and response bodies.
//! - How a caller's JSON body becomes a relay frame.

pub mod boundary;

pub use boundary::{
    error_body, relay_frame, resolve_session_id, BoundaryError, SESSION_HEADER,
};
