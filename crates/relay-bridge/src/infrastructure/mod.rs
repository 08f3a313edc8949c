//! Infrastructure layer for relay-bridge.
//!
//! All I/O lives here:
//!
//! - Binding the HTTP listener and serving the axum router (`http_server`)
//! - Opening the internal WebSocket for each SSE stream and forwarding its
//!   frames as events (`stream_bridge`)
//! - Driving the server side of each internal WebSocket through the lifecycle
//!   handler (`ws_session`)
//! - Writing frames to a WebSocket on behalf of the relay (`ws_connection`)
//!
//! Protocol decisions (status codes, id resolution) belong to the application
//! layer; configuration parsing is done in `main.rs`.

pub mod http_server;
pub mod stream_bridge;
pub mod ws_connection;
pub mod ws_session;

pub use http_server::{build_router, run_server, AppState, RelayServer};
pub use stream_bridge::{BridgeError, StreamBridge};
