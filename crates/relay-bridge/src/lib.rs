//! relay-bridge library crate.
//!
//! HTTP front end that lets a browser receive messages over Server-Sent Events
//! while anyone holding its session id pushes messages in with a plain `POST`.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Browser ◀── SSE ── GET /events ──┐
//!                                  │  stream bridge opens an internal
//!                                  ▼  WebSocket tagged with a fresh id
//!                         GET /ws?sessionId=… ──▶ lifecycle handler
//!                                                   │  registry (relay-core)
//! Caller ── POST /message (x-session-id) ──▶ relay ─┘
//!
//! [relay-bridge]
//!   ├── domain/           Pure types: BridgeConfig, HTTP response bodies
//!   ├── application/      Boundary rules: session id resolution, status mapping
//!   └── infrastructure/
//!         ├── http_server/   axum router, handlers, server lifecycle
//!         ├── stream_bridge/ SSE side: internal WebSocket client → events
//!         ├── ws_session/    server side of the internal WebSocket
//!         └── ws_connection/ `Connection` impl over an axum WebSocket sink
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async.
//! - `application` depends on `domain` and `relay-core` only.
//! - `infrastructure` depends on all other layers plus `axum`, `tokio` and
//!   `tokio-tungstenite`.

/// Domain layer: configuration and response body types (no I/O).
pub mod domain;

/// Application layer: boundary rules between HTTP and the relay core.
pub mod application;

/// Infrastructure layer: HTTP server, SSE bridge and WebSocket plumbing.
pub mod infrastructure;
