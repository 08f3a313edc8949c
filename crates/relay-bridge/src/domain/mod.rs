//! Domain layer for relay-bridge.
//!
//! Plain data with no dependencies on sockets, runtimes or HTTP frameworks:
//!
//! - [`BridgeConfig`] – every runtime setting, built once in `main.rs`.
//! - Response bodies for the HTTP boundary (`messages`).

pub mod config;
pub mod messages;

pub use config::BridgeConfig;
pub use messages::{DeliveredBody, ErrorBody, HealthBody, SessionQuery, SessionStateBody};
