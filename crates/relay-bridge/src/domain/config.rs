//! Bridge configuration types.
//!
//! [`BridgeConfig`] is the single source of truth for all runtime settings.
//! `main.rs` fills it from CLI arguments and environment variables; tests
//! build it directly, usually from [`BridgeConfig::default`] with an ephemeral
//! port.
//!
//! # The internal WebSocket URL
//!
//! Every SSE stream is backed by a WebSocket the bridge opens *to itself*.
//! When `ws_url` is not set, the URL is derived from the address the listener
//! actually bound.  A wildcard bind (`0.0.0.0` / `::`) is not a connectable
//! address, so loopback is substituted.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// All runtime configuration for the relay bridge.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Address the HTTP server binds to.
    pub bind_addr: SocketAddr,

    /// Explicit URL of this server's `/ws` endpoint, for deployments behind a
    /// proxy.  `None` derives it from the bound address.
    pub ws_url: Option<String>,

    /// TOML file holding durable session markers.  `None` keeps markers in
    /// memory only, so they do not survive a restart.
    pub store_path: Option<PathBuf>,

    /// Upper bound on a single relay send.
    pub send_timeout: Duration,

    /// Upper bound on opening the internal WebSocket and receiving its
    /// `connected` frame.
    pub connect_timeout: Duration,

    /// Upper bound on one durable store operation.
    pub store_timeout: Duration,

    /// Interval between SSE keep-alive comments.
    pub sse_keepalive: Duration,
}

impl BridgeConfig {
    /// Resolves the internal WebSocket URL for a listener bound at `local_addr`.
    ///
    /// ```rust
    /// use relay_bridge::domain::BridgeConfig;
    ///
    /// let cfg = BridgeConfig::default();
    /// let url = cfg.ws_url_for("0.0.0.0:4000".parse().unwrap());
    /// assert_eq!(url, "ws://127.0.0.1:4000/ws");
    /// ```
    pub fn ws_url_for(&self, local_addr: SocketAddr) -> String {
        if let Some(url) = &self.ws_url {
            return url.clone();
        }
        let mut addr = local_addr;
        if addr.ip().is_unspecified() {
            addr.set_ip(match addr.ip() {
                IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::LOCALHOST),
                IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::LOCALHOST),
            });
        }
        format!("ws://{addr}/ws")
    }
}

impl Default for BridgeConfig {
    /// Defaults suitable for local development.
    ///
    /// | Field           | Default            |
    /// |-----------------|--------------------|
    /// | bind_addr       | `127.0.0.1:3000`   |
    /// | ws_url          | derived            |
    /// | store_path      | none (in-memory)   |
    /// | send_timeout    | 5 seconds          |
    /// | connect_timeout | 5 seconds          |
    /// | store_timeout   | 2 seconds          |
    /// | sse_keepalive   | 15 seconds         |
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 3000)),
            ws_url: None,
            store_path: None,
            send_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(5),
            store_timeout: Duration::from_secs(2),
            sse_keepalive: Duration::from_secs(15),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_port_is_3000() {
        // Arrange / Act
        let cfg = BridgeConfig::default();
        // Assert
        assert_eq!(cfg.bind_addr.port(), 3000);
        assert!(cfg.bind_addr.ip().is_loopback());
    }

    #[test]
    fn test_default_store_is_in_memory() {
        let cfg = BridgeConfig::default();
        assert!(cfg.store_path.is_none());
    }

    #[test]
    fn test_default_timeouts() {
        let cfg = BridgeConfig::default();
        assert_eq!(cfg.send_timeout, Duration::from_secs(5));
        assert_eq!(cfg.connect_timeout, Duration::from_secs(5));
        assert_eq!(cfg.store_timeout, Duration::from_secs(2));
        assert_eq!(cfg.sse_keepalive, Duration::from_secs(15));
    }

    #[test]
    fn test_ws_url_derived_from_bound_address() {
        let cfg = BridgeConfig::default();
        let url = cfg.ws_url_for("127.0.0.1:45678".parse().unwrap());
        assert_eq!(url, "ws://127.0.0.1:45678/ws");
    }

    #[test]
    fn test_ws_url_replaces_ipv6_wildcard_with_loopback() {
        let cfg = BridgeConfig::default();
        let url = cfg.ws_url_for("[::]:8080".parse().unwrap());
        assert_eq!(url, "ws://[::1]:8080/ws");
    }

    #[test]
    fn test_explicit_ws_url_wins() {
        let cfg = BridgeConfig {
            ws_url: Some("ws://relay.internal:9000/ws".to_string()),
            ..BridgeConfig::default()
        };
        let url = cfg.ws_url_for("0.0.0.0:3000".parse().unwrap());
        assert_eq!(url, "ws://relay.internal:9000/ws");
    }
}
