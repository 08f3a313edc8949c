//! SSE relay bridge: entry point.
//!
//! This binary serves long-lived Server-Sent Event streams and lets other
//! parties push JSON payloads into them by session id.  Each event stream is
//! backed by an internal WebSocket the server opens to itself, so that every
//! session has one addressable connection handle in the registry.
//!
//! # Usage
//!
//! ```text
//! relay-bridge [OPTIONS]
//!
//! Options:
//!   --port                <PORT>  HTTP listener port [default: 3000]
//!   --bind                <IP>    HTTP bind address [default: 127.0.0.1]
//!   --ws-url              <URL>   Internal WebSocket URL [default: derived]
//!   --store-path          <PATH>  Durable session marker file [default: in-memory]
//!   --send-timeout-ms     <MS>    Relay send timeout [default: 5000]
//!   --connect-timeout-ms  <MS>    Internal WebSocket connect timeout [default: 5000]
//!   --store-timeout-ms    <MS>    Durable store operation timeout [default: 2000]
//!   --sse-keepalive-secs  <SECS>  SSE keep-alive interval [default: 15]
//! ```
//!
//! # Environment variable overrides
//!
//! Every option can also be set through the environment.  CLI args take
//! precedence when both are present.
//!
//! | Variable                   | Default       |
//! |----------------------------|---------------|
//! | `RELAY_PORT`               | `3000`        |
//! | `RELAY_BIND`               | `127.0.0.1`   |
//! | `RELAY_WS_URL`             | derived       |
//! | `RELAY_STORE_PATH`         | in-memory     |
//! | `RELAY_SEND_TIMEOUT_MS`    | `5000`        |
//! | `RELAY_CONNECT_TIMEOUT_MS` | `5000`        |
//! | `RELAY_STORE_TIMEOUT_MS`   | `2000`        |
//! | `RELAY_SSE_KEEPALIVE_SECS` | `15`          |
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use relay_bridge::domain::BridgeConfig;
use relay_bridge::infrastructure::run_server;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// SSE relay bridge.
///
/// Serves `/events` streams and relays `POST /message` bodies into them.
#[derive(Debug, Parser)]
#[command(
    name = "relay-bridge",
    about = "Relays JSON payloads into Server-Sent Event streams by session id",
    version
)]
struct Cli {
    /// TCP port for the HTTP server.
    #[arg(long, default_value_t = 3000, env = "RELAY_PORT")]
    port: u16,

    /// IP address to bind the HTTP server to.
    ///
    /// Use `0.0.0.0` to accept connections on every interface.
    #[arg(long, default_value = "127.0.0.1", env = "RELAY_BIND")]
    bind: String,

    /// URL of this server's `/ws` endpoint as reachable from itself.
    ///
    /// Only needed behind a proxy or NAT; otherwise derived from the bound
    /// address.
    #[arg(long, env = "RELAY_WS_URL")]
    ws_url: Option<String>,

    /// File holding durable session markers.
    ///
    /// Without it markers live in memory and are lost on restart.
    #[arg(long, env = "RELAY_STORE_PATH")]
    store_path: Option<PathBuf>,

    /// Upper bound on a single relay send, in milliseconds.
    #[arg(long, default_value_t = 5000, env = "RELAY_SEND_TIMEOUT_MS")]
    send_timeout_ms: u64,

    /// Upper bound on opening the internal WebSocket, in milliseconds.
    #[arg(long, default_value_t = 5000, env = "RELAY_CONNECT_TIMEOUT_MS")]
    connect_timeout_ms: u64,

    /// Upper bound on one durable store operation, in milliseconds.
    #[arg(long, default_value_t = 2000, env = "RELAY_STORE_TIMEOUT_MS")]
    store_timeout_ms: u64,

    /// Interval between SSE keep-alive comments, in seconds.
    #[arg(long, default_value_t = 15, env = "RELAY_SSE_KEEPALIVE_SECS")]
    sse_keepalive_secs: u64,
}

impl Cli {
    /// Converts the parsed CLI arguments into a [`BridgeConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if `--bind` is not a valid IP address or any timeout
    /// is zero.
    fn into_bridge_config(self) -> anyhow::Result<BridgeConfig> {
        let bind_addr: SocketAddr = format!("{}:{}", self.bind, self.port)
            .parse()
            .with_context(|| format!("invalid bind address: '{}:{}'", self.bind, self.port))?;

        for (flag, value) in [
            ("--send-timeout-ms", self.send_timeout_ms),
            ("--connect-timeout-ms", self.connect_timeout_ms),
            ("--store-timeout-ms", self.store_timeout_ms),
            ("--sse-keepalive-secs", self.sse_keepalive_secs),
        ] {
            anyhow::ensure!(value > 0, "{flag} must be greater than zero");
        }

        Ok(BridgeConfig {
            bind_addr,
            ws_url: self.ws_url,
            store_path: self.store_path,
            send_timeout: Duration::from_millis(self.send_timeout_ms),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            store_timeout: Duration::from_millis(self.store_timeout_ms),
            sse_keepalive: Duration::from_secs(self.sse_keepalive_secs),
        })
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// 1. Initialises `tracing_subscriber` from `RUST_LOG` (default `info`).
/// 2. Parses the CLI into a [`BridgeConfig`].
/// 3. Serves until Ctrl+C, then closes open event streams and exits.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging setup ─────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── Parse CLI arguments ───────────────────────────────────────────────────
    let config = Cli::parse().into_bridge_config()?;

    info!(
        "relay bridge starting: bind={}, store={}",
        config.bind_addr,
        config
            .store_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "in-memory".to_string())
    );

    // ── Serve until Ctrl+C ────────────────────────────────────────────────────
    run_server(config, ctrl_c()).await
}

/// Resolves on Ctrl+C.  If the signal handler cannot be installed, never
/// resolves, so the server keeps running instead of stopping at once.
async fn ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received Ctrl+C; initiating graceful shutdown"),
        Err(e) => {
            error!("failed to listen for Ctrl+C signal: {e}");
            std::future::pending::<()>().await;
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> Cli {
        Cli::parse_from(["relay-bridge"])
    }

    #[test]
    fn test_cli_defaults() {
        // Arrange / Act
        let cli = defaults();

        // Assert
        assert_eq!(cli.port, 3000);
        assert_eq!(cli.bind, "127.0.0.1");
        assert!(cli.ws_url.is_none());
        assert!(cli.store_path.is_none());
        assert_eq!(cli.send_timeout_ms, 5000);
        assert_eq!(cli.connect_timeout_ms, 5000);
        assert_eq!(cli.store_timeout_ms, 2000);
        assert_eq!(cli.sse_keepalive_secs, 15);
    }

    #[test]
    fn test_cli_port_override() {
        let cli = Cli::parse_from(["relay-bridge", "--port", "8080"]);
        assert_eq!(cli.port, 8080);
    }

    #[test]
    fn test_cli_store_path_override() {
        let cli = Cli::parse_from(["relay-bridge", "--store-path", "/var/lib/relay/sessions.toml"]);
        assert_eq!(
            cli.store_path,
            Some(PathBuf::from("/var/lib/relay/sessions.toml"))
        );
    }

    #[test]
    fn test_into_bridge_config_defaults_match_bridge_config_default() {
        // Arrange
        let expected = BridgeConfig::default();

        // Act
        let config = defaults().into_bridge_config().unwrap();

        // Assert
        assert_eq!(config.bind_addr, expected.bind_addr);
        assert_eq!(config.send_timeout, expected.send_timeout);
        assert_eq!(config.connect_timeout, expected.connect_timeout);
        assert_eq!(config.store_timeout, expected.store_timeout);
        assert_eq!(config.sse_keepalive, expected.sse_keepalive);
    }

    #[test]
    fn test_into_bridge_config_custom_bind_and_timeouts() {
        let cli = Cli::parse_from([
            "relay-bridge",
            "--bind",
            "0.0.0.0",
            "--port",
            "9000",
            "--send-timeout-ms",
            "250",
            "--ws-url",
            "ws://relay.internal:9000/ws",
        ]);

        let config = cli.into_bridge_config().unwrap();

        assert_eq!(config.bind_addr.to_string(), "0.0.0.0:9000");
        assert_eq!(config.send_timeout, Duration::from_millis(250));
        assert_eq!(config.ws_url.as_deref(), Some("ws://relay.internal:9000/ws"));
    }

    #[test]
    fn test_into_bridge_config_invalid_bind_returns_error() {
        // Arrange
        let cli = Cli {
            bind: "not.an.ip".to_string(),
            ..defaults()
        };

        // Act
        let result = cli.into_bridge_config();

        // Assert: must return an error, not panic
        assert!(result.is_err());
    }

    #[test]
    fn test_into_bridge_config_zero_timeout_returns_error() {
        let cli = Cli {
            store_timeout_ms: 0,
            ..defaults()
        };
        assert!(cli.into_bridge_config().is_err());
    }
}
