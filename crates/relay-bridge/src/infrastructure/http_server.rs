//! HTTP server: router, handlers and process wiring.
//!
//! | Route                  | Handler          |
//! |------------------------|------------------|
//! | `GET  /events`         | `events`         |
//! | `GET  /ws?sessionId=`  | `ws`             |
//! | `POST /message`        | `message`        |
//! | `GET  /sessions/{id}`  | `session_state`  |
//! | `GET  /health`         | `health`         |
//!
//! [`RelayServer::bind`] builds one registry, relay and lifecycle handler per
//! process and shares them with every handler through [`AppState`].
//! [`RelayServer::serve`] runs until the shutdown future resolves, then
//! cancels every open event stream so axum's graceful shutdown can finish.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::rejection::JsonRejection;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::{Stream, StreamExt};
use serde_json::Value;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use relay_core::{
    ConnectionRelay, DurableStore, FileStore, LifecycleHandler, MemoryStore, RelayError,
    SessionId, SessionRegistry, StoreError,
};

use crate::application::{error_body, relay_frame, resolve_session_id, BoundaryError, SESSION_HEADER};
use crate::domain::{
    BridgeConfig, DeliveredBody, ErrorBody, HealthBody, SessionQuery, SessionStateBody,
};
use crate::infrastructure::stream_bridge::{BridgeError, StreamBridge};
use crate::infrastructure::ws_session;

// ── Shared state ──────────────────────────────────────────────────────────────

/// Shared application state passed to axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub relay: Arc<ConnectionRelay>,
    pub lifecycle: Arc<LifecycleHandler>,
    pub bridge: StreamBridge,
    pub sse_keepalive: Duration,
}

/// Builds the axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/events", get(events))
        .route("/ws", get(ws))
        .route("/message", post(message))
        .route("/sessions/{id}", get(session_state))
        .route("/health", get(health))
        .with_state(state)
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Everything a handler can fail with, mapped onto a status and [`ErrorBody`].
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Boundary(#[from] BoundaryError),

    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error("session store unavailable: {0}")]
    Store(#[from] StoreError),

    #[error("request body is not JSON: {0}")]
    InvalidBody(String),

    #[error("could not encode relay frame: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        let code = match self {
            ApiError::Boundary(e) => e.status_code(),
            ApiError::Relay(e) => e.status_code(),
            ApiError::Bridge(e) => e.status_code(),
            ApiError::Store(_) => 500,
            ApiError::InvalidBody(_) => 400,
            ApiError::Encode(_) => 500,
        };
        StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn to_body(&self) -> ErrorBody {
        match self {
            ApiError::Boundary(e) => e.to_body(),
            ApiError::Relay(e) => error_body(e),
            ApiError::Bridge(e) => ErrorBody {
                error: e.kind().to_string(),
                message: self.to_string(),
                session_id: None,
            },
            ApiError::Store(_) => ErrorBody {
                error: "store_unavailable".to_string(),
                message: self.to_string(),
                session_id: None,
            },
            ApiError::InvalidBody(_) => ErrorBody {
                error: "invalid_body".to_string(),
                message: self.to_string(),
                session_id: None,
            },
            ApiError::Encode(_) => ErrorBody {
                error: "internal".to_string(),
                message: self.to_string(),
                session_id: None,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.to_body())).into_response()
    }
}

// ── Handlers ──────────────────────────────────────────────────────────────────

/// `GET /events`: opens a new session and streams its frames as SSE.
async fn events(
    State(state): State<AppState>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let session_id = SessionId::generate();
    let stream = state.bridge.open(&session_id).await.map_err(|e| {
        error!("session {session_id}: could not open event stream: {e}");
        e
    })?;

    Ok(Sse::new(stream.map(Ok::<Event, Infallible>))
        .keep_alive(KeepAlive::new().interval(state.sse_keepalive)))
}

/// `GET /ws?sessionId=…`: the internal WebSocket behind an event stream.
async fn ws(
    upgrade: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> Response {
    let session_id = match resolve_session_id(None, query.session_id.as_deref()) {
        Ok(id) => id,
        Err(e) => return ApiError::from(e).into_response(),
    };

    let lifecycle = Arc::clone(&state.lifecycle);
    upgrade.on_upgrade(move |socket| ws_session::run(socket, session_id, lifecycle))
}

/// `POST /message`: relays the JSON body to the caller's session.
async fn message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<SessionQuery>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<DeliveredBody>, ApiError> {
    let header = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok());
    let session_id = resolve_session_id(header, query.session_id.as_deref())?;

    let Json(body) = body.map_err(|e| ApiError::InvalidBody(e.body_text()))?;
    let frame = relay_frame(body)?;

    match state.relay.relay(&session_id, frame).await {
        Ok(_) => Ok(Json(DeliveredBody::delivered())),
        Err(e) => {
            match &e {
                RelayError::RelayFailed { .. } | RelayError::StoreUnavailable { .. } => {
                    warn!("session {session_id}: relay failed: {e}")
                }
                _ => debug!("session {session_id}: relay refused: {e}"),
            }
            Err(e.into())
        }
    }
}

/// `GET /sessions/{id}`: reports whether a relay to `id` could succeed.
async fn session_state(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Json<SessionStateBody>, ApiError> {
    let session_id = SessionId::parse(&raw).ok_or(BoundaryError::MissingSessionId)?;
    let session_state = state.registry.state(&session_id).await?;

    Ok(Json(SessionStateBody {
        session_id: session_id.to_string(),
        state: session_state.as_str().to_string(),
    }))
}

/// `GET /health`: liveness plus the number of sessions with a live handle.
async fn health(State(state): State<AppState>) -> Json<HealthBody> {
    Json(HealthBody {
        status: "ok".to_string(),
        live_sessions: state.registry.live_sessions(),
    })
}

// ── Server ────────────────────────────────────────────────────────────────────

/// A bound, not yet serving, relay server.
pub struct RelayServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    router: Router,
    shutdown: CancellationToken,
}

impl RelayServer {
    /// Binds the listener and wires the registry, relay, lifecycle handler and
    /// stream bridge together.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound or the durable store
    /// file exists but cannot be read.
    pub async fn bind(config: BridgeConfig) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(config.bind_addr)
            .await
            .with_context(|| format!("failed to bind HTTP listener on {}", config.bind_addr))?;
        let local_addr = listener
            .local_addr()
            .context("failed to read bound listener address")?;

        let store = open_store(&config).await?;
        let registry = Arc::new(SessionRegistry::with_store_timeout(
            store,
            config.store_timeout,
        ));
        let relay = Arc::new(ConnectionRelay::with_send_timeout(
            Arc::clone(&registry),
            config.send_timeout,
        ));
        let lifecycle = Arc::new(LifecycleHandler::new(Arc::clone(&registry)));

        let shutdown = CancellationToken::new();
        let ws_url = config.ws_url_for(local_addr);
        let bridge = StreamBridge::new(ws_url, config.connect_timeout, shutdown.clone());

        info!(
            "relay bridge listening on {local_addr} (internal WebSocket {})",
            bridge.ws_url()
        );

        let router = build_router(AppState {
            registry,
            relay,
            lifecycle,
            bridge,
            sse_keepalive: config.sse_keepalive,
        });

        Ok(Self {
            listener,
            local_addr,
            router,
            shutdown,
        })
    }

    /// Address the listener actually bound (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serves requests until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns an error if the server loop fails.
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = self.shutdown;
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async move {
                shutdown.await;
                info!("shutdown requested; closing event streams");
                token.cancel();
            })
            .await
            .context("HTTP server failed")?;

        info!("relay bridge stopped");
        Ok(())
    }
}

/// Binds and serves until `shutdown` resolves.
///
/// # Errors
///
/// See [`RelayServer::bind`] and [`RelayServer::serve`].
pub async fn run_server<F>(config: BridgeConfig, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    RelayServer::bind(config).await?.serve(shutdown).await
}

async fn open_store(config: &BridgeConfig) -> anyhow::Result<Arc<dyn DurableStore>> {
    let Some(path) = &config.store_path else {
        info!("durable session markers kept in memory");
        return Ok(Arc::new(MemoryStore::new()));
    };

    let store = FileStore::open(path.clone())
        .await
        .with_context(|| format!("failed to open session store {}", path.display()))?;

    // Markers left by a previous process have no live handle here; relays to
    // them report `connection_lost` until the session reconnects.
    let previous = store.len().await;
    if previous > 0 {
        info!(
            "{previous} session marker(s) from a previous run in {}",
            path.display()
        );
    }
    Ok(Arc::new(store))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
