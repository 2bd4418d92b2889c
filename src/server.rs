//!
//! crewdesk HTTP/WS server
//! ------------------------
//! Axum frontend over the operation surface in [`crate::api`].
//!
//! Responsibilities:
//! - `POST /login` and `POST /signup`, the only routes that need no identity.
//! - `POST /api`: one query or mutation per request, identity taken from the
//!   `Authorization: Bearer <token>` header.
//! - `GET /ws`: subscription socket (see [`ws`]), identity taken once from the
//!   `connection_init` payload.
//! - Startup wiring (store, session manager, message bus) and graceful shutdown.

use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::rejection::JsonRejection;
use axum::extract::{State, WebSocketUpgrade};
use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::FutureExt; // for catch_unwind on async blocks
use serde_json::json;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::api::{Api, Operation, OperationEnvelope};
use crate::bus::MessageBus;
use crate::config::ServerConfig;
use crate::error::AppError;
use crate::identity::{IdentityContext, LocalAuthProvider, LoginRequest, RequestContextBuilder, SessionManager, SignupRequest};
use crate::storage::{MemoryStore, SharedStore};

pub mod ws;

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub api: Api,
    pub auth: LocalAuthProvider,
    pub contexts: RequestContextBuilder,
    /// Flips to `true` when the server starts shutting down; open sockets close.
    pub shutdown: watch::Receiver<bool>,
}

impl AppState {
    /// Wire the core around `store`. Returns the state and the sender that
    /// triggers shutdown of open sockets.
    pub fn new(store: SharedStore, sessions: Arc<SessionManager>) -> (Self, watch::Sender<bool>) {
        let bus = Arc::new(MessageBus::new(store.clone()));
        let (tx, rx) = watch::channel(false);
        let state = Self {
            api: Api::new(store.clone(), bus),
            auth: LocalAuthProvider::new(store, sessions.clone()),
            contexts: RequestContextBuilder::new(sessions),
            shutdown: rx,
        };
        (state, tx)
    }

    pub fn context_from_headers(&self, headers: &HeaderMap) -> IdentityContext {
        let header = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
        self.contexts.from_authorization_header(header)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(target: "http", "request failed: {}", self);
        }
        (status, Json(json!({ "error": self.message(), "code": self.code_str() }))).into_response()
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "crewdesk ok" }))
        .route("/login", post(login))
        .route("/signup", post(signup))
        .route("/api", post(api_handler))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

fn open_store(cfg: &ServerConfig) -> anyhow::Result<SharedStore> {
    match cfg.data_file.as_ref() {
        Some(path) => {
            let store = MemoryStore::open(path)
                .with_context(|| format!("While opening data file: {}", path.display()))?;
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(MemoryStore::new())),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => { s.recv().await; }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();
    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Start the server and block until a shutdown signal arrives.
pub async fn run(cfg: ServerConfig) -> anyhow::Result<()> {
    if cfg.uses_dev_secret() {
        warn!(target: "startup", "CREWDESK_JWT_SECRET not set; using the development secret");
    }
    let store = open_store(&cfg)?;
    let sessions = Arc::new(SessionManager::new(cfg.jwt_secret.as_bytes(), cfg.token_ttl));
    let (state, shutdown_tx) = AppState::new(store, sessions);
    let bus = state.api.bus().clone();
    let app = build_router(state);

    let addr: SocketAddr = format!("0.0.0.0:{}", cfg.http_port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("While binding {}", addr))?;
    info!(target: "startup", "crewdesk listening on {} (token_ttl_secs={}, data_file={:?})", addr, cfg.token_ttl.as_secs(), cfg.data_file);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!(target: "startup", "shutdown signal received");
            let _ = shutdown_tx.send(true);
            bus.shutdown();
        })
        .await?;
    info!(target: "startup", "HTTP server closed");
    Ok(())
}

/// Body rejections (bad JSON, wrong field types, wrong content type) are input
/// errors like any other and answer 400 through [`AppError`].
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(v)| v)
        .map_err(|rejection| AppError::validation("bad_input".to_string(), rejection.body_text()))
}

async fn login(State(state): State<AppState>, payload: Result<Json<LoginRequest>, JsonRejection>) -> Result<impl IntoResponse, AppError> {
    let resp = state.auth.login(&body(payload)?).await?;
    Ok((StatusCode::OK, Json(resp)))
}

async fn signup(State(state): State<AppState>, payload: Result<Json<SignupRequest>, JsonRejection>) -> Result<impl IntoResponse, AppError> {
    let resp = state.auth.signup(body(payload)?).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

async fn api_handler(State(state): State<AppState>, headers: HeaderMap, payload: Result<Json<OperationEnvelope>, JsonRejection>) -> impl IntoResponse {
    let envelope = match body(payload) {
        Ok(envelope) => envelope,
        Err(e) => return Json(json!({ "data": null, "errors": [e.to_api_error()] })),
    };
    let ctx = state.context_from_headers(&headers);
    let op = match Operation::parse(&envelope) {
        Ok(op) => op,
        Err(e) => return Json(json!({ "data": null, "errors": [e.to_api_error()] })),
    };
    let fut = async { state.api.execute(&ctx, op).await };
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(data)) => Json(json!({ "data": data })),
        Ok(Err(e)) => {
            if matches!(e, AppError::Internal { .. }) {
                error!(target: "api", "operation {} failed: {}", envelope.operation, e);
            }
            Json(json!({ "data": null, "errors": [e.to_api_error()] }))
        }
        Err(panic_payload) => {
            let msg = if let Some(s) = panic_payload.downcast_ref::<&str>() { *s }
                      else if let Some(s) = panic_payload.downcast_ref::<String>() { s.as_str() }
                      else { "panic" };
            error!(target: "panic", "operation {} panicked: {}", envelope.operation, msg);
            let e = AppError::internal("internal_panic", "internal server error");
            Json(json!({ "data": null, "errors": [e.to_api_error()] }))
        }
    }
}

async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws::serve_socket(state, socket))
}
