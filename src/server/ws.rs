//! Subscription socket, graphql-ws style.
//!
//! Client frames: `connection_init {payload}`, `subscribe {id, payload:{operation, variables}}`,
//! `complete {id}`, `ping`. Server frames: `connection_ack`, `next {id, payload:{data}}`,
//! `error {id, payload:[...]}`, `complete {id}`, `pong`.
//!
//! The identity context is built once from the `connection_init` payload and used
//! for every subscription on the connection. Each subscription runs a forwarder
//! task; aborting it drops the bus subscription, which unregisters it.

use std::collections::HashMap;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::AppState;
use crate::api::{OperationEnvelope, SubscriptionRequest};
use crate::error::AppError;
use crate::identity::IdentityContext;

const INIT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct ClientFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    payload: Option<Value>,
}

fn parse_frame(text: &str) -> Option<ClientFrame> {
    serde_json::from_str(text).ok()
}

async fn send_json(socket: &mut WebSocket, v: Value) -> bool {
    socket.send(Message::Text(v.to_string().into())).await.is_ok()
}

/// Wait for `connection_init` and build the connection's identity from it.
async fn await_init(state: &AppState, socket: &mut WebSocket) -> Option<IdentityContext> {
    let first = tokio::time::timeout(INIT_TIMEOUT, socket.recv()).await.ok()??.ok()?;
    let Message::Text(text) = first else { return None; };
    let frame = parse_frame(&text)?;
    if frame.kind != "connection_init" { return None; }
    Some(state.contexts.from_connection_params(frame.payload.as_ref()))
}

pub async fn serve_socket(state: AppState, mut socket: WebSocket) {
    let Some(ctx) = await_init(&state, &mut socket).await else {
        warn!(target: "ws", "socket closed: missing or invalid connection_init");
        let _ = send_json(&mut socket, json!({"type": "error", "payload": [{"message": "connection not initialised"}]})).await;
        let _ = socket.send(Message::Close(None)).await;
        return;
    };
    if !send_json(&mut socket, json!({"type": "connection_ack"})).await { return; }
    debug!(target: "ws", "ws.connected authenticated={}", ctx.is_authenticated());

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    let mut active: HashMap<String, JoinHandle<()>> = HashMap::new();
    let mut shutdown = state.shutdown.clone();

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                let Some(Ok(msg)) = incoming else { break; };
                match msg {
                    Message::Text(text) => {
                        let Some(frame) = parse_frame(&text) else {
                            let _ = send_json(&mut socket, json!({"type": "error", "payload": [{"message": "malformed frame"}]})).await;
                            continue;
                        };
                        match frame.kind.as_str() {
                            "subscribe" => {
                                let Some(id) = frame.id else { continue; };
                                active.retain(|_, h| !h.is_finished());
                                if active.contains_key(&id) {
                                    let e = AppError::validation("duplicate_id".to_string(), format!("subscriber for {} already exists", id));
                                    let _ = send_json(&mut socket, json!({"type": "error", "id": id, "payload": [e.to_api_error()]})).await;
                                    continue;
                                }
                                match start(&state, &ctx, &id, frame.payload, out_tx.clone()) {
                                    Ok(handle) => { active.insert(id, handle); }
                                    Err(e) => {
                                        debug!(target: "ws", "ws.subscribe refused id={} reason={}", id, e.code_str());
                                        let _ = send_json(&mut socket, json!({"type": "error", "id": id, "payload": [e.to_api_error()]})).await;
                                    }
                                }
                            }
                            "complete" => {
                                if let Some(handle) = frame.id.and_then(|id| active.remove(&id)) {
                                    handle.abort();
                                }
                            }
                            "ping" => { let _ = send_json(&mut socket, json!({"type": "pong"})).await; }
                            "pong" => {}
                            other => {
                                debug!(target: "ws", "ignoring frame type {}", other);
                            }
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Some(out) = out_rx.recv() => {
                if socket.send(Message::Text(out.into())).await.is_err() { break; }
            }
            _ = shutdown.changed() => {
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
        }
    }

    for (_, handle) in active.drain() {
        handle.abort();
    }
    debug!(target: "ws", "ws.closed");
}

/// Subscribe through the API (gate included) and spawn the forwarder.
fn start(
    state: &AppState,
    ctx: &IdentityContext,
    id: &str,
    payload: Option<Value>,
    out: mpsc::UnboundedSender<String>,
) -> Result<JoinHandle<()>, AppError> {
    let envelope: OperationEnvelope = serde_json::from_value(payload.unwrap_or(Value::Null))?;
    let req = SubscriptionRequest::parse(&envelope)?;
    let mut sub = state.api.subscribe(ctx, &req)?;
    let field = req.name();
    let id = id.to_string();
    Ok(tokio::spawn(async move {
        while let Some(message) = sub.next().await {
            let mut data = serde_json::Map::new();
            data.insert(field.to_string(), json!(message));
            let frame = json!({"type": "next", "id": id, "payload": {"data": data}});
            if out.send(frame.to_string()).is_err() { return; }
        }
        let _ = out.send(json!({"type": "complete", "id": id}).to_string());
    }))
}
