use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crewdesk::identity::{SessionManager, SignupRequest};
use crewdesk::server::{build_router, AppState};
use crewdesk::storage::{MemoryStore, SharedStore};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Server {
    addr: SocketAddr,
    state: AppState,
    _shutdown: watch::Sender<bool>,
}

async fn start() -> Server {
    let store: SharedStore = Arc::new(MemoryStore::new());
    let sm = Arc::new(SessionManager::new(b"ws-tests", Duration::from_secs(3600)));
    let (state, shutdown) = AppState::new(store, sm);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind 127.0.0.1:0");
    let addr = listener.local_addr().unwrap();
    let app = build_router(state.clone());
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await { eprintln!("test server error: {e:?}"); }
    });
    Server { addr, state, _shutdown: shutdown }
}

impl Server {
    async fn token_for(&self, email: &str) -> String {
        let req = SignupRequest { email: email.into(), password: "pw".into(), first_name: "Ada".into(), ..Default::default() };
        self.state.auth.signup(req).await.unwrap().token
    }

    async fn wait_for_subscribers(&self, n: usize) {
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        loop {
            let count = self.state.api.bus().subscriber_count();
            if count == n { return; }
            if std::time::Instant::now() >= deadline { panic!("expected {n} subscribers, have {count}"); }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

async fn send(ws: &mut Client, v: Value) {
    ws.send(Message::Text(v.to_string())).await.unwrap();
}

async fn recv(ws: &mut Client) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn connect(server: &Server, params: Value) -> Client {
    let (mut ws, _) = connect_async(format!("ws://{}/ws", server.addr)).await.unwrap();
    send(&mut ws, json!({"type": "connection_init", "payload": params})).await;
    assert_eq!(recv(&mut ws).await["type"], "connection_ack");
    ws
}

#[tokio::test]
async fn anonymous_subscription_is_refused_with_an_error_frame() {
    let server = start().await;
    let mut ws = connect(&server, json!({})).await;
    send(&mut ws, json!({"type": "subscribe", "id": "1", "payload": {"operation": "messageAdded"}})).await;
    let frame = recv(&mut ws).await;
    assert_eq!(frame["type"], "error");
    assert_eq!(frame["id"], "1");
    assert_eq!(frame["payload"][0]["extensions"]["code"], "UNAUTHORIZED");
    assert_eq!(server.state.api.bus().subscriber_count(), 0);

    send(&mut ws, json!({"type": "ping"})).await;
    assert_eq!(recv(&mut ws).await["type"], "pong");
}

#[tokio::test]
async fn subscribe_before_init_closes_the_socket() {
    let server = start().await;
    let (mut ws, _) = connect_async(format!("ws://{}/ws", server.addr)).await.unwrap();
    send(&mut ws, json!({"type": "subscribe", "id": "1", "payload": {"operation": "messageAdded"}})).await;
    assert_eq!(recv(&mut ws).await["type"], "error");
    let rest = tokio::time::timeout(Duration::from_secs(2), ws.next()).await.expect("socket left open");
    assert!(matches!(rest, None | Some(Ok(Message::Close(_))) | Some(Err(_))));
}

#[tokio::test]
async fn published_messages_arrive_as_next_frames() {
    let server = start().await;
    let token = server.token_for("ada@x.io").await;
    let mut ws = connect(&server, json!({"authorization": format!("Bearer {token}")})).await;
    send(&mut ws, json!({"type": "subscribe", "id": "s1", "payload": {"operation": "messageAdded"}})).await;
    server.wait_for_subscribers(1).await;

    let ctx = server.state.contexts.from_authorization_header(Some(&format!("Bearer {token}")));
    let sent = server.state.api.add_message(&ctx, "hello socket").await.unwrap();

    let frame = recv(&mut ws).await;
    assert_eq!(frame["type"], "next");
    assert_eq!(frame["id"], "s1");
    assert_eq!(frame["payload"]["data"]["messageAdded"]["text"], "hello socket");
    assert_eq!(frame["payload"]["data"]["messageAdded"]["id"], json!(sent.id));
}

#[tokio::test]
async fn duplicate_subscription_id_is_an_error() {
    let server = start().await;
    let token = server.token_for("ada@x.io").await;
    let mut ws = connect(&server, json!({"token": token})).await;
    let sub = json!({"type": "subscribe", "id": "dup", "payload": {"operation": "unicastMessageAdded"}});
    send(&mut ws, sub.clone()).await;
    server.wait_for_subscribers(1).await;
    send(&mut ws, sub).await;
    let frame = recv(&mut ws).await;
    assert_eq!(frame["type"], "error");
    assert_eq!(frame["payload"][0]["extensions"]["reason"], "duplicate_id");
    assert_eq!(server.state.api.bus().subscriber_count(), 1);
}

#[tokio::test]
async fn complete_and_close_release_bus_subscribers() {
    let server = start().await;
    let token = server.token_for("ada@x.io").await;
    let mut ws = connect(&server, json!({"token": token})).await;

    send(&mut ws, json!({"type": "subscribe", "id": "a", "payload": {"operation": "messageAdded"}})).await;
    send(&mut ws, json!({"type": "subscribe", "id": "b", "payload": {"operation": "unicastMessageAdded", "variables": {"peerId": "someone"}}})).await;
    server.wait_for_subscribers(2).await;

    send(&mut ws, json!({"type": "complete", "id": "a"})).await;
    server.wait_for_subscribers(1).await;

    ws.close(None).await.unwrap();
    server.wait_for_subscribers(0).await;
}
