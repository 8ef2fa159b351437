#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::time;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use subcast_gateway::broker::LocalBroker;
use subcast_gateway::config::{BrokerKind, Config};
use subcast_gateway::gateway::session::Connection;
use subcast_gateway::gateway::{Authorizer, GatewayService};
use subcast_gateway::graphql::SubscriptionSchema;
use subcast_gateway::AppState;

pub type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Accepts `""`, `"team:<key>"` and `"user:<id>"`; anything else is rejected.
pub struct TestAuthorizer;

#[async_trait]
impl Authorizer for TestAuthorizer {
    async fn authorize(&self, conn: &Connection, token: &str) -> Result<(), String> {
        if token.is_empty() {
            return Ok(());
        }
        if let Some(team) = token.strip_prefix("team:") {
            conn.set_identity_key(team);
            return Ok(());
        }
        if let Some(id) = token.strip_prefix("user:") {
            let id = id.parse().map_err(|_| "invalid user id".to_string())?;
            conn.set_identity_id(id);
            return Ok(());
        }
        Err("unknown token".into())
    }
}

/// Schema with a `noteUpdated(id)` field decoding JSON notes and a `ping`
/// field echoing the payload as a string.
pub fn test_schema() -> SubscriptionSchema {
    SubscriptionSchema::new()
        .field("noteUpdated", |ctx| serde_json::from_slice(ctx.payload).map_err(|e| e.to_string()))
        .field("ping", |ctx| Ok(json!(String::from_utf8_lossy(ctx.payload))))
}

pub fn test_config(keepalive: Option<Duration>) -> Config {
    Config {
        port: 0,
        machine_id: subcast_common::id::prefixed_ulid(subcast_common::id::prefix::NODE),
        topic: format!("test:{}", subcast_common::id::prefixed_ulid("topic")),
        broker: BrokerKind::Local,
        delivery_timeout: Some(Duration::from_secs(5)),
        keepalive_interval: keepalive,
    }
}

/// Build a test AppState on an in-process broker, fan-out already started.
pub async fn test_state_with(keepalive: Option<Duration>) -> AppState {
    let config = test_config(keepalive);
    let gateway = GatewayService::builder(Arc::new(test_schema()), Arc::new(LocalBroker::new()))
        .machine_id(config.machine_id.clone())
        .topic(config.topic.clone())
        .delivery_timeout(config.delivery_timeout)
        .keepalive(config.keepalive_interval)
        .authorizer(Arc::new(TestAuthorizer))
        .build();
    gateway.start().await.expect("start fan-out");

    AppState {
        gateway: Arc::new(gateway),
    }
}

pub async fn test_state() -> AppState {
    test_state_with(None).await
}

/// Build the full application router wired to the test state.
pub async fn test_app() -> (Router, AppState) {
    let state = test_state().await;
    let app = subcast_gateway::routes::router().with_state(state.clone());
    (app, state)
}

/// Start an actual TCP server for WebSocket testing. The server runs in the
/// background.
pub async fn start_ws_server_with(state: AppState) -> (SocketAddr, AppState) {
    let app = subcast_gateway::routes::router().with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, state)
}

pub async fn start_ws_server() -> (SocketAddr, AppState) {
    start_ws_server_with(test_state().await).await
}

/// Open a websocket offering the `graphql-ws` subprotocol.
pub async fn connect(addr: SocketAddr) -> Ws {
    let mut request = format!("ws://{addr}/subscriptions")
        .into_client_request()
        .expect("request");
    request
        .headers_mut()
        .insert("Sec-WebSocket-Protocol", HeaderValue::from_static("graphql-ws"));

    let (ws, response) = tokio_tungstenite::connect_async(request)
        .await
        .expect("ws connect");
    assert_eq!(
        response.headers().get("sec-websocket-protocol").map(|v| v.as_bytes()),
        Some(&b"graphql-ws"[..])
    );
    ws
}

/// Connect and complete `connection_init` with `token`.
pub async fn connect_and_init(addr: SocketAddr, token: &str) -> Ws {
    let mut ws = connect(addr).await;
    send(&mut ws, json!({ "type": "connection_init", "payload": { "authToken": token } })).await;
    let ack = recv(&mut ws).await;
    assert_eq!(ack, json!({ "type": "connection_ack" }));
    ws
}

/// Start a subscription and wait for `subscription_success`.
pub async fn start(ws: &mut Ws, id: &str, query: &str) {
    send(ws, json!({ "id": id, "type": "start", "payload": { "query": query } })).await;
    let reply = recv(ws).await;
    assert_eq!(reply, json!({ "id": id, "type": "subscription_success" }));
}

pub async fn send(ws: &mut Ws, frame: Value) {
    ws.send(Message::Text(frame.to_string().into()))
        .await
        .expect("send frame");
}

/// Next text frame as JSON, skipping keepalives.
pub async fn recv(ws: &mut Ws) -> Value {
    loop {
        let frame = recv_any(ws).await;
        if frame["type"] != "keepalive" {
            return frame;
        }
    }
}

/// Next text frame as JSON, keepalives included.
pub async fn recv_any(ws: &mut Ws) -> Value {
    loop {
        let msg = time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timeout waiting for frame")
            .expect("stream ended")
            .expect("ws read error");
        match msg {
            Message::Text(text) => return serde_json::from_str(&text).expect("parse frame"),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("expected text frame, got: {other:?}"),
        }
    }
}

/// Assert no text frame arrives within `ms`.
pub async fn expect_silence(ws: &mut Ws, ms: u64) {
    if let Ok(Some(Ok(msg))) = time::timeout(Duration::from_millis(ms), ws.next()).await {
        panic!("expected no frame, got: {msg:?}");
    }
}

/// Wait for the server to send a close frame or drop the socket.
pub async fn expect_closed(ws: &mut Ws) {
    loop {
        let next = time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timeout waiting for close");
        match next {
            Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
            Some(Ok(tungstenite::Message::Ping(_))) => continue,
            Some(Ok(other)) => panic!("expected close, got: {other:?}"),
        }
    }
}

/// Poll until `check` holds, for up to two seconds.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}
