//! WebSocket upgrade handler and per-connection read loop.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::StreamExt;
use tokio::time;

use crate::AppState;

use super::events::{OperationMessage, SUBPROTOCOL};
use super::handler::Outcome;
use super::service::GatewayService;
use super::session::Connection;
use super::sink::WsSink;

pub fn router() -> Router<AppState> {
    Router::new().route("/subscriptions", get(ws_upgrade))
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let gateway = state.gateway.clone();
    ws.protocols([SUBPROTOCOL])
        .on_upgrade(move |socket| handle_connection(socket, gateway))
}

async fn handle_connection(socket: WebSocket, gateway: Arc<GatewayService>) {
    let (ws_tx, ws_rx) = socket.split();
    let conn = gateway.open(Arc::new(WsSink::new(ws_tx))).await;

    tracing::info!(connection = %conn.key(), "subscription connection established");

    run_connection(&gateway, &conn, ws_rx).await;

    gateway.close(&conn).await;

    tracing::info!(connection = %conn.key(), "subscription connection ended");
}

/// Read frames until the client goes away, the protocol asks to close, or a
/// write fails. Optionally emits keepalive frames.
async fn run_connection(
    gateway: &GatewayService,
    conn: &Arc<Connection>,
    mut ws_rx: futures_util::stream::SplitStream<WebSocket>,
) {
    let mut keepalive = gateway.keepalive().filter(|d| !d.is_zero()).map(time::interval);
    if let Some(timer) = keepalive.as_mut() {
        timer.tick().await; // First tick fires immediately; skip it.
    }

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text.as_str().to_owned(),
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                        Ok(text) => text,
                        Err(_) => {
                            tracing::debug!(connection = %conn.key(), "binary frame is not utf-8");
                            let _ = conn.close().await;
                            break;
                        }
                    },
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(?e, connection = %conn.key(), "ws read error");
                        break;
                    }
                };
                if text.is_empty() {
                    continue;
                }

                match gateway.handle(conn, &text).await {
                    Ok(Outcome::Continue) => {}
                    Ok(Outcome::Close) => break,
                    Err(e) => {
                        tracing::debug!(connection = %conn.key(), error = %e, "reply failed");
                        break;
                    }
                }
            }

            _ = tick(&mut keepalive) => {
                if let Err(e) = conn.write("", OperationMessage::keepalive()).await {
                    tracing::debug!(connection = %conn.key(), error = %e, "keepalive failed");
                    break;
                }
            }
        }
    }
}

/// Next keepalive tick, or never when keepalives are disabled.
async fn tick(timer: &mut Option<time::Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}
