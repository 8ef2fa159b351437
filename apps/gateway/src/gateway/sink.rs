//! Outbound half of a websocket connection.

use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use tokio::sync::Mutex;

use crate::error::Result;

/// Normal closure.
pub const CLOSE_NORMAL: u16 = 1000;

#[async_trait]
pub trait FrameSink: Send + Sync {
    /// Send one text frame.
    async fn send_text(&self, text: String) -> Result<()>;

    /// Send a close frame and shut the sink.
    async fn close(&self, code: u16, reason: &str) -> Result<()>;
}

/// Sink over the write half of an axum websocket. Writes are serialized.
pub struct WsSink {
    inner: Mutex<SplitSink<WebSocket, Message>>,
}

impl WsSink {
    pub fn new(inner: SplitSink<WebSocket, Message>) -> Self {
        Self {
            inner: Mutex::new(inner),
        }
    }
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send_text(&self, text: String) -> Result<()> {
        let mut tx = self.inner.lock().await;
        tx.send(Message::Text(text.into())).await?;
        Ok(())
    }

    async fn close(&self, code: u16, reason: &str) -> Result<()> {
        let mut tx = self.inner.lock().await;
        let frame = Message::Close(Some(CloseFrame {
            code,
            reason: reason.to_string().into(),
        }));
        tx.send(frame).await?;
        tx.close().await?;
        Ok(())
    }
}
