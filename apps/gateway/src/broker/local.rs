//! In-process broker over a single `tokio::sync::broadcast` channel.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use super::{ListenHandle, MessageBroker, MessageHandler};
use crate::error::Result;

/// Capacity of the broadcast channel. Listeners that fall behind skip
/// messages.
const BROADCAST_CAPACITY: usize = 4096;

#[derive(Debug)]
struct Envelope {
    topic: String,
    message: Vec<u8>,
}

/// Single-node broker. Cloneable; clones share the channel.
#[derive(Clone)]
pub struct LocalBroker {
    sender: broadcast::Sender<Arc<Envelope>>,
}

impl LocalBroker {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self { sender }
    }
}

impl Default for LocalBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBroker for LocalBroker {
    async fn emit(&self, topic: &str, message: Vec<u8>) -> Result<()> {
        // Err only means nobody is listening.
        let _ = self.sender.send(Arc::new(Envelope {
            topic: topic.to_string(),
            message,
        }));
        Ok(())
    }

    async fn listen(&self, topic: &str, handler: MessageHandler) -> Result<ListenHandle> {
        let mut rx = self.sender.subscribe();
        let topic = topic.to_string();

        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(envelope) if envelope.topic == topic => {
                        handler(envelope.message.clone()).await;
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(%topic, skipped, "broker listener lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        Ok(ListenHandle::new(task))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures_util::FutureExt;
    use tokio::sync::mpsc;

    use super::*;

    fn forward(tx: mpsc::UnboundedSender<Vec<u8>>) -> MessageHandler {
        Arc::new(move |message: Vec<u8>| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(message);
            }
            .boxed()
        })
    }

    #[tokio::test]
    async fn listeners_only_see_their_topic() {
        let broker = LocalBroker::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _handle = broker.listen("a", forward(tx)).await.unwrap();

        broker.emit("b", b"skip".to_vec()).await.unwrap();
        broker.emit("a", b"hit".to_vec()).await.unwrap();

        let got = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert_eq!(got.as_deref(), Some(&b"hit"[..]));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn every_listener_receives_a_copy() {
        let broker = LocalBroker::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _one = broker.listen("t", forward(tx.clone())).await.unwrap();
        let _two = broker.listen("t", forward(tx)).await.unwrap();

        broker.emit("t", b"x".to_vec()).await.unwrap();

        for _ in 0..2 {
            let got = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
            assert_eq!(got.as_deref(), Some(&b"x"[..]));
        }
    }

    #[tokio::test]
    async fn closed_listener_stops_receiving() {
        let broker = LocalBroker::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut handle = broker.listen("t", forward(tx)).await.unwrap();

        handle.close();
        handle.close();
        tokio::task::yield_now().await;
        broker.emit("t", b"x".to_vec()).await.unwrap();

        let got = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(matches!(got, Ok(None) | Err(_)));
    }

    #[tokio::test]
    async fn emit_without_listeners_succeeds() {
        LocalBroker::new().emit("t", b"x".to_vec()).await.unwrap();
    }
}
