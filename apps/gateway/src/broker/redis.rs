//! Redis pub/sub broker for multi-node deployments.

use ::redis::aio::ConnectionManager;
use ::redis::{AsyncCommands, Client};
use async_trait::async_trait;
use futures_util::StreamExt;

use super::{ListenHandle, MessageBroker, MessageHandler};
use crate::error::Result;

/// Publishes through a shared connection manager; each listener holds its
/// own pub/sub connection.
#[derive(Clone)]
pub struct RedisBroker {
    client: Client,
    publisher: ConnectionManager,
}

impl RedisBroker {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = Client::open(url)?;
        let publisher = ConnectionManager::new(client.clone()).await?;
        tracing::info!("redis broker connected");
        Ok(Self { client, publisher })
    }
}

#[async_trait]
impl MessageBroker for RedisBroker {
    async fn emit(&self, topic: &str, message: Vec<u8>) -> Result<()> {
        let mut conn = self.publisher.clone();
        conn.publish::<_, _, ()>(topic, message).await.map_err(|e| {
            tracing::error!(?e, %topic, "redis publish failed");
            e
        })?;
        Ok(())
    }

    async fn listen(&self, topic: &str, handler: MessageHandler) -> Result<ListenHandle> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(topic).await?;
        let topic = topic.to_string();

        let task = tokio::spawn(async move {
            let mut messages = pubsub.into_on_message();
            while let Some(msg) = messages.next().await {
                handler(msg.get_payload_bytes().to_vec()).await;
            }
            tracing::warn!(%topic, "redis subscription ended");
        });

        Ok(ListenHandle::new(task))
    }
}
