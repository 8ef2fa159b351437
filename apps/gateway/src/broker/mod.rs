//! Process-wide message broker: publish bytes on a topic, and listen for
//! them on every node.

mod local;
mod redis;

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use tokio::task::JoinHandle;

use crate::error::Result;

pub use self::local::LocalBroker;
pub use self::redis::RedisBroker;

/// Callback invoked with every message received on a topic.
pub type MessageHandler = Arc<dyn Fn(Vec<u8>) -> BoxFuture<'static, ()> + Send + Sync>;

#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Publish `message` on `topic`. Publishing with no listeners succeeds.
    async fn emit(&self, topic: &str, message: Vec<u8>) -> Result<()>;

    /// Start delivering `topic` messages to `handler`. Messages published
    /// after this returns are observed.
    async fn listen(&self, topic: &str, handler: MessageHandler) -> Result<ListenHandle>;
}

/// A running listener. Closing stops delivery; dropping leaves it running.
pub struct ListenHandle {
    task: Option<JoinHandle<()>>,
}

impl ListenHandle {
    pub fn new(task: JoinHandle<()>) -> Self {
        Self { task: Some(task) }
    }

    pub fn close(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }
}
