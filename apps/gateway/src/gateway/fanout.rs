//! Cluster fan-out: publish distributions to every node through the
//! message broker, and feed received ones to the local distributor.

use std::sync::Arc;

use futures_util::FutureExt;
use parking_lot::Mutex;

use super::distribution::Distribution;
use super::distributor::Distributor;
use crate::broker::{ListenHandle, MessageBroker, MessageHandler};
use crate::error::Result;

pub struct ClusterFanout {
    broker: Arc<dyn MessageBroker>,
    topic: String,
    distributor: Arc<Distributor>,
    listener: Mutex<Option<ListenHandle>>,
}

impl ClusterFanout {
    pub fn new(broker: Arc<dyn MessageBroker>, topic: impl Into<String>, distributor: Arc<Distributor>) -> Self {
        Self {
            broker,
            topic: topic.into(),
            distributor,
            listener: Mutex::new(None),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Encode `event` and publish it on the cluster topic. Every node,
    /// this one included, distributes it once received.
    pub async fn publish(&self, event: &Distribution) -> Result<()> {
        let bytes = event.encode()?;
        self.broker.emit(&self.topic, bytes).await
    }

    /// Begin listening on the cluster topic. Calling again while already
    /// listening is a no-op.
    pub async fn start(&self) -> Result<()> {
        if self.listener.lock().is_some() {
            return Ok(());
        }

        let distributor = self.distributor.clone();
        let handler: MessageHandler = Arc::new(move |bytes: Vec<u8>| {
            let distributor = distributor.clone();
            async move {
                let event = match Distribution::decode(&bytes) {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::debug!(error = %e, "dropping undecodable distribution");
                        return;
                    }
                };
                if let Err(e) = distributor.subscribe(&event).await {
                    tracing::warn!(field = %event.field, error = %e, "distribution aborted");
                }
            }
            .boxed()
        });

        let mut handle = self.broker.listen(&self.topic, handler).await?;
        let mut listener = self.listener.lock();
        if listener.is_some() {
            // Lost a race with a concurrent start.
            handle.close();
            return Ok(());
        }
        *listener = Some(handle);
        tracing::info!(topic = %self.topic, "cluster fan-out listening");
        Ok(())
    }

    /// Stop listening. Idempotent.
    pub fn stop(&self) {
        if let Some(mut handle) = self.listener.lock().take() {
            handle.close();
            tracing::info!(topic = %self.topic, "cluster fan-out stopped");
        }
    }

    pub fn is_listening(&self) -> bool {
        self.listener.lock().as_ref().is_some_and(|h| !h.is_closed())
    }
}

/// Cloneable handle for application code to publish events.
#[derive(Clone)]
pub struct Emitter {
    fanout: Arc<ClusterFanout>,
}

impl Emitter {
    pub fn new(fanout: Arc<ClusterFanout>) -> Self {
        Self { fanout }
    }

    pub async fn emit(&self, event: Distribution) -> Result<()> {
        self.fanout.publish(&event).await
    }
}
