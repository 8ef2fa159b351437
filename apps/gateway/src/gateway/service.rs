//! The assembled subscription gateway: interest index, connection registry,
//! protocol handler, distributor and cluster fan-out, plus user hooks.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::distribution::Distribution;
use super::distributor::Distributor;
use super::fanout::{ClusterFanout, Emitter};
use super::handler::{Authorizer, Outcome, ProtocolHandler};
use super::registry::ConnectionRegistry;
use super::session::Connection;
use super::sink::FrameSink;
use super::tree::InterestIndex;
use crate::broker::MessageBroker;
use crate::error::Result;
use crate::graphql::QueryEngine;

pub const DEFAULT_TOPIC: &str = "subcast:distribution";

/// Application callbacks around a connection's lifetime. `after_close` runs
/// before the connection's own subscriptions are torn down.
#[async_trait]
pub trait ConnectionHooks: Send + Sync {
    async fn before_open(&self, _conn: &Arc<Connection>) {}

    async fn after_close(&self, _conn: &Arc<Connection>) {}
}

pub struct GatewayBuilder {
    engine: Arc<dyn QueryEngine>,
    broker: Arc<dyn MessageBroker>,
    machine_id: Option<String>,
    topic: String,
    delivery_timeout: Option<Duration>,
    keepalive: Option<Duration>,
    authorizer: Option<Arc<dyn Authorizer>>,
    hooks: Option<Arc<dyn ConnectionHooks>>,
}

impl GatewayBuilder {
    pub fn machine_id(mut self, machine_id: impl Into<String>) -> Self {
        self.machine_id = Some(machine_id.into());
        self
    }

    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    /// Bound each subscription's execute + write. `None` disables the bound.
    pub fn delivery_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.delivery_timeout = timeout;
        self
    }

    /// Send `keepalive` frames at this interval. `None` disables them.
    pub fn keepalive(mut self, interval: Option<Duration>) -> Self {
        self.keepalive = interval;
        self
    }

    pub fn authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = Some(authorizer);
        self
    }

    pub fn hooks(mut self, hooks: Arc<dyn ConnectionHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub fn build(self) -> GatewayService {
        let index = Arc::new(InterestIndex::new());
        let distributor = Arc::new(Distributor::new(
            index.clone(),
            self.engine.clone(),
            self.delivery_timeout,
        ));
        let fanout = Arc::new(ClusterFanout::new(self.broker, self.topic, distributor.clone()));

        GatewayService {
            machine_id: self
                .machine_id
                .unwrap_or_else(|| subcast_common::id::prefixed_ulid(subcast_common::id::prefix::NODE)),
            keepalive: self.keepalive,
            index,
            registry: Arc::new(ConnectionRegistry::new()),
            handler: ProtocolHandler::new(self.engine, self.authorizer),
            distributor,
            fanout,
            hooks: self.hooks,
        }
    }
}

pub struct GatewayService {
    machine_id: String,
    keepalive: Option<Duration>,
    index: Arc<InterestIndex>,
    registry: Arc<ConnectionRegistry>,
    handler: ProtocolHandler,
    distributor: Arc<Distributor>,
    fanout: Arc<ClusterFanout>,
    hooks: Option<Arc<dyn ConnectionHooks>>,
}

impl GatewayService {
    pub fn builder(engine: Arc<dyn QueryEngine>, broker: Arc<dyn MessageBroker>) -> GatewayBuilder {
        GatewayBuilder {
            engine,
            broker,
            machine_id: None,
            topic: DEFAULT_TOPIC.to_string(),
            delivery_timeout: None,
            keepalive: None,
            authorizer: None,
            hooks: None,
        }
    }

    /// Start listening for cluster distributions.
    pub async fn start(&self) -> Result<()> {
        self.fanout.start().await
    }

    pub fn stop(&self) {
        self.fanout.stop();
    }

    /// Publish an event to every node in the cluster.
    pub async fn publish(&self, event: &Distribution) -> Result<()> {
        self.fanout.publish(event).await
    }

    /// Distribute an event to this node's subscribers only.
    pub async fn subscribe(&self, event: &Distribution) -> Result<usize> {
        self.distributor.subscribe(event).await
    }

    pub fn emitter(&self) -> Emitter {
        Emitter::new(self.fanout.clone())
    }

    pub fn machine_id(&self) -> &str {
        &self.machine_id
    }

    pub fn keepalive(&self) -> Option<Duration> {
        self.keepalive
    }

    pub fn index(&self) -> &Arc<InterestIndex> {
        &self.index
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Create and register a connection for a freshly upgraded websocket.
    pub async fn open(&self, sink: Arc<dyn FrameSink>) -> Arc<Connection> {
        let conn = Arc::new(Connection::new(
            self.machine_id.clone(),
            subcast_common::id::prefixed_ulid(subcast_common::id::prefix::CONNECTION),
            self.index.clone(),
            sink,
        ));
        self.registry.insert(conn.clone());
        if let Some(hooks) = &self.hooks {
            hooks.before_open(&conn).await;
        }
        conn.before_open();
        conn
    }

    pub async fn handle(&self, conn: &Arc<Connection>, text: &str) -> Result<Outcome> {
        self.handler.handle(conn, text).await
    }

    /// Tear down a connection whose read loop has ended.
    pub async fn close(&self, conn: &Arc<Connection>) {
        if let Some(hooks) = &self.hooks {
            hooks.after_close(conn).await;
        }
        conn.after_close();
        self.registry.remove(conn);
    }
}
