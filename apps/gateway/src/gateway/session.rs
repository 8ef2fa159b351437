//! Per-connection gateway state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::events::OperationMessage;
use super::identity::Identity;
use super::sink::{FrameSink, CLOSE_NORMAL};
use super::subscription::Subscription;
use super::tree::InterestIndex;
use crate::error::{ErrorMessage, GatewayError, Result};

/// Protocol state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Upgraded, `connection_init` not yet acknowledged.
    Fresh,
    Initialized,
    Terminated,
}

/// Subscriptions owned by one connection, keyed by client-assigned id.
#[derive(Default)]
pub struct SubscriptionSet {
    subs: RwLock<HashMap<String, Arc<Subscription>>>,
}

impl SubscriptionSet {
    pub fn has(&self, id: &str) -> bool {
        self.subs.read().contains_key(id)
    }

    /// Insert `sub` under its id. Without `enforce`, an existing id is kept.
    pub fn add(&self, sub: &Arc<Subscription>, enforce: bool) -> bool {
        let mut subs = self.subs.write();
        if !enforce && subs.contains_key(sub.id()) {
            return false;
        }
        subs.insert(sub.id().to_string(), Arc::clone(sub));
        true
    }

    /// Remove `sub` if it is the entry registered under its id.
    pub fn del(&self, sub: &Arc<Subscription>) -> bool {
        let mut subs = self.subs.write();
        match subs.get(sub.id()) {
            Some(existing) if Arc::ptr_eq(existing, sub) => {
                subs.remove(sub.id());
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<Subscription>> {
        self.subs.read().get(id).cloned()
    }

    pub fn list(&self) -> Vec<Arc<Subscription>> {
        self.subs.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.subs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// State for a single WebSocket connection.
pub struct Connection {
    /// Node that accepted the connection.
    machine_id: String,
    /// Unique per connection (`conn_` prefixed ULID).
    process_id: String,
    identity: RwLock<Identity>,
    subscriptions: SubscriptionSet,
    state: Mutex<ConnectionState>,
    index: Arc<InterestIndex>,
    sink: Arc<dyn FrameSink>,
    closed: AtomicBool,
}

impl Connection {
    pub fn new(machine_id: String, process_id: String, index: Arc<InterestIndex>, sink: Arc<dyn FrameSink>) -> Self {
        Self {
            machine_id,
            process_id,
            identity: RwLock::new(Identity::default()),
            subscriptions: SubscriptionSet::default(),
            state: Mutex::new(ConnectionState::Fresh),
            index,
            sink,
            closed: AtomicBool::new(false),
        }
    }

    pub fn machine_id(&self) -> &str {
        &self.machine_id
    }

    pub fn process_id(&self) -> &str {
        &self.process_id
    }

    /// Cluster-unique key, `<machine>-<process>`.
    pub fn key(&self) -> String {
        format!("{}-{}", self.machine_id, self.process_id)
    }

    /// Snapshot of the connection's identity.
    pub fn identity(&self) -> Identity {
        self.identity.read().clone()
    }

    pub fn set_identity_id(&self, id: i64) {
        self.identity.write().set_id(id);
    }

    pub fn set_identity_key(&self, key: impl Into<String>) {
        self.identity.write().set_key(key);
    }

    pub fn subscriptions(&self) -> &SubscriptionSet {
        &self.subscriptions
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    pub fn is_initialized(&self) -> bool {
        self.state() == ConnectionState::Initialized
    }

    /// Move `Fresh` to `Initialized`. A terminated connection stays terminated.
    pub fn mark_initialized(&self) {
        let mut state = self.state.lock();
        if *state != ConnectionState::Terminated {
            *state = ConnectionState::Initialized;
        }
    }

    /// Register `sub` in this connection's set and the interest index
    /// together. The set entry is rolled back if the index refuses it.
    pub fn register(&self, sub: &Arc<Subscription>) -> Result<()> {
        if !self.subscriptions.add(sub, true) {
            return Err(GatewayError::Registration(sub.id().to_string()));
        }
        if !self.index.add(sub, true) {
            self.subscriptions.del(sub);
            return Err(GatewayError::Registration(sub.id().to_string()));
        }
        Ok(())
    }

    /// Remove the subscription `id` from the index and this connection's set.
    ///
    /// Both removals always run; if either store did not hold the entry the
    /// two have drifted apart and `Desynchronized` is returned.
    pub fn unregister(&self, id: &str) -> Result<Arc<Subscription>> {
        let sub = self
            .subscriptions
            .get(id)
            .ok_or_else(|| GatewayError::SubscriptionNotFound(id.to_string()))?;
        let in_index = self.index.del(&sub);
        let in_set = self.subscriptions.del(&sub);
        if !in_index || !in_set {
            return Err(GatewayError::Desynchronized(id.to_string()));
        }
        Ok(sub)
    }

    /// Write a message under `id`. Plain JSON values are wrapped in a `data`
    /// frame; an [`OperationMessage`] is sent as-is.
    pub async fn write(&self, id: &str, message: impl Into<OperationMessage>) -> Result<()> {
        let msg = message.into().with_id(id);
        let text = serde_json::to_string(&msg)?;
        self.sink.send_text(text).await
    }

    /// Write an `error` frame. Nothing is sent for an empty list.
    pub async fn error(&self, id: &str, errors: Vec<ErrorMessage>) -> Result<()> {
        if errors.is_empty() {
            return Ok(());
        }
        self.write(id, OperationMessage::error(&errors)).await
    }

    /// Close the websocket. Only the first call sends a close frame.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.sink.close(CLOSE_NORMAL, "").await
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn before_open(&self) {
        tracing::debug!(connection = %self.key(), "subscription connection opened");
    }

    /// Unregister every owned subscription from the index and this set.
    /// Returns how many subscriptions were dropped.
    pub fn after_close(&self) -> usize {
        *self.state.lock() = ConnectionState::Terminated;
        let subs = self.subscriptions.list();
        for sub in &subs {
            self.index.del(sub);
            self.subscriptions.del(sub);
        }
        tracing::debug!(connection = %self.key(), dropped = subs.len(), "subscription connection closed");
        subs.len()
    }
}
