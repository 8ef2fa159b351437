//! Live connections on this node, keyed by `<machine>-<process>`.

use std::sync::Arc;

use dashmap::DashMap;

use super::session::Connection;

/// Uses `DashMap` for shard-level concurrency; entries are inserted when the
/// upgrade completes and removed once teardown has finished.
#[derive(Default)]
pub struct ConnectionRegistry {
    conns: DashMap<String, Arc<Connection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, conn: Arc<Connection>) {
        self.conns.insert(conn.key(), conn);
    }

    /// Remove `conn` if it is still the entry under its key.
    pub fn remove(&self, conn: &Arc<Connection>) -> bool {
        self.conns
            .remove_if(&conn.key(), |_, existing| Arc::ptr_eq(existing, conn))
            .is_some()
    }

    pub fn get(&self, key: &str) -> Option<Arc<Connection>> {
        self.conns.get(key).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.conns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conns.is_empty()
    }

    /// Snapshot of every live connection.
    pub fn list(&self) -> Vec<Arc<Connection>> {
        self.conns.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Close every connection. Their read loops tear them down.
    pub async fn close_all(&self) {
        for conn in self.list() {
            if let Err(e) = conn.close().await {
                tracing::debug!(connection = %conn.key(), error = %e, "close during shutdown failed");
            }
        }
    }
}
