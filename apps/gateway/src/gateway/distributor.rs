//! Matches a published event against the interest index and delivers a
//! freshly executed result to every surviving subscription.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use super::distribution::{Condition, Distribution};
use super::identity::Identity;
use super::session::Connection;
use super::subscription::Subscription;
use super::tree::InterestIndex;
use crate::error::{GatewayError, Result};
use crate::graphql::{Arguments, ExecutionRequest, QueryEngine};

pub struct Distributor {
    index: Arc<InterestIndex>,
    engine: Arc<dyn QueryEngine>,
    /// Bound on one subscription's execute + write. `None` waits forever.
    delivery_timeout: Option<Duration>,
}

impl Distributor {
    pub fn new(index: Arc<InterestIndex>, engine: Arc<dyn QueryEngine>, delivery_timeout: Option<Duration>) -> Self {
        Self {
            index,
            engine,
            delivery_timeout,
        }
    }

    /// Deliver `event` to every matching local subscription.
    ///
    /// Returns the number of deliveries. The first failed delivery aborts the
    /// remaining candidates and is returned.
    pub async fn subscribe(&self, event: &Distribution) -> Result<usize> {
        if event.field.is_empty() || event.payload.is_empty() {
            return Ok(0);
        }

        let conditions = IdentityConditions::new(event.condition.as_ref());
        let candidates = self.index.get(&[event.field.as_str()]);
        let mut delivered = 0;

        for sub in candidates {
            let Some(conn) = sub.connection() else {
                continue;
            };
            if conn.is_closed() {
                continue;
            }
            if !conditions.admits(&conn.identity()) {
                continue;
            }
            if !filters_match(event, sub.arguments()) {
                continue;
            }
            self.deliver(&sub, &conn, &event.payload).await?;
            delivered += 1;
        }

        tracing::debug!(field = %event.field, delivered, "distribution processed");
        Ok(delivered)
    }

    async fn deliver(&self, sub: &Subscription, conn: &Connection, payload: &[u8]) -> Result<()> {
        let work = async {
            let result = self
                .engine
                .execute(ExecutionRequest {
                    document: sub.document(),
                    query: sub.query(),
                    variables: sub.variables(),
                    operation_name: sub.operation_name(),
                    identity: conn.identity(),
                    root: payload,
                })
                .await;
            conn.write(sub.id(), result).await
        };

        match self.delivery_timeout {
            Some(limit) => tokio::time::timeout(limit, work)
                .await
                .map_err(|_| GatewayError::DeliveryTimeout(sub.id().to_string()))?,
            None => work.await,
        }
    }
}

/// Hash-set form of a [`Condition`], built once per event.
#[derive(Default)]
struct IdentityConditions<'a> {
    eq_ids: Option<HashSet<i64>>,
    ne_ids: Option<HashSet<i64>>,
    eq_keys: Option<HashSet<&'a str>>,
    ne_keys: Option<HashSet<&'a str>>,
}

impl<'a> IdentityConditions<'a> {
    fn new(condition: Option<&'a Condition>) -> Self {
        let Some(c) = condition else {
            return Self::default();
        };
        Self {
            eq_ids: (!c.eq_ids.is_empty()).then(|| c.eq_ids.iter().copied().collect()),
            ne_ids: (!c.ne_ids.is_empty()).then(|| c.ne_ids.iter().copied().collect()),
            eq_keys: (!c.eq_keys.is_empty()).then(|| c.eq_keys.iter().map(String::as_str).collect()),
            ne_keys: (!c.ne_keys.is_empty()).then(|| c.ne_keys.iter().map(String::as_str).collect()),
        }
    }

    /// An active list requires the identity to carry that attribute at all.
    fn admits(&self, identity: &Identity) -> bool {
        if let Some(ids) = &self.eq_ids {
            match identity.id() {
                Some(id) if ids.contains(&id) => {}
                _ => return false,
            }
        }
        if let Some(ids) = &self.ne_ids {
            match identity.id() {
                Some(id) if !ids.contains(&id) => {}
                _ => return false,
            }
        }
        if let Some(keys) = &self.eq_keys {
            match identity.key() {
                Some(key) if keys.contains(key) => {}
                _ => return false,
            }
        }
        if let Some(keys) = &self.ne_keys {
            match identity.key() {
                Some(key) if !keys.contains(key) => {}
                _ => return false,
            }
        }
        true
    }
}

fn filters_match(event: &Distribution, arguments: &Arguments) -> bool {
    for filter in &event.filters {
        match arguments.get(&filter.key) {
            Some(arg) if filter.value.matches(arg) => {}
            _ => return false,
        }
    }
    if event.strict {
        let keys: HashSet<&str> = event.filters.iter().map(|f| f.key.as_str()).collect();
        if keys.len() != arguments.len() || !arguments.keys().all(|k| keys.contains(k.as_str())) {
            return false;
        }
    }
    true
}
