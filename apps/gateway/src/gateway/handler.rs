//! Inbound `graphql-ws` message dispatch: connection_init, start, stop,
//! connection_terminate, and unknown types.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::events::{ClientMessage, InitPayload, MessageType, OperationMessage, StartPayload};
use super::session::Connection;
use super::subscription::Subscription;
use crate::error::{ErrorMessage, GatewayError, Result};
use crate::graphql::QueryEngine;

/// Decides whether a connection may proceed, given the `authToken` from
/// its `connection_init` payload. Implementations may set the connection's
/// identity.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize(&self, conn: &Connection, token: &str) -> std::result::Result<(), String>;
}

/// What the read loop should do after a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    Close,
}

pub struct ProtocolHandler {
    engine: Arc<dyn QueryEngine>,
    authorizer: Option<Arc<dyn Authorizer>>,
}

impl ProtocolHandler {
    pub fn new(engine: Arc<dyn QueryEngine>, authorizer: Option<Arc<dyn Authorizer>>) -> Self {
        Self { engine, authorizer }
    }

    /// Process one inbound text frame.
    ///
    /// Protocol errors are answered with an `error` frame and keep the
    /// connection open. Only malformed framing and `connection_terminate`
    /// close it. A failed reply write is returned as an error.
    pub async fn handle(&self, conn: &Arc<Connection>, text: &str) -> Result<Outcome> {
        let msg: ClientMessage = match serde_json::from_str(text) {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!(connection = %conn.key(), error = %e, "malformed frame");
                conn.close().await?;
                return Ok(Outcome::Close);
            }
        };

        match msg.kind.as_str() {
            MessageType::CONNECTION_INIT => self.connection_init(conn, msg).await?,
            MessageType::START => self.start(conn, msg).await?,
            MessageType::STOP => self.stop(conn, msg).await?,
            MessageType::CONNECTION_TERMINATE => {
                conn.close().await?;
                return Ok(Outcome::Close);
            }
            other => {
                tracing::trace!(connection = %conn.key(), kind = %other, "ignoring message");
            }
        }
        Ok(Outcome::Continue)
    }

    async fn connection_init(&self, conn: &Connection, msg: ClientMessage) -> Result<()> {
        let id = msg.id().to_string();
        let payload = match msg.payload {
            Value::Null => InitPayload::default(),
            other => match serde_json::from_value::<InitPayload>(other) {
                Ok(p) => p,
                Err(_) => {
                    let err = GatewayError::InvalidPayload(MessageType::CONNECTION_INIT);
                    return conn.error(&id, err.to_messages()).await;
                }
            },
        };

        if let Some(authorizer) = &self.authorizer {
            if let Err(reason) = authorizer.authorize(conn, &payload.auth_token).await {
                tracing::debug!(connection = %conn.key(), %reason, "connection_init rejected");
                let err = GatewayError::Unauthorized(reason);
                return conn.error(&id, err.to_messages()).await;
            }
        }

        conn.mark_initialized();
        conn.write("", OperationMessage::connection_ack()).await
    }

    async fn start(&self, conn: &Arc<Connection>, msg: ClientMessage) -> Result<()> {
        let id = msg.id().to_string();
        match self.register(conn, msg) {
            Ok(sub) => {
                tracing::debug!(
                    connection = %conn.key(),
                    subscription = %id,
                    fields = ?sub.fields(),
                    "subscription started"
                );
                conn.write(&id, OperationMessage::subscription_success()).await
            }
            Err(err) => conn.error(&id, err.to_messages()).await,
        }
    }

    /// Validate a `start` and register it. Nothing is mutated unless every
    /// check passes.
    fn register(&self, conn: &Arc<Connection>, msg: ClientMessage) -> Result<Arc<Subscription>> {
        if !conn.is_initialized() {
            return Err(GatewayError::NotInitialized);
        }
        if msg.id().trim().is_empty() {
            return Err(GatewayError::EmptySubscriptionId);
        }
        let id = msg.id().to_string();
        if conn.subscriptions().has(&id) {
            return Err(GatewayError::DuplicateSubscription(id));
        }

        let payload: StartPayload =
            serde_json::from_value(msg.payload).map_err(|_| GatewayError::InvalidPayload(MessageType::START))?;
        if payload.query.trim().is_empty() {
            return Err(GatewayError::EmptyQuery);
        }

        let document = self.engine.parse(&payload.query)?;
        self.engine.validate(&document).map_err(GatewayError::Validation)?;

        let sub = Arc::new(Subscription::new(
            id,
            payload.query,
            payload.operation_name,
            payload.variables,
            document,
            Arc::downgrade(conn),
        ));
        if sub.fields().is_empty() {
            return Err(GatewayError::Validation(vec![ErrorMessage::new(
                "subscription does not select a root field",
            )]));
        }
        conn.register(&sub)?;
        Ok(sub)
    }

    async fn stop(&self, conn: &Connection, msg: ClientMessage) -> Result<()> {
        let id = msg.id();
        if id.trim().is_empty() {
            return conn.error("", GatewayError::EmptySubscriptionId.to_messages()).await;
        }

        match conn.unregister(id) {
            Ok(_) => {
                tracing::debug!(connection = %conn.key(), subscription = %id, "subscription stopped");
                conn.write(id, OperationMessage::complete()).await
            }
            Err(err) => {
                if matches!(err, GatewayError::Desynchronized(_)) {
                    tracing::error!(
                        connection = %conn.key(),
                        subscription = %id,
                        "interest index and connection subscriptions out of sync"
                    );
                }
                conn.error(id, err.to_messages()).await
            }
        }
    }
}
