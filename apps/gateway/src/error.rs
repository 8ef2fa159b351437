use serde::{Deserialize, Serialize};
use thiserror::Error;

/// GraphQL-style error object carried in `error` and `data` payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub message: String,
}

impl ErrorMessage {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors raised by the subscription gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid {0} payload")]
    InvalidPayload(&'static str),

    #[error("connection has not been initialized")]
    NotInitialized,

    #[error("failed to authenticate user: {0}")]
    Unauthorized(String),

    #[error("subscription id is empty")]
    EmptySubscriptionId,

    #[error("subscription query is empty")]
    EmptyQuery,

    #[error("cannot register subscription twice")]
    DuplicateSubscription(String),

    #[error("unable to find matching subscription")]
    SubscriptionNotFound(String),

    #[error("unable to register subscription")]
    Registration(String),

    #[error("unable to deregister subscription")]
    Desynchronized(String),

    #[error("{0}")]
    Parse(String),

    #[error("query failed validation")]
    Validation(Vec<ErrorMessage>),

    #[error("connection is closed")]
    Closed,

    #[error("websocket write failed: {0}")]
    Write(String),

    #[error("delivery to subscription {0} timed out")]
    DeliveryTimeout(String),

    #[error("broker error: {0}")]
    Broker(String),

    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

impl GatewayError {
    /// Render the error as the list of messages sent in an `error` frame.
    pub fn to_messages(&self) -> Vec<ErrorMessage> {
        match self {
            GatewayError::Validation(errors) if !errors.is_empty() => errors.clone(),
            other => vec![ErrorMessage::new(other.to_string())],
        }
    }
}

impl From<axum::Error> for GatewayError {
    fn from(err: axum::Error) -> Self {
        GatewayError::Write(err.to_string())
    }
}

impl From<redis::RedisError> for GatewayError {
    fn from(err: redis::RedisError) -> Self {
        GatewayError::Broker(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
