//! Query-engine collaborator: the seam between the gateway and GraphQL
//! execution.
//!
//! The gateway only needs three things from an engine: parse a query into a
//! [`Document`], validate it against a schema, and execute it with an event
//! payload as the root value. [`SubscriptionSchema`] is the bundled engine,
//! an explicit registry of subscription root fields.

pub mod document;
pub mod schema;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{ErrorMessage, GatewayError};
use crate::gateway::identity::Identity;

pub use document::{parse, subscription_info, Document};
pub use schema::{ResolveContext, SubscriptionSchema};

/// Everything an engine needs to re-run a stored subscription.
pub struct ExecutionRequest<'a> {
    pub document: &'a Document,
    pub query: &'a str,
    pub variables: &'a Map<String, Value>,
    pub operation_name: Option<&'a str>,
    /// Identity of the connection that owns the subscription.
    pub identity: Identity,
    /// Event payload, exposed to the root subscription field resolver.
    pub root: &'a [u8],
}

/// Result of one execution, sent to the client as a `data` payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionResult {
    pub data: Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ErrorMessage>,
}

impl ExecutionResult {
    pub fn from_errors(errors: Vec<ErrorMessage>) -> Self {
        Self {
            data: Value::Null,
            errors,
        }
    }
}

#[async_trait]
pub trait QueryEngine: Send + Sync {
    /// Parse a query string into a document.
    fn parse(&self, query: &str) -> Result<Document, GatewayError> {
        document::parse(query)
    }

    /// Validate a parsed document against the engine's schema.
    fn validate(&self, document: &Document) -> Result<(), Vec<ErrorMessage>>;

    /// Execute a document with the event payload as root value.
    async fn execute(&self, request: ExecutionRequest<'_>) -> ExecutionResult;
}

/// Resolved argument values of a subscription field, keyed by argument name.
pub type Arguments = HashMap<String, Value>;
