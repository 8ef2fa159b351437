//! `graphql-ws` message types and wire-format envelopes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ErrorMessage;
use crate::graphql::ExecutionResult;

/// Websocket subprotocol offered during the upgrade.
pub const SUBPROTOCOL: &str = "graphql-ws";

// ---------------------------------------------------------------------------
// Message types
// ---------------------------------------------------------------------------

pub struct MessageType;

impl MessageType {
    // Client → Server
    pub const CONNECTION_INIT: &'static str = "connection_init";
    pub const START: &'static str = "start";
    pub const STOP: &'static str = "stop";
    pub const CONNECTION_TERMINATE: &'static str = "connection_terminate";

    // Server → Client
    pub const CONNECTION_ACK: &'static str = "connection_ack";
    pub const CONNECTION_ERROR: &'static str = "connection_error";
    pub const KEEPALIVE: &'static str = "keepalive";
    pub const SUBSCRIPTION_SUCCESS: &'static str = "subscription_success";
    pub const DATA: &'static str = "data";
    pub const ERROR: &'static str = "error";
    pub const COMPLETE: &'static str = "complete";
}

// ---------------------------------------------------------------------------
// Server → Client message
// ---------------------------------------------------------------------------

/// A message sent from the server to the client over WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl OperationMessage {
    fn new(kind: &str, payload: Option<Value>) -> Self {
        Self {
            id: None,
            kind: kind.to_string(),
            payload,
        }
    }

    pub fn connection_ack() -> Self {
        Self::new(MessageType::CONNECTION_ACK, None)
    }

    pub fn keepalive() -> Self {
        Self::new(MessageType::KEEPALIVE, None)
    }

    pub fn subscription_success() -> Self {
        Self::new(MessageType::SUBSCRIPTION_SUCCESS, None)
    }

    pub fn complete() -> Self {
        Self::new(MessageType::COMPLETE, None)
    }

    pub fn data(payload: Value) -> Self {
        Self::new(MessageType::DATA, Some(payload))
    }

    pub fn error(errors: &[ErrorMessage]) -> Self {
        Self::new(MessageType::ERROR, Some(serde_json::to_value(errors).unwrap_or_default()))
    }

    /// Stamp the message with a subscription id. An empty id is omitted.
    pub fn with_id(mut self, id: &str) -> Self {
        self.id = (!id.is_empty()).then(|| id.to_string());
        self
    }
}

impl From<Value> for OperationMessage {
    fn from(payload: Value) -> Self {
        OperationMessage::data(payload)
    }
}

impl From<ExecutionResult> for OperationMessage {
    fn from(result: ExecutionResult) -> Self {
        OperationMessage::data(serde_json::to_value(result).unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Client → Server message
// ---------------------------------------------------------------------------

/// A message received from the client over WebSocket.
#[derive(Debug, Deserialize)]
pub struct ClientMessage {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
}

impl ClientMessage {
    pub fn id(&self) -> &str {
        self.id.as_deref().unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// connection_init payload
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct InitPayload {
    #[serde(rename = "authToken", default)]
    pub auth_token: String,
}

// ---------------------------------------------------------------------------
// start payload
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct StartPayload {
    #[serde(default)]
    pub query: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub variables: Map<String, Value>,
    #[serde(rename = "operationName", default)]
    pub operation_name: Option<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn ack_omits_id_and_payload() {
        let json = serde_json::to_value(OperationMessage::connection_ack().with_id("")).unwrap();
        assert_eq!(json, json!({ "type": "connection_ack" }));
    }

    #[test]
    fn execution_result_becomes_data_frame() {
        let result = ExecutionResult {
            data: json!({ "ping": true }),
            errors: vec![],
        };
        let msg = OperationMessage::from(result).with_id("9");
        let json = serde_json::to_value(msg).unwrap();
        assert_eq!(json, json!({ "id": "9", "type": "data", "payload": { "data": { "ping": true } } }));
    }

    #[test]
    fn error_frame_carries_message_list() {
        let msg = OperationMessage::error(&[ErrorMessage::new("boom")]).with_id("1");
        let json = serde_json::to_value(msg).unwrap();
        assert_eq!(json["payload"], json!([{ "message": "boom" }]));
    }

    #[test]
    fn start_payload_tolerates_null_variables() {
        let payload: StartPayload = serde_json::from_value(json!({
            "query": "subscription { ping }",
            "variables": null,
            "operationName": null
        }))
        .unwrap();
        assert!(payload.variables.is_empty());
        assert!(payload.operation_name.is_none());
    }

    #[test]
    fn client_message_without_type_is_accepted() {
        let msg: ClientMessage = serde_json::from_str(r#"{"id":"1"}"#).unwrap();
        assert_eq!(msg.kind, "");
        assert_eq!(msg.id(), "1");
    }
}
