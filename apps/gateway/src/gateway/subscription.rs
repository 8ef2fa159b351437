//! A client's registered interest, immutable once registered.

use std::sync::{Arc, Weak};

use serde_json::{Map, Value};

use super::session::Connection;
use crate::graphql::{subscription_info, Arguments, Document};

#[derive(Debug)]
pub struct Subscription {
    id: String,
    query: String,
    operation_name: Option<String>,
    variables: Map<String, Value>,
    document: Document,
    /// Top-level subscribed field names; the index keys this subscription by each.
    fields: Vec<String>,
    /// Resolved arguments of the subscribed fields, matched against event filters.
    arguments: Arguments,
    connection: Weak<Connection>,
}

impl Subscription {
    /// Build a subscription from an already validated document. Field names
    /// and arguments are derived here.
    pub fn new(
        id: String,
        query: String,
        operation_name: Option<String>,
        variables: Map<String, Value>,
        document: Document,
        connection: Weak<Connection>,
    ) -> Self {
        let (fields, arguments) = subscription_info(&document, &variables);
        Self {
            id,
            query,
            operation_name: operation_name.filter(|name| !name.is_empty()),
            variables,
            document,
            fields,
            arguments,
            connection,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn operation_name(&self) -> Option<&str> {
        self.operation_name.as_deref()
    }

    pub fn variables(&self) -> &Map<String, Value> {
        &self.variables
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn arguments(&self) -> &Arguments {
        &self.arguments
    }

    /// The owning connection, if it is still alive.
    pub fn connection(&self) -> Option<Arc<Connection>> {
        self.connection.upgrade()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::graphql::parse;

    #[test]
    fn derives_fields_and_arguments() {
        let query = "subscription Notes($id: ID) { noteUpdated(id: $id) { id } }";
        let variables = match json!({ "id": "7" }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        let sub = Subscription::new(
            "1".into(),
            query.into(),
            Some(String::new()),
            variables,
            parse(query).unwrap(),
            Weak::new(),
        );

        assert_eq!(sub.id(), "1");
        assert_eq!(sub.fields(), ["noteUpdated".to_string()]);
        assert_eq!(sub.arguments()["id"], json!("7"));
        assert_eq!(sub.operation_name(), None);
        assert!(sub.connection().is_none());
    }
}
