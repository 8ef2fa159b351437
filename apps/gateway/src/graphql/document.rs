//! Query parsing and subscription field/argument extraction.

use graphql_parser::query::{self, Definition, OperationDefinition, Selection};
use serde_json::{Map, Number, Value};

use super::Arguments;
use crate::error::GatewayError;

/// A parsed GraphQL document with owned strings.
pub type Document = query::Document<'static, String>;

type Field = query::Field<'static, String>;
type Literal = query::Value<'static, String>;

/// Parse a query string into an owned document.
pub fn parse(source: &str) -> Result<Document, GatewayError> {
    graphql_parser::parse_query::<String>(source)
        .map(|doc| doc.into_static())
        .map_err(|e| GatewayError::Parse(e.to_string()))
}

/// Subscription operations in document order.
pub fn subscription_operations(doc: &Document) -> impl Iterator<Item = &query::Subscription<'static, String>> {
    doc.definitions.iter().filter_map(|def| match def {
        Definition::Operation(OperationDefinition::Subscription(sub)) => Some(sub),
        _ => None,
    })
}

/// Extract the subscribed field names and their resolved arguments.
///
/// Only the first selection of each subscription operation counts, and only
/// when it is a plain field. Each field name is reported once. A variable
/// reference missing from `variables` resolves to `null`.
pub fn subscription_info(doc: &Document, variables: &Map<String, Value>) -> (Vec<String>, Arguments) {
    let mut fields = Vec::new();
    let mut arguments = Arguments::new();

    for op in subscription_operations(doc) {
        if let Some(Selection::Field(field)) = op.selection_set.items.first() {
            if !fields.contains(&field.name) {
                fields.push(field.name.clone());
            }
            arguments.extend(field_arguments(field, variables));
        }
    }

    (fields, arguments)
}

/// Resolve the arguments of a single field against `variables`.
pub fn field_arguments(field: &Field, variables: &Map<String, Value>) -> Arguments {
    field
        .arguments
        .iter()
        .map(|(name, value)| (name.clone(), resolve_literal(value, variables)))
        .collect()
}

/// Convert an argument literal to JSON, dereferencing variables.
pub fn resolve_literal(value: &Literal, variables: &Map<String, Value>) -> Value {
    match value {
        Literal::Variable(name) => variables.get(name).cloned().unwrap_or(Value::Null),
        Literal::Int(n) => n.as_i64().map(Value::from).unwrap_or(Value::Null),
        Literal::Float(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
        Literal::String(s) => Value::String(s.clone()),
        Literal::Boolean(b) => Value::Bool(*b),
        Literal::Null => Value::Null,
        Literal::Enum(e) => Value::String(e.clone()),
        Literal::List(items) => Value::Array(items.iter().map(|v| resolve_literal(v, variables)).collect()),
        Literal::Object(entries) => Value::Object(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), resolve_literal(v, variables)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn vars(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn extracts_field_and_literal_arguments() {
        let doc = parse(r#"subscription { noteUpdated(id: "7", limit: 3, ratio: 0.5, live: true) { id content } }"#)
            .unwrap();
        let (fields, args) = subscription_info(&doc, &Map::new());

        assert_eq!(fields, vec!["noteUpdated".to_string()]);
        assert_eq!(args["id"], json!("7"));
        assert_eq!(args["limit"], json!(3));
        assert_eq!(args["ratio"], json!(0.5));
        assert_eq!(args["live"], json!(true));
    }

    #[test]
    fn dereferences_variables_and_nulls_missing_ones() {
        let doc = parse("subscription S($id: ID, $other: ID) { noteUpdated(id: $id, other: $other) { id } }").unwrap();
        let (_, args) = subscription_info(&doc, &vars(json!({ "id": "42" })));

        assert_eq!(args["id"], json!("42"));
        assert_eq!(args["other"], Value::Null);
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn only_first_top_level_field_counts() {
        let doc = parse("subscription { first { id } second { id } }").unwrap();
        let (fields, _) = subscription_info(&doc, &Map::new());
        assert_eq!(fields, vec!["first".to_string()]);
    }

    #[test]
    fn each_subscription_operation_contributes_a_field() {
        let doc = parse("subscription A { alpha { id } } subscription B { beta(kind: ACTIVE) { id } } query Q { gamma }")
            .unwrap();
        let (fields, args) = subscription_info(&doc, &Map::new());

        assert_eq!(fields, vec!["alpha".to_string(), "beta".to_string()]);
        assert_eq!(args["kind"], json!("ACTIVE"));
    }

    #[test]
    fn repeated_field_across_operations_is_reported_once() {
        let doc = parse("subscription A { ping } subscription B { ping } subscription C { pong }").unwrap();
        let (fields, _) = subscription_info(&doc, &Map::new());
        assert_eq!(fields, vec!["ping".to_string(), "pong".to_string()]);
    }

    #[test]
    fn fragment_as_first_selection_contributes_nothing() {
        let doc = parse("subscription { ...F } fragment F on Subscription { ping }").unwrap();
        let (fields, args) = subscription_info(&doc, &Map::new());
        assert!(fields.is_empty());
        assert!(args.is_empty());
    }

    #[test]
    fn resolves_nested_lists_and_objects() {
        let doc = parse(r#"subscription($tag: String) { feed(where: { tags: ["a", $tag] }) { id } }"#).unwrap();
        let (_, args) = subscription_info(&doc, &vars(json!({ "tag": "b" })));
        assert_eq!(args["where"], json!({ "tags": ["a", "b"] }));
    }

    #[test]
    fn parse_error_is_reported() {
        let err = parse("subscription { noteUpdated(").unwrap_err();
        assert!(matches!(err, GatewayError::Parse(_)));
    }
}
