//! Resolver registry engine for subscription root fields.
//!
//! Each registered field owns a resolver that turns the event payload into a
//! JSON value. Execution projects that value onto the client's selection set.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use graphql_parser::query::{Definition, FragmentDefinition, OperationDefinition, Selection, SelectionSet};
use serde_json::{Map, Value};

use super::document::{field_arguments, subscription_operations, Document};
use super::{Arguments, ExecutionRequest, ExecutionResult, QueryEngine};
use crate::error::ErrorMessage;
use crate::gateway::identity::Identity;

type Fragments<'d> = HashMap<&'d str, &'d FragmentDefinition<'static, String>>;

/// Inputs handed to a root field resolver.
pub struct ResolveContext<'a> {
    /// Raw event payload.
    pub payload: &'a [u8],
    /// Arguments of this field, variables already resolved.
    pub arguments: &'a Arguments,
    pub identity: &'a Identity,
}

pub type Resolver = Arc<dyn Fn(&ResolveContext<'_>) -> Result<Value, String> + Send + Sync>;

/// Explicit registry of subscription root fields.
#[derive(Clone)]
pub struct SubscriptionSchema {
    type_name: String,
    fields: HashMap<String, Resolver>,
}

impl SubscriptionSchema {
    pub fn new() -> Self {
        Self {
            type_name: "Subscription".to_string(),
            fields: HashMap::new(),
        }
    }

    /// Register a root field. A later registration under the same name wins.
    pub fn field<F>(mut self, name: &str, resolver: F) -> Self
    where
        F: Fn(&ResolveContext<'_>) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.fields.insert(name.to_string(), Arc::new(resolver));
        self
    }

    /// Name reported in validation errors, `Subscription` by default.
    pub fn type_name(mut self, name: &str) -> Self {
        self.type_name = name.to_string();
        self
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    fn select_operation<'d>(
        document: &'d Document,
        operation_name: Option<&str>,
    ) -> Result<&'d SelectionSet<'static, String>, ErrorMessage> {
        let mut subscriptions = subscription_operations(document);
        match operation_name.filter(|name| !name.is_empty()) {
            Some(name) => subscriptions
                .find(|op| op.name.as_deref() == Some(name))
                .map(|op| &op.selection_set)
                .ok_or_else(|| ErrorMessage::new(format!("Unknown operation named \"{name}\"."))),
            None => {
                let first = subscriptions
                    .next()
                    .ok_or_else(|| ErrorMessage::new("Must provide a subscription operation."))?;
                if subscriptions.next().is_some() {
                    return Err(ErrorMessage::new(
                        "Must provide operation name if query contains multiple operations.",
                    ));
                }
                Ok(&first.selection_set)
            }
        }
    }
}

impl Default for SubscriptionSchema {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueryEngine for SubscriptionSchema {
    fn validate(&self, document: &Document) -> Result<(), Vec<ErrorMessage>> {
        let mut errors = Vec::new();
        let mut operations = 0;

        for def in &document.definitions {
            let op = match def {
                Definition::Operation(OperationDefinition::Subscription(op)) => op,
                Definition::Operation(_) => {
                    errors.push(ErrorMessage::new("Only subscription operations are supported."));
                    continue;
                }
                Definition::Fragment(_) => continue,
            };
            operations += 1;
            if !matches!(op.selection_set.items.first(), Some(Selection::Field(_))) {
                errors.push(ErrorMessage::new(format!(
                    "Subscription must select a field of type \"{}\" first.",
                    self.type_name
                )));
            }
            for selection in &op.selection_set.items {
                if let Selection::Field(field) = selection {
                    if !self.has_field(&field.name) {
                        errors.push(ErrorMessage::new(format!(
                            "Cannot query field \"{}\" on type \"{}\".",
                            field.name, self.type_name
                        )));
                    }
                }
            }
        }

        if operations == 0 {
            errors.push(ErrorMessage::new("Document does not contain a subscription operation."));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    async fn execute(&self, request: ExecutionRequest<'_>) -> ExecutionResult {
        let selection_set = match Self::select_operation(request.document, request.operation_name) {
            Ok(set) => set,
            Err(err) => return ExecutionResult::from_errors(vec![err]),
        };
        let fragments = collect_fragments(request.document);

        let mut data = Map::new();
        let mut errors = Vec::new();

        for selection in &selection_set.items {
            let Selection::Field(field) = selection else {
                continue;
            };
            let key = field.alias.clone().unwrap_or_else(|| field.name.clone());
            let Some(resolver) = self.fields.get(&field.name) else {
                errors.push(ErrorMessage::new(format!(
                    "Cannot query field \"{}\" on type \"{}\".",
                    field.name, self.type_name
                )));
                data.insert(key, Value::Null);
                continue;
            };

            let arguments = field_arguments(field, request.variables);
            let ctx = ResolveContext {
                payload: request.root,
                arguments: &arguments,
                identity: &request.identity,
            };
            match resolver(&ctx) {
                Ok(value) => {
                    data.insert(key, project(value, &field.selection_set, &fragments));
                }
                Err(message) => {
                    errors.push(ErrorMessage::new(message));
                    data.insert(key, Value::Null);
                }
            }
        }

        ExecutionResult {
            data: Value::Object(data),
            errors,
        }
    }
}

fn collect_fragments(document: &Document) -> Fragments<'_> {
    document
        .definitions
        .iter()
        .filter_map(|def| match def {
            Definition::Fragment(fragment) => Some((fragment.name.as_str(), fragment)),
            _ => None,
        })
        .collect()
}

/// Shape a resolved value by the selection set.
fn project(value: Value, selection_set: &SelectionSet<'static, String>, fragments: &Fragments<'_>) -> Value {
    if selection_set.items.is_empty() {
        return value;
    }
    match value {
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| project(item, selection_set, fragments))
                .collect(),
        ),
        Value::Object(source) => {
            let mut out = Map::new();
            select_into(&source, selection_set, fragments, &mut out);
            Value::Object(out)
        }
        other => other,
    }
}

fn select_into(
    source: &Map<String, Value>,
    selection_set: &SelectionSet<'static, String>,
    fragments: &Fragments<'_>,
    out: &mut Map<String, Value>,
) {
    for selection in &selection_set.items {
        match selection {
            Selection::Field(field) => {
                if field.name == "__typename" && !source.contains_key("__typename") {
                    continue;
                }
                let key = field.alias.clone().unwrap_or_else(|| field.name.clone());
                let value = source.get(&field.name).cloned().unwrap_or(Value::Null);
                out.insert(key, project(value, &field.selection_set, fragments));
            }
            Selection::InlineFragment(inline) => {
                select_into(source, &inline.selection_set, fragments, out);
            }
            Selection::FragmentSpread(spread) => {
                if let Some(fragment) = fragments.get(spread.fragment_name.as_str()) {
                    select_into(source, &fragment.selection_set, fragments, out);
                }
            }
        }
    }
}
