//! Events published to subscribers, and their cluster wire format.
//!
//! On the wire a distribution is JSON; the payload and byte filters are
//! base64 strings, filter values are externally tagged (`{"int": 7}`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// A published occurrence of `field`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
    /// Event name, matched against subscribed field names.
    pub field: String,
    /// Opaque bytes handed to the query engine as the execution root.
    #[serde(with = "base64_bytes")]
    pub payload: Vec<u8>,
    #[serde(default)]
    pub filters: Vec<Filter>,
    /// Require the subscription's argument keys to equal the filter keys.
    #[serde(default)]
    pub strict: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
}

impl Distribution {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            payload: Vec::new(),
            filters: Vec::new(),
            strict: false,
            condition: None,
        }
    }

    pub fn payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Add an argument filter. Filters keep insertion order.
    pub fn filter(mut self, key: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.filters.push(Filter {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Only deliver to connections whose identity id is listed.
    pub fn eq_ids(self, ids: impl IntoIterator<Item = i64>) -> Self {
        self.with_condition(|c| c.eq_ids.extend(ids))
    }

    /// Only deliver to connections with an identity id that is not listed.
    pub fn ne_ids(self, ids: impl IntoIterator<Item = i64>) -> Self {
        self.with_condition(|c| c.ne_ids.extend(ids))
    }

    pub fn eq_keys<S: Into<String>>(self, keys: impl IntoIterator<Item = S>) -> Self {
        self.with_condition(|c| c.eq_keys.extend(keys.into_iter().map(Into::into)))
    }

    pub fn ne_keys<S: Into<String>>(self, keys: impl IntoIterator<Item = S>) -> Self {
        self.with_condition(|c| c.ne_keys.extend(keys.into_iter().map(Into::into)))
    }

    fn with_condition(mut self, f: impl FnOnce(&mut Condition)) -> Self {
        let mut condition = self.condition.take().unwrap_or_default();
        f(&mut condition);
        self.condition = (!condition.is_empty()).then_some(condition);
        self
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub key: String,
    pub value: FilterValue,
}

/// Tagged scalar compared against a subscription argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Bytes(#[serde(with = "base64_bytes")] Vec<u8>),
    /// Unix timestamp in nanoseconds.
    Time(i64),
}

impl FilterValue {
    /// Whether a resolved argument holds this value with a matching type.
    ///
    /// Bytes compare against a string's UTF-8 bytes; times against an
    /// RFC 3339 string denoting the same instant.
    pub fn matches(&self, arg: &Value) -> bool {
        match self {
            FilterValue::String(s) => arg.as_str() == Some(s.as_str()),
            FilterValue::Int(i) => arg.as_i64() == Some(*i),
            FilterValue::Float(f) => arg.is_f64() && arg.as_f64() == Some(*f),
            FilterValue::Bool(b) => arg.as_bool() == Some(*b),
            FilterValue::Bytes(b) => arg.as_str().map(str::as_bytes) == Some(b.as_slice()),
            FilterValue::Time(nanos) => arg
                .as_str()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .and_then(|t| t.timestamp_nanos_opt())
                == Some(*nanos),
        }
    }
}

impl From<&str> for FilterValue {
    fn from(v: &str) -> Self {
        FilterValue::String(v.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(v: String) -> Self {
        FilterValue::String(v)
    }
}

impl From<i64> for FilterValue {
    fn from(v: i64) -> Self {
        FilterValue::Int(v)
    }
}

impl From<i32> for FilterValue {
    fn from(v: i32) -> Self {
        FilterValue::Int(v.into())
    }
}

impl From<u32> for FilterValue {
    fn from(v: u32) -> Self {
        FilterValue::Int(v.into())
    }
}

impl From<f64> for FilterValue {
    fn from(v: f64) -> Self {
        FilterValue::Float(v)
    }
}

impl From<bool> for FilterValue {
    fn from(v: bool) -> Self {
        FilterValue::Bool(v)
    }
}

impl From<Vec<u8>> for FilterValue {
    fn from(v: Vec<u8>) -> Self {
        FilterValue::Bytes(v)
    }
}

impl From<DateTime<Utc>> for FilterValue {
    fn from(v: DateTime<Utc>) -> Self {
        FilterValue::Time(v.timestamp_nanos_opt().unwrap_or_default())
    }
}

/// Identity allow/deny lists. Empty lists are inactive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(default)]
    pub eq_ids: Vec<i64>,
    #[serde(default)]
    pub ne_ids: Vec<i64>,
    #[serde(default)]
    pub eq_keys: Vec<String>,
    #[serde(default)]
    pub ne_keys: Vec<String>,
}

impl Condition {
    pub fn is_empty(&self) -> bool {
        self.eq_ids.is_empty() && self.ne_ids.is_empty() && self.eq_keys.is_empty() && self.ne_keys.is_empty()
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
