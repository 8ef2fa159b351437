use std::time::Duration;

use crate::gateway::service::DEFAULT_TOPIC;

/// Which message broker carries cluster distributions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerKind {
    /// In-process broadcast channel. Single node only.
    Local,
    Redis { url: String },
}

impl BrokerKind {
    pub fn name(&self) -> &'static str {
        match self {
            BrokerKind::Local => "local",
            BrokerKind::Redis { .. } => "redis",
        }
    }
}

/// Gateway configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port the HTTP server binds to.
    pub port: u16,
    /// This node's id, the first half of every connection key.
    pub machine_id: String,
    /// Broker topic distributions are published on.
    pub topic: String,
    pub broker: BrokerKind,
    /// Per-subscription delivery bound. `None` waits indefinitely.
    pub delivery_timeout: Option<Duration>,
    /// Keepalive frame interval. `None` disables keepalives.
    pub keepalive_interval: Option<Duration>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message if a required variable is missing.
    pub fn from_env() -> Self {
        let broker = match std::env::var("BROKER").ok().as_deref().map(str::trim) {
            None | Some("") | Some("local") => BrokerKind::Local,
            Some("redis") => BrokerKind::Redis {
                url: required_var("REDIS_URL"),
            },
            Some(other) => panic!("BROKER must be `local` or `redis`, got `{other}`"),
        };

        Self {
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(4000),
            machine_id: std::env::var("MACHINE_ID")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| subcast_common::id::prefixed_ulid(subcast_common::id::prefix::NODE)),
            topic: std::env::var("SUBSCRIPTION_TOPIC")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_TOPIC.to_string()),
            broker,
            delivery_timeout: millis_var("DELIVERY_TIMEOUT_MS", 10_000),
            keepalive_interval: millis_var("KEEPALIVE_INTERVAL_MS", 0),
        }
    }
}

fn required_var(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} env var is required"))
}

/// A millisecond duration where `0` means disabled.
fn millis_var(name: &str, default: u64) -> Option<Duration> {
    let ms = std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default);
    (ms > 0).then(|| Duration::from_millis(ms))
}
