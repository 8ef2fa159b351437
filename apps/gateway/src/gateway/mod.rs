//! GraphQL subscription gateway over the `graphql-ws` websocket protocol.

pub mod distribution;
pub mod distributor;
pub mod events;
pub mod fanout;
pub mod handler;
pub mod identity;
pub mod registry;
pub mod server;
pub mod service;
pub mod session;
pub mod sink;
pub mod subscription;
pub mod tree;

pub use distribution::{Condition, Distribution, Filter, FilterValue};
pub use fanout::Emitter;
pub use handler::Authorizer;
pub use service::{ConnectionHooks, GatewayService};
