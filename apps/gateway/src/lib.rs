pub mod broker;
pub mod config;
pub mod error;
pub mod gateway;
pub mod graphql;
pub mod routes;

use std::sync::Arc;

use gateway::GatewayService;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<GatewayService>,
}
