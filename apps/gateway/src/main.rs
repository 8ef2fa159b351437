use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use subcast_gateway::broker::{LocalBroker, MessageBroker, RedisBroker};
use subcast_gateway::config::{BrokerKind, Config};
use subcast_gateway::gateway::GatewayService;
use subcast_gateway::graphql::{ResolveContext, SubscriptionSchema};
use subcast_gateway::AppState;

/// Payload published for `noteUpdated` events.
#[derive(Debug, Deserialize)]
struct Note {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
}

fn note_updated(ctx: &ResolveContext<'_>) -> Result<serde_json::Value, String> {
    let note: Note = serde_json::from_slice(ctx.payload).map_err(|e| format!("invalid note payload: {e}"))?;
    Ok(json!({
        "__typename": "Note",
        "id": note.id,
        "title": note.title,
        "content": note.content,
    }))
}

#[tokio::main]
async fn main() {
    // Load .env file (silently skip if missing; env vars may be set externally)
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;

    let broker: Arc<dyn MessageBroker> = match &config.broker {
        BrokerKind::Local => Arc::new(LocalBroker::new()),
        BrokerKind::Redis { url } => Arc::new(
            RedisBroker::connect(url)
                .await
                .expect("failed to connect to redis"),
        ),
    };

    let schema = SubscriptionSchema::new().field("noteUpdated", note_updated);

    let gateway = GatewayService::builder(Arc::new(schema), broker)
        .machine_id(config.machine_id.clone())
        .topic(config.topic.clone())
        .delivery_timeout(config.delivery_timeout)
        .keepalive(config.keepalive_interval)
        .build();
    gateway.start().await.expect("failed to start cluster fan-out");

    tracing::info!(
        machine_id = %config.machine_id,
        topic = %config.topic,
        broker = config.broker.name(),
        "subcast-gateway configured"
    );

    let gateway = Arc::new(gateway);
    let state = AppState {
        gateway: gateway.clone(),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(subcast_gateway::routes::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "subcast-gateway listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    gateway.stop();
    gateway.registry().close_all().await;
    tracing::info!("subcast-gateway stopped");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(?e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
