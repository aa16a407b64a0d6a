use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chat_api::config::Config;
use chat_api::db::kv::{KeyValueStore, MemoryKv};
use chat_api::delivery::DeliveryCoordinator;
use chat_api::dispatch::MessageDispatcher;
use chat_api::gateway::hub::Hub;
use chat_api::store::{ChatStore, PgStore};
use chat_api::AppState;
use chat_common::SnowflakeGenerator;

#[tokio::main]
async fn main() {
    // Load .env file (silently skip if missing — env vars may be set externally)
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

    // Connect to PostgreSQL.
    let db = chat_api::db::pool::connect(&config.database_url).await;
    let store: Arc<dyn ChatStore> = Arc::new(PgStore::new(db));

    // In-memory token store. Swap in Redis when sessions must survive restarts.
    let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryKv::new());

    let snowflake = Arc::new(SnowflakeGenerator::new(config.worker_id));

    // The hub's control loop owns the connection registry for the lifetime
    // of the process.
    let (hub, hub_handle) = Hub::new(store.clone());
    tokio::spawn(hub.run());

    let coordinator = Arc::new(DeliveryCoordinator::new(store.clone()));
    let dispatcher = MessageDispatcher::new(store.clone(), hub_handle.clone(), snowflake.clone());

    let state = AppState {
        store,
        kv,
        hub: hub_handle,
        coordinator,
        dispatcher,
        config: Arc::new(config),
        snowflake,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(chat_api::routes::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "chat-api listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app).await.expect("server error");
}
