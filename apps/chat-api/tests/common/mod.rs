use std::net::SocketAddr;
use std::sync::Arc;

use chat_api::config::Config;
use chat_api::db::kv::{KeyValueStore, MemoryKv};
use chat_api::delivery::DeliveryCoordinator;
use chat_api::dispatch::MessageDispatcher;
use chat_api::gateway::hub::Hub;
use chat_api::store::{ChatStore, MemoryStore};
use chat_api::AppState;
use chat_common::SnowflakeGenerator;

/// Build an `AppState` backed entirely by in-memory stores. No Postgres.
pub async fn test_state() -> AppState {
    let store: Arc<dyn ChatStore> = Arc::new(MemoryStore::new());
    let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryKv::new());
    let snowflake = Arc::new(SnowflakeGenerator::new(0));

    let (hub, hub_handle) = Hub::new(store.clone());
    tokio::spawn(hub.run());

    let coordinator = Arc::new(DeliveryCoordinator::new(store.clone()));
    let dispatcher = MessageDispatcher::new(store.clone(), hub_handle.clone(), snowflake.clone());

    AppState {
        store,
        kv,
        hub: hub_handle,
        coordinator,
        dispatcher,
        config: Arc::new(Config {
            database_url: String::new(),
            port: 0,
            worker_id: 0,
        }),
        snowflake,
    }
}

/// Start the full router on an ephemeral port. The server runs in the
/// background; returns the bound address and the shared state.
pub async fn start_server() -> (SocketAddr, AppState) {
    let state = test_state().await;
    let app = chat_api::routes::router().with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, state)
}

/// Sign a user up over HTTP; returns (bearer token, user id).
pub async fn signup(addr: SocketAddr, username: &str) -> (String, String) {
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("http://{addr}/auth/signup"))
        .json(&serde_json::json!({
            "username": username,
            "email": format!("{username}@example.com"),
            "password": "correct horse battery staple",
        }))
        .send()
        .await
        .expect("signup request");

    assert_eq!(resp.status(), 201, "signup should succeed");
    let body: serde_json::Value = resp.json().await.expect("signup body");

    (
        body["token"].as_str().expect("token present").to_string(),
        body["user"]["id"].as_str().expect("user id present").to_string(),
    )
}
