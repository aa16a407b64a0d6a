pub mod auth;
pub mod config;
pub mod db;
pub mod delivery;
pub mod dispatch;
pub mod error;
pub mod gateway;
pub mod models;
pub mod routes;
pub mod store;

use std::sync::Arc;

use chat_common::SnowflakeGenerator;
use config::Config;
use db::kv::KeyValueStore;
use delivery::DeliveryCoordinator;
use dispatch::MessageDispatcher;
use gateway::hub::HubHandle;
use store::ChatStore;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ChatStore>,
    pub kv: Arc<dyn KeyValueStore>,
    pub hub: HubHandle,
    pub coordinator: Arc<DeliveryCoordinator>,
    pub dispatcher: MessageDispatcher,
    pub config: Arc<Config>,
    pub snowflake: Arc<SnowflakeGenerator>,
}
