pub mod actor;
pub mod admin;
pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;
pub mod package;
mod server;
pub mod tracing;
pub mod worker;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use wasmtime::Engine;

use crate::actor::ActorRegistry;
use crate::admin::AdminState;
use crate::config::Config;
use crate::gateway::{ConnectGateway, GraphQlGateway};

/// Wires the actor runtime, both gateways, and the admin surface, then
/// serves until a shutdown signal arrives.
pub async fn run(config: Config) -> Result<()> {
    tokio::fs::create_dir_all(&config.packages_dir).await?;

    let engine = Arc::new(Engine::default());
    let registry = ActorRegistry::new(config.worker_pool_min, config.worker_pool_max);
    let connect = ConnectGateway::new(
        config.connect_max_body_bytes,
        Duration::from_secs(config.gateway_default_timeout_secs),
    );
    let graphql = GraphQlGateway::new();
    let admin = AdminState::new(
        registry.clone(),
        connect.clone(),
        graphql.clone(),
        engine.clone(),
        config.packages_dir.clone(),
    );

    server::run(&config, registry, connect, graphql, admin).await
}
