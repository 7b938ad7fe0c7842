use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use okra_runtime::actor::ActorRegistry;
use okra_runtime::admin::AdminState;
use okra_runtime::gateway::{ConnectGateway, GraphQlGateway};
use tempfile::tempdir;
use wasmtime::Engine;

/// Service gateway router (Connect + GraphQL) with an empty actor registry —
/// exercises the "nothing deployed yet" paths every gateway must handle
/// before any `deploy` call ever lands.
pub(crate) fn service_app() -> Router {
    let connect = ConnectGateway::new(10 * 1024 * 1024, Duration::from_secs(5));
    let graphql = GraphQlGateway::new();

    Router::new().merge(connect.router()).merge(graphql.router())
}

/// Admin router against a fresh, empty registry and a scratch directory that
/// is removed when the returned guard drops.
pub(crate) fn admin_app() -> (Router, tempfile::TempDir) {
    let scratch = tempdir().unwrap();
    let registry = ActorRegistry::new(1, 2);
    let connect = ConnectGateway::new(10 * 1024 * 1024, Duration::from_secs(5));
    let graphql = GraphQlGateway::new();
    let engine = Arc::new(Engine::default());
    let admin = AdminState::new(registry, connect, graphql, engine, scratch.path().to_path_buf());

    (admin.router(), scratch)
}
