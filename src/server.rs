use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::actor::ActorRegistry;
use crate::admin::AdminState;
use crate::config::Config;
use crate::gateway::{ConnectGateway, GraphQlGateway};

/// Binds the service port (Connect + GraphQL) and the admin port, serves
/// both until a shutdown signal arrives, then tears the runtime down in a
/// fixed order: stop accepting, drain, shut down gateways, shut down the
/// actor runtime.
pub async fn run(
    config: &Config,
    registry: Arc<ActorRegistry>,
    connect: Arc<ConnectGateway>,
    graphql: Arc<GraphQlGateway>,
    admin: Arc<AdminState>,
) -> Result<()> {
    let service_router = axum::Router::new()
        .merge(connect.router())
        .merge(graphql.router())
        .layer(TraceLayer::new_for_http());
    let admin_router = admin.router().layer(TraceLayer::new_for_http());

    let service_listener = TcpListener::bind(config.service_addr).await?;
    let admin_listener = TcpListener::bind(config.admin_addr).await?;

    info!(addr = %config.service_addr, "service gateway listening");
    info!(addr = %config.admin_addr, "admin surface listening");

    let service_server = axum::serve(service_listener, service_router).with_graceful_shutdown(shutdown_signal());
    let admin_server = axum::serve(admin_listener, admin_router).with_graceful_shutdown(shutdown_signal());

    let (service_result, admin_result) = tokio::join!(service_server, admin_server);
    service_result?;
    admin_result?;

    info!("gateways stopped accepting connections, shutting down runtime");
    connect.shutdown().await;
    graphql.shutdown();
    registry.shutdown().await?;
    info!("runtime shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
}
