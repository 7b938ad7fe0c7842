use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};
use wasmtime::Engine;

use crate::actor::ActorRegistry;
use crate::error::Error;
use crate::gateway::{ConnectGateway, GraphQlGateway};
use crate::package::loader::load_package;
use crate::package::ServiceId;

#[derive(Clone, Serialize)]
pub struct DeploymentRecord {
    pub id: String,
    pub source: String,
    pub timestamp: u64,
}

/// Ties the package loader to the actor runtime and both gateways: a
/// deployment touches all three, in a fixed order.
pub struct AdminState {
    registry: Arc<ActorRegistry>,
    connect: Arc<ConnectGateway>,
    graphql: Arc<GraphQlGateway>,
    engine: Arc<Engine>,
    scratch_dir: PathBuf,
    deployments: RwLock<HashMap<String, DeploymentRecord>>,
}

impl AdminState {
    pub fn new(
        registry: Arc<ActorRegistry>,
        connect: Arc<ConnectGateway>,
        graphql: Arc<GraphQlGateway>,
        engine: Arc<Engine>,
        scratch_dir: PathBuf,
    ) -> Arc<Self> {
        Arc::new(AdminState {
            registry,
            connect,
            graphql,
            engine,
            scratch_dir,
            deployments: RwLock::new(HashMap::new()),
        })
    }

    pub fn router(self: &Arc<Self>) -> Router {
        Router::new()
            .route("/api/v1/health", get(health))
            .route("/api/v1/packages/deploy", post(deploy))
            .route("/api/v1/packages", get(list_packages))
            .route("/api/v1/packages/{id}", delete(undeploy))
            .with_state(self.clone())
    }
}

async fn health(State(state): State<Arc<AdminState>>) -> Json<serde_json::Value> {
    let not_ready = state.registry.not_ready_services().await;
    if not_ready.is_empty() {
        Json(serde_json::json!({ "status": "ok" }))
    } else {
        let not_ready: Vec<String> = not_ready.iter().map(ToString::to_string).collect();
        Json(serde_json::json!({ "status": "degraded", "not_ready": not_ready }))
    }
}

struct DeployRequestWire {
    source: String,
    override_existing: bool,
}

// `override` is a reserved word in several client-generated bindings; the
// wire field is `override`, mapped onto `override_existing` here.
impl<'de> serde::de::Deserialize<'de> for DeployRequestWire {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::de::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            source: String,
            #[serde(default, rename = "override")]
            override_existing: bool,
        }
        let raw = Raw::deserialize(deserializer)?;
        Ok(DeployRequestWire {
            source: raw.source,
            override_existing: raw.override_existing,
        })
    }
}

async fn deploy(State(state): State<Arc<AdminState>>, Json(body): Json<DeployRequestWire>) -> Response {
    match deploy_inner(&state, body).await {
        Ok(record) => Json(record).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn deploy_inner(state: &Arc<AdminState>, body: DeployRequestWire) -> Result<DeploymentRecord, Error> {
    let package = load_package(&body.source, &state.scratch_dir, state.engine.clone())
        .await
        .map_err(|e| Error::Parse(e.to_string()))?;
    let service_id = package.service_id.clone();
    let service_name = package
        .service_name()
        .map_err(|e| Error::Internal(e.to_string()))?
        .to_string();
    let namespace = package.schema.namespace.clone();
    let schema = package.schema.clone();
    let descriptor_set = package.descriptor_set.clone();

    if body.override_existing && state.registry.is_deployed(&service_id).await {
        state.registry.undeploy(&service_id).await.ok();
        state.deployments.write().await.remove(&service_id.to_string());
    }

    let package = Arc::new(package);
    state.registry.deploy(package.clone()).await?;

    let actor = state
        .registry
        .get_actor_handle(&service_id)
        .await
        .ok_or_else(|| Error::Internal("deployed actor handle disappeared immediately after deploy".to_string()))?;

    let connect_key = format!("{}.{}", service_id.namespace, service_id.service_name);
    if let Some(descriptor_set) = &descriptor_set {
        if let Err(e) = state.connect.update_service(&connect_key, descriptor_set, actor.clone()).await {
            warn!(service_id = %service_id, error = %e, "connect gateway update failed during deploy");
        }
    }
    if let Err(e) = state.graphql.update_service(&namespace, &service_name, &schema, actor) {
        warn!(service_id = %service_id, error = %e, "graphql gateway update failed during deploy");
    }

    let record = DeploymentRecord {
        id: service_id.to_string(),
        source: body.source,
        timestamp: SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs(),
    };
    state.deployments.write().await.insert(record.id.clone(), record.clone());
    info!(service_id = %service_id, "package deployed");
    Ok(record)
}

async fn list_packages(State(state): State<Arc<AdminState>>) -> Json<Vec<DeploymentRecord>> {
    let deployments = state.deployments.read().await;
    Json(deployments.values().cloned().collect())
}

async fn undeploy(State(state): State<Arc<AdminState>>, Path(id): Path<String>) -> Response {
    let service_id = match parse_service_id(&id) {
        Some(s) => s,
        None => return error_response(&Error::Validation(id, "malformed service id".to_string())),
    };

    match state.registry.undeploy(&service_id).await {
        Ok(()) => {
            state.deployments.write().await.remove(&id);
            let connect_key = format!("{}.{}", service_id.namespace, service_id.service_name);
            state.connect.remove_service(&connect_key).await;
            state.graphql.remove_service(&service_id.namespace, &service_id.service_name).ok();
            info!(service_id = %service_id, "package undeployed");
            Json(serde_json::json!({ "status": "ok" })).into_response()
        }
        Err(e) => error_response(&e),
    }
}

fn parse_service_id(raw: &str) -> Option<ServiceId> {
    let mut from_end = raw.rsplitn(2, '.');
    let version = from_end.next()?;
    let rest = from_end.next()?;
    let mut from_start = rest.splitn(2, '.');
    let namespace = from_start.next()?;
    let service_name = from_start.next()?;
    Some(ServiceId::new(namespace, service_name, version))
}

fn error_response(error: &Error) -> Response {
    (error.status_code(), Json(serde_json::json!({ "code": error.kind(), "message": error.to_string() }))).into_response()
}
