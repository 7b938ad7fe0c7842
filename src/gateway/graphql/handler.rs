use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use async_graphql::dynamic::Schema;
use async_graphql_axum::GraphQLResponse;
use axum::extract::{Path, State};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::actor::ActorHandle;
use crate::error::Error;
use crate::gateway::graphql::schema_builder::{build_schema, MethodBinding};
use crate::package::schema::{EnumTypeSchema, ObjectTypeSchema, PackageSchema};

/// One service's contribution to a namespace's generated document; kept
/// around so the document can be rebuilt in full whenever a sibling service
/// is added or removed.
struct ServiceRegistration {
    types: Vec<ObjectTypeSchema>,
    enums: Vec<EnumTypeSchema>,
    methods: HashMap<String, MethodBinding>,
}

struct NamespaceState {
    schema: ArcSwap<Schema>,
    services: Mutex<HashMap<String, ServiceRegistration>>,
}

/// Per-namespace dynamically generated GraphQL schema. Each namespace's
/// document is rebuilt and atomically swapped whenever a service in it
/// changes; in-flight requests keep using the snapshot they loaded at the
/// start of the request.
pub struct GraphQlGateway {
    namespaces: Mutex<HashMap<String, Arc<NamespaceState>>>,
}

impl GraphQlGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(GraphQlGateway {
            namespaces: Mutex::new(HashMap::new()),
        })
    }

    pub fn router(self: &Arc<Self>) -> Router {
        Router::new()
            .route("/graphql/{namespace}", get(playground).post(execute))
            .route("/graphql", get(missing_namespace).post(missing_namespace))
            .with_state(self.clone())
    }

    /// Register (or replace) one service's contribution to `namespace` and
    /// rebuild the namespace's compiled document.
    pub fn update_service(
        &self,
        namespace: &str,
        service_name: &str,
        schema: &PackageSchema,
        actor: ActorHandle,
    ) -> anyhow::Result<()> {
        let namespace_state = self.namespace_state(namespace);

        let methods = schema
            .services
            .iter()
            .flat_map(|s| s.methods.iter())
            .map(|m| {
                (
                    m.name.clone(),
                    MethodBinding {
                        method: (m).into(),
                        actor: actor.clone(),
                    },
                )
            })
            .collect();

        {
            let mut services = namespace_state.services.lock().expect("graphql services mutex poisoned");
            services.insert(
                service_name.to_string(),
                ServiceRegistration {
                    types: schema.types.clone(),
                    enums: schema.enums.clone(),
                    methods,
                },
            );
        }

        self.rebuild(namespace, &namespace_state)?;
        info!(namespace, service = service_name, "graphql gateway registered service");
        Ok(())
    }

    pub fn remove_service(&self, namespace: &str, service_name: &str) -> anyhow::Result<()> {
        if let Some(namespace_state) = self.namespaces.lock().expect("graphql namespaces mutex poisoned").get(namespace) {
            namespace_state
                .services
                .lock()
                .expect("graphql services mutex poisoned")
                .remove(service_name);
            self.rebuild(namespace, namespace_state)?;
        }
        Ok(())
    }

    pub fn shutdown(&self) {
        self.namespaces.lock().expect("graphql namespaces mutex poisoned").clear();
    }

    fn namespace_state(&self, namespace: &str) -> Arc<NamespaceState> {
        let mut namespaces = self.namespaces.lock().expect("graphql namespaces mutex poisoned");
        namespaces
            .entry(namespace.to_string())
            .or_insert_with(|| {
                let empty = build_schema(&[], &[], &HashMap::new()).expect("empty schema always builds");
                Arc::new(NamespaceState {
                    schema: ArcSwap::new(Arc::new(empty)),
                    services: Mutex::new(HashMap::new()),
                })
            })
            .clone()
    }

    fn rebuild(&self, _namespace: &str, namespace_state: &NamespaceState) -> anyhow::Result<()> {
        let services = namespace_state.services.lock().expect("graphql services mutex poisoned");

        let mut types = Vec::new();
        let mut enums = Vec::new();
        let mut methods = HashMap::new();
        let mut seen_types = std::collections::HashSet::new();
        let mut seen_enums = std::collections::HashSet::new();

        for registration in services.values() {
            for t in &registration.types {
                if seen_types.insert(t.name.clone()) {
                    types.push(t.clone());
                }
            }
            for e in &registration.enums {
                if seen_enums.insert(e.name.clone()) {
                    enums.push(e.clone());
                }
            }
            methods.extend(registration.methods.clone());
        }

        let schema = build_schema(&types, &enums, &methods)?;
        namespace_state.schema.store(Arc::new(schema));
        Ok(())
    }
}

async fn playground(Path(namespace): Path<String>) -> Html<String> {
    Html(format!(
        r#"<!DOCTYPE html>
<html>
<head><title>OKRA GraphQL — {namespace}</title></head>
<body>
  <div id="sandbox" style="position:absolute;top:0;right:0;bottom:0;left:0"></div>
  <script src="https://embeddable-sandbox.cdn.apollographql.com/_latest/embeddable-sandbox.umd.production.min.js"></script>
  <script>
    new window.EmbeddedSandbox({{
      target: "#sandbox",
      initialEndpoint: window.location.pathname,
    }});
  </script>
</body>
</html>"#
    ))
}

#[derive(Deserialize)]
struct GraphQlBody {
    query: String,
    #[serde(default)]
    variables: Value,
    #[serde(default, rename = "operationName")]
    operation_name: Option<String>,
}

async fn execute(
    State(gateway): State<Arc<GraphQlGateway>>,
    Path(namespace): Path<String>,
    Json(body): Json<GraphQlBody>,
) -> Response {
    let namespace_state = {
        let namespaces = gateway.namespaces.lock().expect("graphql namespaces mutex poisoned");
        match namespaces.get(&namespace) {
            Some(s) => s.clone(),
            None => return not_found_response(&namespace),
        }
    };

    let schema = namespace_state.schema.load_full();

    let mut request = async_graphql::Request::new(body.query);
    if let Some(name) = body.operation_name {
        request = request.operation_name(name);
    }
    if let Value::Object(vars) = body.variables {
        request = request.variables(async_graphql::Variables::from_json(Value::Object(vars)));
    }

    // GraphQL convention: parse/validation errors still return 200 with
    // `errors` populated.
    let response = schema.execute(request).await;
    GraphQLResponse::from(response).into_response()
}

async fn missing_namespace() -> Response {
    let error = Error::Validation("namespace".to_string(), "graphql namespace is required in the path".to_string());
    (error.status_code(), Json(serde_json::json!({ "errors": [{"message": error.to_string()}] }))).into_response()
}

fn not_found_response(namespace: &str) -> Response {
    let error = Error::NotFound(format!("unknown graphql namespace {namespace}"));
    (error.status_code(), Json(serde_json::json!({ "errors": [{"message": error.to_string()}] }))).into_response()
}
