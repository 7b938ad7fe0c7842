use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use prost_reflect::DescriptorPool;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::actor::{ActorHandle, ServiceErrorDetail, ServiceRequest};
use crate::error::Error;
use crate::gateway::connect::content::{parse_content_type, ContentKind};
use crate::gateway::connect::marshal::{marshal, to_canonical_json, unmarshal};

struct MethodEntry {
    input: prost_reflect::MessageDescriptor,
    output: prost_reflect::MessageDescriptor,
}

struct ServiceEntry {
    methods: HashMap<String, MethodEntry>,
    actor: ActorHandle,
}

/// Dynamic ConnectRPC-style gateway: one route per `{package}.{Service}/{Method}`
/// is served by a single handler that looks the pair up in `services` at
/// request time, instead of generating static routes per descriptor.
pub struct ConnectGateway {
    services: RwLock<HashMap<String, ServiceEntry>>,
    max_body_bytes: usize,
    default_timeout: Duration,
}

impl ConnectGateway {
    pub fn new(max_body_bytes: usize, default_timeout: Duration) -> Arc<Self> {
        Arc::new(ConnectGateway {
            services: RwLock::new(HashMap::new()),
            max_body_bytes,
            default_timeout,
        })
    }

    pub fn router(self: &Arc<Self>) -> Router {
        Router::new()
            .route("/connect/{*rest}", post(handle_connect))
            .with_state(self.clone())
    }

    /// Build a file-descriptor registry from the `FileDescriptorSet`, locate
    /// the target service, and register a handler entry per method.
    pub async fn update_service(
        &self,
        service_name: &str,
        descriptor_pool: &DescriptorPool,
        actor: ActorHandle,
    ) -> Result<(), Error> {
        let service = descriptor_pool
            .services()
            .find(|s| s.full_name() == service_name || s.name() == service_name)
            .ok_or_else(|| Error::NotFound(format!("service {service_name} not found in descriptor set")))?;

        let mut methods = HashMap::new();
        for method in service.methods() {
            methods.insert(
                method.name().to_string(),
                MethodEntry {
                    input: method.input(),
                    output: method.output(),
                },
            );
        }

        let mut services = self.services.write().await;
        services.insert(service_name.to_string(), ServiceEntry { methods, actor });
        info!(service = service_name, "connect gateway registered service");
        Ok(())
    }

    pub async fn remove_service(&self, service_name: &str) {
        self.services.write().await.remove(service_name);
    }

    /// Discard every registered service; the handler returns 404 thereafter.
    pub async fn shutdown(&self) {
        self.services.write().await.clear();
    }
}

/// `/{package}.{Service}/{Method}`, after the `/connect` prefix axum already
/// stripped via the route pattern; also accepts the prefix still attached,
/// since callers may forward requests without mounting under `/connect`.
fn split_service_and_method(rest: &str) -> Option<(&str, &str)> {
    let rest = rest.strip_prefix("connect/").unwrap_or(rest);
    let rest = rest.trim_start_matches('/');
    let slash = rest.rfind('/')?;
    let (service, method) = rest.split_at(slash);
    let method = &method[1..];
    if service.is_empty() || method.is_empty() {
        return None;
    }
    Some((service, method))
}

async fn handle_connect(
    State(gateway): State<Arc<ConnectGateway>>,
    Path(rest): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match handle_connect_inner(gateway, &rest, &headers, body).await {
        Ok(response) => response,
        Err(e) => connect_error_response(&e),
    }
}

async fn handle_connect_inner(
    gateway: Arc<ConnectGateway>,
    rest: &str,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<Response, Error> {
    let (service_name, method_name) =
        split_service_and_method(rest).ok_or_else(|| Error::NotFound(format!("malformed connect path: {rest}")))?;

    if body.len() > gateway.max_body_bytes {
        return Err(Error::RequestTooLarge {
            limit: gateway.max_body_bytes,
        });
    }

    let request_content = match headers.get(axum::http::header::CONTENT_TYPE) {
        Some(v) if !body.is_empty() => parse_content_type(v.to_str().unwrap_or_default())?,
        Some(v) => parse_content_type(v.to_str().unwrap_or_default()).unwrap_or(ContentKind::Proto),
        None if body.is_empty() => ContentKind::Proto,
        None => return Err(Error::UnsupportedMedia("(missing)".to_string())),
    };

    let (input_descriptor, output_descriptor, actor) = {
        let services = gateway.services.read().await;
        let entry = services
            .get(service_name)
            .ok_or_else(|| Error::NotFound(format!("unknown service {service_name}")))?;
        let method = entry
            .methods
            .get(method_name)
            .ok_or_else(|| Error::NotFound(format!("unknown method {service_name}/{method_name}")))?;
        (method.input.clone(), method.output.clone(), entry.actor.clone())
    };

    let dynamic_request = unmarshal(&input_descriptor, &body, request_content)?;
    let canonical_input = to_canonical_json(&dynamic_request)?;

    let request = ServiceRequest::new(Uuid::new_v4().to_string(), method_name, canonical_input, gateway.default_timeout);
    let response = actor.ask(request).await?;

    if !response.success {
        let error = response
            .error
            .map(error_from_detail)
            .unwrap_or_else(|| Error::Internal("service actor returned an unlabeled failure".to_string()));
        return Err(error);
    }

    let dynamic_response = unmarshal(&output_descriptor, &response.output, ContentKind::Json)?;
    let response_content = if request_content == ContentKind::Json {
        ContentKind::Json
    } else {
        ContentKind::Proto
    };
    let marshaled = marshal(&dynamic_response, response_content)?;

    let mut http_response = Response::new(axum::body::Body::from(marshaled));
    http_response.headers_mut().insert(
        axum::http::header::CONTENT_TYPE,
        HeaderValue::from_static(response_content.mime()),
    );
    Ok(http_response)
}

/// Reconstruct the taxonomy `Error` an actor's failure detail came from, so
/// its HTTP status survives the mailbox round trip instead of collapsing
/// into a generic execution failure.
fn error_from_detail(detail: ServiceErrorDetail) -> Error {
    let field = detail.details.unwrap_or_default();
    match detail.code.as_str() {
        "VALIDATION_ERROR" => Error::Validation(field, detail.message),
        "PARSE_ERROR" => Error::Parse(detail.message),
        "UNSUPPORTED_MEDIA" => Error::UnsupportedMedia(detail.message),
        "TIMEOUT" => Error::Timeout,
        "NOT_FOUND" => Error::NotFound(detail.message),
        "EXECUTION_ERROR" => Error::Execution(detail.message),
        _ => Error::Internal(detail.message),
    }
}

fn connect_error_response(error: &Error) -> Response {
    warn!(kind = error.kind(), "connect request failed");
    let body = serde_json::json!({
        "code": error.kind(),
        "message": error.to_string(),
    });
    (error.status_code(), axum::Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_service_and_method() {
        assert_eq!(
            split_service_and_method("test.Service/greet"),
            Some(("test.Service", "greet"))
        );
        assert_eq!(
            split_service_and_method("connect/test.Service/greet"),
            Some(("test.Service", "greet"))
        );
    }

    #[test]
    fn rejects_paths_without_a_method() {
        assert_eq!(split_service_and_method("test.Service"), None);
        assert_eq!(split_service_and_method(""), None);
    }
}
