mod common;

use common::{admin_app, service_app};

use axum::{
    body::Body,
    http::{self, header, Request, StatusCode},
};
use http_body_util::BodyExt;
use tower::ServiceExt;

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_ok() {
    let (app, _scratch) = admin_app();

    let request = Request::builder()
        .method(http::Method::GET)
        .uri("/api/v1/health")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");
}

#[tokio::test]
async fn list_packages_starts_empty() {
    let (app, _scratch) = admin_app();

    let request = Request::builder()
        .method(http::Method::GET)
        .uri("/api/v1/packages")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, serde_json::json!([]));
}

#[tokio::test]
async fn deploy_from_an_unreachable_source_fails_cleanly() {
    let (app, _scratch) = admin_app();

    let request = Request::builder()
        .method(http::Method::POST)
        .header(header::CONTENT_TYPE, "application/json")
        .uri("/api/v1/packages/deploy")
        .body(Body::from(
            serde_json::json!({ "source": "file:///does/not/exist.tar.gz" }).to_string(),
        ))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    // The loader surfaces a missing source as a parse/IO failure, never a panic.
    assert!(response.status().is_client_error() || response.status().is_server_error());
}

#[tokio::test]
async fn undeploy_of_an_unknown_service_is_not_found() {
    let (app, _scratch) = admin_app();

    let request = Request::builder()
        .method(http::Method::DELETE)
        .uri("/api/v1/packages/acme.Greeter.v1")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn connect_request_against_an_undeployed_service_is_not_found() {
    let app = service_app();

    let request = Request::builder()
        .method(http::Method::POST)
        .header(header::CONTENT_TYPE, "application/json")
        .uri("/connect/acme.Greeter/Greet")
        .body(Body::from("{}"))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn connect_path_without_a_method_is_rejected() {
    let app = service_app();

    let request = Request::builder()
        .method(http::Method::POST)
        .header(header::CONTENT_TYPE, "application/json")
        .uri("/connect/acme.Greeter")
        .body(Body::from("{}"))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn connect_rejects_an_unsupported_content_type() {
    let app = service_app();

    let request = Request::builder()
        .method(http::Method::POST)
        .header(header::CONTENT_TYPE, "text/plain")
        .uri("/connect/acme.Greeter/Greet")
        .body(Body::from("hello"))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn connect_rejects_oversized_bodies() {
    // The test gateway is built with a 10 MiB limit; this body exceeds it.
    let app = service_app();
    let oversized = vec![0u8; 11 * 1024 * 1024];

    let request = Request::builder()
        .method(http::Method::POST)
        .header(header::CONTENT_TYPE, "application/json")
        .uri("/connect/acme.Greeter/Greet")
        .body(Body::from(oversized))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn graphql_missing_namespace_is_a_bad_request() {
    let app = service_app();

    let request = Request::builder()
        .method(http::Method::POST)
        .header(header::CONTENT_TYPE, "application/json")
        .uri("/graphql")
        .body(Body::from(serde_json::json!({ "query": "{ __typename }" }).to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn graphql_unknown_namespace_is_not_found() {
    let app = service_app();

    let request = Request::builder()
        .method(http::Method::POST)
        .header(header::CONTENT_TYPE, "application/json")
        .uri("/graphql/acme")
        .body(Body::from(serde_json::json!({ "query": "{ __typename }" }).to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn graphql_playground_is_served_per_namespace() {
    let app = service_app();

    let request = Request::builder()
        .method(http::Method::GET)
        .uri("/graphql/acme")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
