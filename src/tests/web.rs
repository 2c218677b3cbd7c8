use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::config::Config;
use crate::semantic::{CategoryModel, EmbeddingProvider, Explorer, SimilarityEngine};
use crate::tests::stubs::{FailingProvider, OneHotProvider};
use crate::web::router;

fn app_with(provider: Arc<dyn EmbeddingProvider>) -> axum::Router {
    let explorer = Explorer::new(
        provider,
        SimilarityEngine::sequential(),
        Arc::new(CategoryModel::builtin()),
        &Config::default(),
    );
    router(Arc::new(explorer))
}

fn app() -> axum::Router {
    app_with(Arc::new(
        OneHotProvider::new()
            .with("rei", &[(0, 1.0)])
            .with("rainha", &[(0, 0.98), (1, 0.2)]),
    ))
}

async fn send(app: axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_search_route() {
    let (status, body) = send(app(), post("/api/search", json!({"word": "rei"}))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["query"], "rei");
    assert_eq!(body["generation"], 1);
    assert_eq!(body["stale"], false);
    assert_eq!(body["results"][0]["word"], "rainha");
    assert_eq!(body["results"][0]["category"], "realeza");
    assert!(body.get("graph").is_none());
}

#[tokio::test]
async fn test_search_with_graph() {
    let (status, body) = send(
        app(),
        post("/api/search", json!({"word": "rei", "graph": true})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["graph"]["nodes"][0]["id"], "rei");
    assert_eq!(body["graph"]["nodes"][0]["level"], "central");
    assert_eq!(body["graph"]["edges"][0]["level"], "first");
}

#[tokio::test]
async fn test_compute_route_rejects_malformed() {
    let (status, body) = send(app(), post("/api/compute", json!({"expression": "rei"}))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("malformed"));
}

#[tokio::test]
async fn test_empty_word_is_bad_request() {
    let (status, _) = send(app(), post("/api/search", json!({"word": "  "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_provider_failure_is_unavailable() {
    let app = app_with(Arc::new(FailingProvider::new(8, &["rei"])));
    let (status, body) = send(app, post("/api/search", json!({"word": "rei"}))).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].as_str().unwrap().contains("rei"));
}

#[tokio::test]
async fn test_latest_and_status() {
    let app = app();

    let (_, empty) = send(app.clone(), get("/api/latest")).await;
    assert!(empty.is_null());

    send(app.clone(), post("/api/search", json!({"word": "rei"}))).await;

    let (status, latest) = send(app.clone(), get("/api/latest")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(latest["query"], "rei");

    let (_, status_body) = send(app, get("/api/status")).await;
    assert_eq!(status_body["generation"], 1);
    assert_eq!(status_body["model"], "one-hot-stub");
    assert_eq!(status_body["compute"]["strategy"], "sequential");
    assert!(status_body["cached_words"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn test_categories_route() {
    let (status, body) = send(app(), get("/api/categories")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["categories"].as_array().unwrap().len(), 8);
    assert_eq!(body["categories"][0]["name"], "realeza");
}
