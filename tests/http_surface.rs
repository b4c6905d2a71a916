// tests/http_surface.rs
mod common;

use common::{build_service, test_config, FakeProber, StaticSource};
use hyper::{Body, Method, Request, StatusCode};
use proxy_pool::server::RequestHandler;
use serde_json::Value;
use std::sync::Arc;

async fn call(handler: &RequestHandler, method: Method, path: &str) -> (StatusCode, Value) {
    let req = Request::builder()
        .method(method)
        .uri(path)
        .body(Body::empty())
        .unwrap();
    let response = handler.handle(req).await;
    let status = response.status();
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn populated_handler() -> (RequestHandler, Arc<proxy_pool::service::PoolService>) {
    let source = Arc::new(StaticSource::new(&[
        "http://slow.example:80",
        "http://fast.example:80",
        "http://dead.example:80",
    ]));
    let prober = Arc::new(FakeProber::default());
    prober.alive("http://slow.example:80", 400);
    prober.alive("http://fast.example:80", 40);

    let service = build_service(test_config(), source, prober);
    (RequestHandler::new(service.clone()), service)
}

#[tokio::test]
async fn get_on_empty_pool_is_not_found() {
    let (handler, _service) = populated_handler();

    let (status, body) = call(&handler, Method::GET, "/get").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "No available proxies");

    let (status, body) = call(&handler, Method::GET, "/count").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 0);
}

#[tokio::test]
async fn serves_ranked_pool() {
    let (handler, service) = populated_handler();
    service.ingest_cycle().await;

    let (status, body) = call(&handler, Method::GET, "/get").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["proxy"], "http://fast.example:80");
    assert_eq!(body["latency_ms"], 40);

    let (_, body) = call(&handler, Method::GET, "/all").await;
    assert_eq!(
        body["proxies"],
        serde_json::json!(["http://fast.example:80", "http://slow.example:80"])
    );

    let (_, body) = call(&handler, Method::GET, "/count").await;
    assert_eq!(body["count"], 2);

    let (status, body) = call(&handler, Method::GET, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "running");
    assert_eq!(body["count"], 2);
    assert!(body["last_ingest"].is_string());
    assert!(body["last_revalidation"].is_null());
}

#[tokio::test]
async fn unknown_route_and_method() {
    let (handler, _service) = populated_handler();

    let (status, body) = call(&handler, Method::GET, "/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "Not Found");

    let (status, _) = call(&handler, Method::POST, "/get").await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}
