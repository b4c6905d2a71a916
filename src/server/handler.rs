// src/server/handler.rs
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Body, Method, Request, Response, StatusCode};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use tower::Service;

use crate::service::PoolService;

/// Read-only HTTP surface over the live pool.
#[derive(Clone)]
pub struct RequestHandler {
    service: Arc<PoolService>,
}

impl RequestHandler {
    pub fn new(service: Arc<PoolService>) -> Self {
        Self { service }
    }

    pub async fn handle(&self, req: Request<Body>) -> Response<Body> {
        if req.method() != Method::GET {
            return json_response(
                StatusCode::METHOD_NOT_ALLOWED,
                json!({ "detail": "Method Not Allowed" }),
            );
        }

        match req.uri().path() {
            "/get" => match self.service.best_proxy().await {
                Some(entry) => json_response(
                    StatusCode::OK,
                    json!({ "proxy": entry.address, "latency_ms": entry.latency_ms }),
                ),
                None => json_response(
                    StatusCode::NOT_FOUND,
                    json!({ "detail": "No available proxies" }),
                ),
            },
            "/all" => json_response(
                StatusCode::OK,
                json!({ "proxies": self.service.all_proxies().await }),
            ),
            "/count" => json_response(
                StatusCode::OK,
                json!({ "count": self.service.count().await }),
            ),
            "/" => {
                let status = self.service.status().await;
                let body = serde_json::to_value(&status)
                    .unwrap_or_else(|_| json!({ "status": status.status }));
                json_response(StatusCode::OK, body)
            }
            _ => json_response(StatusCode::NOT_FOUND, json!({ "detail": "Not Found" })),
        }
    }
}

fn json_response(status: StatusCode, body: Value) -> Response<Body> {
    let mut response = Response::new(Body::from(body.to_string()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

impl Service<Request<Body>> for RequestHandler {
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = futures::future::BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let handler = self.clone();
        Box::pin(async move {
            tracing::debug!(method = %req.method(), path = %req.uri().path(), "request");
            Ok(handler.handle(req).await)
        })
    }
}
