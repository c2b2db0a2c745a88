//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode};
use route_scope::security::HeaderRoleEvaluator;
use route_scope::{App, HttpServer, ServerConfig, Shutdown};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower::ServiceExt;

/// App checking roles from the `x-role` header.
pub fn secured_app(config: ServerConfig) -> App {
    App::with_access_evaluator(config, Arc::new(HeaderRoleEvaluator::default()))
}

pub fn request(method: Method, uri: &str) -> Request<Body> {
    Request::builder().method(method).uri(uri).body(Body::empty()).unwrap()
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

/// Send one request through the server's router in-process.
pub async fn send(server: &HttpServer, request: Request<Body>) -> TestResponse {
    let response = server.router().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    TestResponse {
        status,
        headers,
        body: String::from_utf8(body.to_vec()).unwrap(),
    }
}

/// Serve on an ephemeral port until the returned `Shutdown` fires.
pub async fn spawn(server: HttpServer) -> (SocketAddr, Shutdown) {
    let (addr, shutdown, _task) = spawn_with_task(server).await;
    (addr, shutdown)
}

/// Like [`spawn`], also returning the serving task so tests can wait for
/// the server to stop.
pub async fn spawn_with_task(server: HttpServer) -> (SocketAddr, Shutdown, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let signal = shutdown.subscribe();

    let task = tokio::spawn(async move {
        server.run(listener, signal).await.unwrap();
    });

    (addr, shutdown, task)
}

/// Ordered record of which handlers ran.
#[derive(Clone, Default)]
pub struct Trail(Arc<Mutex<Vec<String>>>);

impl Trail {
    pub fn push(&self, step: impl Into<String>) {
        self.0.lock().unwrap().push(step.into());
    }

    pub fn steps(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}
