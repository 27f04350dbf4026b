//! Shared router fixture backed by the in-memory stores.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response};
use botlist_api::{AppState, config::ApiConfig};
use botlist_core::audit::MemoryAuditSink;
use botlist_core::config::DispatcherConfig;
use botlist_core::ratelimit::{MemoryCounterStore, RateLimiter};
use botlist_core::store::MemoryStore;
use botlist_core::webhooks::Dispatcher;
use sqlx::postgres::PgPoolOptions;

pub struct TestApp {
    pub app: Router,
    pub store: Arc<MemoryStore>,
    pub audit: Arc<MemoryAuditSink>,
}

/// Router over fresh in-memory stores. The pool never connects; only
/// `/healthz` would touch it.
pub fn test_app() -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let audit = Arc::new(MemoryAuditSink::new());

    let mut config = ApiConfig::default();
    config.dispatcher = DispatcherConfig {
        allow_private_targets: true,
        ..DispatcherConfig::default()
    };

    let pool = PgPoolOptions::new()
        .acquire_timeout(Duration::from_millis(100))
        .connect_lazy("postgres://localhost:1/none")
        .expect("lazy pool");
    let limiter = RateLimiter::new(Arc::new(MemoryCounterStore::new()), config.rate_limit.clone());
    let dispatcher =
        Dispatcher::new(store.clone(), config.dispatcher.clone()).expect("dispatcher");

    let state = AppState::new(pool, store.clone(), limiter, dispatcher, audit.clone(), config);
    TestApp {
        app: botlist_api::router(state),
        store,
        audit,
    }
}

pub fn request(method: &str, uri: &str, token: Option<&str>, body: Option<serde_json::Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", token);
    }
    match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub async fn body_json(resp: Response<Body>) -> serde_json::Value {
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("parse JSON")
}
