//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{DateTime, TimeZone, Utc};
use http_body_util::BodyExt;
use tower::ServiceExt;

use waymark_api::routes;
use waymark_api::state::AppState;
use waymark_engine::SchedulePolicy;
use waymark_test_support::{
    FixedClock, InMemoryProgressStore, RecordingDeliveryChannel, sample_catalog,
};

/// Shared secret every test app is built with.
pub const DISPATCH_SECRET: &str = "it-is-time";

/// Fixed timestamp used across all integration tests.
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()
}

/// Builds the full app router over the given store/channel at the given
/// instant. Uses the same route structure as `main.rs`.
pub fn build_app_at(
    store: Arc<InMemoryProgressStore>,
    delivery: Arc<RecordingDeliveryChannel>,
    now: DateTime<Utc>,
) -> Router {
    let app_state = AppState::new(
        Arc::new(sample_catalog()),
        store,
        delivery,
        Arc::new(FixedClock(now)),
        SchedulePolicy::default(),
        DISPATCH_SECRET.to_owned(),
    );

    Router::new()
        .merge(routes::health::router())
        .nest("/api/v1/quest", routes::quest::router())
        .nest("/api/v1/admin", routes::admin::router())
        .nest("/api/v1/dispatch", routes::dispatch::router())
        .with_state(app_state)
}

/// Builds a fresh app plus handles on its store and delivery channel.
pub fn build_test_app() -> (
    Router,
    Arc<InMemoryProgressStore>,
    Arc<RecordingDeliveryChannel>,
) {
    let store = Arc::new(InMemoryProgressStore::new());
    let delivery = Arc::new(RecordingDeliveryChannel::new());
    let app = build_app_at(store.clone(), delivery.clone(), fixed_now());
    (app, store, delivery)
}

/// Send a POST request with a JSON body and return the response.
pub async fn post_json(
    app: Router,
    uri: &str,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, json)
}

/// Send a POST request with a header and no body and return the response.
pub async fn post_with_header(
    app: Router,
    uri: &str,
    header: (&str, &str),
) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header.0, header.1)
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, json)
}

/// Send a GET request and return the response.
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, json)
}
