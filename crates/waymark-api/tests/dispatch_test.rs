//! Integration tests for the periodic dispatch trigger.

mod common;

use axum::http::StatusCode;
use chrono::{TimeZone, Utc};
use waymark_core::store::MessageStatus;

#[tokio::test]
async fn test_sweep_promotes_due_messages_and_is_safe_to_repeat() {
    let (_, store, delivery) = common::build_test_app();

    // Schedule the afterword note two mornings out.
    let app = common::build_app_at(store.clone(), delivery.clone(), common::fixed_now());
    let (status, json) = common::post_json(
        app,
        "/api/v1/admin/messages/schedule",
        &serde_json::json!({
            "track": "live",
            "chapter": "afterword",
            "step": "afterword-note",
            "delay_mornings": 2,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["due"], "2026-01-17T08:00:00Z");

    // A sweep before the due time leaves the row scheduled.
    let before = Utc.with_ymd_and_hms(2026, 1, 17, 7, 59, 0).unwrap();
    let app = common::build_app_at(store.clone(), delivery.clone(), before);
    let (status, json) = common::post_with_header(
        app,
        "/api/v1/dispatch/sweep",
        ("x-dispatch-secret", common::DISPATCH_SECRET),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["dispatched"], 0);
    assert_eq!(store.message_rows()[0].status, MessageStatus::Scheduled);

    // A sweep after the due time dispatches it.
    let after = Utc.with_ymd_and_hms(2026, 1, 17, 8, 0, 30).unwrap();
    let app = common::build_app_at(store.clone(), delivery.clone(), after);
    let (status, json) = common::post_with_header(
        app,
        "/api/v1/dispatch/sweep",
        ("x-dispatch-secret", common::DISPATCH_SECRET),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["dispatched"], 1);
    assert_eq!(store.message_rows()[0].status, MessageStatus::Sent);
    assert_eq!(delivery.sent_messages().len(), 1);

    // A redundant sweep finds nothing; the send happened exactly once.
    let app = common::build_app_at(store.clone(), delivery.clone(), after);
    let (status, json) = common::post_with_header(
        app,
        "/api/v1/dispatch/sweep",
        ("x-dispatch-secret", common::DISPATCH_SECRET),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["dispatched"], 0);
    assert_eq!(delivery.sent_messages().len(), 1);
}

#[tokio::test]
async fn test_sweep_rejects_a_bad_secret() {
    let (app, _, _) = common::build_test_app();
    let (status, json) = common::post_with_header(
        app,
        "/api/v1/dispatch/sweep",
        ("x-dispatch-secret", "guess"),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"], "unauthorized");
}
