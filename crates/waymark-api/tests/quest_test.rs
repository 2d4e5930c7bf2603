//! Integration tests for the player quest flow.

mod common;

use axum::http::StatusCode;
use waymark_core::store::MessageStatus;

#[tokio::test]
async fn test_full_chapter_round_trip() {
    let (app, store, delivery) = common::build_test_app();

    // Activate the gatehouse chapter through the admin surface.
    let (status, json) = common::post_json(
        common::build_app_at(store.clone(), delivery.clone(), common::fixed_now()),
        "/api/v1/admin/chapters/activate",
        &serde_json::json!({ "track": "live", "chapter": "gatehouse" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["state"], "active");

    // The player polls and sees the narrative step.
    let (status, json) = common::get_json(app, "/api/v1/quest/live").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["step_index"], 0);
    assert_eq!(json["component"], "narrative");
    assert_eq!(json["advance"], "auto");

    // Completing the narrative cascades both messaging steps and lands on
    // the riddle, with no further external call.
    let app = common::build_app_at(store.clone(), delivery.clone(), common::fixed_now());
    let (status, json) = common::post_json(
        app,
        "/api/v1/quest/live/advance",
        &serde_json::json!({ "chapter": "gatehouse", "step_index": 0 }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["step_index"], 3);
    assert_eq!(json["component"], "riddle");
    assert_eq!(delivery.sent_messages().len(), 2);

    // A hint request reveals tier 0.
    let app = common::build_app_at(store.clone(), delivery.clone(), common::fixed_now());
    let (status, json) = common::post_json(
        app,
        "/api/v1/quest/live/hints",
        &serde_json::json!({ "chapter": "gatehouse", "step_index": 3, "tier": 0 }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["revealed"], serde_json::json!([0]));

    // The revealed tier shows up on the next poll.
    let app = common::build_app_at(store.clone(), delivery.clone(), common::fixed_now());
    let (_, json) = common::get_json(app, "/api/v1/quest/live").await;
    assert_eq!(json["revealed_hints"], serde_json::json!([0]));

    // Solving the riddle completes the chapter and schedules the companion
    // chapter's delayed message.
    let app = common::build_app_at(store.clone(), delivery.clone(), common::fixed_now());
    let (status, json) = common::post_json(
        app,
        "/api/v1/quest/live/answer",
        &serde_json::json!({ "chapter": "gatehouse", "step_index": 3, "answer": "LANTERN" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["correct"], true);
    assert_eq!(json["state"]["state"], "waiting");

    let scheduled = store
        .message_rows()
        .into_iter()
        .find(|row| row.progress_key == "afterword-note")
        .expect("companion message should be scheduled");
    assert_eq!(scheduled.status, MessageStatus::Scheduled);
}

#[tokio::test]
async fn test_replayed_advance_is_idempotent_over_http() {
    let (_, store, delivery) = common::build_test_app();

    let app = common::build_app_at(store.clone(), delivery.clone(), common::fixed_now());
    common::post_json(
        app,
        "/api/v1/admin/chapters/activate",
        &serde_json::json!({ "track": "live", "chapter": "gatehouse" }),
    )
    .await;

    for _ in 0..2 {
        let app = common::build_app_at(store.clone(), delivery.clone(), common::fixed_now());
        let (status, json) = common::post_json(
            app,
            "/api/v1/quest/live/advance",
            &serde_json::json!({ "chapter": "gatehouse", "step_index": 0 }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["step_index"], 3);
    }

    // The double-submitted advance did not double-send.
    assert_eq!(delivery.sent_messages().len(), 2);
}

#[tokio::test]
async fn test_wrong_answer_leaves_the_riddle_current() {
    let (_, store, delivery) = common::build_test_app();

    let app = common::build_app_at(store.clone(), delivery.clone(), common::fixed_now());
    common::post_json(
        app,
        "/api/v1/admin/chapters/activate",
        &serde_json::json!({ "track": "live", "chapter": "gatehouse" }),
    )
    .await;
    let app = common::build_app_at(store.clone(), delivery.clone(), common::fixed_now());
    common::post_json(
        app,
        "/api/v1/quest/live/advance",
        &serde_json::json!({ "chapter": "gatehouse", "step_index": 0 }),
    )
    .await;

    let app = common::build_app_at(store.clone(), delivery.clone(), common::fixed_now());
    let (status, json) = common::post_json(
        app,
        "/api/v1/quest/live/answer",
        &serde_json::json!({ "chapter": "gatehouse", "step_index": 3, "answer": "torch" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["correct"], false);
    assert_eq!(json["state"]["step_index"], 3);
}

#[tokio::test]
async fn test_admin_trigger_step_waits_for_the_admin() {
    let (_, store, delivery) = common::build_test_app();

    let app = common::build_app_at(store.clone(), delivery.clone(), common::fixed_now());
    common::post_json(
        app,
        "/api/v1/admin/chapters/activate",
        &serde_json::json!({ "track": "live", "chapter": "vigil" }),
    )
    .await;
    let app = common::build_app_at(store.clone(), delivery.clone(), common::fixed_now());
    common::post_json(
        app,
        "/api/v1/quest/live/advance",
        &serde_json::json!({ "chapter": "vigil", "step_index": 0 }),
    )
    .await;

    // The wait step cannot be completed by the client; it polls.
    let app = common::build_app_at(store.clone(), delivery.clone(), common::fixed_now());
    let (_, json) = common::get_json(app, "/api/v1/quest/live").await;
    assert_eq!(json["component"], "await_signal");
    assert_eq!(json["advance"], "admin_trigger");

    // The admin completes it through the same advance operation.
    let app = common::build_app_at(store.clone(), delivery.clone(), common::fixed_now());
    let (status, json) = common::post_json(
        app,
        "/api/v1/quest/live/advance",
        &serde_json::json!({ "chapter": "vigil", "step_index": 1 }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["state"], "waiting");
}
