//! Admin console routes: chapter activation, direct message control, hint
//! pushes, and the audit trail.
//!
//! These are the manual-recovery levers for stuck `sent`/`failed` message
//! rows and the explicit activation action chapter progression depends on.

use axum::extract::{Path, Query, State};
use axum::{Json, Router, routing::get, routing::post};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use waymark_catalog::model::Step;
use waymark_core::activity::ActivityRow;
use waymark_core::error::EngineError;
use waymark_core::ids::{ChapterId, StepId};
use waymark_core::store::HintOrigin;
use waymark_core::track::Track;
use waymark_engine::{
    QuestState, activate_chapter, mark_delivered, resend, reveal_hint, schedule_step, send_step,
};

use crate::error::ApiError;
use crate::state::AppState;

/// Request body for POST /chapters/activate.
#[derive(Debug, Deserialize)]
pub struct ActivateRequest {
    /// Track to activate on.
    pub track: Track,
    /// The chapter to activate.
    pub chapter: ChapterId,
}

/// Request body for POST /messages/send.
#[derive(Debug, Deserialize)]
pub struct SendRequest {
    /// Track to send on.
    pub track: Track,
    /// The chapter the step belongs to.
    pub chapter: ChapterId,
    /// The messaging step to send.
    pub step: StepId,
}

/// Request body for POST /messages/schedule.
#[derive(Debug, Deserialize)]
pub struct ScheduleRequest {
    /// Track to schedule on.
    pub track: Track,
    /// The chapter the step belongs to.
    pub chapter: ChapterId,
    /// The messaging step to schedule.
    pub step: StepId,
    /// Delay in mornings (day boundaries at the configured time-of-day).
    pub delay_mornings: u32,
}

/// Request body for POST /messages/resend and /messages/delivered.
#[derive(Debug, Deserialize)]
pub struct MessageKeyRequest {
    /// Track the message belongs to.
    pub track: Track,
    /// The message's correlation key.
    pub progress_key: String,
}

/// Request body for POST /hints/push.
#[derive(Debug, Deserialize)]
pub struct PushHintRequest {
    /// Track to push on.
    pub track: Track,
    /// The chapter the step belongs to.
    pub chapter: ChapterId,
    /// The step index the hint belongs to.
    pub step_index: u32,
    /// The hint tier to push.
    pub tier: u32,
}

/// Query parameters for GET /activity/{track}.
#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    /// Maximum number of rows to return.
    #[serde(default = "default_activity_limit")]
    pub limit: u32,
}

const fn default_activity_limit() -> u32 {
    50
}

/// Response body for message commands.
#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
    /// Always `true`; the detail lives in the audit trail.
    pub accepted: bool,
}

/// Looks a step up by id and checks it belongs to the named chapter.
fn chapter_step<'a>(
    state: &'a AppState,
    chapter: &ChapterId,
    step: &StepId,
) -> Result<&'a Step, ApiError> {
    let (owning, found) = state
        .catalog
        .find_step(step)
        .ok_or_else(|| EngineError::StepNotFound(step.clone()))?;
    if &owning.id != chapter {
        return Err(ApiError::Engine(EngineError::Precondition(format!(
            "step {step} belongs to chapter {}, not {chapter}",
            owning.id
        ))));
    }
    Ok(found)
}

/// POST /chapters/activate
#[instrument(skip(state, request), fields(track = %request.track, chapter = %request.chapter))]
async fn activate(
    State(state): State<AppState>,
    Json(request): Json<ActivateRequest>,
) -> Result<Json<QuestState>, ApiError> {
    info!("handling chapter activation");
    let ctx = state.engine_ctx();
    let quest = activate_chapter(&ctx, request.track, &request.chapter).await?;
    Ok(Json(quest))
}

/// POST /messages/send
#[instrument(skip(state, request), fields(track = %request.track, step = %request.step))]
async fn send_message(
    State(state): State<AppState>,
    Json(request): Json<SendRequest>,
) -> Result<Json<AcceptedResponse>, ApiError> {
    let step = chapter_step(&state, &request.chapter, &request.step)?;
    send_step(
        request.track,
        &request.chapter,
        step,
        state.catalog.as_ref(),
        state.store.as_ref(),
        state.delivery.as_ref(),
        state.clock.as_ref(),
    )
    .await?;
    Ok(Json(AcceptedResponse { accepted: true }))
}

/// POST /messages/schedule
#[instrument(skip(state, request), fields(track = %request.track, step = %request.step))]
async fn schedule_message(
    State(state): State<AppState>,
    Json(request): Json<ScheduleRequest>,
) -> Result<Json<ScheduledResponse>, ApiError> {
    let step = chapter_step(&state, &request.chapter, &request.step)?;
    let due = schedule_step(
        request.track,
        &request.chapter,
        step,
        request.delay_mornings,
        state.store.as_ref(),
        state.clock.as_ref(),
        &state.policy,
    )
    .await?;
    Ok(Json(ScheduledResponse { due }))
}

/// Response body for POST /messages/schedule.
#[derive(Debug, Serialize)]
pub struct ScheduledResponse {
    /// The computed due time.
    pub due: chrono::DateTime<chrono::Utc>,
}

/// POST /messages/resend
#[instrument(skip(state, request), fields(track = %request.track, progress_key = %request.progress_key))]
async fn resend_message(
    State(state): State<AppState>,
    Json(request): Json<MessageKeyRequest>,
) -> Result<Json<AcceptedResponse>, ApiError> {
    resend(
        request.track,
        &request.progress_key,
        state.catalog.as_ref(),
        state.store.as_ref(),
        state.delivery.as_ref(),
        state.clock.as_ref(),
    )
    .await?;
    Ok(Json(AcceptedResponse { accepted: true }))
}

/// POST /messages/delivered
#[instrument(skip(state, request), fields(track = %request.track, progress_key = %request.progress_key))]
async fn confirm_delivered(
    State(state): State<AppState>,
    Json(request): Json<MessageKeyRequest>,
) -> Result<Json<AcceptedResponse>, ApiError> {
    mark_delivered(
        request.track,
        &request.progress_key,
        state.store.as_ref(),
        state.clock.as_ref(),
    )
    .await?;
    Ok(Json(AcceptedResponse { accepted: true }))
}

/// POST /hints/push
#[instrument(skip(state, request), fields(track = %request.track, chapter = %request.chapter))]
async fn push_hint(
    State(state): State<AppState>,
    Json(request): Json<PushHintRequest>,
) -> Result<Json<super::quest::RevealedResponse>, ApiError> {
    let revealed = reveal_hint(
        request.track,
        &request.chapter,
        request.step_index,
        request.tier,
        HintOrigin::Admin,
        state.catalog.as_ref(),
        state.store.as_ref(),
        state.clock.as_ref(),
    )
    .await?;
    Ok(Json(super::quest::RevealedResponse { revealed }))
}

/// GET /activity/{track}
#[instrument(skip(state))]
async fn activity(
    State(state): State<AppState>,
    Path(track): Path<Track>,
    Query(query): Query<ActivityQuery>,
) -> Result<Json<Vec<ActivityRow>>, ApiError> {
    let rows = state.store.list_activity(track, query.limit).await?;
    Ok(Json(rows))
}

/// Returns the router for the admin context.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/chapters/activate", post(activate))
        .route("/messages/send", post(send_message))
        .route("/messages/schedule", post(schedule_message))
        .route("/messages/resend", post(resend_message))
        .route("/messages/delivered", post(confirm_delivered))
        .route("/hints/push", post(push_hint))
        .route("/activity/{track}", get(activity))
}
