//! Player-facing quest routes.
//!
//! Every handler recomputes state from the store; nothing is cached between
//! requests, so a poll always reflects mutations made by the admin console
//! or the dispatch sweep in the meantime.

use axum::extract::{Path, State};
use axum::{Json, Router, routing::get, routing::post};
use serde::Deserialize;
use tracing::{info, instrument};

use waymark_core::ids::ChapterId;
use waymark_core::store::HintOrigin;
use waymark_core::track::Track;
use waymark_engine::{
    AnswerOutcome, ProximityFeedback, QuestState, proximity_feedback, resolve, reveal_hint,
};
use waymark_geo::GeoPoint;

use crate::error::ApiError;
use crate::state::AppState;

/// Request body for POST /{track}/advance.
#[derive(Debug, Deserialize)]
pub struct AdvanceRequest {
    /// The chapter being advanced.
    pub chapter: ChapterId,
    /// The derived current index the client observed.
    pub step_index: u32,
}

/// Request body for POST /{track}/answer.
#[derive(Debug, Deserialize)]
pub struct AnswerRequest {
    /// The chapter being answered.
    pub chapter: ChapterId,
    /// The derived current index the client observed.
    pub step_index: u32,
    /// The submitted riddle answer.
    pub answer: String,
}

/// Request body for POST /{track}/hints.
#[derive(Debug, Deserialize)]
pub struct HintRequest {
    /// The chapter the hint belongs to.
    pub chapter: ChapterId,
    /// The step index the hint belongs to.
    pub step_index: u32,
    /// The requested hint tier.
    pub tier: u32,
}

/// Request body for POST /{track}/position.
#[derive(Debug, Deserialize)]
pub struct PositionRequest {
    /// The chapter of the proximity step.
    pub chapter: ChapterId,
    /// The step index of the proximity step.
    pub step_index: u32,
    /// Reported latitude.
    pub lat: f64,
    /// Reported longitude.
    pub lon: f64,
}

/// Response body for POST /{track}/hints.
#[derive(Debug, serde::Serialize)]
pub struct RevealedResponse {
    /// All revealed tiers for the step, ascending.
    pub revealed: Vec<u32>,
}

/// GET /{track}
#[instrument(skip(state))]
async fn quest_state(
    State(state): State<AppState>,
    Path(track): Path<Track>,
) -> Result<Json<QuestState>, ApiError> {
    let quest = resolve(track, state.catalog.as_ref(), state.store.as_ref()).await?;
    Ok(Json(quest))
}

/// POST /{track}/advance
#[instrument(skip(state, request), fields(chapter = %request.chapter, step_index = request.step_index))]
async fn advance_step(
    State(state): State<AppState>,
    Path(track): Path<Track>,
    Json(request): Json<AdvanceRequest>,
) -> Result<Json<QuestState>, ApiError> {
    info!("handling advance");
    let ctx = state.engine_ctx();
    let quest = waymark_engine::advance(&ctx, track, &request.chapter, request.step_index).await?;
    Ok(Json(quest))
}

/// POST /{track}/answer
#[instrument(skip(state, request), fields(chapter = %request.chapter, step_index = request.step_index))]
async fn answer_riddle(
    State(state): State<AppState>,
    Path(track): Path<Track>,
    Json(request): Json<AnswerRequest>,
) -> Result<Json<AnswerOutcome>, ApiError> {
    let ctx = state.engine_ctx();
    let outcome = waymark_engine::submit_answer(
        &ctx,
        track,
        &request.chapter,
        request.step_index,
        &request.answer,
    )
    .await?;
    Ok(Json(outcome))
}

/// POST /{track}/hints
#[instrument(skip(state, request), fields(chapter = %request.chapter, tier = request.tier))]
async fn request_hint(
    State(state): State<AppState>,
    Path(track): Path<Track>,
    Json(request): Json<HintRequest>,
) -> Result<Json<RevealedResponse>, ApiError> {
    let revealed = reveal_hint(
        track,
        &request.chapter,
        request.step_index,
        request.tier,
        HintOrigin::Player,
        state.catalog.as_ref(),
        state.store.as_ref(),
        state.clock.as_ref(),
    )
    .await?;
    Ok(Json(RevealedResponse { revealed }))
}

/// POST /{track}/position
#[instrument(skip(state, request), fields(chapter = %request.chapter))]
async fn check_position(
    State(state): State<AppState>,
    Path(_track): Path<Track>,
    Json(request): Json<PositionRequest>,
) -> Result<Json<ProximityFeedback>, ApiError> {
    let feedback = proximity_feedback(
        state.catalog.as_ref(),
        &request.chapter,
        request.step_index,
        GeoPoint {
            lat: request.lat,
            lon: request.lon,
        },
    )?;
    Ok(Json(feedback))
}

/// Returns the router for the quest context.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{track}", get(quest_state))
        .route("/{track}/advance", post(advance_step))
        .route("/{track}/answer", post(answer_riddle))
        .route("/{track}/hints", post(request_hint))
        .route("/{track}/position", post(check_position))
}
