//! Periodic dispatch trigger.
//!
//! An external scheduler POSTs here on a fixed interval. The endpoint is
//! idempotent and safe to invoke more often than necessary: the sweep's
//! status filter guarantees a row is only dispatched once even under
//! overlapping triggers.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::{Json, Router, routing::post};
use sha2::{Digest, Sha256};
use tracing::{info, instrument};

use waymark_engine::{SweepOutcome, sweep_due_messages};

use crate::error::ApiError;
use crate::state::AppState;

/// Header carrying the shared secret.
pub const DISPATCH_SECRET_HEADER: &str = "x-dispatch-secret";

/// Compares two secrets by SHA-256 digest so the comparison does not leak
/// a matching prefix length.
fn secrets_match(provided: &str, expected: &str) -> bool {
    Sha256::digest(provided.as_bytes()) == Sha256::digest(expected.as_bytes())
}

/// POST /sweep
#[instrument(skip(state, headers))]
async fn sweep(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<SweepOutcome>, ApiError> {
    let provided = headers
        .get(DISPATCH_SECRET_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;
    if !secrets_match(provided, &state.dispatch_secret) {
        return Err(ApiError::Unauthorized);
    }

    let outcome = sweep_due_messages(
        state.catalog.as_ref(),
        state.store.as_ref(),
        state.delivery.as_ref(),
        state.clock.as_ref(),
    )
    .await?;

    info!(
        dispatched = outcome.dispatched,
        failed = outcome.failed,
        skipped = outcome.skipped,
        "sweep finished"
    );
    Ok(Json(outcome))
}

/// Returns the router for the dispatch trigger.
pub fn router() -> Router<AppState> {
    Router::new().route("/sweep", post(sweep))
}
