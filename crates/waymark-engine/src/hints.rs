//! Hint Revelation Tracker.
//!
//! Revelation is append-only: a tier counts as revealed if at least one row
//! exists, so recording the same tier twice is harmless. Player-requested
//! and admin-pushed hints share one audit trail and one "already revealed"
//! state.

use tracing::instrument;
use uuid::Uuid;

use waymark_catalog::model::Catalog;
use waymark_core::activity::{ActivityKind, ActivityRow};
use waymark_core::clock::Clock;
use waymark_core::error::EngineError;
use waymark_core::ids::ChapterId;
use waymark_core::store::{HintOrigin, HintViewRow, ProgressStore};
use waymark_core::track::Track;

/// Records that a hint tier was shown and returns the updated set of
/// revealed tiers.
///
/// Player reveals are bounded by the step's configured hint list; admin
/// pushes are unconstrained (an admin may improvise a tier on the spot).
///
/// # Errors
///
/// Returns `EngineError::ChapterNotFound` for an unknown chapter and
/// `EngineError::Precondition` when a player requests a tier the step does
/// not have.
#[instrument(skip(catalog, store, clock))]
pub async fn reveal_hint(
    track: Track,
    chapter_id: &ChapterId,
    step_index: u32,
    tier: u32,
    origin: HintOrigin,
    catalog: &Catalog,
    store: &dyn ProgressStore,
    clock: &dyn Clock,
) -> Result<Vec<u32>, EngineError> {
    let chapter = catalog
        .chapter(chapter_id)
        .ok_or_else(|| EngineError::ChapterNotFound(chapter_id.clone()))?;

    if origin == HintOrigin::Player {
        let steps = chapter.ordered_steps();
        let step = steps.get(step_index as usize).ok_or_else(|| {
            EngineError::Precondition(format!(
                "chapter {chapter_id} has no step at index {step_index}"
            ))
        })?;
        #[allow(clippy::cast_possible_truncation)]
        let tier_count = step.hints().len() as u32;
        if tier >= tier_count {
            return Err(EngineError::Precondition(format!(
                "step {} has no hint tier {tier}",
                step.id
            )));
        }
    }

    let now = clock.now();
    store
        .insert_hint_view(&HintViewRow {
            id: Uuid::new_v4(),
            track,
            chapter_id: chapter_id.clone(),
            step_index,
            tier,
            origin,
            viewed_at: now,
        })
        .await?;
    store
        .append_activity(&ActivityRow::new(
            track,
            ActivityKind::HintRevealed,
            serde_json::json!({
                "chapter": chapter_id,
                "step_index": step_index,
                "tier": tier,
                "origin": origin.as_str(),
            }),
            now,
        ))
        .await?;

    store.list_hint_tiers(track, chapter_id, step_index).await
}

/// Returns the distinct revealed tiers for a step, ascending.
///
/// # Errors
///
/// Returns store errors.
pub async fn list_revealed_tiers(
    track: Track,
    chapter_id: &ChapterId,
    step_index: u32,
    store: &dyn ProgressStore,
) -> Result<Vec<u32>, EngineError> {
    store.list_hint_tiers(track, chapter_id, step_index).await
}
