//! Quest State Resolver — derives "what should the player see right now"
//! from stored progress and the catalog.
//!
//! The current step index is recomputed from step progress rows on every
//! read. There is deliberately no stored cursor: two independent writers
//! (player, admin, sweep) converge on the same derived state instead of
//! drifting apart.

use tracing::instrument;

use waymark_catalog::model::{Catalog, Chapter, Step};
use waymark_core::error::EngineError;
use waymark_core::store::{ChapterProgressRow, ProgressStore, StepProgressRow};
use waymark_core::track::Track;

use crate::view::{ActiveStepView, QuestState};

/// Returns the index of the first step whose progress row is absent or
/// incomplete, or `None` when every step has a completed row.
pub(crate) fn current_step_index(steps: &[&Step], rows: &[StepProgressRow]) -> Option<usize> {
    steps.iter().position(|step| {
        !rows
            .iter()
            .any(|row| row.step_id == step.id && row.completed_at.is_some())
    })
}

/// Selects the chapter progress row the player-facing state derives from:
/// the oldest active non-companion chapter. Companion chapters run in the
/// background and never become the on-screen chapter.
fn select_active<'a>(
    catalog: &Catalog,
    active: &'a [ChapterProgressRow],
) -> Option<&'a ChapterProgressRow> {
    active.iter().find(|row| {
        catalog
            .chapter(&row.chapter_id)
            .is_some_and(|chapter| !chapter.is_companion())
    })
}

/// Resolves the quest state for a track.
///
/// # Errors
///
/// Returns `EngineError::StoreUnavailable` when the store cannot be read
/// (never silently treated as `Waiting`) and `EngineError::ChapterNotFound`
/// when a progress row references a chapter missing from the catalog.
#[instrument(skip(catalog, store))]
pub async fn resolve(
    track: Track,
    catalog: &Catalog,
    store: &dyn ProgressStore,
) -> Result<QuestState, EngineError> {
    let active = store.list_active_chapters(track).await?;
    let Some(progress) = select_active(catalog, &active) else {
        return Ok(QuestState::Waiting);
    };

    let chapter = catalog
        .chapter(&progress.chapter_id)
        .ok_or_else(|| EngineError::ChapterNotFound(progress.chapter_id.clone()))?;

    resolve_chapter(track, chapter, progress, store).await
}

/// Resolves the state of one specific active chapter.
pub(crate) async fn resolve_chapter(
    track: Track,
    chapter: &Chapter,
    progress: &ChapterProgressRow,
    store: &dyn ProgressStore,
) -> Result<QuestState, EngineError> {
    let steps = chapter.ordered_steps();
    let rows = store.list_step_progress(progress.id).await?;

    let Some(index) = current_step_index(&steps, &rows) else {
        return Ok(QuestState::ChapterComplete {
            chapter: chapter.id.clone(),
            chapter_name: chapter.name.clone(),
        });
    };

    #[allow(clippy::cast_possible_truncation)]
    let step_index = index as u32;
    let revealed = store
        .list_hint_tiers(track, &chapter.id, step_index)
        .await?;

    Ok(QuestState::Active(ActiveStepView::build(
        chapter, step_index, steps[index], revealed,
    )))
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    use waymark_core::ids::ChapterId;
    use waymark_core::store::ChapterProgressRow;
    use waymark_test_support::{FailingProgressStore, InMemoryProgressStore, sample_catalog};

    use super::*;
    use crate::view::StepPayload;

    fn chapter_row(track: Track, chapter: &str, hour: u32) -> ChapterProgressRow {
        ChapterProgressRow {
            id: Uuid::new_v4(),
            track,
            chapter_id: ChapterId::from(chapter),
            started_at: Utc.with_ymd_and_hms(2026, 1, 15, hour, 0, 0).unwrap(),
            completed_at: None,
        }
    }

    #[tokio::test]
    async fn test_resolve_reports_waiting_without_active_chapter() {
        // Arrange
        let catalog = sample_catalog();
        let store = InMemoryProgressStore::new();

        // Act
        let state = resolve(Track::Live, &catalog, &store).await.unwrap();

        // Assert
        assert!(matches!(state, QuestState::Waiting));
    }

    #[tokio::test]
    async fn test_resolve_returns_first_step_of_active_chapter() {
        // Arrange
        let catalog = sample_catalog();
        let store = InMemoryProgressStore::new();
        store
            .insert_chapter_progress(&chapter_row(Track::Live, "gatehouse", 10))
            .await
            .unwrap();

        // Act
        let state = resolve(Track::Live, &catalog, &store).await.unwrap();

        // Assert
        let QuestState::Active(view) = state else {
            panic!("expected Active, got {state:?}");
        };
        assert_eq!(view.chapter, ChapterId::from("gatehouse"));
        assert_eq!(view.step_index, 0);
        assert_eq!(view.component, "narrative");
        match view.payload {
            StepPayload::Narrative { body_html } => {
                assert!(body_html.contains("<strong>You</strong>"));
            }
            other => panic!("expected Narrative payload, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_current_index_skips_completed_steps() {
        // Arrange
        let catalog = sample_catalog();
        let store = InMemoryProgressStore::new();
        let row = chapter_row(Track::Live, "gatehouse", 10);
        store.insert_chapter_progress(&row).await.unwrap();
        let at = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        store
            .complete_step(row.id, &"gatehouse-intro".into(), at)
            .await
            .unwrap();
        store
            .complete_step(row.id, &"gatehouse-ping".into(), at)
            .await
            .unwrap();

        // Act
        let state = resolve(Track::Live, &catalog, &store).await.unwrap();

        // Assert
        let QuestState::Active(view) = state else {
            panic!("expected Active, got {state:?}");
        };
        assert_eq!(view.step_index, 2);
        assert_eq!(view.component, "message");
    }

    #[tokio::test]
    async fn test_resolve_flags_completion_without_mutating() {
        // Arrange
        let catalog = sample_catalog();
        let store = InMemoryProgressStore::new();
        let row = chapter_row(Track::Live, "vigil", 10);
        store.insert_chapter_progress(&row).await.unwrap();
        let at = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        store
            .complete_step(row.id, &"vigil-walk".into(), at)
            .await
            .unwrap();
        store
            .complete_step(row.id, &"vigil-wait".into(), at)
            .await
            .unwrap();

        // Act
        let state = resolve(Track::Live, &catalog, &store).await.unwrap();

        // Assert
        assert!(matches!(state, QuestState::ChapterComplete { .. }));
        // The resolver only flags; the chapter row is still active.
        assert!(store.chapter_rows()[0].completed_at.is_none());
    }

    #[tokio::test]
    async fn test_resolve_skips_companion_chapters() {
        // Arrange
        let catalog = sample_catalog();
        let store = InMemoryProgressStore::new();
        // Companion activated first, main chapter second.
        store
            .insert_chapter_progress(&chapter_row(Track::Live, "afterword", 9))
            .await
            .unwrap();
        store
            .insert_chapter_progress(&chapter_row(Track::Live, "vigil", 10))
            .await
            .unwrap();

        // Act
        let state = resolve(Track::Live, &catalog, &store).await.unwrap();

        // Assert
        let QuestState::Active(view) = state else {
            panic!("expected Active, got {state:?}");
        };
        assert_eq!(view.chapter, ChapterId::from("vigil"));
    }

    #[tokio::test]
    async fn test_resolve_keeps_store_failure_distinguishable_from_waiting() {
        // Arrange
        let catalog = sample_catalog();
        let store = FailingProgressStore;

        // Act
        let result = resolve(Track::Live, &catalog, &store).await;

        // Assert
        match result.unwrap_err() {
            EngineError::StoreUnavailable(_) => {}
            other => panic!("expected StoreUnavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_tracks_are_independent() {
        // Arrange
        let catalog = sample_catalog();
        let store = InMemoryProgressStore::new();
        store
            .insert_chapter_progress(&chapter_row(Track::Test, "gatehouse", 10))
            .await
            .unwrap();

        // Act
        let test_state = resolve(Track::Test, &catalog, &store).await.unwrap();
        let live_state = resolve(Track::Live, &catalog, &store).await.unwrap();

        // Assert
        assert!(matches!(test_state, QuestState::Active(_)));
        assert!(matches!(live_state, QuestState::Waiting));
    }
}
