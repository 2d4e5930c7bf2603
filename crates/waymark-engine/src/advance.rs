//! Advancement & Cascade Controller.
//!
//! Completing a step walks forward through consecutive messaging steps,
//! dispatching each one, then re-checks chapter completion. The walk is a
//! bounded loop over the ordered step list, never true recursion, and every
//! mutation is idempotent: replaying an advance after a partial failure is
//! safe.

use serde::Serialize;
use tracing::{instrument, warn};
use uuid::Uuid;

use waymark_catalog::model::{Catalog, Chapter, Step, StepConfig};
use waymark_core::activity::{ActivityKind, ActivityRow};
use waymark_core::clock::Clock;
use waymark_core::delivery::DeliveryChannel;
use waymark_core::error::EngineError;
use waymark_core::ids::ChapterId;
use waymark_core::store::{ChapterProgressRow, ProgressStore};
use waymark_core::track::Track;

use crate::messaging::{SchedulePolicy, schedule_step, send_step};
use crate::resolver::{current_step_index, resolve, resolve_chapter};
use crate::view::QuestState;

/// Borrowed collaborators of the cascade controller. The cascade touches
/// every collaborator (catalog, store, channel, clock, schedule policy), so
/// they travel together.
pub struct EngineContext<'a> {
    /// The validated, process-lifetime catalog.
    pub catalog: &'a Catalog,
    /// The shared progress store.
    pub store: &'a dyn ProgressStore,
    /// The outbound delivery channel.
    pub delivery: &'a dyn DeliveryChannel,
    /// Time source.
    pub clock: &'a dyn Clock,
    /// Morning-delay policy for scheduled messaging steps.
    pub policy: &'a SchedulePolicy,
}

/// Result of a riddle answer submission.
#[derive(Debug, Serialize)]
pub struct AnswerOutcome {
    /// Whether the submitted answer matched.
    pub correct: bool,
    /// The freshly resolved quest state after the submission.
    pub state: QuestState,
}

async fn append_step_advanced(
    ctx: &EngineContext<'_>,
    track: Track,
    chapter: &Chapter,
    step: &Step,
    step_index: usize,
    auto: bool,
) -> Result<(), EngineError> {
    ctx.store
        .append_activity(&ActivityRow::new(
            track,
            ActivityKind::StepAdvanced,
            serde_json::json!({
                "chapter": chapter.id,
                "step": step.id,
                "step_index": step_index,
                "auto": auto,
            }),
            ctx.clock.now(),
        ))
        .await
}

/// Dispatches one cascade messaging step: an immediate send, or a schedule
/// when the step configures a morning delay. Delivery and configuration
/// failures are audited by the dispatcher and must not stall the quest;
/// only store failures propagate.
async fn dispatch_cascade_step(
    ctx: &EngineContext<'_>,
    track: Track,
    chapter: &Chapter,
    step: &Step,
) -> Result<(), EngineError> {
    let delay = match &step.config {
        StepConfig::Message { delay_mornings, .. } => *delay_mornings,
        _ => None,
    };

    let result = if let Some(mornings) = delay {
        schedule_step(
            track,
            &chapter.id,
            step,
            mornings,
            ctx.store,
            ctx.clock,
            ctx.policy,
        )
        .await
        .map(|_| ())
    } else {
        send_step(
            track,
            &chapter.id,
            step,
            ctx.catalog,
            ctx.store,
            ctx.delivery,
            ctx.clock,
        )
        .await
    };

    match result {
        Ok(()) => Ok(()),
        Err(err @ EngineError::StoreUnavailable(_)) => Err(err),
        Err(err) => {
            warn!(step = %step.id, error = %err, "cascade dispatch failed; step stays completed");
            Ok(())
        }
    }
}

/// Completes consecutive messaging steps starting at `start`, dispatching
/// each, and returns the index of the first step the cascade did not handle.
async fn run_messaging_cascade(
    ctx: &EngineContext<'_>,
    track: Track,
    chapter: &Chapter,
    progress_id: Uuid,
    steps: &[&Step],
    start: usize,
) -> Result<usize, EngineError> {
    let mut index = start;
    while index < steps.len() && steps[index].is_messaging() {
        let step = steps[index];
        ctx.store
            .complete_step(progress_id, &step.id, ctx.clock.now())
            .await?;
        append_step_advanced(ctx, track, chapter, step, index, true).await?;
        dispatch_cascade_step(ctx, track, chapter, step).await?;
        index += 1;
    }
    Ok(index)
}

async fn all_steps_complete(
    ctx: &EngineContext<'_>,
    chapter: &Chapter,
    progress_id: Uuid,
) -> Result<bool, EngineError> {
    let steps = chapter.ordered_steps();
    let rows = ctx.store.list_step_progress(progress_id).await?;
    Ok(current_step_index(&steps, &rows).is_none())
}

/// Completes the chapter if every step has a completed row, then activates
/// companion chapters. Activation of an all-messaging companion completes it
/// immediately, which may trigger further companions; handled iteratively
/// with a worklist, bounded by the chapter count.
async fn finish_chapter_if_complete(
    ctx: &EngineContext<'_>,
    track: Track,
    chapter: &Chapter,
    progress_id: Uuid,
) -> Result<(), EngineError> {
    if !all_steps_complete(ctx, chapter, progress_id).await? {
        return Ok(());
    }
    // The guarded update makes completion single-shot under concurrent
    // advances; the loser also skips companion activation.
    if !ctx
        .store
        .complete_chapter(progress_id, ctx.clock.now())
        .await?
    {
        return Ok(());
    }
    ctx.store
        .append_activity(&ActivityRow::new(
            track,
            ActivityKind::ChapterCompleted,
            serde_json::json!({ "chapter": chapter.id }),
            ctx.clock.now(),
        ))
        .await?;

    let mut completed: Vec<&Chapter> = vec![chapter];
    while let Some(done) = completed.pop() {
        for companion in ctx.catalog.companions_of(&done.id) {
            if ctx
                .store
                .find_chapter_progress(track, &companion.id)
                .await?
                .is_some()
            {
                continue;
            }
            let row = ChapterProgressRow {
                id: Uuid::new_v4(),
                track,
                chapter_id: companion.id.clone(),
                started_at: ctx.clock.now(),
                completed_at: None,
            };
            ctx.store.insert_chapter_progress(&row).await?;
            ctx.store
                .append_activity(&ActivityRow::new(
                    track,
                    ActivityKind::ChapterActivated,
                    serde_json::json!({
                        "chapter": companion.id,
                        "triggered_by": done.id,
                    }),
                    ctx.clock.now(),
                ))
                .await?;

            let steps = companion.ordered_steps();
            let end = run_messaging_cascade(ctx, track, companion, row.id, &steps, 0).await?;
            if end == steps.len()
                && ctx.store.complete_chapter(row.id, ctx.clock.now()).await?
            {
                ctx.store
                    .append_activity(&ActivityRow::new(
                        track,
                        ActivityKind::ChapterCompleted,
                        serde_json::json!({ "chapter": companion.id }),
                        ctx.clock.now(),
                    ))
                    .await?;
                completed.push(companion);
            }
        }
    }
    Ok(())
}

/// Advances one step of an active chapter.
///
/// The supplied `step_index` must equal the currently derived index; a stale
/// or replayed call mutates nothing and simply returns the freshly resolved
/// state. After completing the step, the auto-advance cascade handles any
/// directly following messaging steps and the chapter-completion check runs.
///
/// # Errors
///
/// Returns `EngineError::ChapterNotFound` for an unknown chapter,
/// `EngineError::Precondition` when the chapter has no progress row on this
/// track, and store errors otherwise.
#[instrument(skip(ctx))]
pub async fn advance(
    ctx: &EngineContext<'_>,
    track: Track,
    chapter_id: &ChapterId,
    step_index: u32,
) -> Result<QuestState, EngineError> {
    let chapter = ctx
        .catalog
        .chapter(chapter_id)
        .ok_or_else(|| EngineError::ChapterNotFound(chapter_id.clone()))?;
    let Some(progress) = ctx.store.find_chapter_progress(track, chapter_id).await? else {
        return Err(EngineError::Precondition(format!(
            "chapter {chapter_id} is not active on the {track} track"
        )));
    };
    if progress.completed_at.is_some() {
        // Replay against a finished chapter: no-op.
        return resolve(track, ctx.catalog, ctx.store).await;
    }

    let steps = chapter.ordered_steps();
    let rows = ctx.store.list_step_progress(progress.id).await?;
    let Some(index) = current_step_index(&steps, &rows) else {
        // Every step is already complete; the resolver flagged this and we
        // are the caller that performs the completion.
        finish_chapter_if_complete(ctx, track, chapter, progress.id).await?;
        return resolve(track, ctx.catalog, ctx.store).await;
    };

    #[allow(clippy::cast_possible_truncation)]
    if index as u32 != step_index {
        // Stale or double-submitted index: no-op, return fresh state.
        return resolve(track, ctx.catalog, ctx.store).await;
    }

    let step = steps[index];
    ctx.store
        .complete_step(progress.id, &step.id, ctx.clock.now())
        .await?;
    append_step_advanced(ctx, track, chapter, step, index, false).await?;

    run_messaging_cascade(ctx, track, chapter, progress.id, &steps, index + 1).await?;
    finish_chapter_if_complete(ctx, track, chapter, progress.id).await?;

    resolve(track, ctx.catalog, ctx.store).await
}

/// Activates a chapter on a track (an explicit admin action).
///
/// Rejects a chapter that already has a progress row. A chapter that opens
/// with messaging steps fires them immediately through the same cascade the
/// controller uses after a completion.
///
/// # Errors
///
/// Returns `EngineError::ChapterNotFound` for an unknown chapter and
/// `EngineError::Precondition` when the chapter is already active or
/// completed on this track.
#[instrument(skip(ctx))]
pub async fn activate_chapter(
    ctx: &EngineContext<'_>,
    track: Track,
    chapter_id: &ChapterId,
) -> Result<QuestState, EngineError> {
    let chapter = ctx
        .catalog
        .chapter(chapter_id)
        .ok_or_else(|| EngineError::ChapterNotFound(chapter_id.clone()))?;
    if let Some(existing) = ctx.store.find_chapter_progress(track, chapter_id).await? {
        let what = if existing.completed_at.is_some() {
            "already completed"
        } else {
            "already active"
        };
        return Err(EngineError::Precondition(format!(
            "chapter {chapter_id} is {what} on the {track} track"
        )));
    }

    let row = ChapterProgressRow {
        id: Uuid::new_v4(),
        track,
        chapter_id: chapter_id.clone(),
        started_at: ctx.clock.now(),
        completed_at: None,
    };
    ctx.store.insert_chapter_progress(&row).await?;
    ctx.store
        .append_activity(&ActivityRow::new(
            track,
            ActivityKind::ChapterActivated,
            serde_json::json!({ "chapter": chapter_id }),
            ctx.clock.now(),
        ))
        .await?;

    let steps = chapter.ordered_steps();
    run_messaging_cascade(ctx, track, chapter, row.id, &steps, 0).await?;
    finish_chapter_if_complete(ctx, track, chapter, row.id).await?;

    resolve_chapter(track, chapter, &row, ctx.store).await
}

fn normalize_answer(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Checks a riddle answer for the current step; a correct answer advances.
///
/// # Errors
///
/// Returns `EngineError::Precondition` when the step is not a riddle or the
/// index is out of range, plus everything `advance` can return.
#[instrument(skip(ctx, answer))]
pub async fn submit_answer(
    ctx: &EngineContext<'_>,
    track: Track,
    chapter_id: &ChapterId,
    step_index: u32,
    answer: &str,
) -> Result<AnswerOutcome, EngineError> {
    let chapter = ctx
        .catalog
        .chapter(chapter_id)
        .ok_or_else(|| EngineError::ChapterNotFound(chapter_id.clone()))?;
    let steps = chapter.ordered_steps();
    let step = steps.get(step_index as usize).ok_or_else(|| {
        EngineError::Precondition(format!(
            "chapter {chapter_id} has no step at index {step_index}"
        ))
    })?;
    let StepConfig::Riddle {
        answer: expected, ..
    } = &step.config
    else {
        return Err(EngineError::Precondition(format!(
            "step {} is not a riddle",
            step.id
        )));
    };

    let correct = normalize_answer(answer) == normalize_answer(expected);
    ctx.store
        .append_activity(&ActivityRow::new(
            track,
            ActivityKind::AnswerSubmitted,
            serde_json::json!({
                "chapter": chapter_id,
                "step": step.id,
                "correct": correct,
            }),
            ctx.clock.now(),
        ))
        .await?;

    let state = if correct {
        advance(ctx, track, chapter_id, step_index).await?
    } else {
        resolve(track, ctx.catalog, ctx.store).await?
    };
    Ok(AnswerOutcome { correct, state })
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use waymark_core::store::MessageStatus;
    use waymark_test_support::{
        FailingDeliveryChannel, FixedClock, InMemoryProgressStore, RecordingDeliveryChannel,
        sample_catalog,
    };

    use super::*;
    use crate::view::QuestState;

    fn fixed_clock() -> FixedClock {
        FixedClock(Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap())
    }

    struct Harness {
        catalog: Catalog,
        store: InMemoryProgressStore,
        delivery: RecordingDeliveryChannel,
        clock: FixedClock,
        policy: SchedulePolicy,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                catalog: sample_catalog(),
                store: InMemoryProgressStore::new(),
                delivery: RecordingDeliveryChannel::new(),
                clock: fixed_clock(),
                policy: SchedulePolicy::default(),
            }
        }

        fn ctx(&self) -> EngineContext<'_> {
            EngineContext {
                catalog: &self.catalog,
                store: &self.store,
                delivery: &self.delivery,
                clock: &self.clock,
                policy: &self.policy,
            }
        }
    }

    fn step_index_of(state: &QuestState) -> u32 {
        match state {
            QuestState::Active(view) => view.step_index,
            other => panic!("expected Active, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_activate_returns_first_step() {
        // Arrange
        let harness = Harness::new();

        // Act
        let state = activate_chapter(&harness.ctx(), Track::Live, &"gatehouse".into())
            .await
            .unwrap();

        // Assert
        assert_eq!(step_index_of(&state), 0);
        let kinds: Vec<ActivityKind> = harness
            .store
            .activity_rows()
            .iter()
            .map(|row| row.kind)
            .collect();
        assert!(kinds.contains(&ActivityKind::ChapterActivated));
    }

    #[tokio::test]
    async fn test_activate_twice_is_a_precondition_failure() {
        // Arrange
        let harness = Harness::new();
        activate_chapter(&harness.ctx(), Track::Live, &"gatehouse".into())
            .await
            .unwrap();

        // Act
        let result = activate_chapter(&harness.ctx(), Track::Live, &"gatehouse".into()).await;

        // Assert
        match result.unwrap_err() {
            EngineError::Precondition(message) => assert!(message.contains("already active")),
            other => panic!("expected Precondition, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_advance_cascades_through_consecutive_messaging_steps() {
        // Arrange: gatehouse: narrative, message, message, riddle.
        let harness = Harness::new();
        activate_chapter(&harness.ctx(), Track::Live, &"gatehouse".into())
            .await
            .unwrap();

        // Act: complete the narrative.
        let state = advance(&harness.ctx(), Track::Live, &"gatehouse".into(), 0)
            .await
            .unwrap();

        // Assert: both messages fired, the riddle is current.
        assert_eq!(step_index_of(&state), 3);
        let sent = harness.delivery.sent_messages();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].recipient, "Liv Harrow");
        assert_eq!(sent[1].recipient, "Mara Stein");
        assert_eq!(sent[1].subject.as_deref(), Some("A word ahead"));

        let rows = harness.store.message_rows();
        assert!(rows.iter().all(|row| row.status == MessageStatus::Sent));
    }

    #[tokio::test]
    async fn test_advance_is_idempotent_under_replay() {
        // Arrange
        let harness = Harness::new();
        activate_chapter(&harness.ctx(), Track::Live, &"gatehouse".into())
            .await
            .unwrap();
        let first = advance(&harness.ctx(), Track::Live, &"gatehouse".into(), 0)
            .await
            .unwrap();

        // Act: the slow client re-submits the same index.
        let second = advance(&harness.ctx(), Track::Live, &"gatehouse".into(), 0)
            .await
            .unwrap();

        // Assert: same state, no duplicate sends.
        assert_eq!(step_index_of(&first), step_index_of(&second));
        assert_eq!(harness.delivery.sent_messages().len(), 2);
    }

    #[tokio::test]
    async fn test_advance_with_stale_index_is_a_noop() {
        // Arrange
        let harness = Harness::new();
        activate_chapter(&harness.ctx(), Track::Live, &"gatehouse".into())
            .await
            .unwrap();

        // Act: index 2 while the derived index is 0.
        let state = advance(&harness.ctx(), Track::Live, &"gatehouse".into(), 2)
            .await
            .unwrap();

        // Assert: nothing advanced, nothing sent.
        assert_eq!(step_index_of(&state), 0);
        assert!(harness.delivery.sent_messages().is_empty());
    }

    #[tokio::test]
    async fn test_delivery_failure_does_not_stall_the_quest() {
        // Arrange
        let catalog = sample_catalog();
        let store = InMemoryProgressStore::new();
        let delivery = FailingDeliveryChannel;
        let clock = fixed_clock();
        let policy = SchedulePolicy::default();
        let ctx = EngineContext {
            catalog: &catalog,
            store: &store,
            delivery: &delivery,
            clock: &clock,
            policy: &policy,
        };
        activate_chapter(&ctx, Track::Live, &"gatehouse".into())
            .await
            .unwrap();

        // Act
        let state = advance(&ctx, Track::Live, &"gatehouse".into(), 0)
            .await
            .unwrap();

        // Assert: the cascade still landed on the riddle; failures are in
        // the message rows and audit trail, not in the quest position.
        assert_eq!(step_index_of(&state), 3);
        let rows = store.message_rows();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|row| row.status == MessageStatus::Failed));
    }

    #[tokio::test]
    async fn test_completing_the_final_step_completes_the_chapter_once() {
        // Arrange
        let harness = Harness::new();
        activate_chapter(&harness.ctx(), Track::Live, &"vigil".into())
            .await
            .unwrap();
        advance(&harness.ctx(), Track::Live, &"vigil".into(), 0)
            .await
            .unwrap();

        // Act: complete the final step, twice.
        let state = advance(&harness.ctx(), Track::Live, &"vigil".into(), 1)
            .await
            .unwrap();
        advance(&harness.ctx(), Track::Live, &"vigil".into(), 1)
            .await
            .unwrap();

        // Assert
        assert!(matches!(state, QuestState::Waiting));
        let rows = harness.store.chapter_rows();
        let vigil = rows
            .iter()
            .find(|row| row.chapter_id == ChapterId::from("vigil"))
            .unwrap();
        assert_eq!(vigil.completed_at, Some(harness.clock.0));

        let completions = harness
            .store
            .activity_rows()
            .iter()
            .filter(|row| row.kind == ActivityKind::ChapterCompleted)
            .count();
        assert_eq!(completions, 1);
    }

    #[tokio::test]
    async fn test_chapter_completion_activates_companions() {
        // Arrange: gatehouse completion triggers the afterword companion,
        // whose single delayed message gets scheduled two mornings out.
        let harness = Harness::new();
        activate_chapter(&harness.ctx(), Track::Live, &"gatehouse".into())
            .await
            .unwrap();
        advance(&harness.ctx(), Track::Live, &"gatehouse".into(), 0)
            .await
            .unwrap();

        // Act: solve the riddle (final step).
        let outcome = submit_answer(
            &harness.ctx(),
            Track::Live,
            &"gatehouse".into(),
            3,
            " lantern ",
        )
        .await
        .unwrap();

        // Assert
        assert!(outcome.correct);
        let rows = harness.store.chapter_rows();
        let afterword = rows
            .iter()
            .find(|row| row.chapter_id == ChapterId::from("afterword"))
            .unwrap();
        // All-messaging companion completes immediately…
        assert!(afterword.completed_at.is_some());
        // …with its delayed message left scheduled for the sweep.
        let scheduled = harness
            .store
            .message_rows()
            .into_iter()
            .find(|row| row.progress_key == "afterword-note")
            .unwrap();
        assert_eq!(scheduled.status, MessageStatus::Scheduled);
        assert_eq!(
            scheduled.scheduled_at,
            Some(Utc.with_ymd_and_hms(2026, 1, 17, 8, 0, 0).unwrap())
        );
    }

    #[tokio::test]
    async fn test_wrong_answer_does_not_advance() {
        // Arrange
        let harness = Harness::new();
        activate_chapter(&harness.ctx(), Track::Live, &"gatehouse".into())
            .await
            .unwrap();
        advance(&harness.ctx(), Track::Live, &"gatehouse".into(), 0)
            .await
            .unwrap();

        // Act
        let outcome = submit_answer(
            &harness.ctx(),
            Track::Live,
            &"gatehouse".into(),
            3,
            "torch",
        )
        .await
        .unwrap();

        // Assert
        assert!(!outcome.correct);
        assert_eq!(step_index_of(&outcome.state), 3);
    }

    #[tokio::test]
    async fn test_advancing_an_inactive_chapter_is_a_precondition_failure() {
        // Arrange
        let harness = Harness::new();

        // Act
        let result = advance(&harness.ctx(), Track::Live, &"gatehouse".into(), 0).await;

        // Assert
        match result.unwrap_err() {
            EngineError::Precondition(message) => assert!(message.contains("not active")),
            other => panic!("expected Precondition, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_activating_a_messaging_first_chapter_fires_immediately() {
        // Arrange: afterword starts (and ends) with one delayed message.
        let harness = Harness::new();

        // Act: admins can activate a companion chapter directly.
        let state = activate_chapter(&harness.ctx(), Track::Live, &"afterword".into())
            .await
            .unwrap();

        // Assert: chapter ran to completion, message scheduled.
        assert!(matches!(state, QuestState::ChapterComplete { .. }));
        let rows = harness.store.message_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, MessageStatus::Scheduled);
    }
}
