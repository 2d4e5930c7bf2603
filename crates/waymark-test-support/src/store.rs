//! Test stores — mock `ProgressStore` implementations.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use waymark_core::activity::ActivityRow;
use waymark_core::error::EngineError;
use waymark_core::ids::{ChapterId, StepId};
use waymark_core::store::{
    ChapterProgressRow, HintViewRow, MessageProgressRow, MessageStatus, ProgressStore,
    StepProgressRow,
};
use waymark_core::track::Track;

#[derive(Debug, Default)]
struct Rows {
    chapters: Vec<ChapterProgressRow>,
    steps: Vec<StepProgressRow>,
    messages: Vec<MessageProgressRow>,
    hints: Vec<HintViewRow>,
    activity: Vec<ActivityRow>,
}

/// An in-memory `ProgressStore` with the same row semantics as the
/// PostgreSQL implementation: guarded transitions are single-row
/// compare-and-set updates under one lock.
#[derive(Debug, Default)]
pub struct InMemoryProgressStore {
    rows: Mutex<Rows>,
}

impl InMemoryProgressStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all message rows, for assertions.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn message_rows(&self) -> Vec<MessageProgressRow> {
        self.rows.lock().unwrap().messages.clone()
    }

    /// Snapshot of all activity rows, for assertions.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn activity_rows(&self) -> Vec<ActivityRow> {
        self.rows.lock().unwrap().activity.clone()
    }

    /// Snapshot of all chapter progress rows, for assertions.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn chapter_rows(&self) -> Vec<ChapterProgressRow> {
        self.rows.lock().unwrap().chapters.clone()
    }
}

#[async_trait]
impl ProgressStore for InMemoryProgressStore {
    async fn list_active_chapters(
        &self,
        track: Track,
    ) -> Result<Vec<ChapterProgressRow>, EngineError> {
        let rows = self.rows.lock().unwrap();
        let mut active: Vec<ChapterProgressRow> = rows
            .chapters
            .iter()
            .filter(|row| row.track == track && row.completed_at.is_none())
            .cloned()
            .collect();
        active.sort_by_key(|row| row.started_at);
        Ok(active)
    }

    async fn find_chapter_progress(
        &self,
        track: Track,
        chapter_id: &ChapterId,
    ) -> Result<Option<ChapterProgressRow>, EngineError> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .chapters
            .iter()
            .find(|row| row.track == track && &row.chapter_id == chapter_id)
            .cloned())
    }

    async fn insert_chapter_progress(&self, row: &ChapterProgressRow) -> Result<(), EngineError> {
        self.rows.lock().unwrap().chapters.push(row.clone());
        Ok(())
    }

    async fn complete_chapter(
        &self,
        chapter_progress_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, EngineError> {
        let mut rows = self.rows.lock().unwrap();
        let Some(row) = rows
            .chapters
            .iter_mut()
            .find(|row| row.id == chapter_progress_id)
        else {
            return Ok(false);
        };
        if row.completed_at.is_some() {
            return Ok(false);
        }
        row.completed_at = Some(at);
        Ok(true)
    }

    async fn list_step_progress(
        &self,
        chapter_progress_id: Uuid,
    ) -> Result<Vec<StepProgressRow>, EngineError> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .steps
            .iter()
            .filter(|row| row.chapter_progress_id == chapter_progress_id)
            .cloned()
            .collect())
    }

    async fn complete_step(
        &self,
        chapter_progress_id: Uuid,
        step_id: &StepId,
        at: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows
            .steps
            .iter_mut()
            .find(|row| row.chapter_progress_id == chapter_progress_id && &row.step_id == step_id)
        {
            if row.completed_at.is_none() {
                row.completed_at = Some(at);
            }
        } else {
            rows.steps.push(StepProgressRow {
                id: Uuid::new_v4(),
                chapter_progress_id,
                step_id: step_id.clone(),
                created_at: at,
                completed_at: Some(at),
            });
        }
        Ok(())
    }

    async fn find_message(
        &self,
        track: Track,
        progress_key: &str,
    ) -> Result<Option<MessageProgressRow>, EngineError> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .messages
            .iter()
            .find(|row| row.track == track && row.progress_key == progress_key)
            .cloned())
    }

    async fn upsert_message(&self, row: &MessageProgressRow) -> Result<(), EngineError> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(existing) = rows
            .messages
            .iter_mut()
            .find(|existing| existing.track == row.track && existing.progress_key == row.progress_key)
        {
            existing.status = row.status;
            existing.scheduled_at = row.scheduled_at;
            existing.updated_at = row.updated_at;
        } else {
            rows.messages.push(row.clone());
        }
        Ok(())
    }

    async fn list_due_messages(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<MessageProgressRow>, EngineError> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .messages
            .iter()
            .filter(|row| {
                row.status == MessageStatus::Scheduled
                    && row.scheduled_at.is_some_and(|due| due <= now)
            })
            .cloned()
            .collect())
    }

    async fn transition_message(
        &self,
        track: Track,
        progress_key: &str,
        from: MessageStatus,
        to: MessageStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, EngineError> {
        let mut rows = self.rows.lock().unwrap();
        let Some(row) = rows
            .messages
            .iter_mut()
            .find(|row| row.track == track && row.progress_key == progress_key)
        else {
            return Ok(false);
        };
        if row.status != from {
            return Ok(false);
        }
        row.status = to;
        row.updated_at = at;
        Ok(true)
    }

    async fn insert_hint_view(&self, row: &HintViewRow) -> Result<(), EngineError> {
        self.rows.lock().unwrap().hints.push(row.clone());
        Ok(())
    }

    async fn list_hint_tiers(
        &self,
        track: Track,
        chapter_id: &ChapterId,
        step_index: u32,
    ) -> Result<Vec<u32>, EngineError> {
        let rows = self.rows.lock().unwrap();
        let mut tiers: Vec<u32> = rows
            .hints
            .iter()
            .filter(|row| {
                row.track == track
                    && &row.chapter_id == chapter_id
                    && row.step_index == step_index
            })
            .map(|row| row.tier)
            .collect();
        tiers.sort_unstable();
        tiers.dedup();
        Ok(tiers)
    }

    async fn append_activity(&self, row: &ActivityRow) -> Result<(), EngineError> {
        self.rows.lock().unwrap().activity.push(row.clone());
        Ok(())
    }

    async fn list_activity(
        &self,
        track: Track,
        limit: u32,
    ) -> Result<Vec<ActivityRow>, EngineError> {
        let rows = self.rows.lock().unwrap();
        let mut recent: Vec<ActivityRow> = rows
            .activity
            .iter()
            .filter(|row| row.track == track)
            .cloned()
            .collect();
        recent.sort_by_key(|row| std::cmp::Reverse(row.occurred_at));
        recent.truncate(limit as usize);
        Ok(recent)
    }
}

/// A progress store that always reports the store as unreachable. Useful for
/// testing that callers keep "store down" distinguishable from "no state".
#[derive(Debug)]
pub struct FailingProgressStore;

fn unavailable() -> EngineError {
    EngineError::StoreUnavailable("connection refused".into())
}

#[async_trait]
impl ProgressStore for FailingProgressStore {
    async fn list_active_chapters(
        &self,
        _track: Track,
    ) -> Result<Vec<ChapterProgressRow>, EngineError> {
        Err(unavailable())
    }

    async fn find_chapter_progress(
        &self,
        _track: Track,
        _chapter_id: &ChapterId,
    ) -> Result<Option<ChapterProgressRow>, EngineError> {
        Err(unavailable())
    }

    async fn insert_chapter_progress(&self, _row: &ChapterProgressRow) -> Result<(), EngineError> {
        Err(unavailable())
    }

    async fn complete_chapter(
        &self,
        _chapter_progress_id: Uuid,
        _at: DateTime<Utc>,
    ) -> Result<bool, EngineError> {
        Err(unavailable())
    }

    async fn list_step_progress(
        &self,
        _chapter_progress_id: Uuid,
    ) -> Result<Vec<StepProgressRow>, EngineError> {
        Err(unavailable())
    }

    async fn complete_step(
        &self,
        _chapter_progress_id: Uuid,
        _step_id: &StepId,
        _at: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        Err(unavailable())
    }

    async fn find_message(
        &self,
        _track: Track,
        _progress_key: &str,
    ) -> Result<Option<MessageProgressRow>, EngineError> {
        Err(unavailable())
    }

    async fn upsert_message(&self, _row: &MessageProgressRow) -> Result<(), EngineError> {
        Err(unavailable())
    }

    async fn list_due_messages(
        &self,
        _now: DateTime<Utc>,
    ) -> Result<Vec<MessageProgressRow>, EngineError> {
        Err(unavailable())
    }

    async fn transition_message(
        &self,
        _track: Track,
        _progress_key: &str,
        _from: MessageStatus,
        _to: MessageStatus,
        _at: DateTime<Utc>,
    ) -> Result<bool, EngineError> {
        Err(unavailable())
    }

    async fn insert_hint_view(&self, _row: &HintViewRow) -> Result<(), EngineError> {
        Err(unavailable())
    }

    async fn list_hint_tiers(
        &self,
        _track: Track,
        _chapter_id: &ChapterId,
        _step_index: u32,
    ) -> Result<Vec<u32>, EngineError> {
        Err(unavailable())
    }

    async fn append_activity(&self, _row: &ActivityRow) -> Result<(), EngineError> {
        Err(unavailable())
    }

    async fn list_activity(
        &self,
        _track: Track,
        _limit: u32,
    ) -> Result<Vec<ActivityRow>, EngineError> {
        Err(unavailable())
    }
}
