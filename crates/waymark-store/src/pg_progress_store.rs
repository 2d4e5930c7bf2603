//! `PostgreSQL` implementation of the `ProgressStore` trait.
//!
//! Every guarded transition is a single UPDATE whose WHERE clause carries
//! the status/null predicate, so the read-filter and status-write are one
//! atomically visible row operation, which is the property the sweep's
//! concurrency guard depends on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use waymark_core::activity::{ActivityKind, ActivityRow};
use waymark_core::error::EngineError;
use waymark_core::ids::{ChapterId, StepId};
use waymark_core::store::{
    ChapterProgressRow, HintViewRow, MessageProgressRow, MessageStatus, ProgressStore,
    StepProgressRow,
};
use waymark_core::track::Track;

/// PostgreSQL-backed progress store.
#[derive(Debug, Clone)]
pub struct PgProgressStore {
    pool: PgPool,
}

impl PgProgressStore {
    /// Creates a new `PgProgressStore`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn store_err(err: sqlx::Error) -> EngineError {
    EngineError::StoreUnavailable(err.to_string())
}

fn corrupt(what: &str, detail: impl std::fmt::Display) -> EngineError {
    EngineError::StoreUnavailable(format!("malformed {what} row: {detail}"))
}

fn parse_track(raw: &str) -> Result<Track, EngineError> {
    raw.parse().map_err(|e| corrupt("track", e))
}

fn chapter_row(row: &PgRow) -> Result<ChapterProgressRow, EngineError> {
    Ok(ChapterProgressRow {
        id: row.try_get("id").map_err(store_err)?,
        track: parse_track(row.try_get::<&str, _>("track").map_err(store_err)?)?,
        chapter_id: ChapterId(row.try_get("chapter_id").map_err(store_err)?),
        started_at: row.try_get("started_at").map_err(store_err)?,
        completed_at: row.try_get("completed_at").map_err(store_err)?,
    })
}

fn step_row(row: &PgRow) -> Result<StepProgressRow, EngineError> {
    Ok(StepProgressRow {
        id: row.try_get("id").map_err(store_err)?,
        chapter_progress_id: row.try_get("chapter_progress_id").map_err(store_err)?,
        step_id: StepId(row.try_get("step_id").map_err(store_err)?),
        created_at: row.try_get("created_at").map_err(store_err)?,
        completed_at: row.try_get("completed_at").map_err(store_err)?,
    })
}

fn message_row(row: &PgRow) -> Result<MessageProgressRow, EngineError> {
    let status: &str = row.try_get("status").map_err(store_err)?;
    Ok(MessageProgressRow {
        id: row.try_get("id").map_err(store_err)?,
        track: parse_track(row.try_get::<&str, _>("track").map_err(store_err)?)?,
        progress_key: row.try_get("progress_key").map_err(store_err)?,
        status: status
            .parse::<MessageStatus>()
            .map_err(|e| corrupt("message status", e))?,
        scheduled_at: row.try_get("scheduled_at").map_err(store_err)?,
        updated_at: row.try_get("updated_at").map_err(store_err)?,
    })
}

fn activity_row(row: &PgRow) -> Result<ActivityRow, EngineError> {
    let kind: &str = row.try_get("kind").map_err(store_err)?;
    Ok(ActivityRow {
        id: row.try_get("id").map_err(store_err)?,
        track: parse_track(row.try_get::<&str, _>("track").map_err(store_err)?)?,
        kind: kind
            .parse::<ActivityKind>()
            .map_err(|e| corrupt("activity kind", e))?,
        detail: row.try_get("detail").map_err(store_err)?,
        occurred_at: row.try_get("occurred_at").map_err(store_err)?,
    })
}

#[async_trait]
impl ProgressStore for PgProgressStore {
    async fn list_active_chapters(
        &self,
        track: Track,
    ) -> Result<Vec<ChapterProgressRow>, EngineError> {
        let rows = sqlx::query(
            "SELECT id, track, chapter_id, started_at, completed_at
             FROM chapter_progress
             WHERE track = $1 AND completed_at IS NULL
             ORDER BY started_at ASC",
        )
        .bind(track.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;
        rows.iter().map(chapter_row).collect()
    }

    async fn find_chapter_progress(
        &self,
        track: Track,
        chapter_id: &ChapterId,
    ) -> Result<Option<ChapterProgressRow>, EngineError> {
        let row = sqlx::query(
            "SELECT id, track, chapter_id, started_at, completed_at
             FROM chapter_progress
             WHERE track = $1 AND chapter_id = $2",
        )
        .bind(track.as_str())
        .bind(chapter_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;
        row.as_ref().map(chapter_row).transpose()
    }

    async fn insert_chapter_progress(&self, row: &ChapterProgressRow) -> Result<(), EngineError> {
        sqlx::query(
            "INSERT INTO chapter_progress (id, track, chapter_id, started_at, completed_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(row.id)
        .bind(row.track.as_str())
        .bind(row.chapter_id.as_str())
        .bind(row.started_at)
        .bind(row.completed_at)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn complete_chapter(
        &self,
        chapter_progress_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, EngineError> {
        let result = sqlx::query(
            "UPDATE chapter_progress SET completed_at = $2
             WHERE id = $1 AND completed_at IS NULL",
        )
        .bind(chapter_progress_id)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(result.rows_affected() == 1)
    }

    async fn list_step_progress(
        &self,
        chapter_progress_id: Uuid,
    ) -> Result<Vec<StepProgressRow>, EngineError> {
        let rows = sqlx::query(
            "SELECT id, chapter_progress_id, step_id, created_at, completed_at
             FROM step_progress
             WHERE chapter_progress_id = $1",
        )
        .bind(chapter_progress_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;
        rows.iter().map(step_row).collect()
    }

    async fn complete_step(
        &self,
        chapter_progress_id: Uuid,
        step_id: &StepId,
        at: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        sqlx::query(
            "INSERT INTO step_progress (id, chapter_progress_id, step_id, created_at, completed_at)
             VALUES ($1, $2, $3, $4, $4)
             ON CONFLICT (chapter_progress_id, step_id)
             DO UPDATE SET completed_at = EXCLUDED.completed_at
             WHERE step_progress.completed_at IS NULL",
        )
        .bind(Uuid::new_v4())
        .bind(chapter_progress_id)
        .bind(step_id.as_str())
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn find_message(
        &self,
        track: Track,
        progress_key: &str,
    ) -> Result<Option<MessageProgressRow>, EngineError> {
        let row = sqlx::query(
            "SELECT id, track, progress_key, status, scheduled_at, updated_at
             FROM message_progress
             WHERE track = $1 AND progress_key = $2",
        )
        .bind(track.as_str())
        .bind(progress_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;
        row.as_ref().map(message_row).transpose()
    }

    async fn upsert_message(&self, row: &MessageProgressRow) -> Result<(), EngineError> {
        sqlx::query(
            "INSERT INTO message_progress (id, track, progress_key, status, scheduled_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (track, progress_key)
             DO UPDATE SET status = EXCLUDED.status,
                           scheduled_at = EXCLUDED.scheduled_at,
                           updated_at = EXCLUDED.updated_at",
        )
        .bind(row.id)
        .bind(row.track.as_str())
        .bind(&row.progress_key)
        .bind(row.status.as_str())
        .bind(row.scheduled_at)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn list_due_messages(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<MessageProgressRow>, EngineError> {
        let rows = sqlx::query(
            "SELECT id, track, progress_key, status, scheduled_at, updated_at
             FROM message_progress
             WHERE status = $1 AND scheduled_at <= $2
             ORDER BY scheduled_at ASC",
        )
        .bind(MessageStatus::Scheduled.as_str())
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;
        rows.iter().map(message_row).collect()
    }

    async fn transition_message(
        &self,
        track: Track,
        progress_key: &str,
        from: MessageStatus,
        to: MessageStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, EngineError> {
        let result = sqlx::query(
            "UPDATE message_progress SET status = $4, updated_at = $5
             WHERE track = $1 AND progress_key = $2 AND status = $3",
        )
        .bind(track.as_str())
        .bind(progress_key)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(result.rows_affected() == 1)
    }

    async fn insert_hint_view(&self, row: &HintViewRow) -> Result<(), EngineError> {
        sqlx::query(
            "INSERT INTO hint_views (id, track, chapter_id, step_index, tier, origin, viewed_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(row.id)
        .bind(row.track.as_str())
        .bind(row.chapter_id.as_str())
        .bind(i64::from(row.step_index))
        .bind(i64::from(row.tier))
        .bind(row.origin.as_str())
        .bind(row.viewed_at)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn list_hint_tiers(
        &self,
        track: Track,
        chapter_id: &ChapterId,
        step_index: u32,
    ) -> Result<Vec<u32>, EngineError> {
        let rows = sqlx::query(
            "SELECT DISTINCT tier FROM hint_views
             WHERE track = $1 AND chapter_id = $2 AND step_index = $3
             ORDER BY tier ASC",
        )
        .bind(track.as_str())
        .bind(chapter_id.as_str())
        .bind(i64::from(step_index))
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;
        rows.iter()
            .map(|row| {
                let tier: i64 = row.try_get("tier").map_err(store_err)?;
                u32::try_from(tier).map_err(|e| corrupt("hint tier", e))
            })
            .collect()
    }

    async fn append_activity(&self, row: &ActivityRow) -> Result<(), EngineError> {
        sqlx::query(
            "INSERT INTO activity_log (id, track, kind, detail, occurred_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(row.id)
        .bind(row.track.as_str())
        .bind(row.kind.as_str())
        .bind(&row.detail)
        .bind(row.occurred_at)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn list_activity(
        &self,
        track: Track,
        limit: u32,
    ) -> Result<Vec<ActivityRow>, EngineError> {
        let rows = sqlx::query(
            "SELECT id, track, kind, detail, occurred_at
             FROM activity_log
             WHERE track = $1
             ORDER BY occurred_at DESC
             LIMIT $2",
        )
        .bind(track.as_str())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;
        rows.iter().map(activity_row).collect()
    }
}
