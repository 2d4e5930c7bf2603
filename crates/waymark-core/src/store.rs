//! Progress store abstraction.
//!
//! The engine holds no in-process state between invocations; every operation
//! derives what it needs from these rows and writes back idempotently. The
//! guarded transition methods return whether *this* call performed the write,
//! which is the concurrency primitive the sweep and completion logic rely on.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::activity::ActivityRow;
use crate::error::EngineError;
use crate::ids::{ChapterId, StepId};
use crate::track::Track;

/// Stored progress of one chapter on one track.
///
/// `completed_at` is null while the chapter is active. At most one
/// non-completed row exists per (track, chapter); callers re-check before
/// insert since the store does not enforce it.
#[derive(Debug, Clone)]
pub struct ChapterProgressRow {
    /// Row identifier.
    pub id: Uuid,
    /// Track this progress belongs to.
    pub track: Track,
    /// The chapter being progressed.
    pub chapter_id: ChapterId,
    /// When the chapter was activated.
    pub started_at: DateTime<Utc>,
    /// Set exactly once, when every step has completed.
    pub completed_at: Option<DateTime<Utc>>,
}

/// Stored progress of one step within a chapter progress row.
///
/// Created lazily on first interaction or admin completion. The current step
/// index of a chapter is *derived* from these rows on every read; there is
/// no stored cursor.
#[derive(Debug, Clone)]
pub struct StepProgressRow {
    /// Row identifier.
    pub id: Uuid,
    /// Owning chapter progress row.
    pub chapter_progress_id: Uuid,
    /// The step this row tracks.
    pub step_id: StepId,
    /// When the row was first created.
    pub created_at: DateTime<Utc>,
    /// Null until the step is finished.
    pub completed_at: Option<DateTime<Utc>>,
}

/// Lifecycle status of an outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageStatus {
    /// Waiting for its due time; picked up by the periodic sweep.
    Scheduled,
    /// Handed to the delivery channel.
    Sent,
    /// Externally confirmed (admin marks done).
    Delivered,
    /// The delivery channel reported an error; manual recovery only.
    Failed,
}

impl MessageStatus {
    /// Returns the canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(Self::Scheduled),
            "sent" => Ok(Self::Sent),
            "delivered" => Ok(Self::Delivered),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown message status: {other}")),
        }
    }
}

/// Stored state of one messaging step's outbound message on one track,
/// correlated by the step's `progress_key`.
#[derive(Debug, Clone)]
pub struct MessageProgressRow {
    /// Row identifier.
    pub id: Uuid,
    /// Track this message belongs to.
    pub track: Track,
    /// Correlation key from the messaging step's configuration.
    pub progress_key: String,
    /// Current lifecycle status.
    pub status: MessageStatus,
    /// Due time while `status` is `Scheduled`.
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Last status change.
    pub updated_at: DateTime<Utc>,
}

/// Who caused a hint tier to be revealed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HintOrigin {
    /// The player requested the hint.
    Player,
    /// An admin pushed the hint.
    Admin,
}

impl HintOrigin {
    /// Returns the canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Player => "player",
            Self::Admin => "admin",
        }
    }
}

impl FromStr for HintOrigin {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "player" => Ok(Self::Player),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown hint origin: {other}")),
        }
    }
}

/// Append-only record of a hint tier being shown. A tier counts as revealed
/// if at least one row exists for its (track, chapter, step index, tier).
#[derive(Debug, Clone)]
pub struct HintViewRow {
    /// Row identifier.
    pub id: Uuid,
    /// Track the hint was shown on.
    pub track: Track,
    /// Chapter the step belongs to.
    pub chapter_id: ChapterId,
    /// Zero-based index of the step within the chapter's ordered steps.
    pub step_index: u32,
    /// The revealed hint tier.
    pub tier: u32,
    /// Player-requested or admin-pushed.
    pub origin: HintOrigin,
    /// When the hint was shown.
    pub viewed_at: DateTime<Utc>,
}

/// Transactional row store holding all quest progress. Implementations must
/// make each guarded transition an atomically visible per-row update.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Returns all non-completed chapter progress rows for a track, oldest
    /// `started_at` first.
    async fn list_active_chapters(
        &self,
        track: Track,
    ) -> Result<Vec<ChapterProgressRow>, EngineError>;

    /// Returns the progress row for a specific (track, chapter), if any.
    async fn find_chapter_progress(
        &self,
        track: Track,
        chapter_id: &ChapterId,
    ) -> Result<Option<ChapterProgressRow>, EngineError>;

    /// Inserts a new chapter progress row.
    async fn insert_chapter_progress(&self, row: &ChapterProgressRow) -> Result<(), EngineError>;

    /// Sets `completed_at` on a chapter progress row if it is still null.
    /// Returns `true` if this call performed the transition.
    async fn complete_chapter(
        &self,
        chapter_progress_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, EngineError>;

    /// Returns all step progress rows under a chapter progress row.
    async fn list_step_progress(
        &self,
        chapter_progress_id: Uuid,
    ) -> Result<Vec<StepProgressRow>, EngineError>;

    /// Ensures a step progress row exists and sets `completed_at` if it is
    /// still null. Completing an already-completed step is a safe no-op.
    async fn complete_step(
        &self,
        chapter_progress_id: Uuid,
        step_id: &StepId,
        at: DateTime<Utc>,
    ) -> Result<(), EngineError>;

    /// Returns the message progress row for (track, `progress_key`), if any.
    async fn find_message(
        &self,
        track: Track,
        progress_key: &str,
    ) -> Result<Option<MessageProgressRow>, EngineError>;

    /// Inserts or replaces the message progress row keyed by
    /// (track, `progress_key`).
    async fn upsert_message(&self, row: &MessageProgressRow) -> Result<(), EngineError>;

    /// Returns all rows with status `Scheduled` whose due time is at or
    /// before `now`.
    async fn list_due_messages(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<MessageProgressRow>, EngineError>;

    /// Transitions one row from `from` to `to` if and only if its current
    /// status equals `from`. Returns `true` if this call won the transition.
    /// This is the sweep's guard against concurrent/redundant invocations.
    async fn transition_message(
        &self,
        track: Track,
        progress_key: &str,
        from: MessageStatus,
        to: MessageStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, EngineError>;

    /// Appends a hint view row. Append is safe even if the same tier was
    /// already recorded.
    async fn insert_hint_view(&self, row: &HintViewRow) -> Result<(), EngineError>;

    /// Returns the distinct revealed tiers for (track, chapter, step index),
    /// ascending.
    async fn list_hint_tiers(
        &self,
        track: Track,
        chapter_id: &ChapterId,
        step_index: u32,
    ) -> Result<Vec<u32>, EngineError>;

    /// Appends an activity log row. Never mutated afterwards.
    async fn append_activity(&self, row: &ActivityRow) -> Result<(), EngineError>;

    /// Returns the most recent activity rows for a track, newest first.
    async fn list_activity(
        &self,
        track: Track,
        limit: u32,
    ) -> Result<Vec<ActivityRow>, EngineError>;
}
