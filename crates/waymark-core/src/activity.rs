//! Append-only audit trail of domain events.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::track::Track;

/// The kind of domain event an activity row records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    /// A chapter was activated (admin action or companion auto-activation).
    ChapterActivated,
    /// A step was completed, by the player or by the cascade.
    StepAdvanced,
    /// Every step of a chapter completed.
    ChapterCompleted,
    /// A riddle answer was submitted.
    AnswerSubmitted,
    /// A hint tier was shown.
    HintRevealed,
    /// An outbound message was scheduled for later dispatch.
    MessageScheduled,
    /// An outbound message was handed to the delivery channel.
    MessageSent,
    /// An outbound message was confirmed delivered by an admin.
    MessageDelivered,
    /// The delivery channel reported a failure.
    MessageFailed,
}

impl ActivityKind {
    /// Returns the canonical snake_case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ChapterActivated => "chapter_activated",
            Self::StepAdvanced => "step_advanced",
            Self::ChapterCompleted => "chapter_completed",
            Self::AnswerSubmitted => "answer_submitted",
            Self::HintRevealed => "hint_revealed",
            Self::MessageScheduled => "message_scheduled",
            Self::MessageSent => "message_sent",
            Self::MessageDelivered => "message_delivered",
            Self::MessageFailed => "message_failed",
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chapter_activated" => Ok(Self::ChapterActivated),
            "step_advanced" => Ok(Self::StepAdvanced),
            "chapter_completed" => Ok(Self::ChapterCompleted),
            "answer_submitted" => Ok(Self::AnswerSubmitted),
            "hint_revealed" => Ok(Self::HintRevealed),
            "message_scheduled" => Ok(Self::MessageScheduled),
            "message_sent" => Ok(Self::MessageSent),
            "message_delivered" => Ok(Self::MessageDelivered),
            "message_failed" => Ok(Self::MessageFailed),
            other => Err(format!("unknown activity kind: {other}")),
        }
    }
}

/// One append-only audit trail entry. Inserted and queried, never mutated.
#[derive(Debug, Clone, Serialize)]
pub struct ActivityRow {
    /// Row identifier.
    pub id: Uuid,
    /// Track the event happened on.
    pub track: Track,
    /// What happened.
    pub kind: ActivityKind,
    /// Structured event detail (chapter, step, progress key, error text…).
    pub detail: serde_json::Value,
    /// When it happened.
    pub occurred_at: DateTime<Utc>,
}

impl ActivityRow {
    /// Builds a new activity row with a fresh identifier.
    #[must_use]
    pub fn new(
        track: Track,
        kind: ActivityKind,
        detail: serde_json::Value,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            track,
            kind,
            detail,
            occurred_at,
        }
    }
}
