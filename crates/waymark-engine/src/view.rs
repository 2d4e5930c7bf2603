//! Player-visible quest state DTOs.

use serde::Serialize;

use waymark_catalog::markdown::render_markdown;
use waymark_catalog::model::{AdvanceMode, Chapter, Step, StepConfig, StepType};
use waymark_core::ids::{ChapterId, StepId};
use waymark_geo::GeoPoint;

/// What the player should see right now. Recomputed from stored progress on
/// every read, since another actor may have mutated progress since the last.
#[derive(Debug, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum QuestState {
    /// No active chapter on this track.
    Waiting,
    /// A chapter is active and has a current step.
    Active(ActiveStepView),
    /// Every step of the active chapter has completed; the resolver flags
    /// this but does not itself mutate.
    ChapterComplete {
        /// The completed chapter.
        chapter: ChapterId,
        /// Its display name.
        chapter_name: String,
    },
}

/// The current step, rendered for the client.
#[derive(Debug, Serialize)]
pub struct ActiveStepView {
    /// Active chapter id.
    pub chapter: ChapterId,
    /// Active chapter display name.
    pub chapter_name: String,
    /// Zero-based index into the chapter's ordered steps.
    pub step_index: u32,
    /// The current step's id.
    pub step_id: StepId,
    /// Coarse step classification.
    pub step_type: StepType,
    /// Component name the client renders.
    pub component: &'static str,
    /// How the client may complete this step.
    pub advance: AdvanceMode,
    /// Component-specific client payload.
    pub payload: StepPayload,
    /// Hint tiers already revealed for this step, ascending.
    pub revealed_hints: Vec<u32>,
}

/// Component-specific payload of the current step. Riddle answers and raw
/// message bodies never leave the server.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepPayload {
    /// Narrative reveal.
    Narrative {
        /// Rendered HTML body.
        body_html: String,
    },
    /// Riddle prompt.
    Riddle {
        /// Rendered HTML prompt.
        prompt_html: String,
        /// Number of hint tiers available.
        hint_count: u32,
    },
    /// Geofence puzzle.
    Proximity {
        /// Target coordinates the client measures against.
        target: GeoPoint,
        /// Number of hint tiers available.
        hint_count: u32,
    },
    /// Waiting for an out-of-band event.
    AwaitSignal {
        /// Optional text shown while waiting.
        note: Option<String>,
    },
    /// A messaging step surfaced as current (normally transient; the
    /// cascade completes these automatically).
    Message {
        /// Correlation key of the outbound message.
        progress_key: String,
    },
}

impl ActiveStepView {
    /// Builds the view for one step of a chapter.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn build(chapter: &Chapter, step_index: u32, step: &Step, revealed_hints: Vec<u32>) -> Self {
        let payload = match &step.config {
            StepConfig::Narrative { body_md } => StepPayload::Narrative {
                body_html: render_markdown(body_md),
            },
            StepConfig::Riddle {
                prompt_md, hints, ..
            } => StepPayload::Riddle {
                prompt_html: render_markdown(prompt_md),
                hint_count: hints.len() as u32,
            },
            StepConfig::Proximity { target, hints, .. } => StepPayload::Proximity {
                target: *target,
                hint_count: hints.len() as u32,
            },
            StepConfig::AwaitSignal { note } => StepPayload::AwaitSignal { note: note.clone() },
            StepConfig::Message { progress_key, .. } => StepPayload::Message {
                progress_key: progress_key.clone(),
            },
        };

        Self {
            chapter: chapter.id.clone(),
            chapter_name: chapter.name.clone(),
            step_index,
            step_id: step.id.clone(),
            step_type: step.step_type(),
            component: step.component_name(),
            advance: step.advance_mode(),
            payload,
            revealed_hints,
        }
    }
}
