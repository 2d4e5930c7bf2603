//! Catalog data model: chapters, steps, and contact rosters.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use waymark_core::delivery::{Channel, Contact};
use waymark_core::ids::{ChapterId, StepId};
use waymark_core::track::Track;
use waymark_geo::{DistanceGate, GeoPoint};

/// How the current step can be completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvanceMode {
    /// The client calls advance after its own interaction completes.
    Auto,
    /// No client action can complete this step; the client polls for an
    /// admin-driven change.
    AdminTrigger,
}

/// Coarse step classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepType {
    /// Rendered in the player's browser and completed interactively.
    WebsiteInteractive,
    /// An outbound message handled automatically by the cascade.
    Messaging,
}

/// Recipient selector for messaging steps, keyed into the active track's
/// contact roster. `"player"` is a special-cased alias; any other value names
/// a companion role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ContactRole {
    /// The track's player contact.
    Player,
    /// A named companion from the track's roster.
    Companion(String),
}

impl ContactRole {
    /// Returns the roster key this role resolves through.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Player => "player",
            Self::Companion(name) => name,
        }
    }
}

impl From<String> for ContactRole {
    fn from(value: String) -> Self {
        if value == "player" {
            Self::Player
        } else {
            Self::Companion(value)
        }
    }
}

impl From<ContactRole> for String {
    fn from(role: ContactRole) -> Self {
        role.as_str().to_owned()
    }
}

/// Per-component step configuration. One closed variant per component so the
/// compiler checks which fields each step type requires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "component", rename_all = "snake_case")]
pub enum StepConfig {
    /// A narrative reveal. Markdown body, completed by the client once read.
    Narrative {
        /// Markdown body shown to the player.
        body_md: String,
    },
    /// A text riddle the player must answer.
    Riddle {
        /// Markdown prompt.
        prompt_md: String,
        /// Expected answer; checked case- and whitespace-insensitively.
        answer: String,
        /// Hint tier texts, tier 0 first.
        #[serde(default)]
        hints: Vec<String>,
    },
    /// A geofence puzzle: reach the target location.
    Proximity {
        /// Target coordinates.
        target: GeoPoint,
        /// Banding gates; the default gate set applies when empty.
        #[serde(default)]
        gates: Vec<DistanceGate>,
        /// Hint tier texts, tier 0 first.
        #[serde(default)]
        hints: Vec<String>,
    },
    /// A blocking wait for an out-of-band event; only an admin can complete
    /// this step.
    AwaitSignal {
        /// Optional text shown while waiting.
        #[serde(default)]
        note: Option<String>,
    },
    /// An outbound message, auto-handled by the cascade.
    Message {
        /// Recipient role resolved against the active track's roster.
        to: ContactRole,
        /// Transport to deliver on.
        channel: Channel,
        /// Subject line (email only).
        #[serde(default)]
        subject: Option<String>,
        /// Message body.
        body: String,
        /// Correlation key for scheduled/sent state.
        progress_key: String,
        /// Delay in "mornings"; absent means send immediately.
        #[serde(default)]
        delay_mornings: Option<u32>,
    },
}

/// One step of a chapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Globally unique step identifier.
    pub id: StepId,
    /// Position within the chapter; unique per chapter, ascending.
    pub order: u32,
    /// Component-specific configuration.
    #[serde(flatten)]
    pub config: StepConfig,
}

impl Step {
    /// Returns the coarse step type.
    #[must_use]
    pub const fn step_type(&self) -> StepType {
        match self.config {
            StepConfig::Message { .. } => StepType::Messaging,
            _ => StepType::WebsiteInteractive,
        }
    }

    /// True for steps the cascade auto-handles.
    #[must_use]
    pub const fn is_messaging(&self) -> bool {
        matches!(self.config, StepConfig::Message { .. })
    }

    /// Derives how the client may complete this step.
    #[must_use]
    pub const fn advance_mode(&self) -> AdvanceMode {
        match self.config {
            StepConfig::AwaitSignal { .. } | StepConfig::Message { .. } => {
                AdvanceMode::AdminTrigger
            }
            _ => AdvanceMode::Auto,
        }
    }

    /// Component name used in views and logs.
    #[must_use]
    pub const fn component_name(&self) -> &'static str {
        match self.config {
            StepConfig::Narrative { .. } => "narrative",
            StepConfig::Riddle { .. } => "riddle",
            StepConfig::Proximity { .. } => "proximity",
            StepConfig::AwaitSignal { .. } => "await_signal",
            StepConfig::Message { .. } => "message",
        }
    }

    /// Hint tier texts for website steps; empty for components without hints.
    #[must_use]
    pub fn hints(&self) -> &[String] {
        match &self.config {
            StepConfig::Riddle { hints, .. } | StepConfig::Proximity { hints, .. } => hints,
            _ => &[],
        }
    }
}

/// Optional real-world availability window for a chapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Window start.
    pub opens_at: DateTime<Utc>,
    /// Window end.
    pub closes_at: DateTime<Utc>,
}

/// A named, ordered unit of gameplay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    /// Chapter identifier.
    pub id: ChapterId,
    /// Display name.
    pub name: String,
    /// Optional real-world location the chapter plays at.
    #[serde(default)]
    pub location: Option<GeoPoint>,
    /// Optional availability window.
    #[serde(default)]
    pub time_window: Option<TimeWindow>,
    /// When set, this chapter is auto-activated by the named chapter's
    /// completion instead of an explicit admin action.
    #[serde(default)]
    pub companion_of: Option<ChapterId>,
    /// The chapter's steps, in configuration order.
    pub steps: Vec<Step>,
}

impl Chapter {
    /// Returns the chapter's steps sorted strictly ascending by `order`.
    ///
    /// Pure over the configuration; validation guarantees no duplicate
    /// orders, so the sort is total.
    #[must_use]
    pub fn ordered_steps(&self) -> Vec<&Step> {
        let mut steps: Vec<&Step> = self.steps.iter().collect();
        steps.sort_by_key(|step| step.order);
        steps
    }

    /// True when this chapter is auto-triggered by another's completion.
    #[must_use]
    pub const fn is_companion(&self) -> bool {
        self.companion_of.is_some()
    }
}

/// Contact roster for one track: the player plus named companions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Roster {
    /// The track's player contact.
    pub player: Contact,
    /// Named companion contacts.
    #[serde(default)]
    pub companions: BTreeMap<String, Contact>,
}

impl Roster {
    /// Resolves a recipient role against this roster.
    #[must_use]
    pub fn resolve(&self, role: &ContactRole) -> Option<&Contact> {
        match role {
            ContactRole::Player => Some(&self.player),
            ContactRole::Companion(name) => self.companions.get(name),
        }
    }
}

/// Both tracks' rosters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rosters {
    /// Rehearsal roster.
    pub test: Roster,
    /// Live roster.
    pub live: Roster,
}

impl Rosters {
    /// Returns the roster for a track.
    #[must_use]
    pub const fn for_track(&self, track: Track) -> &Roster {
        match track {
            Track::Test => &self.test,
            Track::Live => &self.live,
        }
    }
}

/// The complete validated configuration: chapters plus contact rosters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    /// All chapters.
    pub chapters: Vec<Chapter>,
    /// Contact rosters per track.
    pub rosters: Rosters,
}

impl Catalog {
    /// Looks up a chapter by id.
    #[must_use]
    pub fn chapter(&self, id: &ChapterId) -> Option<&Chapter> {
        self.chapters.iter().find(|chapter| &chapter.id == id)
    }

    /// Finds the messaging step owning a `progress_key`, with its chapter.
    #[must_use]
    pub fn find_by_progress_key(&self, key: &str) -> Option<(&Chapter, &Step)> {
        self.chapters.iter().find_map(|chapter| {
            chapter.steps.iter().find_map(|step| match &step.config {
                StepConfig::Message { progress_key, .. } if progress_key == key => {
                    Some((chapter, step))
                }
                _ => None,
            })
        })
    }

    /// Finds a step by id, with its chapter.
    #[must_use]
    pub fn find_step(&self, id: &StepId) -> Option<(&Chapter, &Step)> {
        self.chapters.iter().find_map(|chapter| {
            chapter
                .steps
                .iter()
                .find(|step| &step.id == id)
                .map(|step| (chapter, step))
        })
    }

    /// Chapters auto-triggered by the given chapter's completion.
    #[must_use]
    pub fn companions_of(&self, id: &ChapterId) -> Vec<&Chapter> {
        self.chapters
            .iter()
            .filter(|chapter| chapter.companion_of.as_ref() == Some(id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(id: &str, order: u32) -> Step {
        Step {
            id: StepId::from(id),
            order,
            config: StepConfig::Narrative {
                body_md: "…".to_owned(),
            },
        }
    }

    #[test]
    fn test_ordered_steps_sorts_ascending_by_order() {
        let chapter = Chapter {
            id: ChapterId::from("ch1"),
            name: "One".to_owned(),
            location: None,
            time_window: None,
            companion_of: None,
            steps: vec![step("c", 30), step("a", 10), step("b", 20)],
        };

        let ordered = chapter.ordered_steps();
        let orders: Vec<u32> = ordered.iter().map(|s| s.order).collect();
        assert_eq!(orders, vec![10, 20, 30]);
    }

    #[test]
    fn test_contact_role_player_alias_round_trips() {
        let role = ContactRole::from("player".to_owned());
        assert_eq!(role, ContactRole::Player);
        let role = ContactRole::from("watcher".to_owned());
        assert_eq!(role, ContactRole::Companion("watcher".to_owned()));
        assert_eq!(String::from(ContactRole::Player), "player");
    }

    #[test]
    fn test_advance_mode_is_derived_from_component() {
        let narrative = step("n", 1);
        assert_eq!(narrative.advance_mode(), AdvanceMode::Auto);
        assert_eq!(narrative.step_type(), StepType::WebsiteInteractive);

        let waiting = Step {
            id: StepId::from("w"),
            order: 2,
            config: StepConfig::AwaitSignal { note: None },
        };
        assert_eq!(waiting.advance_mode(), AdvanceMode::AdminTrigger);

        let message = Step {
            id: StepId::from("m"),
            order: 3,
            config: StepConfig::Message {
                to: ContactRole::Player,
                channel: Channel::Sms,
                subject: None,
                body: "hello".to_owned(),
                progress_key: "pk-m".to_owned(),
                delay_mornings: None,
            },
        };
        assert!(message.is_messaging());
        assert_eq!(message.step_type(), StepType::Messaging);
    }
}
