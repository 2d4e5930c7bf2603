//! Deploy-time catalog validation.
//!
//! Violations here are configuration errors: fatal when the catalog is
//! loaded, never surfaced to a live request. The resolver and controller
//! assume these invariants hold.

use std::collections::HashSet;

use thiserror::Error;

use waymark_core::ids::{ChapterId, StepId};
use waymark_core::track::Track;

use crate::model::{Catalog, StepConfig};

/// A catalog invariant violation.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// A chapter has no steps.
    #[error("chapter {chapter} has no steps")]
    EmptyChapter {
        /// The offending chapter.
        chapter: ChapterId,
    },

    /// Two steps in one chapter share an `order` value.
    #[error("chapter {chapter} has duplicate step order {order}")]
    DuplicateOrder {
        /// The offending chapter.
        chapter: ChapterId,
        /// The colliding order value.
        order: u32,
    },

    /// A step id collides with a step in this or another chapter.
    #[error("step id {step} is used more than once")]
    DuplicateStepId {
        /// The colliding step id.
        step: StepId,
    },

    /// Two messaging steps share a `progress_key`.
    #[error("progress key {key} is used by more than one messaging step")]
    DuplicateProgressKey {
        /// The colliding key.
        key: String,
    },

    /// A messaging step's recipient role does not resolve on a track.
    #[error("step {step}: recipient role {role:?} does not resolve on the {track} track")]
    UnresolvedRecipient {
        /// The messaging step.
        step: StepId,
        /// The unresolved role key.
        role: String,
        /// The track missing the contact.
        track: Track,
    },

    /// A messaging step declares a zero-morning delay; omit the delay to
    /// send immediately.
    #[error("step {step}: delay_mornings must be at least 1 when present")]
    ZeroDelay {
        /// The messaging step.
        step: StepId,
    },

    /// A companion chapter references an unknown trigger chapter.
    #[error("chapter {chapter}: companion_of references unknown chapter {target}")]
    UnknownCompanionTarget {
        /// The companion chapter.
        chapter: ChapterId,
        /// The missing trigger chapter.
        target: ChapterId,
    },
}

/// Validates every catalog invariant. Treat a failure as a deploy-time gate.
///
/// # Errors
///
/// Returns the first `CatalogError` encountered.
pub fn validate(catalog: &Catalog) -> Result<(), CatalogError> {
    let mut seen_step_ids: HashSet<&StepId> = HashSet::new();
    let mut seen_progress_keys: HashSet<&str> = HashSet::new();
    let chapter_ids: HashSet<&ChapterId> =
        catalog.chapters.iter().map(|chapter| &chapter.id).collect();

    for chapter in &catalog.chapters {
        if chapter.steps.is_empty() {
            return Err(CatalogError::EmptyChapter {
                chapter: chapter.id.clone(),
            });
        }

        if let Some(target) = &chapter.companion_of
            && !chapter_ids.contains(target)
        {
            return Err(CatalogError::UnknownCompanionTarget {
                chapter: chapter.id.clone(),
                target: target.clone(),
            });
        }

        let mut seen_orders: HashSet<u32> = HashSet::new();
        for step in &chapter.steps {
            if !seen_orders.insert(step.order) {
                return Err(CatalogError::DuplicateOrder {
                    chapter: chapter.id.clone(),
                    order: step.order,
                });
            }
            if !seen_step_ids.insert(&step.id) {
                return Err(CatalogError::DuplicateStepId {
                    step: step.id.clone(),
                });
            }

            if let StepConfig::Message {
                to,
                progress_key,
                delay_mornings,
                ..
            } = &step.config
            {
                if !seen_progress_keys.insert(progress_key.as_str()) {
                    return Err(CatalogError::DuplicateProgressKey {
                        key: progress_key.clone(),
                    });
                }
                if *delay_mornings == Some(0) {
                    return Err(CatalogError::ZeroDelay {
                        step: step.id.clone(),
                    });
                }
                for track in [Track::Test, Track::Live] {
                    if catalog.rosters.for_track(track).resolve(to).is_none() {
                        return Err(CatalogError::UnresolvedRecipient {
                            step: step.id.clone(),
                            role: to.as_str().to_owned(),
                            track,
                        });
                    }
                }
            }
        }
    }

    Ok(())
}
