//! Proximity feedback for geofence puzzle steps.
//!
//! Thin policy layer over the geo calculator: resolves the step's target and
//! gate list from the catalog and turns a reported position into narrative
//! feedback. Pure: position checks touch no stored state.

use serde::Serialize;

use waymark_catalog::model::{Catalog, StepConfig};
use waymark_core::error::EngineError;
use waymark_core::ids::ChapterId;
use waymark_geo::{
    DistanceGate, GeoPoint, compass_point, default_gates, distance_meters, gate_for_distance,
    initial_bearing_degrees,
};

/// Feedback for one reported position against a proximity step's target.
#[derive(Debug, Serialize)]
pub struct ProximityFeedback {
    /// Great-circle distance to the target in meters.
    pub distance_meters: f64,
    /// Initial bearing toward the target, 0–360 clockwise from north.
    pub bearing_degrees: f64,
    /// 8-wind compass point for the bearing.
    pub compass: &'static str,
    /// Narrative banding text for the distance.
    pub text: String,
    /// Whether the distance landed in the closest-range gate.
    pub arrived: bool,
}

/// Computes feedback for a reported position.
///
/// # Errors
///
/// Returns `EngineError::ChapterNotFound` for an unknown chapter and
/// `EngineError::Precondition` when the step is not a proximity step.
pub fn proximity_feedback(
    catalog: &Catalog,
    chapter_id: &ChapterId,
    step_index: u32,
    position: GeoPoint,
) -> Result<ProximityFeedback, EngineError> {
    let chapter = catalog
        .chapter(chapter_id)
        .ok_or_else(|| EngineError::ChapterNotFound(chapter_id.clone()))?;
    let steps = chapter.ordered_steps();
    let step = steps.get(step_index as usize).ok_or_else(|| {
        EngineError::Precondition(format!(
            "chapter {chapter_id} has no step at index {step_index}"
        ))
    })?;
    let StepConfig::Proximity { target, gates, .. } = &step.config else {
        return Err(EngineError::Precondition(format!(
            "step {} is not a proximity step",
            step.id
        )));
    };

    let effective: Vec<DistanceGate> = if gates.is_empty() {
        default_gates()
    } else {
        gates.clone()
    };

    let distance = distance_meters(position, *target);
    let bearing = initial_bearing_degrees(position, *target);
    let gate = gate_for_distance(&effective, distance).ok_or_else(|| {
        EngineError::Config(format!("step {} has an empty gate list", step.id))
    })?;
    let closest = effective
        .iter()
        .map(|gate| gate.threshold_meters)
        .fold(f64::INFINITY, f64::min);

    Ok(ProximityFeedback {
        distance_meters: distance,
        bearing_degrees: bearing,
        compass: compass_point(bearing),
        text: gate.text.clone(),
        arrived: (gate.threshold_meters - closest).abs() < f64::EPSILON,
    })
}
