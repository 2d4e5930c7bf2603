//! Waymark Geo — pure proximity math for location puzzle steps.
//!
//! Great-circle distance, initial bearing, and the thematic distance banding
//! that turns a raw distance into narrative feedback. Everything here is
//! deterministic and side-effect-free so puzzle scoring can be unit-tested
//! against fixed coordinate pairs.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters, as used by the haversine formula.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in decimal degrees, positive north.
    pub lat: f64,
    /// Longitude in decimal degrees, positive east.
    pub lon: f64,
}

/// One banding gate: applies when the distance exceeds `threshold_meters`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistanceGate {
    /// Lower bound in meters this gate's text applies beyond.
    pub threshold_meters: f64,
    /// Narrative feedback shown to the player.
    pub text: String,
}

impl DistanceGate {
    /// Builds a gate.
    #[must_use]
    pub fn new(threshold_meters: f64, text: &str) -> Self {
        Self {
            threshold_meters,
            text: text.to_owned(),
        }
    }
}

/// Great-circle distance between two points in meters (haversine).
#[must_use]
pub fn distance_meters(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat_a = a.lat.to_radians();
    let lat_b = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();

    let h = (d_lat / 2.0).sin().powi(2)
        + lat_a.cos() * lat_b.cos() * (d_lon / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_METERS * h.sqrt().asin()
}

/// Initial bearing from `a` to `b` in degrees, 0–360 clockwise from north.
#[must_use]
pub fn initial_bearing_degrees(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat_a = a.lat.to_radians();
    let lat_b = b.lat.to_radians();
    let d_lon = (b.lon - a.lon).to_radians();

    let y = d_lon.sin() * lat_b.cos();
    let x = lat_a.cos() * lat_b.sin() - lat_a.sin() * lat_b.cos() * d_lon.cos();

    y.atan2(x).to_degrees().rem_euclid(360.0)
}

/// Maps a bearing to an 8-wind compass point for client feedback.
#[must_use]
pub fn compass_point(bearing_degrees: f64) -> &'static str {
    const WINDS: [&str; 8] = ["N", "NE", "E", "SE", "S", "SW", "W", "NW"];
    let normalized = bearing_degrees.rem_euclid(360.0);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let index = ((normalized + 22.5) / 45.0) as usize % 8;
    WINDS[index]
}

/// Selects the gate for a distance.
///
/// Gates are evaluated sorted descending by threshold; the first gate whose
/// threshold the distance exceeds wins. If no gate matches (the player is at
/// or inside the closest threshold), the closest-range gate is the fallback.
/// Returns `None` only for an empty gate list, which the catalog validator
/// rejects.
#[must_use]
pub fn gate_for_distance(gates: &[DistanceGate], meters: f64) -> Option<&DistanceGate> {
    let mut ordered: Vec<&DistanceGate> = gates.iter().collect();
    ordered.sort_by(|a, b| b.threshold_meters.total_cmp(&a.threshold_meters));

    ordered
        .iter()
        .find(|gate| meters > gate.threshold_meters)
        .or_else(|| ordered.last())
        .copied()
}

/// Selects the narrative text for a distance. See [`gate_for_distance`].
#[must_use]
pub fn band_for_distance(gates: &[DistanceGate], meters: f64) -> Option<&str> {
    gate_for_distance(gates, meters).map(|gate| gate.text.as_str())
}

/// The default gate set for proximity steps that do not configure their own.
/// The zero-threshold gate is the "arrived" text.
#[must_use]
pub fn default_gates() -> Vec<DistanceGate> {
    vec![
        DistanceGate::new(2000.0, "The trail is faint here. You are far from the mark."),
        DistanceGate::new(1000.0, "A long walk still lies between you and the mark."),
        DistanceGate::new(500.0, "You are drawing nearer. Keep moving."),
        DistanceGate::new(200.0, "The mark is close. Watch your surroundings."),
        DistanceGate::new(50.0, "Very close now. Look around you."),
        DistanceGate::new(0.0, "You have arrived."),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE_METERS: f64 = 1.0;

    fn origin() -> GeoPoint {
        GeoPoint { lat: 0.0, lon: 0.0 }
    }

    #[test]
    fn test_distance_between_identical_points_is_zero() {
        let p = GeoPoint {
            lat: 52.5200,
            lon: 13.4050,
        };
        assert!(distance_meters(p, p).abs() < f64::EPSILON);
    }

    #[test]
    fn test_distance_is_symmetric() {
        let a = GeoPoint {
            lat: 52.5200,
            lon: 13.4050,
        };
        let b = GeoPoint {
            lat: 48.8566,
            lon: 2.3522,
        };
        let forward = distance_meters(a, b);
        let backward = distance_meters(b, a);
        assert!((forward - backward).abs() < 1e-6);
    }

    #[test]
    fn test_one_degree_of_longitude_at_the_equator() {
        let b = GeoPoint { lat: 0.0, lon: 1.0 };
        let expected = EARTH_RADIUS_METERS * 1f64.to_radians();
        assert!((distance_meters(origin(), b) - expected).abs() < TOLERANCE_METERS);
    }

    #[test]
    fn test_bearing_due_east_is_90() {
        let b = GeoPoint { lat: 0.0, lon: 1.0 };
        assert!((initial_bearing_degrees(origin(), b) - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_bearing_due_north_is_0() {
        let b = GeoPoint { lat: 1.0, lon: 0.0 };
        assert!(initial_bearing_degrees(origin(), b).abs() < 1e-9);
    }

    #[test]
    fn test_bearing_due_south_is_180() {
        let a = GeoPoint { lat: 1.0, lon: 0.0 };
        assert!((initial_bearing_degrees(a, origin()) - 180.0).abs() < 1e-9);
    }

    #[test]
    fn test_compass_points_cover_the_rose() {
        assert_eq!(compass_point(0.0), "N");
        assert_eq!(compass_point(44.0), "NE");
        assert_eq!(compass_point(90.0), "E");
        assert_eq!(compass_point(135.0), "SE");
        assert_eq!(compass_point(180.0), "S");
        assert_eq!(compass_point(225.0), "SW");
        assert_eq!(compass_point(270.0), "W");
        assert_eq!(compass_point(315.0), "NW");
        assert_eq!(compass_point(359.0), "N");
    }

    #[test]
    fn test_banding_zero_distance_selects_the_arrived_gate() {
        let gates = default_gates();
        assert_eq!(band_for_distance(&gates, 0.0), Some("You have arrived."));
    }

    #[test]
    fn test_banding_selects_tightest_exceeded_gate() {
        let gates = default_gates();
        assert_eq!(
            band_for_distance(&gates, 120.0),
            Some("Very close now. Look around you.")
        );
        assert_eq!(
            band_for_distance(&gates, 750.0),
            Some("You are drawing nearer. Keep moving.")
        );
        assert_eq!(
            band_for_distance(&gates, 5000.0),
            Some("The trail is faint here. You are far from the mark.")
        );
    }

    #[test]
    fn test_banding_handles_unsorted_gate_lists() {
        let gates = vec![
            DistanceGate::new(0.0, "here"),
            DistanceGate::new(1000.0, "far"),
            DistanceGate::new(100.0, "near"),
        ];
        assert_eq!(band_for_distance(&gates, 500.0), Some("near"));
        assert_eq!(band_for_distance(&gates, 2000.0), Some("far"));
        assert_eq!(band_for_distance(&gates, 0.0), Some("here"));
    }

    #[test]
    fn test_banding_empty_gate_list_yields_none() {
        assert_eq!(band_for_distance(&[], 10.0), None);
    }
}
