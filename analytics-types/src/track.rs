use serde::{Deserialize, Serialize};

use crate::geometry::Vec3;

/// Stable, process-unique track identifier. Never reused after retirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TrackId(pub u64);

impl std::fmt::Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether an object category is expected to move (governs which
/// `non_measurement_time_*` retirement timer applies).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CategoryKind {
    Dynamic,
    Static,
}

/// How the worker should shift a track's predicted position forward in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShiftType {
    Velocity,
    None,
}

/// One tracked real-world object, owned exclusively by its category worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub category: String,
    pub position: Vec3,
    pub velocity: Vec3,
    pub size: Vec3,
    pub buffer_size: Vec3,
    pub tracking_radius: f64,
    pub confidence: f64,
    /// Seconds since the last update was judged unreliable (resets on a
    /// reliable match, advances otherwise).
    pub reliability_timer: f64,
    /// Seconds since the last measurement was absorbed.
    pub measurement_age: f64,
    pub predicted_position: Vec3,
    pub persistent_attributes: std::collections::BTreeMap<String, serde_json::Value>,
    pub project_to_map: bool,
    pub rotation_from_velocity: bool,
    pub shift_type: ShiftType,
    pub last_time: f64,
    pub unreliable: bool,
}

impl Track {
    pub fn new(id: TrackId, category: impl Into<String>, position: Vec3, when: f64, tracking_radius: f64) -> Self {
        Track {
            id,
            category: category.into(),
            position,
            velocity: Vec3::ZERO,
            size: Vec3::ZERO,
            buffer_size: Vec3::ZERO,
            tracking_radius,
            confidence: 1.0,
            reliability_timer: 0.0,
            measurement_age: 0.0,
            predicted_position: position,
            persistent_attributes: Default::default(),
            project_to_map: false,
            rotation_from_velocity: false,
            shift_type: ShiftType::Velocity,
            last_time: when,
            unreliable: false,
        }
    }
}
