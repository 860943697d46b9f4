use serde::{Deserialize, Serialize};

use crate::geometry::Vec3;

/// Stable, process-unique tracked-cluster identifier. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClusterId(pub u64);

impl std::fmt::Display for ClusterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterState {
    New,
    Active,
    Stable,
    Fading,
    Lost,
}

impl ClusterState {
    /// States whose members participate in assignment matching (spec 4.8
    /// step 2: "trackable" clusters).
    pub fn is_trackable(&self) -> bool {
        !matches!(self, ClusterState::Lost)
    }

    /// States published externally; NEW is suppressed to avoid flicker and
    /// LOST is archival-only (spec 4.8 "Publishable filter").
    pub fn is_publishable(&self) -> bool {
        matches!(self, ClusterState::Active | ClusterState::Stable | ClusterState::Fading)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    InsufficientPoints,
    Circle,
    Rectangle,
    Line,
    Irregular,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", content = "size", rename_all = "snake_case")]
pub enum ShapeSize {
    InsufficientPoints,
    Circle {
        radius: f64,
        diameter: f64,
        area: f64,
        circumference: f64,
    },
    Rectangle {
        width: f64,
        height: f64,
        area: f64,
        perimeter: f64,
        corner_points: [[f64; 2]; 4],
    },
    Line {
        length: f64,
        endpoints: [[f64; 2]; 2],
        width_spread: f64,
    },
    Irregular {
        bounding_width: f64,
        bounding_height: f64,
        bounding_area: f64,
        point_spread: f64,
    },
}

impl ShapeSize {
    pub fn kind(&self) -> ShapeKind {
        match self {
            ShapeSize::InsufficientPoints => ShapeKind::InsufficientPoints,
            ShapeSize::Circle { .. } => ShapeKind::Circle,
            ShapeSize::Rectangle { .. } => ShapeKind::Rectangle,
            ShapeSize::Line { .. } => ShapeKind::Line,
            ShapeSize::Irregular { .. } => ShapeKind::Irregular,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementPattern {
    InsufficientData,
    Stationary,
    CoordinatedParallel,
    Converging,
    Diverging,
    LooselyCoordinated,
    Chaotic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VelocityAnalysis {
    pub movement_type: MovementPattern,
    pub average_velocity: Vec3,
    pub velocity_magnitude: f64,
    pub movement_direction_degrees: f64,
    pub velocity_coherence: f64,
}

impl VelocityAnalysis {
    pub fn insufficient_data() -> Self {
        VelocityAnalysis {
            movement_type: MovementPattern::InsufficientData,
            average_velocity: Vec3::ZERO,
            velocity_magnitude: 0.0,
            movement_direction_degrees: 0.0,
            velocity_coherence: 0.0,
        }
    }
}

/// Density-clustering parameters actually applied when a detection was
/// produced (resolved precedence: per-scene override > category default >
/// global default).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DbscanParams {
    pub eps: f64,
    pub min_samples: usize,
}

/// One bounded observation of a tracked cluster, appended on every update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterObservation {
    pub position: Vec3,
    pub velocity: Vec3,
    pub member_count: usize,
    pub shape: ShapeKind,
    pub timestamp: f64,
}

/// Ring buffer of the most recent observations, capped at 100 (spec 3
/// "bounded observation history").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterHistory {
    observations: std::collections::VecDeque<ClusterObservation>,
}

impl ClusterHistory {
    pub const CAPACITY: usize = 100;

    pub fn push(&mut self, obs: ClusterObservation) {
        self.observations.push_back(obs);
        while self.observations.len() > Self::CAPACITY {
            self.observations.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn recent(&self, n: usize) -> impl Iterator<Item = &ClusterObservation> {
        let skip = self.observations.len().saturating_sub(n);
        self.observations.iter().skip(skip)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClusterObservation> {
        self.observations.iter()
    }
}

/// A cluster whose identity is maintained frame-to-frame via assignment
/// matching (C6/C7/C8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedCluster {
    pub id: ClusterId,
    pub scene_id: String,
    pub category: String,
    pub centroid: Vec3,
    pub shape: ShapeSize,
    pub velocity_analysis: VelocityAnalysis,
    pub object_ids: Vec<String>,
    pub dbscan_params: DbscanParams,
    pub first_seen: f64,
    pub last_seen: f64,
    pub last_updated: f64,
    pub frames_detected: u64,
    pub frames_missed: u64,
    /// Misses since the last successful match; drives the ACTIVE/STABLE →
    /// FADING → LOST transitions independently of the cumulative
    /// `frames_missed` counter used by the confidence formula. Reset to 0 on
    /// every match.
    pub consecutive_misses: u64,
    pub confidence: f64,
    pub stability_score: f64,
    pub predicted_position: Vec3,
    pub state: ClusterState,
    pub history: ClusterHistory,
}

impl TrackedCluster {
    pub fn total_frames(&self) -> u64 {
        self.frames_detected + self.frames_missed
    }

    pub fn age_seconds(&self, now: f64) -> f64 {
        (now - self.first_seen).max(0.0)
    }

    pub fn time_since_last_seen(&self, now: f64) -> f64 {
        (now - self.last_seen).max(0.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingInfo {
    pub state: ClusterState,
    pub confidence: f64,
    pub stability_score: f64,
    pub frames_detected: u64,
    pub frames_missed: u64,
    pub age_seconds: f64,
    pub time_since_last_seen: f64,
    pub first_seen: f64,
    pub last_seen: f64,
    pub predicted_position: PlanarPoint,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PlanarPoint {
    pub x: f64,
    pub y: f64,
}

impl From<Vec3> for PlanarPoint {
    fn from(v: Vec3) -> Self {
        PlanarPoint { x: v.x, y: v.y }
    }
}

/// One cluster entry in the published cluster batch message (section 6.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterRecord {
    pub id: ClusterId,
    pub category: String,
    pub objects_count: usize,
    pub center_of_mass: PlanarPoint,
    pub shape_analysis: ShapeSize,
    pub velocity_analysis: VelocityAnalysis,
    pub object_ids: Vec<String>,
    pub dbscan_params: DbscanParams,
    pub tracking: TrackingInfo,
}

impl ClusterRecord {
    pub fn from_tracked(c: &TrackedCluster, now: f64) -> Self {
        ClusterRecord {
            id: c.id,
            category: c.category.clone(),
            objects_count: c.object_ids.len(),
            center_of_mass: c.centroid.into(),
            shape_analysis: c.shape.clone(),
            velocity_analysis: c.velocity_analysis.clone(),
            object_ids: c.object_ids.clone(),
            dbscan_params: c.dbscan_params,
            tracking: TrackingInfo {
                state: c.state,
                confidence: c.confidence,
                stability_score: c.stability_score,
                frames_detected: c.frames_detected,
                frames_missed: c.frames_missed,
                age_seconds: c.age_seconds(now),
                time_since_last_seen: c.time_since_last_seen(now),
                first_seen: c.first_seen,
                last_seen: c.last_seen,
                predicted_position: c.predicted_position.into(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterBatchSummary {
    pub categories: Vec<String>,
    pub total_objects: usize,
}

/// The cluster batch message published by the cluster coordinator (C8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterBatchMessage {
    pub scene_id: String,
    pub scene_name: String,
    pub timestamp: f64,
    pub clusters: Vec<ClusterRecord>,
    pub summary: ClusterBatchSummary,
}

impl ClusterBatchMessage {
    pub fn new(scene_id: impl Into<String>, scene_name: impl Into<String>, timestamp: f64, clusters: Vec<ClusterRecord>) -> Self {
        let mut categories: Vec<String> = clusters.iter().map(|c| c.category.clone()).collect();
        categories.sort();
        categories.dedup();
        let total_objects = clusters.iter().map(|c| c.objects_count).sum();
        ClusterBatchMessage {
            scene_id: scene_id.into(),
            scene_name: scene_name.into(),
            timestamp,
            clusters,
            summary: ClusterBatchSummary { categories, total_objects },
        }
    }
}
