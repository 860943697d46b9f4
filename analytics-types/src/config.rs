use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

fn default_max_unreliable_time() -> f64 {
    2.0
}

fn default_non_measurement_time_dynamic() -> f64 {
    1.0
}

fn default_non_measurement_time_static() -> f64 {
    30.0
}

fn default_regulate_rate() -> f64 {
    10.0
}

fn default_queue_capacity() -> usize {
    1
}

/// Per-scene object tracker settings (spec section 6.5, upper half of the
/// table: track lifetime and regulation cadence).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrackerConfig {
    #[serde(default = "default_max_unreliable_time")]
    pub max_unreliable_time: f64,
    #[serde(default = "default_non_measurement_time_dynamic")]
    pub non_measurement_time_dynamic: f64,
    #[serde(default = "default_non_measurement_time_static")]
    pub non_measurement_time_static: f64,
    #[serde(default = "default_regulate_rate")]
    pub regulate_rate: f64,
    /// Capacity of each category worker's pending-item slot. Spec section 5
    /// requires "bounded single-item queue"; kept configurable for tests.
    #[serde(default = "default_queue_capacity")]
    pub worker_queue_capacity: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            max_unreliable_time: default_max_unreliable_time(),
            non_measurement_time_dynamic: default_non_measurement_time_dynamic(),
            non_measurement_time_static: default_non_measurement_time_static(),
            regulate_rate: default_regulate_rate(),
            worker_queue_capacity: default_queue_capacity(),
        }
    }
}

impl TrackerConfig {
    pub fn regulate_period(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / self.regulate_rate)
    }
}

fn default_eps() -> f64 {
    1.0
}

fn default_min_samples() -> usize {
    3
}

fn default_shape_variance_threshold() -> f64 {
    0.5
}

fn default_quadrant_angle() -> f64 {
    std::f64::consts::FRAC_PI_2
}

fn default_angle_distribution_threshold() -> f64 {
    0.5
}

fn default_linear_formation_area_threshold() -> f64 {
    0.5
}

fn default_alignment_threshold() -> f64 {
    0.5
}

fn default_convergence_divergence_ratio_threshold() -> f64 {
    0.6
}

fn default_stationary_threshold() -> f64 {
    0.1
}

fn default_velocity_coherence_threshold() -> f64 {
    0.3
}

fn default_frames_to_activate() -> u64 {
    3
}

fn default_frames_to_stable() -> u64 {
    20
}

fn default_frames_to_fade() -> u64 {
    5
}

fn default_frames_to_lost() -> u64 {
    10
}

fn default_initial_confidence() -> f64 {
    0.5
}

fn default_activation_threshold() -> f64 {
    0.6
}

fn default_stability_threshold() -> f64 {
    0.7
}

fn default_confidence_miss_penalty() -> f64 {
    0.1
}

fn default_confidence_max_miss_penalty() -> f64 {
    0.5
}

fn default_confidence_longevity_bonus_max() -> f64 {
    0.2
}

fn default_confidence_longevity_frames() -> f64 {
    100.0
}

fn default_archive_time_threshold() -> f64 {
    5.0
}

fn default_max_archived_clusters() -> usize {
    50
}

fn default_max_matching_distance() -> f64 {
    5.0
}

fn default_position_weight() -> f64 {
    0.4
}

fn default_velocity_weight() -> f64 {
    0.3
}

fn default_size_weight() -> f64 {
    0.2
}

fn default_shape_weight() -> f64 {
    0.1
}

fn default_eps_change_ratio_threshold() -> f64 {
    0.5
}

/// Global and per-category DBSCAN defaults (section 6.5:
/// `dbscan.default.*`, `dbscan.category_specific.<cat>.*`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DbscanDefaults {
    #[serde(default = "default_eps")]
    pub eps: f64,
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
}

impl Default for DbscanDefaults {
    fn default() -> Self {
        DbscanDefaults {
            eps: default_eps(),
            min_samples: default_min_samples(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShapeThresholds {
    #[serde(default = "default_shape_variance_threshold")]
    pub variance_threshold: f64,
    #[serde(default = "default_quadrant_angle")]
    pub quadrant_angle: f64,
    #[serde(default = "default_angle_distribution_threshold")]
    pub angle_distribution_threshold: f64,
    #[serde(default = "default_linear_formation_area_threshold")]
    pub linear_formation_area_threshold: f64,
}

impl Default for ShapeThresholds {
    fn default() -> Self {
        ShapeThresholds {
            variance_threshold: default_shape_variance_threshold(),
            quadrant_angle: default_quadrant_angle(),
            angle_distribution_threshold: default_angle_distribution_threshold(),
            linear_formation_area_threshold: default_linear_formation_area_threshold(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MovementThresholds {
    #[serde(default = "default_alignment_threshold")]
    pub alignment_threshold: f64,
    #[serde(default = "default_convergence_divergence_ratio_threshold")]
    pub convergence_divergence_ratio_threshold: f64,
    #[serde(default = "default_stationary_threshold")]
    pub stationary_threshold: f64,
    #[serde(default = "default_velocity_coherence_threshold")]
    pub velocity_coherence_threshold: f64,
}

impl Default for MovementThresholds {
    fn default() -> Self {
        MovementThresholds {
            alignment_threshold: default_alignment_threshold(),
            convergence_divergence_ratio_threshold: default_convergence_divergence_ratio_threshold(),
            stationary_threshold: default_stationary_threshold(),
            velocity_coherence_threshold: default_velocity_coherence_threshold(),
        }
    }
}

/// `cluster_tracking.state_transitions.*`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StateTransitionThresholds {
    #[serde(default = "default_frames_to_activate")]
    pub frames_to_activate: u64,
    #[serde(default = "default_frames_to_stable")]
    pub frames_to_stable: u64,
    #[serde(default = "default_frames_to_fade")]
    pub frames_to_fade: u64,
    #[serde(default = "default_frames_to_lost")]
    pub frames_to_lost: u64,
}

impl Default for StateTransitionThresholds {
    fn default() -> Self {
        StateTransitionThresholds {
            frames_to_activate: default_frames_to_activate(),
            frames_to_stable: default_frames_to_stable(),
            frames_to_fade: default_frames_to_fade(),
            frames_to_lost: default_frames_to_lost(),
        }
    }
}

/// `cluster_tracking.confidence.*`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfidenceConstants {
    #[serde(default = "default_initial_confidence")]
    pub initial_confidence: f64,
    #[serde(default = "default_activation_threshold")]
    pub activation_threshold: f64,
    #[serde(default = "default_stability_threshold")]
    pub stability_threshold: f64,
    #[serde(default = "default_confidence_miss_penalty")]
    pub miss_penalty: f64,
    #[serde(default = "default_confidence_max_miss_penalty")]
    pub max_miss_penalty: f64,
    #[serde(default = "default_confidence_longevity_bonus_max")]
    pub longevity_bonus_max: f64,
    #[serde(default = "default_confidence_longevity_frames")]
    pub longevity_frames: f64,
}

impl Default for ConfidenceConstants {
    fn default() -> Self {
        ConfidenceConstants {
            initial_confidence: default_initial_confidence(),
            activation_threshold: default_activation_threshold(),
            stability_threshold: default_stability_threshold(),
            miss_penalty: default_confidence_miss_penalty(),
            max_miss_penalty: default_confidence_max_miss_penalty(),
            longevity_bonus_max: default_confidence_longevity_bonus_max(),
            longevity_frames: default_confidence_longevity_frames(),
        }
    }
}

/// `cluster_tracking.archival.*`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArchivalConstants {
    #[serde(default = "default_archive_time_threshold")]
    pub archive_time_threshold: f64,
    #[serde(default = "default_max_archived_clusters")]
    pub max_archived_clusters: usize,
}

impl Default for ArchivalConstants {
    fn default() -> Self {
        ArchivalConstants {
            archive_time_threshold: default_archive_time_threshold(),
            max_archived_clusters: default_max_archived_clusters(),
        }
    }
}

/// Matching cost weights and distance cutoff for C7 (Hungarian assignment).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MatchingConstants {
    #[serde(default = "default_max_matching_distance")]
    pub max_matching_distance: f64,
    #[serde(default = "default_position_weight")]
    pub position_weight: f64,
    #[serde(default = "default_velocity_weight")]
    pub velocity_weight: f64,
    #[serde(default = "default_size_weight")]
    pub size_weight: f64,
    #[serde(default = "default_shape_weight")]
    pub shape_weight: f64,
}

impl Default for MatchingConstants {
    fn default() -> Self {
        MatchingConstants {
            max_matching_distance: default_max_matching_distance(),
            position_weight: default_position_weight(),
            velocity_weight: default_velocity_weight(),
            size_weight: default_size_weight(),
            shape_weight: default_shape_weight(),
        }
    }
}

/// All configuration recognized by the cluster-analytics process (section
/// 6.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClusterAnalyticsConfig {
    #[serde(default)]
    pub dbscan_default: DbscanDefaults,
    #[serde(default)]
    pub dbscan_category_specific: BTreeMap<String, DbscanDefaults>,
    #[serde(default)]
    pub shape: ShapeThresholds,
    #[serde(default)]
    pub movement: MovementThresholds,
    #[serde(default)]
    pub state_transitions: StateTransitionThresholds,
    #[serde(default)]
    pub confidence: ConfidenceConstants,
    #[serde(default)]
    pub archival: ArchivalConstants,
    #[serde(default)]
    pub matching: MatchingConstants,
    /// Threshold for what counts as a "significant" DBSCAN parameter change
    /// (section 4.5): `|Δeps|/max(eps,0.1) > threshold OR Δmin_samples != 0`.
    #[serde(default = "default_eps_change_ratio_threshold")]
    pub eps_change_ratio_threshold: f64,
}

impl Default for ClusterAnalyticsConfig {
    fn default() -> Self {
        ClusterAnalyticsConfig {
            dbscan_default: DbscanDefaults::default(),
            dbscan_category_specific: BTreeMap::new(),
            shape: ShapeThresholds::default(),
            movement: MovementThresholds::default(),
            state_transitions: StateTransitionThresholds::default(),
            confidence: ConfidenceConstants::default(),
            archival: ArchivalConstants::default(),
            matching: MatchingConstants::default(),
            eps_change_ratio_threshold: default_eps_change_ratio_threshold(),
        }
    }
}

impl ClusterAnalyticsConfig {
    /// Resolve `(eps, min_samples)` for a category, applying the
    /// per-scene-override > category-default > global-default precedence
    /// (section 4.5). `scene_override` is looked up by the caller, which
    /// owns the per-scene user-parameter store (section 9 "global mutable
    /// `user_dbscan_params_by_scene`" redesign).
    pub fn resolve_dbscan_params(
        &self,
        category: &str,
        scene_override: Option<DbscanDefaultsOverride>,
    ) -> crate::cluster::DbscanParams {
        if let Some(o) = scene_override {
            return crate::cluster::DbscanParams {
                eps: o.eps,
                min_samples: o.min_samples,
            };
        }
        if let Some(cat) = self.dbscan_category_specific.get(category) {
            return crate::cluster::DbscanParams {
                eps: cat.eps,
                min_samples: cat.min_samples,
            };
        }
        crate::cluster::DbscanParams {
            eps: self.dbscan_default.eps,
            min_samples: self.dbscan_default.min_samples,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DbscanDefaultsOverride {
    pub eps: f64,
    pub min_samples: usize,
}

/// Load a TOML config file, applying defaults for every absent field. A
/// missing file is a fatal configuration error (spec section 7 item 6).
pub fn load_toml<T: for<'de> Deserialize<'de>>(path: &std::path::Path) -> Result<T> {
    if !path.exists() {
        return Err(Error::MissingConfigFile(path.to_path_buf()));
    }
    let text = std::fs::read_to_string(path)?;
    let value: T = toml::from_str(&text)?;
    Ok(value)
}
