//! Shared wire types, domain model, and configuration for the spatial
//! analytics pipeline: detections, tracks, scene messages, tracked clusters,
//! and the config structs each service loads at startup.

pub mod cluster;
pub mod config;
pub mod detection;
pub mod error;
pub mod geometry;
pub mod scene;
pub mod track;

pub use cluster::{
    ClusterBatchMessage, ClusterHistory, ClusterId, ClusterObservation, ClusterRecord,
    ClusterState, DbscanParams, MovementPattern, ShapeKind, ShapeSize, TrackedCluster,
    VelocityAnalysis,
};
pub use config::{ClusterAnalyticsConfig, TrackerConfig};
pub use detection::{Detection, DetectionObject};
pub use error::{Error, Result};
pub use geometry::{BoundingBoxPx, Quaternion, Vec3};
pub use scene::{SceneMessage, SceneObject};
pub use track::{CategoryKind, ShiftType, Track, TrackId};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cluster_state_publishable_filter() {
        assert!(!ClusterState::New.is_publishable());
        assert!(ClusterState::Active.is_publishable());
        assert!(ClusterState::Stable.is_publishable());
        assert!(ClusterState::Fading.is_publishable());
        assert!(!ClusterState::Lost.is_publishable());
    }

    #[test]
    fn cluster_history_caps_at_100() {
        let mut h = cluster::ClusterHistory::default();
        for i in 0..150 {
            h.push(cluster::ClusterObservation {
                position: Vec3::ZERO,
                velocity: Vec3::ZERO,
                member_count: 1,
                shape: ShapeKind::Circle,
                timestamp: i as f64,
            });
        }
        assert_eq!(h.len(), 100);
        let first = h.iter().next().unwrap();
        assert_eq!(first.timestamp, 50.0);
    }

    #[test]
    fn dbscan_param_precedence() {
        let mut cfg = ClusterAnalyticsConfig::default();
        cfg.dbscan_category_specific.insert(
            "person".to_string(),
            config::DbscanDefaults {
                eps: 2.0,
                min_samples: 4,
            },
        );
        let resolved = cfg.resolve_dbscan_params("person", None);
        assert_eq!(resolved.eps, 2.0);
        assert_eq!(resolved.min_samples, 4);

        let overridden = cfg.resolve_dbscan_params(
            "person",
            Some(config::DbscanDefaultsOverride {
                eps: 3.0,
                min_samples: 5,
            }),
        );
        assert_eq!(overridden.eps, 3.0);

        let fallback = cfg.resolve_dbscan_params("vehicle", None);
        assert_eq!(fallback.eps, cfg.dbscan_default.eps);
    }

    #[test]
    fn track_id_display_and_vec3_distance() {
        let id = TrackId(42);
        assert_eq!(format!("{id}"), "42");
        let a = Vec3::new(0.0, 0.0, 0.0);
        let b = Vec3::new(3.0, 4.0, 0.0);
        approx::assert_relative_eq!(a.distance(&b), 5.0, epsilon = 1e-9);
    }
}
