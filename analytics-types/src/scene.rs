use serde::{Deserialize, Serialize};

use crate::geometry::{Quaternion, Vec3};
use crate::track::TrackId;

/// One fused object as published on the scene-regulated topic (section 6.3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneObject {
    pub category: String,
    pub id: TrackId,
    pub translation: Vec3,
    pub velocity: Vec3,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub rotation: Option<Quaternion>,
    pub size: Vec3,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneSummary {
    pub categories: Vec<String>,
    pub total_objects: usize,
}

/// The scene-regulated message published by the rate regulator (C4) and
/// consumed by the cluster coordinator (C8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneMessage {
    pub scene_id: String,
    pub scene_name: String,
    pub timestamp: f64,
    pub objects: Vec<SceneObject>,
    pub summary: SceneSummary,
}

impl SceneMessage {
    pub fn new(scene_id: impl Into<String>, scene_name: impl Into<String>, timestamp: f64, objects: Vec<SceneObject>) -> Self {
        let mut categories: Vec<String> = objects.iter().map(|o| o.category.clone()).collect();
        categories.sort();
        categories.dedup();
        let summary = SceneSummary {
            categories,
            total_objects: objects.len(),
        };
        SceneMessage {
            scene_id: scene_id.into(),
            scene_name: scene_name.into(),
            timestamp,
            objects,
            summary,
        }
    }
}
