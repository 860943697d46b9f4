use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::geometry::{BoundingBoxPx, Quaternion, Vec3};

/// One detected object within a single camera frame, as received over the
/// wire (section 6.2 of the camera detection schema).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionObject {
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub id: Option<String>,
    pub confidence: f64,
    pub bounding_box_px: BoundingBoxPx,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub translation: Option<Vec3>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub rotation: Option<Quaternion>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub velocity: Option<Vec3>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reid: Option<String>,
}

impl DetectionObject {
    /// Position used for tracking: the scene-metric translation when present,
    /// else the origin (upstream calibration failure; still tracked so the
    /// category worker can apply its own gating rather than silently drop).
    pub fn position(&self) -> Vec3 {
        self.translation.unwrap_or(Vec3::ZERO)
    }
}

/// Immutable camera detection payload for one camera at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub id: String,
    pub timestamp: serde_json::Value,
    pub objects: Vec<DetectionObject>,
}

impl Detection {
    pub fn camera_id(&self) -> &str {
        &self.id
    }

    /// Coerce the wire timestamp (ISO-8601 string, float seconds, or
    /// missing) into a float-seconds epoch value, falling back to `fallback`
    /// (normally wall-clock time) rather than failing ingestion outright.
    pub fn timestamp_secs(&self, fallback: f64) -> f64 {
        match &self.timestamp {
            serde_json::Value::Number(n) => n.as_f64().unwrap_or(fallback),
            serde_json::Value::String(s) => {
                datetime_conversion::parse_iso8601_to_f64(s).unwrap_or(fallback)
            }
            _ => fallback,
        }
    }

    pub fn from_json(payload: &[u8]) -> Result<Self> {
        serde_json::from_slice(payload)
            .map_err(|e| Error::MalformedPayload(format!("camera detection: {e}")))
    }
}
