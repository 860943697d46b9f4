use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use analytics_types::{DetectionObject, SceneObject, TrackerConfig};
use parking_lot::{Mutex, RwLock};
use tracing::info;

use crate::worker::{CategoryWorker, InputMode, WorkerParams};

/// Tracks which object categories are "static" (governed by
/// `non_measurement_time_static`) versus the default "dynamic" timeout.
/// Constructed explicitly and passed in (section 9: "module-level
/// `object_classes` dict" becomes "a per-process registry passed explicitly
/// into C3 at construction; no singletons").
#[derive(Debug, Clone, Default)]
pub struct CategoryRegistry {
    static_categories: std::collections::BTreeSet<String>,
    tracking_radii: BTreeMap<String, f64>,
}

impl CategoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_static(mut self, category: impl Into<String>) -> Self {
        self.static_categories.insert(category.into());
        self
    }

    pub fn with_tracking_radius(mut self, category: impl Into<String>, radius: f64) -> Self {
        self.tracking_radii.insert(category.into(), radius);
        self
    }

    fn is_static(&self, category: &str) -> bool {
        self.static_categories.contains(category)
    }

    fn tracking_radius(&self, category: &str) -> f64 {
        self.tracking_radii.get(category).copied().unwrap_or(1.0)
    }
}

/// Demultiplexes detections by category, lazily creates workers, and
/// aggregates current tracks across categories (section 4.3).
pub struct SceneTracker {
    scene_id: String,
    config: TrackerConfig,
    registry: CategoryRegistry,
    workers: RwLock<BTreeMap<String, CategoryWorker>>,
    next_track_id: Arc<AtomicU64>,
    connected_cameras: Mutex<std::collections::BTreeSet<String>>,
    reference_frame_rate: Arc<Mutex<f64>>,
    camera_frame_rates: Mutex<BTreeMap<String, f64>>,
    join_deadline: Duration,
    drop_counter: AtomicUsize,
}

impl SceneTracker {
    pub fn new(scene_id: impl Into<String>, config: TrackerConfig, registry: CategoryRegistry) -> Self {
        SceneTracker {
            scene_id: scene_id.into(),
            config,
            registry,
            workers: RwLock::new(BTreeMap::new()),
            next_track_id: Arc::new(AtomicU64::new(1)),
            connected_cameras: Mutex::new(Default::default()),
            reference_frame_rate: Arc::new(Mutex::new(30.0)),
            camera_frame_rates: Mutex::new(BTreeMap::new()),
            join_deadline: Duration::from_secs(2),
            drop_counter: AtomicUsize::new(0),
        }
    }

    pub fn scene_id(&self) -> &str {
        &self.scene_id
    }

    /// Update the tracked frame-rate for one camera; the scene's reference
    /// rate is the minimum across connected cameras (section 3: "a reference
    /// camera frame-rate (the minimum of connected cameras...)").
    pub fn note_camera_frame_rate(&self, camera_id: &str, fps: f64) {
        self.connected_cameras.lock().insert(camera_id.to_string());
        self.camera_frame_rates.lock().insert(camera_id.to_string(), fps);
        let min_fps = self
            .camera_frame_rates
            .lock()
            .values()
            .cloned()
            .fold(f64::INFINITY, f64::min);
        if min_fps.is_finite() {
            *self.reference_frame_rate.lock() = min_fps;
        }
    }

    pub fn reference_frame_rate(&self) -> f64 {
        *self.reference_frame_rate.lock()
    }

    pub fn connected_camera_count(&self) -> usize {
        self.connected_cameras.lock().len()
    }

    fn worker_params(&self, category: &str) -> WorkerParams {
        let non_measurement_time = if self.registry.is_static(category) {
            self.config.non_measurement_time_static
        } else {
            self.config.non_measurement_time_dynamic
        };
        WorkerParams {
            max_unreliable_time: self.config.max_unreliable_time,
            non_measurement_time,
            default_tracking_radius: self.registry.tracking_radius(category),
        }
    }

    fn worker_for(&self, category: &str) -> CategoryWorkerHandle<'_> {
        {
            let workers = self.workers.read();
            if workers.contains_key(category) {
                return CategoryWorkerHandle { tracker: self, category: category.to_string() };
            }
        }
        let mut workers = self.workers.write();
        if !workers.contains_key(category) {
            let params = self.worker_params(category);
            let worker = CategoryWorker::spawn(
                category,
                params,
                self.next_track_id.clone(),
                self.config.worker_queue_capacity,
            );
            info!(scene = %self.scene_id, category, "category worker created");
            workers.insert(category.to_string(), worker);
        }
        CategoryWorkerHandle { tracker: self, category: category.to_string() }
    }

    /// Route one camera's detections to their per-category workers, creating
    /// workers lazily for newly-seen categories.
    pub fn dispatch(&self, _camera_id: &str, when: f64, objects: Vec<DetectionObject>, mode: InputMode) {
        let mut by_category: BTreeMap<String, Vec<DetectionObject>> = BTreeMap::new();
        for obj in objects {
            by_category.entry(obj.category.clone()).or_default().push(obj);
        }
        for (category, objs) in by_category {
            let handle = self.worker_for(&category);
            let accepted = handle.enqueue(vec![objs], when, false, mode);
            if !accepted {
                self.drop_counter.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    /// Merge the latest published snapshot across all workers, optionally
    /// restricted to one category, sorted by category then track id for a
    /// deterministic ordering.
    pub fn current_objects(&self, category: Option<&str>) -> Vec<SceneObject> {
        let workers = self.workers.read();
        let mut out = Vec::new();
        match category {
            Some(cat) => {
                if let Some(w) = workers.get(cat) {
                    out.extend(w.current_objects().iter().cloned());
                }
            }
            None => {
                for w in workers.values() {
                    out.extend(w.current_objects().iter().cloned());
                }
            }
        }
        out.sort_by(|a, b| a.category.cmp(&b.category).then(a.id.cmp(&b.id)));
        out
    }

    pub fn dropped_messages(&self) -> usize {
        self.drop_counter.load(Ordering::SeqCst)
    }

    /// Signal every worker to retire, draining its pending item and joining
    /// within the configured deadline. Safe to call through a shared
    /// `Arc<SceneTracker>`: draining the worker map out from under the lock
    /// does not require unique ownership of the tracker itself.
    pub fn shutdown(&self) {
        let workers = std::mem::take(&mut *self.workers.write());
        for (category, worker) in workers {
            info!(scene = %self.scene_id, category = %category, "retiring category worker");
            worker.retire(self.join_deadline);
        }
    }
}

/// Thin accessor used internally by [`SceneTracker::dispatch`] so the read
/// lock guarding the worker map is released before `enqueue` runs.
struct CategoryWorkerHandle<'a> {
    tracker: &'a SceneTracker,
    category: String,
}

impl<'a> CategoryWorkerHandle<'a> {
    fn enqueue(&self, objects: Vec<Vec<DetectionObject>>, when: f64, already_tracked: bool, mode: InputMode) -> bool {
        let workers = self.tracker.workers.read();
        match workers.get(&self.category) {
            Some(w) => w.enqueue(objects, when, already_tracked, mode),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analytics_types::{BoundingBoxPx, Vec3};

    fn det(category: &str, x: f64, y: f64) -> DetectionObject {
        DetectionObject {
            category: category.to_string(),
            id: None,
            confidence: 0.8,
            bounding_box_px: BoundingBoxPx { x: 0.0, y: 0.0, width: 1.0, height: 1.0 },
            translation: Some(Vec3::new(x, y, 0.0)),
            rotation: None,
            velocity: None,
            reid: None,
        }
    }

    #[test]
    fn lazy_worker_creation_and_category_merge() {
        let tracker = SceneTracker::new("scene-1", TrackerConfig::default(), CategoryRegistry::new());
        tracker.dispatch("cam1", 0.0, vec![det("person", 1.0, 1.0), det("vehicle", 5.0, 5.0)], InputMode::Streaming);
        std::thread::sleep(Duration::from_millis(100));
        let all = tracker.current_objects(None);
        assert_eq!(all.len(), 2);
        let persons = tracker.current_objects(Some("person"));
        assert_eq!(persons.len(), 1);
        tracker.shutdown();
    }

    #[test]
    fn reference_frame_rate_is_minimum_across_cameras() {
        let tracker = SceneTracker::new("scene-1", TrackerConfig::default(), CategoryRegistry::new());
        tracker.note_camera_frame_rate("cam1", 30.0);
        tracker.note_camera_frame_rate("cam2", 15.0);
        assert_eq!(tracker.reference_frame_rate(), 15.0);
        tracker.shutdown();
    }
}
