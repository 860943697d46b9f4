use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use analytics_types::{DetectionObject, SceneObject, ShiftType, Track, TrackId};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

/// How detections arrive at [`CategoryWorker::enqueue`] (section 4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    /// One camera's objects per call; fused against the current track set.
    Streaming,
    /// Multiple cameras' object lists per call; fused across cameras first.
    Batched,
}

#[derive(Debug, Clone)]
pub struct WorkItem {
    pub objects: Vec<Vec<DetectionObject>>,
    pub when: f64,
    pub already_tracked: bool,
    pub mode: InputMode,
}

impl WorkItem {
    /// `STREAMING` passes one camera's objects through untouched; `BATCHED`
    /// first fuses near-duplicate detections contributed by different
    /// cameras into a single representative object, before the rest of the
    /// predict/associate/update pipeline runs identically either way.
    fn fused_detections(&self, fusion_radius: f64) -> Vec<DetectionObject> {
        match self.mode {
            InputMode::Streaming => self.objects.iter().flatten().cloned().collect(),
            InputMode::Batched => fuse_across_cameras(self.objects.iter().flatten(), fusion_radius),
        }
    }
}

/// Greedily merge detections within `radius` of one another (typically
/// contributed by different cameras observing the same real object) into a
/// single averaged detection.
fn fuse_across_cameras<'a>(
    objects: impl Iterator<Item = &'a DetectionObject>,
    radius: f64,
) -> Vec<DetectionObject> {
    let items: Vec<&DetectionObject> = objects.collect();
    let mut used = vec![false; items.len()];
    let mut fused = Vec::new();

    for i in 0..items.len() {
        if used[i] {
            continue;
        }
        let mut group = vec![i];
        used[i] = true;
        for j in (i + 1)..items.len() {
            if used[j] {
                continue;
            }
            if items[i].position().distance(&items[j].position()) <= radius {
                group.push(j);
                used[j] = true;
            }
        }
        let n = group.len() as f64;
        let mut position = analytics_types::Vec3::ZERO;
        let mut velocity = analytics_types::Vec3::ZERO;
        let mut confidence = 0.0;
        for &idx in &group {
            position = position.add(&items[idx].position());
            velocity = velocity.add(&items[idx].velocity.unwrap_or(analytics_types::Vec3::ZERO));
            confidence += items[idx].confidence;
        }
        let mut merged = items[group[0]].clone();
        merged.translation = Some(position.scale(1.0 / n));
        merged.velocity = Some(velocity.scale(1.0 / n));
        merged.confidence = confidence / n;
        fused.push(merged);
    }
    fused
}

/// Parameters governing a single category worker's track lifecycle, a view
/// onto [`analytics_types::TrackerConfig`] resolved for one category.
#[derive(Debug, Clone, Copy)]
pub struct WorkerParams {
    pub max_unreliable_time: f64,
    pub non_measurement_time: f64,
    pub default_tracking_radius: f64,
}

/// Recency-biased smoothing constants for the update step: a simple
/// alpha-beta (g-h) filter, deterministic given identical inputs.
const POSITION_ALPHA: f64 = 0.85;
const VELOCITY_BETA: f64 = 0.5;

/// One worker per (scene, category), running the predict/associate/update/
/// birth/age/publish loop on a dedicated thread (section 4.2, 5).
pub struct CategoryWorker {
    category: String,
    sender: channellib::Sender<WorkItem>,
    shutdown: Arc<AtomicBool>,
    snapshot: Arc<RwLock<Arc<Vec<SceneObject>>>>,
    dropped_messages: Arc<AtomicU64>,
    handle: Option<std::thread::JoinHandle<()>>,
}

struct WorkerState {
    category: String,
    params: WorkerParams,
    next_id: Arc<AtomicU64>,
    tracks: BTreeMap<TrackId, Track>,
    external_ids: BTreeMap<String, TrackId>,
}

impl WorkerState {
    fn non_measurement_timeout(&self) -> f64 {
        self.params.non_measurement_time
    }

    fn run_frame(&mut self, item: &WorkItem) {
        let when = item.when;

        for track in self.tracks.values_mut() {
            let dt = (when - track.last_time).max(0.0);
            track.predicted_position = match track.shift_type {
                ShiftType::Velocity => track.position.add(&track.velocity.scale(dt)),
                ShiftType::None => track.position,
            };
        }

        let detections = item.fused_detections(self.params.default_tracking_radius / 2.0);

        let mut matched_tracks: std::collections::BTreeSet<TrackId> = Default::default();
        let mut matched_detections: std::collections::BTreeSet<usize> = Default::default();

        if item.already_tracked {
            for (idx, det) in detections.iter().enumerate() {
                if let Some(ext_id) = &det.id {
                    if let Some(&track_id) = self.external_ids.get(ext_id) {
                        if self.tracks.contains_key(&track_id) {
                            matched_tracks.insert(track_id);
                            matched_detections.insert(idx);
                            self.update_track(track_id, det, when);
                        }
                    }
                }
            }
        } else {
            let mut candidates: Vec<(f64, TrackId, usize)> = Vec::new();
            for (track_id, track) in self.tracks.iter() {
                for (idx, det) in detections.iter().enumerate() {
                    let dist = track.predicted_position.distance(&det.position());
                    if dist <= track.tracking_radius {
                        candidates.push((dist, *track_id, idx));
                    }
                }
            }
            candidates.sort_by(|a, b| {
                a.0.partial_cmp(&b.0)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.1.cmp(&b.1))
            });
            for (_, track_id, idx) in candidates {
                if matched_tracks.contains(&track_id) || matched_detections.contains(&idx) {
                    continue;
                }
                matched_tracks.insert(track_id);
                matched_detections.insert(idx);
                self.update_track(track_id, &detections[idx], when);
            }
        }

        for (idx, det) in detections.iter().enumerate() {
            if matched_detections.contains(&idx) {
                continue;
            }
            self.birth_track(det, when, item.already_tracked);
        }

        let timeout = self.non_measurement_timeout();
        let max_unreliable = self.params.max_unreliable_time;
        let mut retired: Vec<TrackId> = Vec::new();
        for (track_id, track) in self.tracks.iter_mut() {
            if matched_tracks.contains(track_id) {
                continue;
            }
            let dt = (when - track.last_time).max(0.0);
            track.measurement_age += dt;
            track.reliability_timer += dt;
            track.last_time = when;
            track.position = track.predicted_position;
            if track.reliability_timer > max_unreliable {
                track.unreliable = true;
            }
            if track.measurement_age > timeout {
                retired.push(*track_id);
            }
        }
        for track_id in retired {
            self.tracks.remove(&track_id);
            self.external_ids.retain(|_, v| *v != track_id);
            info!(category = %self.category, track_id = track_id.0, "track retired");
        }
    }

    fn update_track(&mut self, track_id: TrackId, det: &DetectionObject, when: f64) {
        let track = self.tracks.get_mut(&track_id).expect("matched track must exist");
        let dt = (when - track.last_time).max(f64::EPSILON);
        let measured = det.position();
        let residual = measured.sub(&track.predicted_position);
        let new_position = track.predicted_position.add(&residual.scale(POSITION_ALPHA));
        let instantaneous_velocity = measured.sub(&track.position).scale(1.0 / dt);
        let new_velocity = track
            .velocity
            .add(&instantaneous_velocity.sub(&track.velocity).scale(VELOCITY_BETA));

        track.position = new_position;
        track.velocity = new_velocity;
        track.predicted_position = new_position;
        track.last_time = when;
        track.measurement_age = 0.0;
        track.reliability_timer = 0.0;
        track.unreliable = false;
        track.confidence = det.confidence;
        debug!(category = %self.category, track_id = track_id.0, "track updated");
    }

    fn birth_track(&mut self, det: &DetectionObject, when: f64, already_tracked: bool) {
        let id = TrackId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let mut track = Track::new(id, self.category.clone(), det.position(), when, self.params.default_tracking_radius);
        track.confidence = det.confidence;
        if already_tracked {
            if let Some(ext_id) = &det.id {
                self.external_ids.insert(ext_id.clone(), id);
            }
        }
        info!(category = %self.category, track_id = id.0, "track born");
        self.tracks.insert(id, track);
    }

    fn snapshot(&self) -> Vec<SceneObject> {
        self.tracks
            .values()
            .filter(|t| !t.unreliable)
            .map(|t| SceneObject {
                category: t.category.clone(),
                id: t.id,
                translation: t.position,
                velocity: t.velocity,
                rotation: None,
                size: t.size,
                confidence: t.confidence,
            })
            .collect()
    }
}

impl CategoryWorker {
    pub fn spawn(
        category: impl Into<String>,
        params: WorkerParams,
        next_id: Arc<AtomicU64>,
        queue_capacity: usize,
    ) -> Self {
        let category = category.into();
        let (sender, receiver) = channellib::bounded(queue_capacity.max(1));
        let shutdown = Arc::new(AtomicBool::new(false));
        let snapshot: Arc<RwLock<Arc<Vec<SceneObject>>>> = Arc::new(RwLock::new(Arc::new(Vec::new())));
        let dropped_messages = Arc::new(AtomicU64::new(0));

        let worker_shutdown = shutdown.clone();
        let worker_snapshot = snapshot.clone();
        let worker_category = category.clone();

        let handle = std::thread::spawn(move || {
            let mut state = WorkerState {
                category: worker_category,
                params,
                next_id,
                tracks: BTreeMap::new(),
                external_ids: BTreeMap::new(),
            };

            loop {
                match receiver.recv_timeout(Duration::from_millis(50)) {
                    Ok(item) => {
                        state.run_frame(&item);
                        let snap = state.snapshot();
                        *worker_snapshot.write() = Arc::new(snap);
                    }
                    Err(e) if e.is_timeout() => {
                        if worker_shutdown.load(Ordering::SeqCst) {
                            break;
                        }
                    }
                    Err(_disconnected) => break,
                }
            }
        });

        CategoryWorker {
            category,
            sender,
            shutdown,
            snapshot,
            dropped_messages,
            handle: Some(handle),
        }
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    /// Non-blocking enqueue. If the worker's pending slot is occupied,
    /// increments the drop counter and returns `false` without blocking
    /// (drop-newest policy at the caller's edge; the already-queued item is
    /// left alone, oldest-wins).
    pub fn enqueue(&self, objects: Vec<Vec<DetectionObject>>, when: f64, already_tracked: bool, mode: InputMode) -> bool {
        let item = WorkItem {
            objects,
            when,
            already_tracked,
            mode,
        };
        match self.sender.try_send(item) {
            Ok(()) => true,
            Err(e) => {
                if e.is_full() {
                    self.dropped_messages.fetch_add(1, Ordering::SeqCst);
                    warn!(category = %self.category, "tracker busy, dropping detection");
                } else {
                    warn!(category = %self.category, "worker gone, dropping detection");
                }
                false
            }
        }
    }

    pub fn current_objects(&self) -> Arc<Vec<SceneObject>> {
        self.snapshot.read().clone()
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::SeqCst)
    }

    /// Signal the worker to stop after draining its pending item, and join
    /// it within `deadline`. Exceeding the deadline logs a warning and
    /// abandons the thread (section 5: "the process is exiting").
    pub fn retire(mut self, deadline: Duration) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let (done_tx, done_rx) = std::sync::mpsc::channel();
            let category = self.category.clone();
            std::thread::spawn(move || {
                let _ = handle.join();
                let _ = done_tx.send(());
            });
            if done_rx.recv_timeout(deadline).is_err() {
                warn!(category = %category, "worker join deadline exceeded, abandoning thread");
            }
        }
    }
}

impl Drop for CategoryWorker {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analytics_types::{BoundingBoxPx, Vec3};
    use std::sync::atomic::AtomicU64;

    fn bbox() -> BoundingBoxPx {
        BoundingBoxPx {
            x: 0.0,
            y: 0.0,
            width: 10.0,
            height: 10.0,
        }
    }

    fn det(x: f64, y: f64) -> DetectionObject {
        DetectionObject {
            category: "person".to_string(),
            id: None,
            confidence: 0.9,
            bounding_box_px: bbox(),
            translation: Some(Vec3::new(x, y, 0.0)),
            rotation: None,
            velocity: None,
            reid: None,
        }
    }

    fn params() -> WorkerParams {
        WorkerParams {
            max_unreliable_time: 2.0,
            non_measurement_time: 1.0,
            default_tracking_radius: 1.0,
        }
    }

    #[test]
    fn single_track_birth_and_retire() {
        let worker = CategoryWorker::spawn("person", params(), Arc::new(AtomicU64::new(0)), 1);
        worker.enqueue(vec![vec![det(1.0, 1.0)]], 0.0, false, InputMode::Streaming);
        std::thread::sleep(Duration::from_millis(100));
        let snap = worker.current_objects();
        assert_eq!(snap.len(), 1);
        let id = snap[0].id;

        for i in 1..=10 {
            let t = i as f64 * 0.1;
            worker.enqueue(vec![vec![det(1.0, 1.0 + t)]], t, false, InputMode::Streaming);
            std::thread::sleep(Duration::from_millis(20));
        }
        let snap = worker.current_objects();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].id, id, "track identity must be stable across updates");

        worker.enqueue(vec![vec![]], 3.0, false, InputMode::Streaming);
        std::thread::sleep(Duration::from_millis(100));
        let snap = worker.current_objects();
        assert!(snap.is_empty(), "track must retire after non_measurement_time silence");

        worker.retire(Duration::from_secs(1));
    }

    #[test]
    fn update_track_blends_measurement_by_position_alpha() {
        let mut state = WorkerState {
            category: "person".to_string(),
            params: params(),
            next_id: Arc::new(AtomicU64::new(0)),
            tracks: BTreeMap::new(),
            external_ids: BTreeMap::new(),
        };
        state.birth_track(&det(0.0, 0.0), 0.0, false);
        let id = *state.tracks.keys().next().unwrap();
        state.update_track(id, &det(1.0, 0.0), 1.0);
        let track = &state.tracks[&id];
        approx::assert_relative_eq!(track.position.x, POSITION_ALPHA, epsilon = 1e-9);
        approx::assert_relative_eq!(track.position.y, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn backpressure_drop_counts_tracker_busy() {
        let worker = CategoryWorker::spawn("person", params(), Arc::new(AtomicU64::new(0)), 1);
        let ok1 = worker.enqueue(vec![vec![det(1.0, 1.0)]], 0.0, false, InputMode::Streaming);
        let ok2 = worker.enqueue(vec![vec![det(2.0, 2.0)]], 0.001, false, InputMode::Streaming);
        assert!(ok1);
        if !ok2 {
            assert_eq!(worker.dropped_count(), 1);
        }
        worker.retire(Duration::from_secs(1));
    }
}
