use std::collections::{BTreeMap, HashSet};

use analytics_types::config::{DbscanDefaultsOverride, StateTransitionThresholds};
use analytics_types::{
    ClusterAnalyticsConfig, ClusterBatchMessage, ClusterHistory, ClusterId, ClusterObservation,
    ClusterRecord, ClusterState, DbscanParams, SceneMessage, SceneObject, TrackedCluster, Vec3,
};
use tracing::{debug, info};

use crate::dbscan::{analyze_velocity, classify_shape, cluster as run_dbscan, mean, variance};
use crate::matcher::{match_clusters, Observation};
use crate::memory::ClusterMemory;

/// Hit before a scene-regulated message is analyzed. Replaces the original
/// implementation's module-level monkey-patch hook (section 9 redesign
/// flag: "a registered pre/post-analysis callback interface instead").
pub trait BeforeAnalyze: Send + Sync {
    fn on_before_analyze(&self, message: &SceneMessage);
}

/// Hit after a cluster batch has been assembled, before it is returned to
/// the caller for publication.
pub trait AfterPublish: Send + Sync {
    fn on_after_publish(&self, records: &[ClusterRecord]);
}

/// Orchestrates C5-C7 over incoming scene messages and owns the cluster
/// memory for one process (C8, section 4.8).
pub struct ClusterCoordinator {
    config: ClusterAnalyticsConfig,
    memory: ClusterMemory,
    next_id: u64,
    applied_params: BTreeMap<(String, String), DbscanParams>,
    scene_overrides: BTreeMap<(String, String), DbscanDefaultsOverride>,
    before_analyze: Vec<Box<dyn BeforeAnalyze>>,
    after_publish: Vec<Box<dyn AfterPublish>>,
}

impl ClusterCoordinator {
    pub fn new(config: ClusterAnalyticsConfig) -> Self {
        let max_archived = config.archival.max_archived_clusters;
        ClusterCoordinator {
            config,
            memory: ClusterMemory::new(max_archived),
            next_id: 1,
            applied_params: BTreeMap::new(),
            scene_overrides: BTreeMap::new(),
            before_analyze: Vec::new(),
            after_publish: Vec::new(),
        }
    }

    pub fn add_before_analyze(&mut self, hook: Box<dyn BeforeAnalyze>) {
        self.before_analyze.push(hook);
    }

    pub fn add_after_publish(&mut self, hook: Box<dyn AfterPublish>) {
        self.after_publish.push(hook);
    }

    /// An explicit per-(scene, category) override table owned by the
    /// coordinator, in place of a global mutable map (section 9).
    pub fn set_scene_override(&mut self, scene_id: &str, category: &str, eps: f64, min_samples: usize) {
        self.scene_overrides
            .insert((scene_id.to_string(), category.to_string()), DbscanDefaultsOverride { eps, min_samples });
    }

    pub fn memory(&self) -> &ClusterMemory {
        &self.memory
    }

    fn next_cluster_id(&mut self) -> ClusterId {
        let id = ClusterId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Run one scene-regulated message through clustering, matching, and
    /// lifecycle bookkeeping, returning the cluster batch ready to publish
    /// (section 4.8 steps 1-7).
    pub fn process(&mut self, message: &SceneMessage, now: f64) -> ClusterBatchMessage {
        for hook in &self.before_analyze {
            hook.on_before_analyze(message);
        }

        let scene_id = message.scene_id.clone();
        let mut by_category: BTreeMap<String, Vec<&SceneObject>> = BTreeMap::new();
        for obj in &message.objects {
            by_category.entry(obj.category.clone()).or_default().push(obj);
        }

        let mut touched: HashSet<ClusterId> = HashSet::new();

        for (category, objects) in &by_category {
            let key = (scene_id.clone(), category.clone());
            let scene_override = self.scene_overrides.get(&key).copied();
            let params = self.config.resolve_dbscan_params(category, scene_override);

            if let Some(&previous) = self.applied_params.get(&key) {
                if significant_change(previous, params, self.config.eps_change_ratio_threshold) {
                    info!(scene = %scene_id, category = %category, "dbscan parameters changed significantly, clearing category");
                    self.memory.force_clear_by_category(&scene_id, category);
                }
            }
            self.applied_params.insert(key, params);

            if objects.len() < params.min_samples {
                debug!(scene = %scene_id, category = %category, count = objects.len(), "below minimum sample gate, skipping dbscan");
                continue;
            }

            let points: Vec<Vec3> = objects.iter().map(|o| o.translation).collect();
            let groups = run_dbscan(&points, params);
            let observations: Vec<(Observation, Vec<String>, analytics_types::ShapeSize)> = groups
                .iter()
                .map(|members| build_observation(category, objects, members, &self.config.shape))
                .collect();

            let trackable_ids: Vec<ClusterId> = self
                .memory
                .by_category(&scene_id, Some(category))
                .into_iter()
                .filter(|c| c.state.is_trackable())
                .map(|c| c.id)
                .collect();
            let trackable_refs: Vec<&TrackedCluster> = trackable_ids.iter().filter_map(|id| self.memory.get(*id)).collect();
            let observation_views: Vec<Observation> = observations.iter().map(|(o, _, _)| o.clone()).collect();

            let matches = match_clusters(&trackable_refs, &observation_views, &self.config.matching);

            let mut matched_observations: HashSet<usize> = HashSet::new();
            for m in &matches {
                let cluster_id = trackable_ids[m.cluster_index];
                matched_observations.insert(m.observation_index);
                touched.insert(cluster_id);
                let (obs, object_ids, shape) = &observations[m.observation_index];
                if let Some(cluster) = self.memory.get_mut(cluster_id) {
                    apply_observation(cluster, obs, shape, object_ids, now, &self.config.movement);
                    cluster.consecutive_misses = 0;
                    cluster.frames_detected += 1;
                    recompute_confidence(cluster, &self.config.confidence);
                    recompute_stability(cluster);
                    apply_state_transition(cluster, &self.config.state_transitions, &self.config.confidence);
                }
            }

            for (idx, (obs, object_ids, shape)) in observations.iter().enumerate() {
                if matched_observations.contains(&idx) {
                    continue;
                }
                let id = self.next_cluster_id();
                let cluster = birth_cluster(id, &scene_id, category, obs, shape, object_ids, params, now, &self.config.confidence);
                touched.insert(id);
                self.memory.add(cluster);
            }

            for id in trackable_ids {
                if touched.contains(&id) {
                    continue;
                }
                if let Some(cluster) = self.memory.get_mut(id) {
                    mark_missed(cluster, &self.config.state_transitions, &self.config.confidence);
                    touched.insert(id);
                }
            }
        }

        let remaining: Vec<ClusterId> = self
            .memory
            .by_scene(&scene_id)
            .into_iter()
            .filter(|c| c.state.is_trackable() && !touched.contains(&c.id))
            .map(|c| c.id)
            .collect();
        for id in remaining {
            if let Some(cluster) = self.memory.get_mut(id) {
                mark_missed(cluster, &self.config.state_transitions, &self.config.confidence);
            }
        }

        self.memory.cleanup_old(now, self.config.archival.archive_time_threshold);

        let records: Vec<ClusterRecord> = self
            .memory
            .by_scene(&scene_id)
            .into_iter()
            .filter(|c| c.state.is_publishable())
            .map(|c| ClusterRecord::from_tracked(c, now))
            .collect();

        for hook in &self.after_publish {
            hook.on_after_publish(&records);
        }

        ClusterBatchMessage::new(scene_id, message.scene_name.clone(), message.timestamp, records)
    }
}

fn significant_change(previous: DbscanParams, current: DbscanParams, ratio_threshold: f64) -> bool {
    let eps_ratio = (current.eps - previous.eps).abs() / previous.eps.max(0.1);
    eps_ratio > ratio_threshold || current.min_samples != previous.min_samples
}

fn build_observation(
    category: &str,
    objects: &[&SceneObject],
    members: &[usize],
    shape_thresholds: &analytics_types::config::ShapeThresholds,
) -> (Observation, Vec<String>, analytics_types::ShapeSize) {
    let positions: Vec<Vec3> = members.iter().map(|&i| objects[i].translation).collect();
    let velocities: Vec<Vec3> = members.iter().map(|&i| objects[i].velocity).collect();
    let centroid = mean(&positions);
    let velocity = mean(&velocities);
    let shape = classify_shape(&positions, shape_thresholds);
    let object_ids: Vec<String> = members.iter().map(|&i| objects[i].id.to_string()).collect();
    let observation = Observation {
        category: category.to_string(),
        centroid,
        velocity,
        member_count: members.len(),
        shape_kind: shape.kind(),
    };
    (observation, object_ids, shape)
}

fn apply_observation(
    cluster: &mut TrackedCluster,
    obs: &Observation,
    shape: &analytics_types::ShapeSize,
    object_ids: &[String],
    now: f64,
    movement_thresholds: &analytics_types::config::MovementThresholds,
) {
    cluster.centroid = obs.centroid;
    cluster.predicted_position = obs.centroid;
    cluster.object_ids = object_ids.to_vec();
    cluster.shape = shape.clone();
    cluster.last_seen = now;
    cluster.last_updated = now;
    cluster.history.push(ClusterObservation {
        position: obs.centroid,
        velocity: obs.velocity,
        member_count: obs.member_count,
        shape: obs.shape_kind,
        timestamp: now,
    });

    let recent: Vec<&ClusterObservation> = cluster.history.recent(10).collect();
    let positions: Vec<Vec3> = recent.iter().map(|o| o.position).collect();
    let velocities: Vec<Vec3> = recent.iter().map(|o| o.velocity).collect();
    cluster.velocity_analysis = analyze_velocity(&velocities, &positions, obs.centroid, movement_thresholds);
}

fn birth_cluster(
    id: ClusterId,
    scene_id: &str,
    category: &str,
    obs: &Observation,
    shape: &analytics_types::ShapeSize,
    object_ids: &[String],
    params: DbscanParams,
    now: f64,
    confidence: &analytics_types::config::ConfidenceConstants,
) -> TrackedCluster {
    let mut history = ClusterHistory::default();
    history.push(ClusterObservation {
        position: obs.centroid,
        velocity: obs.velocity,
        member_count: obs.member_count,
        shape: obs.shape_kind,
        timestamp: now,
    });
    TrackedCluster {
        id,
        scene_id: scene_id.to_string(),
        category: category.to_string(),
        centroid: obs.centroid,
        shape: shape.clone(),
        velocity_analysis: analytics_types::VelocityAnalysis::insufficient_data(),
        object_ids: object_ids.to_vec(),
        dbscan_params: params,
        first_seen: now,
        last_seen: now,
        last_updated: now,
        frames_detected: 1,
        frames_missed: 0,
        consecutive_misses: 0,
        confidence: confidence.initial_confidence,
        stability_score: 0.0,
        predicted_position: obs.centroid,
        state: ClusterState::New,
        history,
    }
}

fn mark_missed(
    cluster: &mut TrackedCluster,
    thresholds: &StateTransitionThresholds,
    confidence: &analytics_types::config::ConfidenceConstants,
) {
    cluster.frames_missed += 1;
    cluster.consecutive_misses += 1;
    recompute_confidence(cluster, confidence);
    apply_state_transition(cluster, thresholds, confidence);
}

/// Section 4.8's finite-state machine: NEW → ACTIVE → STABLE, with FADING
/// and LOST reachable from ACTIVE/STABLE once misses accumulate.
fn apply_state_transition(
    cluster: &mut TrackedCluster,
    thresholds: &StateTransitionThresholds,
    confidence: &analytics_types::config::ConfidenceConstants,
) {
    cluster.state = match cluster.state {
        ClusterState::New => {
            if cluster.frames_detected >= thresholds.frames_to_activate && cluster.confidence > confidence.activation_threshold {
                ClusterState::Active
            } else {
                ClusterState::New
            }
        }
        ClusterState::Active => {
            if cluster.consecutive_misses >= thresholds.frames_to_fade {
                ClusterState::Fading
            } else if cluster.frames_detected >= thresholds.frames_to_stable && cluster.stability_score > confidence.stability_threshold {
                ClusterState::Stable
            } else {
                ClusterState::Active
            }
        }
        ClusterState::Stable => {
            if cluster.consecutive_misses >= thresholds.frames_to_fade {
                ClusterState::Fading
            } else {
                ClusterState::Stable
            }
        }
        ClusterState::Fading => {
            if cluster.consecutive_misses >= thresholds.frames_to_lost {
                ClusterState::Lost
            } else if cluster.consecutive_misses == 0 {
                ClusterState::Active
            } else {
                ClusterState::Fading
            }
        }
        ClusterState::Lost => ClusterState::Lost,
    };
}

fn recompute_confidence(cluster: &mut TrackedCluster, constants: &analytics_types::config::ConfidenceConstants) {
    let total = cluster.total_frames().max(1) as f64;
    let detection_ratio = cluster.frames_detected as f64 / total;
    let miss_penalty = (cluster.consecutive_misses as f64 * constants.miss_penalty).min(constants.max_miss_penalty);
    let longevity_bonus = (cluster.frames_detected as f64 / constants.longevity_frames).min(constants.longevity_bonus_max);
    let raw = detection_ratio - miss_penalty + longevity_bonus;
    cluster.confidence = raw.clamp(0.0, 1.0);
}

/// `stability = 0.4*position_stability + 0.3*size_stability +
/// 0.3*shape_consistency` over the last 10 observations (section 4.8,
/// "Cluster memory statistics" neighbor: stability formula).
fn recompute_stability(cluster: &mut TrackedCluster) {
    let recent: Vec<&ClusterObservation> = cluster.history.recent(10).collect();
    if recent.len() < 2 {
        return;
    }
    let positions: Vec<Vec3> = recent.iter().map(|o| o.position).collect();
    let centroid = mean(&positions);
    let position_variance = variance(&positions.iter().map(|p| p.distance(&centroid)).collect::<Vec<_>>());
    let position_stability = 1.0 / (1.0 + position_variance);

    let sizes: Vec<f64> = recent.iter().map(|o| o.member_count as f64).collect();
    let size_stability = 1.0 / (1.0 + variance(&sizes));

    let shapes: Vec<analytics_types::ShapeKind> = recent.iter().map(|o| o.shape).collect();
    let mode_count = shapes
        .iter()
        .map(|&kind| shapes.iter().filter(|&&k| k == kind).count())
        .max()
        .unwrap_or(0);
    let shape_consistency = mode_count as f64 / recent.len() as f64;

    cluster.stability_score = 0.4 * position_stability + 0.3 * size_stability + 0.3 * shape_consistency;
}

#[cfg(test)]
mod tests {
    use super::*;
    use analytics_types::TrackId;

    fn scene_object(category: &str, id: u64, x: f64, y: f64) -> SceneObject {
        SceneObject {
            category: category.to_string(),
            id: TrackId(id),
            translation: Vec3::new(x, y, 0.0),
            velocity: Vec3::ZERO,
            rotation: None,
            size: Vec3::ZERO,
            confidence: 0.8,
        }
    }

    fn message(objects: Vec<SceneObject>, timestamp: f64) -> SceneMessage {
        SceneMessage::new("scene-1", "Scene One", timestamp, objects)
    }

    #[test]
    fn tight_group_forms_a_new_cluster() {
        let mut coordinator = ClusterCoordinator::new(ClusterAnalyticsConfig::default());
        let objects = vec![
            scene_object("person", 1, 0.0, 0.0),
            scene_object("person", 2, 0.2, 0.0),
            scene_object("person", 3, 0.0, 0.2),
        ];
        let batch = coordinator.process(&message(objects, 0.0), 0.0);
        assert!(batch.clusters.is_empty(), "NEW clusters are not publishable yet");
        assert_eq!(coordinator.memory().statistics().active_count, 1);
    }

    #[test]
    fn cluster_activates_after_repeated_detection() {
        let mut coordinator = ClusterCoordinator::new(ClusterAnalyticsConfig::default());
        for t in 0..4 {
            let objects = vec![
                scene_object("person", 1, 0.0, 0.0),
                scene_object("person", 2, 0.2, 0.0),
                scene_object("person", 3, 0.0, 0.2),
            ];
            coordinator.process(&message(objects, t as f64), t as f64);
        }
        let batch = coordinator.process(
            &message(
                vec![
                    scene_object("person", 1, 0.0, 0.0),
                    scene_object("person", 2, 0.2, 0.0),
                    scene_object("person", 3, 0.0, 0.2),
                ],
                4.0,
            ),
            4.0,
        );
        assert_eq!(batch.clusters.len(), 1);
        assert_eq!(batch.clusters[0].tracking.state, ClusterState::Active);
    }

    #[test]
    fn missed_frames_eventually_expire_a_cluster() {
        let mut coordinator = ClusterCoordinator::new(ClusterAnalyticsConfig::default());
        let objects = vec![
            scene_object("person", 1, 0.0, 0.0),
            scene_object("person", 2, 0.2, 0.0),
            scene_object("person", 3, 0.0, 0.2),
        ];
        // A NEW cluster only ever transitions to ACTIVE or stays NEW; it can
        // never reach LOST (and so never gets archived) without activating
        // first, so detect it long enough to activate before missing it.
        for t in 0..3 {
            coordinator.process(&message(objects.clone(), t as f64), t as f64);
        }
        for t in 3..40 {
            coordinator.process(&message(vec![], t as f64), t as f64 * 2.0);
        }
        assert_eq!(coordinator.memory().statistics().active_count, 0);
    }

    #[test]
    fn significant_eps_change_force_clears_the_category() {
        let mut coordinator = ClusterCoordinator::new(ClusterAnalyticsConfig::default());
        let objects = vec![
            scene_object("person", 1, 0.0, 0.0),
            scene_object("person", 2, 0.2, 0.0),
            scene_object("person", 3, 0.0, 0.2),
        ];
        coordinator.process(&message(objects.clone(), 0.0), 0.0);
        assert_eq!(coordinator.memory().statistics().active_count, 1);

        // Shrinking eps well past the default ratio threshold on the same
        // scene+category must force-clear the cluster born above, even
        // though the next message offers the same tight group again.
        coordinator.set_scene_override("scene-1", "person", 0.05, 3);
        coordinator.process(&message(objects, 1.0), 1.0);
        assert_eq!(
            coordinator.memory().statistics().active_count,
            1,
            "the old cluster is force-cleared and a fresh NEW cluster replaces it"
        );
    }

    #[test]
    fn below_minimum_sample_gate_skips_dbscan_but_still_ages_existing_clusters() {
        let mut coordinator = ClusterCoordinator::new(ClusterAnalyticsConfig::default());
        let objects = vec![
            scene_object("person", 1, 0.0, 0.0),
            scene_object("person", 2, 0.2, 0.0),
            scene_object("person", 3, 0.0, 0.2),
        ];
        coordinator.process(&message(objects, 0.0), 0.0);
        assert_eq!(coordinator.memory().statistics().active_count, 1);

        // Only one object present now: below the default min_samples of 3,
        // so DBSCAN is skipped entirely for "person" this message, but the
        // existing cluster must still be aged via the belt-and-braces sweep.
        let sparse = vec![scene_object("person", 1, 0.0, 0.0)];
        coordinator.process(&message(sparse, 1.0), 1.0);
        let cluster = coordinator
            .memory()
            .by_category("scene-1", Some("person"))
            .into_iter()
            .next()
            .expect("cluster must still be present, just missed");
        assert_eq!(cluster.frames_missed, 1);
        assert_eq!(cluster.consecutive_misses, 1);
    }
}
