use std::collections::BTreeMap;

use analytics_types::{ClusterId, ClusterState, TrackedCluster};

use crate::error::{Error, Result};

/// Aggregate counts over the live and archived cluster population (section
/// 4.6, "Cluster memory statistics").
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryStatistics {
    pub active_count: usize,
    pub archived_count: usize,
    pub by_state: BTreeMap<&'static str, usize>,
    pub scenes_tracked: usize,
    pub categories_tracked: usize,
}

/// Indexed store of tracked clusters (C6). Holds the live population plus a
/// bounded archive of clusters evicted by age or capacity.
#[derive(Debug, Default)]
pub struct ClusterMemory {
    clusters: BTreeMap<ClusterId, TrackedCluster>,
    archived: Vec<TrackedCluster>,
    max_archived: usize,
}

impl ClusterMemory {
    pub fn new(max_archived: usize) -> Self {
        ClusterMemory {
            clusters: BTreeMap::new(),
            archived: Vec::new(),
            max_archived,
        }
    }

    pub fn add(&mut self, cluster: TrackedCluster) {
        self.clusters.insert(cluster.id, cluster);
    }

    pub fn get(&self, id: ClusterId) -> Option<&TrackedCluster> {
        self.clusters.get(&id)
    }

    pub fn get_mut(&mut self, id: ClusterId) -> Option<&mut TrackedCluster> {
        self.clusters.get_mut(&id)
    }

    pub fn remove(&mut self, id: ClusterId) -> Result<TrackedCluster> {
        self.clusters.remove(&id).ok_or(Error::UnknownCluster(id))
    }

    pub fn by_scene(&self, scene_id: &str) -> Vec<&TrackedCluster> {
        self.clusters.values().filter(|c| c.scene_id == scene_id).collect()
    }

    pub fn by_category(&self, scene_id: &str, category: Option<&str>) -> Vec<&TrackedCluster> {
        self.clusters
            .values()
            .filter(|c| c.scene_id == scene_id)
            .filter(|c| category.map_or(true, |cat| c.category == cat))
            .collect()
    }

    pub fn by_state(&self, state: ClusterState) -> Vec<&TrackedCluster> {
        self.clusters.values().filter(|c| c.state == state).collect()
    }

    pub fn all(&self) -> impl Iterator<Item = &TrackedCluster> {
        self.clusters.values()
    }

    pub fn all_mut(&mut self) -> impl Iterator<Item = &mut TrackedCluster> {
        self.clusters.values_mut()
    }

    /// Move a cluster from the live population into the bounded archive,
    /// evicting the oldest archived entry (by `last_seen`) if over capacity.
    pub fn archive(&mut self, id: ClusterId) -> Result<()> {
        let cluster = self.remove(id)?;
        self.archived.push(cluster);
        if self.archived.len() > self.max_archived {
            let oldest_idx = self
                .archived
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| a.last_seen.partial_cmp(&b.last_seen).unwrap())
                .map(|(idx, _)| idx);
            if let Some(idx) = oldest_idx {
                self.archived.remove(idx);
            }
        }
        Ok(())
    }

    /// Drop every cluster for `(scene_id, category)` without archiving, used
    /// when a DBSCAN parameter change invalidates existing memberships
    /// (section 4.5, "significant parameter change").
    pub fn force_clear_by_category(&mut self, scene_id: &str, category: &str) {
        self.clusters.retain(|_, c| !(c.scene_id == scene_id && c.category == category));
    }

    /// Archive every `Lost` cluster whose silence has exceeded
    /// `archive_time_threshold` (section 4.8, invoked once per processed
    /// message).
    pub fn cleanup_old(&mut self, now: f64, archive_time_threshold: f64) {
        let stale: Vec<ClusterId> = self
            .clusters
            .values()
            .filter(|c| c.state == ClusterState::Lost && c.time_since_last_seen(now) > archive_time_threshold)
            .map(|c| c.id)
            .collect();
        for id in stale {
            let _ = self.archive(id);
        }
    }

    pub fn statistics(&self) -> MemoryStatistics {
        let mut by_state = BTreeMap::new();
        for state in [
            ClusterState::New,
            ClusterState::Active,
            ClusterState::Stable,
            ClusterState::Fading,
            ClusterState::Lost,
        ] {
            let count = self.clusters.values().filter(|c| c.state == state).count();
            by_state.insert(state_label(state), count);
        }
        let mut scenes: Vec<&str> = self.clusters.values().map(|c| c.scene_id.as_str()).collect();
        scenes.sort_unstable();
        scenes.dedup();
        let mut categories: Vec<&str> = self.clusters.values().map(|c| c.category.as_str()).collect();
        categories.sort_unstable();
        categories.dedup();

        MemoryStatistics {
            active_count: self.clusters.len(),
            archived_count: self.archived.len(),
            by_state,
            scenes_tracked: scenes.len(),
            categories_tracked: categories.len(),
        }
    }
}

fn state_label(state: ClusterState) -> &'static str {
    match state {
        ClusterState::New => "new",
        ClusterState::Active => "active",
        ClusterState::Stable => "stable",
        ClusterState::Fading => "fading",
        ClusterState::Lost => "lost",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analytics_types::{ClusterHistory, DbscanParams, ShapeSize, Vec3, VelocityAnalysis};

    fn cluster(id: u64, scene: &str, category: &str, state: ClusterState, last_seen: f64) -> TrackedCluster {
        TrackedCluster {
            id: ClusterId(id),
            scene_id: scene.to_string(),
            category: category.to_string(),
            centroid: Vec3::ZERO,
            shape: ShapeSize::InsufficientPoints,
            velocity_analysis: VelocityAnalysis::insufficient_data(),
            object_ids: Vec::new(),
            dbscan_params: DbscanParams { eps: 1.0, min_samples: 3 },
            first_seen: 0.0,
            last_seen,
            last_updated: last_seen,
            frames_detected: 1,
            frames_missed: 0,
            consecutive_misses: 0,
            confidence: 0.5,
            stability_score: 0.0,
            predicted_position: Vec3::ZERO,
            state,
            history: ClusterHistory::default(),
        }
    }

    #[test]
    fn cleanup_archives_stale_lost_clusters_only() {
        let mut mem = ClusterMemory::new(50);
        mem.add(cluster(1, "scene", "person", ClusterState::Lost, 0.0));
        mem.add(cluster(2, "scene", "person", ClusterState::Active, 0.0));
        mem.cleanup_old(10.0, 5.0);
        assert!(mem.get(ClusterId(1)).is_none());
        assert!(mem.get(ClusterId(2)).is_some());
        assert_eq!(mem.statistics().archived_count, 1);
    }

    #[test]
    fn archive_evicts_oldest_beyond_capacity() {
        let mut mem = ClusterMemory::new(1);
        mem.add(cluster(1, "scene", "person", ClusterState::Lost, 1.0));
        mem.add(cluster(2, "scene", "person", ClusterState::Lost, 2.0));
        mem.archive(ClusterId(1)).unwrap();
        mem.archive(ClusterId(2)).unwrap();
        assert_eq!(mem.statistics().archived_count, 1);
    }

    #[test]
    fn force_clear_by_category_drops_only_matching() {
        let mut mem = ClusterMemory::new(50);
        mem.add(cluster(1, "scene", "person", ClusterState::Active, 0.0));
        mem.add(cluster(2, "scene", "vehicle", ClusterState::Active, 0.0));
        mem.force_clear_by_category("scene", "person");
        assert!(mem.get(ClusterId(1)).is_none());
        assert!(mem.get(ClusterId(2)).is_some());
    }
}
