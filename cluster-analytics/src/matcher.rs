use analytics_types::{config::MatchingConstants, ShapeKind, TrackedCluster, Vec3};
use pathfinding::kuhn_munkres::kuhn_munkres_min;
use pathfinding::matrix::Matrix;

/// `kuhn_munkres_min` requires integral weights; costs are scaled by this
/// factor before rounding so fractional distances survive the conversion.
const COST_SCALE: f64 = 1_000.0;

/// A confirmed match between an existing tracked cluster and an observation
/// from the current DBSCAN pass, with the residual similarity (section 4.7).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Match {
    pub cluster_index: usize,
    pub observation_index: usize,
    pub similarity: f64,
}

/// One DBSCAN-produced grouping awaiting assignment to an existing tracked
/// cluster, or birth as a new one.
#[derive(Debug, Clone)]
pub struct Observation {
    pub category: String,
    pub centroid: Vec3,
    pub velocity: Vec3,
    pub member_count: usize,
    pub shape_kind: ShapeKind,
}

fn cost(cluster: &TrackedCluster, obs: &Observation, weights: &MatchingConstants) -> f64 {
    if cluster.category != obs.category {
        return f64::INFINITY;
    }
    let position_term = cluster.predicted_position.distance(&obs.centroid);
    let velocity_term = cluster.velocity_analysis.average_velocity.distance(&obs.velocity);
    let size_term = (cluster.object_ids.len() as f64 - obs.member_count as f64).abs();
    let shape_term = if cluster.shape.kind() == obs.shape_kind { 0.0 } else { 1.0 };

    weights.position_weight * position_term
        + weights.velocity_weight * velocity_term
        + weights.size_weight * size_term
        + weights.shape_weight * shape_term
}

/// Solve the assignment problem between `clusters` and `observations` of the
/// same category via the Hungarian algorithm, dropping any pairing whose
/// cost exceeds `max_matching_distance` (section 4.7).
///
/// `pathfinding`'s solver requires a square matrix; non-square inputs are
/// padded with a sentinel cost well above `max_matching_distance` so every
/// real row and column still gets a considered assignment, and
/// padding-only pairings are filtered out afterward.
pub fn match_clusters(clusters: &[&TrackedCluster], observations: &[Observation], weights: &MatchingConstants) -> Vec<Match> {
    if clusters.is_empty() || observations.is_empty() {
        return Vec::new();
    }

    let n = clusters.len().max(observations.len());
    let mut raw_costs = vec![vec![f64::INFINITY; n]; n];
    for (i, cluster) in clusters.iter().enumerate() {
        for (j, obs) in observations.iter().enumerate() {
            raw_costs[i][j] = cost(cluster, obs, weights);
        }
    }

    let finite_max = raw_costs
        .iter()
        .flatten()
        .filter(|c| c.is_finite())
        .cloned()
        .fold(weights.max_matching_distance, f64::max);
    let sentinel = finite_max * 4.0 + 1.0;

    let scaled: Vec<Vec<i64>> = raw_costs
        .iter()
        .map(|row| {
            row.iter()
                .map(|&c| {
                    let bounded = if c.is_finite() { c } else { sentinel };
                    (bounded * COST_SCALE) as i64
                })
                .collect()
        })
        .collect();

    let matrix = Matrix::from_rows(scaled).expect("square cost matrix");
    let (_, assignment) = kuhn_munkres_min(&matrix);

    let mut matches = Vec::new();
    for (i, &j) in assignment.iter().enumerate() {
        if i >= clusters.len() || j >= observations.len() {
            continue;
        }
        let raw = raw_costs[i][j];
        if !raw.is_finite() || raw > weights.max_matching_distance {
            continue;
        }
        matches.push(Match {
            cluster_index: i,
            observation_index: j,
            similarity: 1.0 - (raw / weights.max_matching_distance).min(1.0),
        });
    }
    matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use analytics_types::{ClusterHistory, ClusterId, ClusterState, DbscanParams, ShapeSize, VelocityAnalysis};

    fn tracked(id: u64, category: &str, position: Vec3) -> TrackedCluster {
        TrackedCluster {
            id: ClusterId(id),
            scene_id: "scene".to_string(),
            category: category.to_string(),
            centroid: position,
            shape: ShapeSize::InsufficientPoints,
            velocity_analysis: VelocityAnalysis::insufficient_data(),
            object_ids: vec!["a".to_string(), "b".to_string()],
            dbscan_params: DbscanParams { eps: 1.0, min_samples: 3 },
            first_seen: 0.0,
            last_seen: 0.0,
            last_updated: 0.0,
            frames_detected: 1,
            frames_missed: 0,
            consecutive_misses: 0,
            confidence: 0.5,
            stability_score: 0.0,
            predicted_position: position,
            state: ClusterState::Active,
            history: ClusterHistory::default(),
        }
    }

    #[test]
    fn matches_nearest_observation_by_category() {
        let weights = MatchingConstants::default();
        let near = tracked(1, "person", Vec3::new(0.0, 0.0, 0.0));
        let far = tracked(2, "person", Vec3::new(10.0, 10.0, 0.0));
        let clusters = vec![&near, &far];
        let observations = vec![Observation {
            category: "person".to_string(),
            centroid: Vec3::new(0.1, 0.0, 0.0),
            velocity: Vec3::ZERO,
            member_count: 2,
            shape_kind: ShapeKind::InsufficientPoints,
        }];
        let matches = match_clusters(&clusters, &observations, &weights);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].cluster_index, 0);
    }

    #[test]
    fn category_mismatch_never_matches() {
        let weights = MatchingConstants::default();
        let cluster = tracked(1, "vehicle", Vec3::ZERO);
        let clusters = vec![&cluster];
        let observations = vec![Observation {
            category: "person".to_string(),
            centroid: Vec3::ZERO,
            velocity: Vec3::ZERO,
            member_count: 2,
            shape_kind: ShapeKind::InsufficientPoints,
        }];
        let matches = match_clusters(&clusters, &observations, &weights);
        assert!(matches.is_empty());
    }

    #[test]
    fn crossed_pairs_resolve_to_the_lower_total_cost_assignment() {
        let weights = MatchingConstants::default();
        // Two clusters and two observations arranged so the "obvious"
        // nearest-neighbor-per-row greedy choice (left->left, right->right)
        // is also the minimum-total-cost assignment; the Hungarian solver
        // must not cross the pairs even though both observations are within
        // range of both clusters.
        let left = tracked(1, "person", Vec3::new(0.0, 0.0, 0.0));
        let right = tracked(2, "person", Vec3::new(1.0, 0.0, 0.0));
        let clusters = vec![&left, &right];
        let observations = vec![
            Observation {
                category: "person".to_string(),
                centroid: Vec3::new(0.05, 0.0, 0.0),
                velocity: Vec3::ZERO,
                member_count: 2,
                shape_kind: ShapeKind::InsufficientPoints,
            },
            Observation {
                category: "person".to_string(),
                centroid: Vec3::new(0.95, 0.0, 0.0),
                velocity: Vec3::ZERO,
                member_count: 2,
                shape_kind: ShapeKind::InsufficientPoints,
            },
        ];
        let matches = match_clusters(&clusters, &observations, &weights);
        assert_eq!(matches.len(), 2);
        for m in &matches {
            assert_eq!(m.cluster_index, m.observation_index, "pairs must not cross");
        }
    }

    #[test]
    fn fewer_observations_than_clusters_leaves_the_unmatched_cluster_out() {
        let weights = MatchingConstants::default();
        let near = tracked(1, "person", Vec3::new(0.0, 0.0, 0.0));
        let far = tracked(2, "person", Vec3::new(20.0, 20.0, 0.0));
        let clusters = vec![&near, &far];
        let observations = vec![Observation {
            category: "person".to_string(),
            centroid: Vec3::new(0.1, 0.0, 0.0),
            velocity: Vec3::ZERO,
            member_count: 2,
            shape_kind: ShapeKind::InsufficientPoints,
        }];
        let matches = match_clusters(&clusters, &observations, &weights);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].cluster_index, 0);
    }
}
