use std::collections::VecDeque;

use itertools::Itertools;

use analytics_types::{
    config::{MovementThresholds, ShapeThresholds},
    DbscanParams, MovementPattern, ShapeSize, Vec3, VelocityAnalysis,
};

/// Run density clustering over `points`, returning one `Vec<usize>` of point
/// indices per non-noise cluster (section 4.5). A hand-rolled port of
/// `sklearn.cluster.DBSCAN`'s core loop: no crate in the dependency tree
/// exposes this algorithm directly.
pub fn cluster(points: &[Vec3], params: DbscanParams) -> Vec<Vec<usize>> {
    let n = points.len();
    const UNVISITED: i64 = -2;
    const NOISE: i64 = -1;
    let mut labels = vec![UNVISITED; n];
    let mut next_cluster_id: i64 = 0;

    let region_query = |i: usize| -> Vec<usize> {
        (0..n)
            .filter(|&j| points[i].distance(&points[j]) <= params.eps)
            .collect()
    };

    for i in 0..n {
        if labels[i] != UNVISITED {
            continue;
        }
        let neighbors = region_query(i);
        if neighbors.len() < params.min_samples {
            labels[i] = NOISE;
            continue;
        }
        let cluster_id = next_cluster_id;
        next_cluster_id += 1;
        labels[i] = cluster_id;

        let mut seeds: VecDeque<usize> = neighbors.into_iter().collect();
        while let Some(j) = seeds.pop_front() {
            if labels[j] == NOISE {
                labels[j] = cluster_id;
            }
            if labels[j] != UNVISITED {
                continue;
            }
            labels[j] = cluster_id;
            let j_neighbors = region_query(j);
            if j_neighbors.len() >= params.min_samples {
                seeds.extend(j_neighbors);
            }
        }
    }

    let mut clusters: Vec<Vec<usize>> = vec![Vec::new(); next_cluster_id as usize];
    for (idx, &label) in labels.iter().enumerate() {
        if label >= 0 {
            clusters[label as usize].push(idx);
        }
    }
    clusters
}

pub(crate) fn mean(points: &[Vec3]) -> Vec3 {
    let n = points.len() as f64;
    let sum = points.iter().fold(Vec3::ZERO, |acc, p| acc.add(p));
    sum.scale(1.0 / n.max(1.0))
}

pub(crate) fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
}

fn std_dev(values: &[f64]) -> f64 {
    variance(values).sqrt()
}

/// Classify the planar shape formed by `points` (section 4.5, "Shape
/// classification detail"). Ports `detectShapeMl`/`_get*Shape`.
pub fn classify_shape(points: &[Vec3], thresholds: &ShapeThresholds) -> ShapeSize {
    if points.len() < 3 {
        return ShapeSize::InsufficientPoints;
    }
    let centroid = mean(points);
    let distances: Vec<f64> = points.iter().map(|p| p.distance(&centroid)).collect();
    let angles: Vec<f64> = points.iter().map(|p| (p.y - centroid.y).atan2(p.x - centroid.x)).collect();

    let dist_variance = variance(&distances);

    if dist_variance < thresholds.variance_threshold {
        return circle_shape(distances.iter().sum::<f64>() / distances.len() as f64);
    }

    if points.len() == 4 {
        let mut groups: Vec<i64> = angles
            .iter()
            .map(|a| (a / thresholds.quadrant_angle).round() as i64)
            .collect();
        groups.sort_unstable();
        groups.dedup();
        if groups.len() >= 3 {
            return rectangle_shape(points);
        }
    } else if points.len() >= 5 {
        let sorted_angles: Vec<f64> = angles.iter().copied().sorted_by(|a, b| a.partial_cmp(b).unwrap()).collect();
        let diffs: Vec<f64> = sorted_angles.iter().tuple_windows().map(|(a, b)| b - a).collect();
        if std_dev(&diffs) < thresholds.angle_distribution_threshold {
            return circle_shape(distances.iter().sum::<f64>() / distances.len() as f64);
        } else {
            return irregular_shape(points, &distances);
        }
    }

    let fan_areas: Vec<f64> = points
        .windows(3)
        .map(|w| ((w[1].x - w[0].x) * (w[2].y - w[0].y) - (w[2].x - w[0].x) * (w[1].y - w[0].y)).abs() / 2.0)
        .collect();
    let mean_fan_area = fan_areas.iter().sum::<f64>() / fan_areas.len() as f64;

    if mean_fan_area < thresholds.linear_formation_area_threshold {
        line_shape(points)
    } else {
        irregular_shape(points, &distances)
    }
}

fn circle_shape(radius: f64) -> ShapeSize {
    ShapeSize::Circle {
        radius,
        diameter: radius * 2.0,
        area: std::f64::consts::PI * radius * radius,
        circumference: 2.0 * std::f64::consts::PI * radius,
    }
}

fn rectangle_shape(points: &[Vec3]) -> ShapeSize {
    let min_x = points.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
    let max_x = points.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max);
    let min_y = points.iter().map(|p| p.y).fold(f64::INFINITY, f64::min);
    let max_y = points.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max);
    let width = max_x - min_x;
    let height = max_y - min_y;
    ShapeSize::Rectangle {
        width,
        height,
        area: width * height,
        perimeter: 2.0 * (width + height),
        corner_points: [
            [min_x, min_y],
            [max_x, min_y],
            [max_x, max_y],
            [min_x, max_y],
        ],
    }
}

fn irregular_shape(points: &[Vec3], distances: &[f64]) -> ShapeSize {
    let min_x = points.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
    let max_x = points.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max);
    let min_y = points.iter().map(|p| p.y).fold(f64::INFINITY, f64::min);
    let max_y = points.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max);
    let width = max_x - min_x;
    let height = max_y - min_y;
    ShapeSize::Irregular {
        bounding_width: width,
        bounding_height: height,
        bounding_area: width * height,
        point_spread: std_dev(distances),
    }
}

fn line_shape(points: &[Vec3]) -> ShapeSize {
    let mut max_dist = 0.0;
    let mut endpoints = [[points[0].x, points[0].y], [points[0].x, points[0].y]];
    for i in 0..points.len() {
        for j in (i + 1)..points.len() {
            let d = points[i].distance(&points[j]);
            if d > max_dist {
                max_dist = d;
                endpoints = [[points[i].x, points[i].y], [points[j].x, points[j].y]];
            }
        }
    }
    let ys: Vec<f64> = points.iter().map(|p| p.y).collect();
    let min_y = ys.iter().cloned().fold(f64::INFINITY, f64::min);
    let max_y = ys.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    ShapeSize::Line {
        length: max_dist,
        endpoints,
        width_spread: std_dev(&[min_y, max_y]),
    }
}

/// Analyze the average velocity, speed, direction, and coherence of a
/// cluster's members (section 4.5, "Movement classification detail").
/// Ports `analyzeClusterVelocity` + `classifyMovementPattern`.
pub fn analyze_velocity(
    velocities: &[Vec3],
    positions: &[Vec3],
    centroid: Vec3,
    thresholds: &MovementThresholds,
) -> VelocityAnalysis {
    if velocities.len() < 2 {
        return VelocityAnalysis::insufficient_data();
    }

    let avg_velocity = mean(velocities);
    let avg_speed = avg_velocity.magnitude();
    let movement_direction_degrees = avg_velocity.y.atan2(avg_velocity.x).to_degrees();

    let vx: Vec<f64> = velocities.iter().map(|v| v.x).collect();
    let vy: Vec<f64> = velocities.iter().map(|v| v.y).collect();
    let vz: Vec<f64> = velocities.iter().map(|v| v.z).collect();
    let velocity_std = Vec3::new(std_dev(&vx), std_dev(&vy), std_dev(&vz));
    let velocity_coherence = 1.0 - (velocity_std.magnitude() / (avg_speed + 1e-6));

    let movement_type = classify_movement_pattern(velocities, positions, centroid, avg_speed, velocity_coherence, thresholds);

    VelocityAnalysis {
        movement_type,
        average_velocity: avg_velocity,
        velocity_magnitude: avg_speed,
        movement_direction_degrees,
        velocity_coherence,
    }
}

fn classify_movement_pattern(
    velocities: &[Vec3],
    positions: &[Vec3],
    centroid: Vec3,
    avg_speed: f64,
    velocity_coherence: f64,
    thresholds: &MovementThresholds,
) -> MovementPattern {
    if avg_speed < thresholds.stationary_threshold {
        return MovementPattern::Stationary;
    }
    if velocity_coherence > thresholds.velocity_coherence_threshold {
        return MovementPattern::CoordinatedParallel;
    }

    let mut convergence_score = 0usize;
    let mut divergence_score = 0usize;
    for (pos, vel) in positions.iter().zip(velocities.iter()) {
        let to_center = centroid.sub(pos);
        let to_center_norm = to_center.scale(1.0 / (to_center.magnitude() + 1e-6));
        let vel_2d = Vec3::new(vel.x, vel.y, 0.0);
        let vel_norm = vel_2d.scale(1.0 / (vel_2d.magnitude() + 1e-6));
        let alignment = vel_norm.dot(&to_center_norm);
        if alignment > thresholds.alignment_threshold {
            convergence_score += 1;
        } else if alignment < -thresholds.alignment_threshold {
            divergence_score += 1;
        }
    }

    let total = velocities.len() as f64;
    let convergence_ratio = convergence_score as f64 / total;
    let divergence_ratio = divergence_score as f64 / total;

    if convergence_ratio > thresholds.convergence_divergence_ratio_threshold {
        MovementPattern::Converging
    } else if divergence_ratio > thresholds.convergence_divergence_ratio_threshold {
        MovementPattern::Diverging
    } else if velocity_coherence > 0.2 {
        MovementPattern::LooselyCoordinated
    } else {
        MovementPattern::Chaotic
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clusters_dense_group_leaves_outlier_as_noise() {
        let points = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(0.2, 0.0, 0.0),
            Vec3::new(0.0, 0.2, 0.0),
            Vec3::new(100.0, 100.0, 0.0),
        ];
        let clusters = cluster(&points, DbscanParams { eps: 1.0, min_samples: 3 });
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].len(), 3);
    }

    #[test]
    fn circle_points_classify_as_circle() {
        let thresholds = ShapeThresholds::default();
        let n = 8;
        let points: Vec<Vec3> = (0..n)
            .map(|i| {
                let angle = (i as f64) / (n as f64) * std::f64::consts::TAU;
                Vec3::new(angle.cos(), angle.sin(), 0.0)
            })
            .collect();
        let shape = classify_shape(&points, &thresholds);
        assert_eq!(shape.kind(), analytics_types::ShapeKind::Circle);
        if let ShapeSize::Circle { radius, .. } = shape {
            approx::assert_relative_eq!(radius, 1.0, epsilon = 1e-9);
        } else {
            panic!("expected circle shape");
        }
    }

    #[test]
    fn stationary_cluster_classified_as_stationary() {
        let thresholds = MovementThresholds::default();
        let velocities = vec![Vec3::ZERO, Vec3::ZERO, Vec3::ZERO];
        let positions = vec![Vec3::new(0.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0)];
        let centroid = mean(&positions);
        let analysis = analyze_velocity(&velocities, &positions, centroid, &thresholds);
        assert_eq!(analysis.movement_type, MovementPattern::Stationary);
    }
}
