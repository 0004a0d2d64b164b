use crate::model::Point;
use std::collections::{HashMap, VecDeque};
use tracing::debug;

/// Collapse near-duplicate candidates into one centroid per cluster.
///
/// Two points share a cluster when a chain of points, each within `epsilon`
/// of the next, connects them (single linkage; every point is a core point).
/// Returns an empty list for empty input.
pub fn cluster_points(points: &[Point], epsilon: f64) -> Vec<Point> {
    if points.is_empty() {
        return Vec::new();
    }

    let cell = epsilon.max(1.0);
    let grid = build_grid(points, cell);
    let mut visited = vec![false; points.len()];
    let mut clusters = Vec::new();

    for seed in 0..points.len() {
        if visited[seed] {
            continue;
        }

        let mut members = Vec::new();
        let mut queue = VecDeque::new();
        visited[seed] = true;
        queue.push_back(seed);

        while let Some(idx) = queue.pop_front() {
            members.push(idx);
            let (cx, cy) = cell_of(&points[idx], cell);

            // 3x3 neighbourhood of cells covers every point within epsilon
            for dx in -1..=1 {
                for dy in -1..=1 {
                    let Some(bucket) = grid.get(&(cx + dx, cy + dy)) else {
                        continue;
                    };
                    for &other in bucket {
                        if !visited[other] && points[idx].distance_to(&points[other]) <= epsilon {
                            visited[other] = true;
                            queue.push_back(other);
                        }
                    }
                }
            }
        }

        clusters.push(centroid(points, &members));
    }

    debug!(
        "Clustered {} candidate points into {} corners (epsilon {:.1}px)",
        points.len(),
        clusters.len(),
        epsilon
    );

    clusters
}

fn build_grid(points: &[Point], cell: f64) -> HashMap<(i64, i64), Vec<usize>> {
    let mut grid: HashMap<(i64, i64), Vec<usize>> = HashMap::new();
    for (i, p) in points.iter().enumerate() {
        grid.entry(cell_of(p, cell)).or_default().push(i);
    }
    grid
}

fn cell_of(p: &Point, cell: f64) -> (i64, i64) {
    (
        (p.x as f64 / cell).floor() as i64,
        (p.y as f64 / cell).floor() as i64,
    )
}

fn centroid(points: &[Point], members: &[usize]) -> Point {
    let n = members.len() as f64;
    let sum_x: f64 = members.iter().map(|&i| points[i].x as f64).sum();
    let sum_y: f64 = members.iter().map(|&i| points[i].y as f64).sum();
    Point::new((sum_x / n).round() as i32, (sum_y / n).round() as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input() {
        assert!(cluster_points(&[], 20.0).is_empty());
    }

    #[test]
    fn test_merges_nearby_points() {
        let points = vec![
            Point::new(100, 100),
            Point::new(104, 100),
            Point::new(102, 106),
            Point::new(500, 500),
        ];

        let clusters = cluster_points(&points, 20.0);

        assert_eq!(clusters, vec![Point::new(102, 102), Point::new(500, 500)]);
    }

    #[test]
    fn test_chained_neighbourhoods_merge() {
        // Ends are 45px apart but linked through the middle points
        let points = vec![
            Point::new(0, 0),
            Point::new(15, 0),
            Point::new(30, 0),
            Point::new(45, 0),
        ];

        let clusters = cluster_points(&points, 20.0);

        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0], Point::new(23, 0));
    }

    #[test]
    fn test_already_clustered_set_is_unchanged() {
        let points = vec![
            Point::new(0, 0),
            Point::new(300, 0),
            Point::new(300, 200),
            Point::new(0, 200),
            Point::new(21, 0),
        ];

        let once = cluster_points(&points, 20.0);
        assert_eq!(once, points);

        let twice = cluster_points(&once, 20.0);
        assert_eq!(twice, once);
    }

    #[test]
    fn test_points_across_cell_boundary() {
        let points = vec![Point::new(39, 39), Point::new(41, 41)];

        assert_eq!(cluster_points(&points, 20.0).len(), 1);
    }
}
