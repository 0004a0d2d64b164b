use crate::config::FilterConfig;
use crate::model::{GeometryModel, Wall};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Result of removing walls that touch invalid corners
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterOutcome {
    pub total_walls: usize,
    pub kept_walls: usize,
    pub dropped_wall_ids: Vec<usize>,
    /// Set when the first pass would have dropped too many walls
    pub safety_valve_triggered: bool,
    /// Corners brought back by the relaxed restoration pass
    pub restored_corners: Vec<usize>,
}

impl FilterOutcome {
    pub fn kept_fraction(&self) -> f64 {
        if self.total_walls == 0 {
            1.0
        } else {
            self.kept_walls as f64 / self.total_walls as f64
        }
    }
}

/// Keep only walls whose endpoints are both valid.
///
/// If more than `over_filter_ratio` of the walls would be dropped, invalid
/// corners touching at least `relaxed_min_adjacent_walls` walls, one of them
/// longer than `relaxed_long_wall_pixels`, are restored before filtering
/// again. The model may be left partial (fewer walls than corners).
pub fn filter_walls(model: &mut GeometryModel, config: &FilterConfig) -> FilterOutcome {
    let total_walls = model.walls.len();
    let mut dropped = dropped_walls(model);
    let mut safety_valve_triggered = false;
    let mut restored_corners = Vec::new();

    if dropped.len() as f64 > config.over_filter_ratio * total_walls as f64 {
        warn!(
            "Filter would drop {} of {} walls, rechecking corner validity",
            dropped.len(),
            total_walls
        );
        safety_valve_triggered = true;

        let candidates: Vec<usize> = model
            .corners
            .iter()
            .filter(|c| !c.is_valid)
            .map(|c| c.id)
            .filter(|&id| is_structural(model, id, config))
            .collect();

        for id in candidates {
            if let Some(corner) = model.corner_mut(id) {
                corner.is_valid = true;
                info!("Restored corner {} as valid based on structural importance", id);
                restored_corners.push(id);
            }
        }

        dropped = dropped_walls(model);
    }

    for wall in &dropped {
        debug!(
            "Filtered out wall {} connecting corners {} and {}",
            wall.id, wall.start_corner_id, wall.end_corner_id
        );
    }

    let dropped_wall_ids: Vec<usize> = dropped.iter().map(|w| w.id).collect();
    model.walls.retain(|w| !dropped_wall_ids.contains(&w.id));

    info!("Wall filter kept {} of {} walls", model.walls.len(), total_walls);

    FilterOutcome {
        total_walls,
        kept_walls: model.walls.len(),
        dropped_wall_ids,
        safety_valve_triggered,
        restored_corners,
    }
}

fn dropped_walls(model: &GeometryModel) -> Vec<Wall> {
    model
        .walls
        .iter()
        .filter(|w| {
            !(model.is_corner_valid(w.start_corner_id) && model.is_corner_valid(w.end_corner_id))
        })
        .cloned()
        .collect()
}

fn is_structural(model: &GeometryModel, id: usize, config: &FilterConfig) -> bool {
    let adjacent: Vec<&Wall> = model.adjacent_walls(id).collect();
    adjacent.len() >= config.relaxed_min_adjacent_walls
        && adjacent
            .iter()
            .any(|w| w.length_pixels > config.relaxed_long_wall_pixels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Point;

    fn stepped_rectangle() -> GeometryModel {
        GeometryModel::from_points(&[
            Point::new(0, 0),
            Point::new(50, 0),
            Point::new(400, 0),
            Point::new(400, 300),
            Point::new(0, 300),
        ])
    }

    #[test]
    fn test_all_valid_keeps_every_wall() {
        let mut model = stepped_rectangle();
        let outcome = filter_walls(&mut model, &FilterConfig::default());

        assert_eq!(outcome.kept_walls, 5);
        assert!(outcome.dropped_wall_ids.is_empty());
        assert!(!outcome.safety_valve_triggered);
        assert!(model.is_full_loop());
    }

    #[test]
    fn test_drops_walls_below_valve() {
        // 10 walls, one invalid corner drops 2 (20%)
        let points: Vec<Point> = (0..10)
            .map(|i| {
                let a = i as f64 / 10.0 * std::f64::consts::TAU;
                Point::new((500.0 * a.cos()) as i32, (500.0 * a.sin()) as i32)
            })
            .collect();
        let mut model = GeometryModel::from_points(&points);
        model.corner_mut(4).unwrap().is_valid = false;

        let outcome = filter_walls(&mut model, &FilterConfig::default());

        assert!(!outcome.safety_valve_triggered);
        assert_eq!(outcome.dropped_wall_ids, vec![4, 5]);
        assert_eq!(model.walls.len(), 8);
        assert!(!model.is_full_loop());
    }

    #[test]
    fn test_safety_valve_restores_structural_corner() {
        let mut model = stepped_rectangle();
        // Corner 1 touches a 50px and a 350px wall, corner 3 two long walls
        model.corner_mut(1).unwrap().is_valid = false;
        model.corner_mut(3).unwrap().is_valid = false;

        let outcome = filter_walls(&mut model, &FilterConfig::default());

        assert!(outcome.safety_valve_triggered);
        assert_eq!(outcome.restored_corners, vec![1, 3]);
        assert_eq!(outcome.kept_walls, 5);
    }

    #[test]
    fn test_safety_valve_skips_short_corners() {
        let mut model = GeometryModel::from_points(&[
            Point::new(0, 0),
            Point::new(40, 0),
            Point::new(80, 0),
            Point::new(80, 60),
        ]);
        model.corner_mut(1).unwrap().is_valid = false;

        let outcome = filter_walls(&mut model, &FilterConfig::default());

        assert!(outcome.safety_valve_triggered);
        assert!(outcome.restored_corners.is_empty());
        assert_eq!(outcome.kept_walls, 2);
        assert!((outcome.kept_fraction() - 0.5).abs() < 1e-9);
    }
}
