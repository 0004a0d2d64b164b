use crate::config::ValidityConfig;
use crate::model::{GeometryModel, Point};
use nalgebra::Vector2;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

/// Rule that brought a corner back after it was marked invalid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoreRule {
    /// Sits on the bounding-box perimeter and touches a long wall
    PerimeterLongWall,
    /// Two adjacent walls meet at roughly a right angle
    RightAngle,
    /// Restored by importance rank to reach the minimum corner count
    Importance,
    /// Restored by the wall filter's relaxed pass
    Structural,
}

/// Per-round validity state of a corner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CornerState {
    Valid,
    MarkedInvalid,
    RestoredValid(RestoreRule),
    Invalid,
}

impl CornerState {
    pub fn is_valid(&self) -> bool {
        matches!(self, CornerState::Valid | CornerState::RestoredValid(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidityReport {
    /// Final state of every corner, keyed by corner id
    pub states: BTreeMap<usize, CornerState>,
    pub long_wall_threshold: f64,
    /// Ids named by the classifier that do not exist in the model
    pub unknown_ids: Vec<usize>,
}

impl ValidityReport {
    pub fn restored_by(&self, rule: RestoreRule) -> Vec<usize> {
        self.states
            .iter()
            .filter(|(_, s)| **s == CornerState::RestoredValid(rule))
            .map(|(&id, _)| id)
            .collect()
    }

    /// Record corners restored after this report was produced
    pub fn record_restorations(&mut self, ids: &[usize], rule: RestoreRule) {
        for &id in ids {
            self.states.insert(id, CornerState::RestoredValid(rule));
        }
    }

    pub fn invalid(&self) -> Vec<usize> {
        self.states
            .iter()
            .filter(|(_, s)| !s.is_valid())
            .map(|(&id, _)| id)
            .collect()
    }
}

/// Reconcile an external "invalid corner" verdict with geometric evidence.
///
/// External invalidation is applied as given, then each invalid corner is
/// independently re-checked: perimeter position with a long wall, then a
/// near-right angle between adjacent walls. Finally, if fewer than
/// `min_valid_corners` remain valid, invalid corners are restored by
/// importance until the minimum is met or none are left.
pub fn apply_classification(
    model: &mut GeometryModel,
    invalid_ids: &[usize],
    config: &ValidityConfig,
) -> ValidityReport {
    let mut states: BTreeMap<usize, CornerState> = model
        .corners
        .iter()
        .map(|c| {
            let state = if c.is_valid {
                CornerState::Valid
            } else {
                CornerState::MarkedInvalid
            };
            (c.id, state)
        })
        .collect();
    let mut unknown_ids = Vec::new();

    // Pass 1: trust the external verdict
    for &id in invalid_ids {
        match model.corner_mut(id) {
            Some(corner) => {
                corner.is_valid = false;
                states.insert(id, CornerState::MarkedInvalid);
                debug!("Marked corner {} as invalid from classification", id);
            }
            None => {
                warn!("Classification named unknown corner {}", id);
                unknown_ids.push(id);
            }
        }
    }

    let long_wall_threshold = config
        .long_wall_min_pixels
        .max(model.average_wall_length() * config.long_wall_avg_ratio);
    debug!("Long wall threshold: {:.1} pixels", long_wall_threshold);

    let positions: HashMap<usize, Point> =
        model.corners.iter().map(|c| (c.id, c.position)).collect();
    let invalid: Vec<usize> = model
        .corners
        .iter()
        .filter(|c| !c.is_valid)
        .map(|c| c.id)
        .collect();

    // Pass 2: geometric evidence can overrule the classifier
    for id in invalid {
        let rule = if at_perimeter_with_long_wall(model, id, long_wall_threshold, config) {
            Some(RestoreRule::PerimeterLongWall)
        } else if has_right_angle(model, &positions, id, config) {
            Some(RestoreRule::RightAngle)
        } else {
            None
        };

        if let Some(rule) = rule {
            restore(model, &mut states, id, rule);
        }
    }

    // Pass 3: keep enough corners for a closed foundation
    let mut valid_count = model.valid_corner_count();
    if valid_count < config.min_valid_corners {
        warn!(
            "Only {} valid corners, restoring by importance (minimum {})",
            valid_count, config.min_valid_corners
        );

        let mut ranked: Vec<(usize, f64)> = model
            .corners
            .iter()
            .filter(|c| !c.is_valid)
            .map(|c| (c.id, importance(model, c.id)))
            .collect();
        ranked.sort_by_key(|&(_, score)| std::cmp::Reverse(OrderedFloat(score)));

        for (id, _) in ranked {
            if valid_count >= config.min_valid_corners {
                break;
            }
            restore(model, &mut states, id, RestoreRule::Importance);
            valid_count += 1;
        }
    }

    for state in states.values_mut() {
        if *state == CornerState::MarkedInvalid {
            *state = CornerState::Invalid;
        }
    }

    let report = ValidityReport {
        states,
        long_wall_threshold,
        unknown_ids,
    };
    info!(
        "Validity pass: {} valid, {} invalid, {} restored",
        model.valid_corner_count(),
        report.invalid().len(),
        report
            .states
            .values()
            .filter(|s| matches!(s, CornerState::RestoredValid(_)))
            .count()
    );
    report
}

fn restore(
    model: &mut GeometryModel,
    states: &mut BTreeMap<usize, CornerState>,
    id: usize,
    rule: RestoreRule,
) {
    if let Some(corner) = model.corner_mut(id) {
        corner.is_valid = true;
        states.insert(id, CornerState::RestoredValid(rule));
        info!("Restored corner {} as valid ({:?})", id, rule);
    }
}

fn at_perimeter_with_long_wall(
    model: &GeometryModel,
    id: usize,
    threshold: f64,
    config: &ValidityConfig,
) -> bool {
    let (Some(corner), Some(bbox)) = (model.corner(id), model.bounding_box()) else {
        return false;
    };
    let x_margin = config.perimeter_margin_ratio * bbox.width() as f64;
    let y_margin = config.perimeter_margin_ratio * bbox.height() as f64;
    let p = corner.position;

    let at_x = ((p.x - bbox.min_x) as f64).abs() <= x_margin
        || ((p.x - bbox.max_x) as f64).abs() <= x_margin;
    let at_y = ((p.y - bbox.min_y) as f64).abs() <= y_margin
        || ((p.y - bbox.max_y) as f64).abs() <= y_margin;

    at_x && at_y && model.adjacent_walls(id).any(|w| w.length_pixels > threshold)
}

fn has_right_angle(
    model: &GeometryModel,
    positions: &HashMap<usize, Point>,
    id: usize,
    config: &ValidityConfig,
) -> bool {
    let Some(origin) = positions.get(&id) else {
        return false;
    };

    // Unit vectors pointing away from the corner along each adjacent wall
    let directions: Vec<Vector2<f64>> = model
        .adjacent_walls(id)
        .filter_map(|wall| {
            let other = if wall.start_corner_id == id {
                wall.end_corner_id
            } else {
                wall.start_corner_id
            };
            let target = positions.get(&other)?;
            let v = Vector2::new((target.x - origin.x) as f64, (target.y - origin.y) as f64);
            v.try_normalize(f64::EPSILON)
        })
        .collect();

    if directions.len() < 2 {
        return false;
    }

    for i in 0..directions.len() {
        for j in (i + 1)..directions.len() {
            let cos = directions[i].dot(&directions[j]).clamp(-1.0, 1.0);
            let angle = cos.acos().to_degrees();
            if angle >= config.right_angle_min_deg && angle <= config.right_angle_max_deg {
                return true;
            }
        }
    }
    false
}

/// Number of adjacent walls times their combined pixel length
fn importance(model: &GeometryModel, id: usize) -> f64 {
    let (count, total) = model
        .adjacent_walls(id)
        .fold((0usize, 0.0), |(n, sum), w| (n + 1, sum + w.length_pixels));
    count as f64 * total
}
