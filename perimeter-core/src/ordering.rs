use crate::error::{PerimeterError, Result};
use crate::model::Point;
use ordered_float::OrderedFloat;

/// Order corner candidates into a closed loop by angle around their centroid.
///
/// The loop only avoids self-intersection when the set is star-shaped around
/// the centroid; an explicit perimeter subset should be preferred when one is
/// available.
pub fn order_perimeter(points: &[Point]) -> Result<Vec<Point>> {
    if points.len() < 3 {
        return Err(PerimeterError::TooFewCorners {
            found: points.len(),
        });
    }

    let (cx, cy) = centroid(points);
    let mut ordered = points.to_vec();
    ordered.sort_by_key(|p| OrderedFloat((p.y as f64 - cy).atan2(p.x as f64 - cx)));

    Ok(ordered)
}

fn centroid(points: &[Point]) -> (f64, f64) {
    let n = points.len() as f64;
    let x = points.iter().map(|p| p.x as f64).sum::<f64>() / n;
    let y = points.iter().map(|p| p.y as f64).sum::<f64>() / n;
    (x, y)
}
