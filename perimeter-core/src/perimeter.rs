use crate::error::{PerimeterError, Result};
use crate::model::{Corner, GeometryModel};
use std::collections::HashSet;
use tracing::{info, warn};

/// Rebuild a closed perimeter from an ordered subset of candidate corner ids.
///
/// Corners are re-indexed `0..n` in the supplied order and keep their
/// candidate id in `original_id`. Unknown and repeated ids are skipped.
pub fn rebuild_from_subset(candidates: &GeometryModel, perimeter_ids: &[usize]) -> Result<GeometryModel> {
    if perimeter_ids.is_empty() {
        return Err(PerimeterError::NoPerimeterIdentified);
    }

    let mut seen = HashSet::new();
    let mut corners = Vec::with_capacity(perimeter_ids.len());

    for &original_id in perimeter_ids {
        if !seen.insert(original_id) {
            warn!("Perimeter subset repeats corner {}, skipping", original_id);
            continue;
        }
        let Some(source) = candidates.corner(original_id) else {
            warn!("Perimeter subset names unknown corner {}, skipping", original_id);
            continue;
        };

        corners.push(Corner {
            id: corners.len(),
            position: source.position,
            is_valid: true,
            original_id: Some(original_id),
        });
    }

    if corners.len() < 3 {
        return Err(PerimeterError::TooFewCorners {
            found: corners.len(),
        });
    }

    info!(
        "Rebuilt perimeter from {} of {} candidate corners",
        corners.len(),
        candidates.corners.len()
    );

    Ok(GeometryModel::from_corners(corners))
}
