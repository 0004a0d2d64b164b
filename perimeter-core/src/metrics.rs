use crate::calibration::parse_feet_inches;
use crate::config::MetricsConfig;
use crate::error::{PerimeterError, Result};
use crate::model::GeometryModel;
use geo::{Area, Coord, LineString, Polygon};
use serde::{Deserialize, Serialize};

/// Physical quantities derived from a calibrated perimeter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoundationMetrics {
    pub total_linear_feet: f64,
    pub total_corners: usize,
    pub wall_height_feet: f64,
    pub wall_area_sqft: f64,
    pub wall_thickness_feet: f64,
    pub concrete_volume_cuyd: f64,
    pub bounding_box: PhysicalExtent,
    pub footprint_area_sqft: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysicalExtent {
    pub width_feet: f64,
    pub length_feet: f64,
}

/// Derive linear footage, wall area, concrete volume and extents.
///
/// Wall lengths use the rounded physical labels when present so totals agree
/// with the per-wall values reported to the caller.
pub fn compute_metrics(
    model: &GeometryModel,
    scale_factor: f64,
    config: &MetricsConfig,
) -> Result<FoundationMetrics> {
    if model.walls.is_empty() {
        return Err(PerimeterError::NoWalls);
    }
    if scale_factor <= 0.0 {
        return Err(PerimeterError::ZeroPixelSpan);
    }

    let total_inches: f64 = model
        .walls
        .iter()
        .map(|wall| {
            wall.length
                .as_deref()
                .and_then(|label| parse_feet_inches(label).ok())
                .map(|inches| inches as f64)
                .unwrap_or(wall.length_pixels * scale_factor)
        })
        .sum();
    let total_linear_feet = total_inches / 12.0;

    let wall_thickness_feet = config.wall_thickness_inches / 12.0;
    let wall_area_sqft = total_linear_feet * config.wall_height_feet;
    let concrete_volume_cuyd = wall_area_sqft * wall_thickness_feet / 27.0;

    let bounding_box = match model.bounding_box() {
        Some(bbox) => PhysicalExtent {
            width_feet: bbox.width() as f64 * scale_factor / 12.0,
            length_feet: bbox.height() as f64 * scale_factor / 12.0,
        },
        None => PhysicalExtent {
            width_feet: 0.0,
            length_feet: 0.0,
        },
    };

    let footprint_area_sqft = footprint_pixels(model) * scale_factor * scale_factor / 144.0;

    Ok(FoundationMetrics {
        total_linear_feet,
        total_corners: model.corners.len(),
        wall_height_feet: config.wall_height_feet,
        wall_area_sqft,
        wall_thickness_feet,
        concrete_volume_cuyd,
        bounding_box,
        footprint_area_sqft,
    })
}

/// Area enclosed by the corner loop, in square pixels
fn footprint_pixels(model: &GeometryModel) -> f64 {
    if model.corners.len() < 3 {
        return 0.0;
    }

    let coords: Vec<Coord> = model
        .corners
        .iter()
        .map(|c| Coord {
            x: c.position.x as f64,
            y: c.position.y as f64,
        })
        .collect();

    Polygon::new(LineString::from(coords), vec![]).unsigned_area()
}
