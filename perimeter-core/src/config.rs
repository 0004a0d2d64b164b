use serde::{Deserialize, Serialize};

use crate::calibration::ReferenceDimension;

/// Tunable heuristics for the whole engine.
///
/// Every field has a default, so a config file only needs to name the values
/// it overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PerimeterConfig {
    pub clustering: ClusteringConfig,
    pub validity: ValidityConfig,
    pub filter: FilterConfig,
    pub calibration: CalibrationConfig,
    pub feedback: FeedbackConfig,
    pub metrics: MetricsConfig,
}

impl PerimeterConfig {
    /// Parse a (possibly partial) JSON config document
    pub fn from_json_str(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// Neighbourhood radius used to merge duplicate corner candidates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ClusterRadius {
    /// Fixed radius in pixels
    Absolute { pixels: f64 },
    /// Fraction of the smaller image side, keeps clustering scale-invariant
    RelativeToImage { fraction: f64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    pub radius: ClusterRadius,
    /// Radius used when a relative radius is configured but no image size is known
    pub fallback_pixels: f64,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            radius: ClusterRadius::Absolute { pixels: 20.0 },
            fallback_pixels: 20.0,
        }
    }
}

impl ClusteringConfig {
    /// Resolve the configured radius to pixels for an image of the given size
    pub fn epsilon_for(&self, image_size: Option<(u32, u32)>) -> f64 {
        match (self.radius, image_size) {
            (ClusterRadius::Absolute { pixels }, _) => pixels,
            (ClusterRadius::RelativeToImage { fraction }, Some((w, h))) => {
                w.min(h) as f64 * fraction
            }
            (ClusterRadius::RelativeToImage { .. }, None) => self.fallback_pixels,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidityConfig {
    /// Lower bound of the long-wall threshold, in pixels
    pub long_wall_min_pixels: f64,
    /// Long-wall threshold as a fraction of the average wall length
    pub long_wall_avg_ratio: f64,
    /// Bounding-box margin, as a fraction of the extent on each axis
    pub perimeter_margin_ratio: f64,
    pub right_angle_min_deg: f64,
    pub right_angle_max_deg: f64,
    /// A closed rectilinear foundation needs at least this many corners
    pub min_valid_corners: usize,
}

impl Default for ValidityConfig {
    fn default() -> Self {
        Self {
            long_wall_min_pixels: 100.0,
            long_wall_avg_ratio: 0.5,
            perimeter_margin_ratio: 0.05,
            right_angle_min_deg: 60.0,
            right_angle_max_deg: 120.0,
            min_valid_corners: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Dropping more than this fraction of walls triggers relaxed restoration
    pub over_filter_ratio: f64,
    pub relaxed_long_wall_pixels: f64,
    pub relaxed_min_adjacent_walls: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            over_filter_ratio: 0.3,
            relaxed_long_wall_pixels: 100.0,
            relaxed_min_adjacent_walls: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub reference: ReferenceDimension,
    /// Inches per pixel outside this range is flagged as suspicious
    pub plausible_scale_min: f64,
    pub plausible_scale_max: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            reference: ReferenceDimension::LongestWall,
            plausible_scale_min: 0.1,
            plausible_scale_max: 30.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    /// Rows/columns below this fraction of the image are top/left
    pub near_band: f64,
    /// Rows/columns above this fraction of the image are bottom/right
    pub far_band: f64,
    /// Total rounds including the final feedback-free round
    pub iterations: usize,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            near_band: 0.3,
            far_band: 0.7,
            iterations: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub wall_height_feet: f64,
    pub wall_thickness_inches: f64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            wall_height_feet: 8.0,
            wall_thickness_inches: 8.0,
        }
    }
}
