use crate::config::CalibrationConfig;
use crate::error::{PerimeterError, Result};
use crate::model::GeometryModel;
use image::GrayImage;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Pixel span a reference length is matched against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceDimension {
    /// Pixel length of the longest wall in the model
    LongestWall,
    /// Horizontal extent of the wall mask
    MaskWidth,
    /// Vertical extent of the wall mask
    MaskHeight,
    /// Horizontal extent of the corner bounding box
    CornerExtentWidth,
}

impl ReferenceDimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceDimension::LongestWall => "longest_wall",
            ReferenceDimension::MaskWidth => "mask_width",
            ReferenceDimension::MaskHeight => "mask_height",
            ReferenceDimension::CornerExtentWidth => "corner_extent_width",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Horizontal,
    Vertical,
}

/// Scale applied to a model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub reference_length: String,
    pub reference_inches: u32,
    pub reference: ReferenceDimension,
    pub pixel_span: f64,
    /// Inches per pixel
    pub scale_factor: f64,
    /// False when the scale falls outside the configured plausible range
    pub plausible: bool,
}

/// Parse a feet-and-inches dimension into inches.
///
/// Accepts `55'-6"`, `55'`, `55' 6"`, a bare `55` (feet) and an inch-only
/// `8"`. Escaped quotes and typographic primes are normalized first.
pub fn parse_feet_inches(input: &str) -> Result<u32> {
    let normalized: String = input
        .replace('\\', "")
        .replace(['\u{2019}', '\u{2032}'], "'")
        .replace(['\u{201c}', '\u{201d}', '\u{2033}'], "\"");
    let text = normalized.trim();

    let invalid = |reason: &str| PerimeterError::InvalidDimension {
        input: input.to_string(),
        reason: reason.to_string(),
    };

    if text.is_empty() {
        return Err(invalid("empty dimension"));
    }

    if let Some((feet_part, rest)) = text.split_once('\'') {
        let feet: u32 = feet_part
            .trim()
            .parse()
            .map_err(|_| invalid("feet must be a whole number"))?;

        let inches_part = rest
            .trim()
            .trim_start_matches('-')
            .trim()
            .trim_end_matches('"')
            .trim();
        let inches: u32 = if inches_part.is_empty() {
            0
        } else {
            inches_part
                .parse()
                .map_err(|_| invalid("inches must be a whole number"))?
        };
        if inches >= 12 {
            return Err(invalid("inches must be below 12"));
        }

        return feet
            .checked_mul(12)
            .and_then(|v| v.checked_add(inches))
            .ok_or_else(|| invalid("dimension too large"));
    }

    if let Some(inches_part) = text.strip_suffix('"') {
        return inches_part
            .trim()
            .parse()
            .map_err(|_| invalid("inches must be a whole number"));
    }

    let feet: u32 = text
        .parse()
        .map_err(|_| invalid("expected <feet>'-<inches>\" or a whole number of feet"))?;
    feet.checked_mul(12)
        .ok_or_else(|| invalid("dimension too large"))
}

/// Physical units per pixel; 0 when the pixel span is 0
pub fn calculate_scale_factor(reference_length: f64, pixel_span: f64) -> f64 {
    if pixel_span == 0.0 {
        return 0.0;
    }
    reference_length / pixel_span
}

/// Format a length in inches as `<feet>'-<inches>"` after rounding to a whole inch
pub fn format_feet_inches(inches: f64) -> String {
    let total = inches.round().max(0.0) as u64;
    format!("{}'-{}\"", total / 12, total % 12)
}

/// Set the physical length of every wall from its pixel length
pub fn apply_scale(model: &mut GeometryModel, scale_factor: f64) {
    for wall in &mut model.walls {
        wall.length = Some(format_feet_inches(wall.length_pixels * scale_factor));
    }
    model.scale_factor = Some(scale_factor);
}

/// Distance between the outermost set pixels of a binary mask along one axis
pub fn mask_extent(mask: &GrayImage, orientation: Orientation) -> u32 {
    let mut bounds: Option<(u32, u32)> = None;

    for (x, y, pixel) in mask.enumerate_pixels() {
        if pixel[0] < 128 {
            continue;
        }
        let v = match orientation {
            Orientation::Horizontal => x,
            Orientation::Vertical => y,
        };
        bounds = Some(match bounds {
            Some((lo, hi)) => (lo.min(v), hi.max(v)),
            None => (v, v),
        });
    }

    bounds.map(|(lo, hi)| hi - lo).unwrap_or(0)
}

/// Measure the pixel span for the chosen reference dimension
pub fn reference_span(
    model: &GeometryModel,
    reference: ReferenceDimension,
    mask: Option<&GrayImage>,
) -> Result<f64> {
    match reference {
        ReferenceDimension::LongestWall => model
            .longest_wall()
            .map(|w| w.length_pixels)
            .ok_or(PerimeterError::NoWalls),
        ReferenceDimension::MaskWidth => mask
            .map(|m| mask_extent(m, Orientation::Horizontal) as f64)
            .ok_or(PerimeterError::MissingWallMask(reference.as_str())),
        ReferenceDimension::MaskHeight => mask
            .map(|m| mask_extent(m, Orientation::Vertical) as f64)
            .ok_or(PerimeterError::MissingWallMask(reference.as_str())),
        ReferenceDimension::CornerExtentWidth => Ok(model
            .bounding_box()
            .map(|b| b.width() as f64)
            .unwrap_or(0.0)),
    }
}

/// Calibrate a model against a known real-world length and label every wall
pub fn calibrate(
    model: &mut GeometryModel,
    reference_length: &str,
    mask: Option<&GrayImage>,
    config: &CalibrationConfig,
) -> Result<Calibration> {
    let reference_inches = parse_feet_inches(reference_length)?;
    let pixel_span = reference_span(model, config.reference, mask)?;

    let scale_factor = calculate_scale_factor(reference_inches as f64, pixel_span);
    if scale_factor == 0.0 {
        return Err(PerimeterError::ZeroPixelSpan);
    }

    apply_scale(model, scale_factor);

    let plausible =
        (config.plausible_scale_min..=config.plausible_scale_max).contains(&scale_factor);
    if !plausible {
        warn!(
            "Unreasonable scale factor: {:.4} inches per pixel (expected {}-{})",
            scale_factor, config.plausible_scale_min, config.plausible_scale_max
        );
    }

    info!(
        "Scale factor: {:.4} inches per pixel ({} = {} in over {:.1}px {})",
        scale_factor,
        reference_length,
        reference_inches,
        pixel_span,
        config.reference.as_str()
    );

    Ok(Calibration {
        reference_length: reference_length.to_string(),
        reference_inches,
        reference: config.reference,
        pixel_span,
        scale_factor,
        plausible,
    })
}
