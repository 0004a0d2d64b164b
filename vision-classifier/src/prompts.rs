//! Instructions sent alongside the drawing, one per classification mode.
//! Each spells out the JSON contract the response is parsed against.

use perimeter_core::classification::ClassificationMode;
use perimeter_core::GeometryPayload;

const PREAMBLE: &str = "You are reviewing a scanned building foundation plan. \
Foundations are rectilinear: straight exterior walls meeting at roughly 90 degree corners.";

/// Instructions for a geometry classification request
pub fn geometry_prompt(
    mode: ClassificationMode,
    geometry: &GeometryPayload,
    reference_length: Option<&str>,
) -> anyhow::Result<String> {
    let geometry_json = serde_json::to_string_pretty(geometry)?;
    let scale_hint = reference_length
        .map(|r| format!("\nThe overall foundation width is {}. Use it as the reference scale.", r))
        .unwrap_or_default();

    let task = match mode {
        ClassificationMode::WallLengths => {
            r#"Mark corners that are not real structural corners (points on arcs, text or
dimension-line artifacts, points creating very short walls) and read the length of
every valid exterior wall from the drawing, keeping the wall ids below.

Respond with JSON only:
{"invalid_corners": [5, 6], "walls": [{"wall_id": 1, "length": "55'-0\"", "position": "top"}]}"#
        }
        ClassificationMode::PerimeterSubset => {
            r#"Pick the candidate corners that form the exterior foundation perimeter, including
jogs, steps and entrances, and list them in connection order (either direction,
starting anywhere). Ignore points on dimension markers or text.

Respond with JSON only:
{"perimeter_corner_ids": [0, 4, 5, 9], "explanation": "why these corners"}"#
        }
        ClassificationMode::CornerCorrection => {
            r#"Move corners so walls meet at right angles where the drawing shows they should,
preserving the overall shape. Only list corners that need to move.

Respond with JSON only:
{"corrected_corners": [{"id": 1, "corrected_x": 300, "corrected_y": 200, "reason": "align with wall 0-1"}]}"#
        }
    };

    Ok(format!(
        "{}{}\n\nDetected geometry ({} corners, {} walls, pixel coordinates):\n```json\n{}\n```\n\n{}",
        PREAMBLE,
        scale_hint,
        geometry.corners.len(),
        geometry.walls.len(),
        geometry_json,
        task
    ))
}

/// Instructions for a boundary review round over the green overlay
pub fn review_prompt(round: usize, contour_count: usize) -> String {
    format!(
        r#"{}

Review round {}. The {} detected perimeter outline(s) are drawn as green lines.
Report where a green line deviates from the wall, where a wall has no green line,
and where a green line is not a wall. Describe locations with top/middle/bottom
and left/center/right.

Respond with JSON only:
{{"issues": [{{"location": "bottom center", "problem": "deviation", "description": "...", "suggestion": "..."}}],
 "overall_assessment": "..."}}
problem must be one of: deviation, missing segment, false positive"#,
        PREAMBLE,
        round + 1,
        contour_count
    )
}
