//! Contracts exchanged with external geometry classifiers and boundary
//! reviewers.
//!
//! Classifiers return raw text. Responses are recovered with
//! [`parse_response`], which tolerates Markdown fences and surrounding prose;
//! anything that still fails to parse is treated as "no classification".

use crate::feedback::Contour;
use crate::model::{GeometryModel, GeometryPayload, Point};
use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use tracing::{debug, info, warn};

/// What a classifier is asked to decide about a geometry payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationMode {
    /// Flag invalid corners and read wall lengths
    WallLengths,
    /// Pick the true perimeter corners in connection order
    PerimeterSubset,
    /// Move misplaced corners onto the actual wall intersections
    CornerCorrection,
}

/// Geometry classification capability, usually backed by a vision-language model
pub trait GeometryClassifier {
    fn classify(
        &self,
        mode: ClassificationMode,
        geometry: &GeometryPayload,
    ) -> impl Future<Output = anyhow::Result<String>>;
}

/// Reviews the current boundary contours and reports issues as raw text
pub trait BoundaryReviewer {
    fn review(&self, contours: &[Contour], round: usize)
        -> impl Future<Output = anyhow::Result<String>>;
}

/// Classifier used when no external service is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct NoClassifier;

impl GeometryClassifier for NoClassifier {
    async fn classify(
        &self,
        mode: ClassificationMode,
        _geometry: &GeometryPayload,
    ) -> anyhow::Result<String> {
        anyhow::bail!("no classifier configured for {:?}", mode)
    }
}

impl BoundaryReviewer for NoClassifier {
    async fn review(&self, _contours: &[Contour], round: usize) -> anyhow::Result<String> {
        anyhow::bail!("no reviewer configured for round {}", round)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WallLengthResponse {
    #[serde(default)]
    pub invalid_corners: Vec<usize>,
    #[serde(default)]
    pub walls: Vec<ClassifiedWall>,
}

/// Wall length as read off the drawing by the classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedWall {
    #[serde(default, alias = "wall_number")]
    pub wall_id: Option<usize>,
    #[serde(default)]
    pub length: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerimeterSubsetResponse {
    pub perimeter_corner_ids: Vec<usize>,
    #[serde(default)]
    pub explanation: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CornerCorrectionResponse {
    #[serde(default)]
    pub corrected_corners: Vec<CornerCorrection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CornerCorrection {
    pub id: usize,
    pub corrected_x: f64,
    pub corrected_y: f64,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedbackResponse {
    #[serde(default)]
    pub issues: Vec<BoundaryIssue>,
    #[serde(default)]
    pub overall_assessment: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryIssue {
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub problem: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub suggestion: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueKind {
    Deviation,
    MissingSegment,
    FalsePositive,
}

impl BoundaryIssue {
    /// Problem category, `None` for anything the loop does not act on
    pub fn kind(&self) -> Option<IssueKind> {
        match self.problem.trim().to_lowercase().replace(['_', '-'], " ").as_str() {
            "deviation" => Some(IssueKind::Deviation),
            "missing segment" | "missing" => Some(IssueKind::MissingSegment),
            "false positive" => Some(IssueKind::FalsePositive),
            _ => None,
        }
    }
}

/// Locate the JSON document in a raw model response.
///
/// The first fenced code block wins; otherwise the outermost `{ ... }` span.
pub fn extract_json(content: &str) -> Option<&str> {
    let trimmed = content.trim();

    if let Some(start) = trimmed.find("```") {
        let after_fence = &trimmed[start + 3..];
        // Skip the language tag (```json)
        let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &after_fence[body_start..];
        if let Some(end) = body.find("```") {
            let block = body[..end].trim();
            if block.starts_with('{') || block.starts_with('[') {
                return Some(block);
            }
        }
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (start < end).then(|| &trimmed[start..=end])
}

/// Parse a typed classifier response out of raw model text
pub fn parse_response<T: DeserializeOwned>(raw: &str) -> anyhow::Result<T> {
    let json = extract_json(raw).context("response contains no JSON object")?;
    let parsed = serde_json::from_str(json).context("response JSON does not match the expected shape")?;
    Ok(parsed)
}

/// Move corners to classifier-supplied positions and refresh the lengths of
/// the walls currently in the model. Returns the ids that moved.
pub fn apply_corner_corrections(
    model: &mut GeometryModel,
    corrections: &[CornerCorrection],
) -> Vec<usize> {
    let mut moved = Vec::new();

    for correction in corrections {
        let Some(corner) = model.corner_mut(correction.id) else {
            warn!("Correction names unknown corner {}, ignoring", correction.id);
            continue;
        };

        let target = Point::new(
            correction.corrected_x.round() as i32,
            correction.corrected_y.round() as i32,
        );
        if corner.position == target {
            continue;
        }

        debug!(
            "Corner {} moved ({}, {}) -> ({}, {}): {}",
            corner.id,
            corner.position.x,
            corner.position.y,
            target.x,
            target.y,
            correction.reason
        );
        corner.position = target;
        moved.push(correction.id);
    }

    if !moved.is_empty() {
        model.refresh_wall_lengths();
        info!("Applied {} corner corrections", moved.len());
    }
    moved
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_from_markdown() {
        let response = "Here is the analysis:\n```json\n{\"invalid_corners\": [2]}\n```\nDone.";
        assert_eq!(extract_json(response), Some("{\"invalid_corners\": [2]}"));
    }

    #[test]
    fn test_extract_json_plain_and_prose() {
        assert_eq!(extract_json(r#"{"a": 1}"#), Some(r#"{"a": 1}"#));
        assert_eq!(
            extract_json(r#"Sure! {"a": {"b": 2}} Hope this helps."#),
            Some(r#"{"a": {"b": 2}}"#)
        );
        assert_eq!(extract_json("I could not find any corners."), None);
    }

    #[test]
    fn test_parse_wall_length_response_with_alias() {
        let raw = r#"```json
{"invalid_corners": [5, 7], "walls": [{"wall_number": 1, "length": "55'-0\"", "position": "top"}]}
```"#;
        let response: WallLengthResponse = parse_response(raw).unwrap();

        assert_eq!(response.invalid_corners, vec![5, 7]);
        assert_eq!(response.walls[0].wall_id, Some(1));
        assert_eq!(response.walls[0].length.as_deref(), Some("55'-0\""));
    }

    #[test]
    fn test_parse_rejects_wrong_shape() {
        let raw = r#"{"perimeter_corner_ids": "all of them"}"#;
        assert!(parse_response::<PerimeterSubsetResponse>(raw).is_err());
        assert!(parse_response::<PerimeterSubsetResponse>("no json here").is_err());
    }

    #[test]
    fn test_issue_kinds() {
        let issue = |problem: &str| BoundaryIssue {
            location: "top".to_string(),
            problem: problem.to_string(),
            description: String::new(),
            suggestion: String::new(),
        };

        assert_eq!(issue("Deviation").kind(), Some(IssueKind::Deviation));
        assert_eq!(issue("false_positive").kind(), Some(IssueKind::FalsePositive));
        assert_eq!(issue("missing segment").kind(), Some(IssueKind::MissingSegment));
        assert_eq!(issue("blurry").kind(), None);
    }

    #[test]
    fn test_corner_corrections_refresh_lengths() {
        let mut model = GeometryModel::from_points(&[
            Point::new(0, 0),
            Point::new(290, 3),
            Point::new(300, 200),
            Point::new(0, 200),
        ]);
        let corrections = vec![
            CornerCorrection {
                id: 1,
                corrected_x: 299.6,
                corrected_y: 0.4,
                reason: "snap to wall intersection".to_string(),
            },
            CornerCorrection {
                id: 12,
                corrected_x: 0.0,
                corrected_y: 0.0,
                reason: String::new(),
            },
        ];

        let moved = apply_corner_corrections(&mut model, &corrections);

        assert_eq!(moved, vec![1]);
        assert_eq!(model.corners[1].position, Point::new(300, 0));
        assert_eq!(model.walls[0].length_pixels, 300.0);
        assert_eq!(model.walls[1].length_pixels, 200.0);
    }

    #[tokio::test]
    async fn test_no_classifier_always_fails() {
        let payload = GeometryModel::default().to_payload();
        assert!(NoClassifier
            .classify(ClassificationMode::WallLengths, &payload)
            .await
            .is_err());
        assert!(NoClassifier.review(&[], 0).await.is_err());
    }
}
