use crate::classification::{
    parse_response, BoundaryIssue, BoundaryReviewer, FeedbackResponse, IssueKind,
};
use crate::config::FeedbackConfig;
use crate::model::{BoundingBox, Point};
use geo::{Centroid, Coord, LineString, Polygon};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Closed boundary outline in pixel coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contour {
    pub points: Vec<Point>,
}

impl Contour {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    /// Area centroid, falling back to the bounding-box centre for degenerate outlines
    pub fn centroid(&self) -> Option<(f64, f64)> {
        let coords: Vec<Coord> = self
            .points
            .iter()
            .map(|p| Coord {
                x: p.x as f64,
                y: p.y as f64,
            })
            .collect();

        let polygon = Polygon::new(LineString::from(coords), vec![]);
        if let Some(c) = polygon.centroid() {
            if c.x().is_finite() && c.y().is_finite() {
                return Some((c.x(), c.y()));
            }
        }

        let bbox = BoundingBox::from_points(&self.points)?;
        Some((
            (bbox.min_x + bbox.max_x) as f64 / 2.0,
            (bbox.min_y + bbox.max_y) as f64 / 2.0,
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerticalBand {
    Top,
    Middle,
    Bottom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HorizontalBand {
    Left,
    Center,
    Right,
}

/// Coarse image region named by a reviewer's location tag.
///
/// A row band is required. Column bands are alternatives; none means any column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub vertical: VerticalBand,
    pub horizontal: Vec<HorizontalBand>,
}

impl Region {
    /// Parse a free-text tag such as "bottom left"; `None` without a top/middle/bottom keyword
    pub fn parse(tag: &str) -> Option<Region> {
        let tag = tag.to_lowercase();

        let vertical = if tag.contains("bottom") {
            VerticalBand::Bottom
        } else if tag.contains("top") {
            VerticalBand::Top
        } else if tag.contains("middle") {
            VerticalBand::Middle
        } else {
            return None;
        };

        let mut horizontal = Vec::new();
        if tag.contains("left") {
            horizontal.push(HorizontalBand::Left);
        }
        if tag.contains("center") || tag.contains("centre") {
            horizontal.push(HorizontalBand::Center);
        }
        if tag.contains("right") {
            horizontal.push(HorizontalBand::Right);
        }

        Some(Region {
            vertical,
            horizontal,
        })
    }

    pub fn contains(&self, x: f64, y: f64, image_size: (u32, u32), config: &FeedbackConfig) -> bool {
        let (width, height) = (image_size.0 as f64, image_size.1 as f64);

        let in_row = band_contains(band_index_v(self.vertical), y, height, config);
        let in_column = self.horizontal.is_empty()
            || self
                .horizontal
                .iter()
                .any(|&band| band_contains(band_index_h(band), x, width, config));
        in_row && in_column
    }
}

fn band_index_v(band: VerticalBand) -> usize {
    match band {
        VerticalBand::Top => 0,
        VerticalBand::Middle => 1,
        VerticalBand::Bottom => 2,
    }
}

fn band_index_h(band: HorizontalBand) -> usize {
    match band {
        HorizontalBand::Left => 0,
        HorizontalBand::Center => 1,
        HorizontalBand::Right => 2,
    }
}

/// Near band is `< near`, middle is `[near, far]`, far band is `> far`
fn band_contains(index: usize, value: f64, extent: f64, config: &FeedbackConfig) -> bool {
    let near = extent * config.near_band;
    let far = extent * config.far_band;
    match index {
        0 => value < near,
        1 => value >= near && value <= far,
        _ => value > far,
    }
}

/// What one round did to the contours
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoundOutcome {
    pub round: usize,
    pub issues: Vec<BoundaryIssue>,
    pub contours_in: usize,
    pub contours_out: usize,
    pub dropped_contours: usize,
    pub straightened_bands: usize,
    /// Locations of reported missing segments; these are never repaired
    pub missing_segments: Vec<String>,
    pub overall_assessment: String,
    /// Set for the final round, which never consults the reviewer
    pub feedback_free: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedbackHistory {
    pub rounds: Vec<RoundOutcome>,
    pub final_contours: Vec<Contour>,
}

/// Apply one set of reviewer issues to the contours.
///
/// False positives drop every contour whose centroid falls in the flagged
/// region. Deviations at the top or bottom replace the contour's points in
/// that band with a straight two-point segment. Missing segments are only
/// recorded. Contours left with fewer than 3 points are discarded.
pub fn apply_feedback(
    contours: &[Contour],
    issues: &[BoundaryIssue],
    image_size: (u32, u32),
    config: &FeedbackConfig,
) -> (Vec<Contour>, RoundOutcome) {
    let mut outcome = RoundOutcome {
        issues: issues.to_vec(),
        contours_in: contours.len(),
        ..RoundOutcome::default()
    };

    let parsed: Vec<(IssueKind, Region)> = issues
        .iter()
        .filter_map(|issue| {
            let kind = issue.kind()?;
            if kind == IssueKind::MissingSegment {
                info!(
                    "Missing segment in {} detected but not automatically fixed",
                    issue.location
                );
                outcome.missing_segments.push(issue.location.clone());
                return None;
            }
            match Region::parse(&issue.location) {
                Some(region) => Some((kind, region)),
                None => {
                    debug!("Ignoring issue with unrecognised location '{}'", issue.location);
                    None
                }
            }
        })
        .collect();

    let mut improved = Vec::with_capacity(contours.len());

    for contour in contours {
        let Some((cx, cy)) = contour.centroid() else {
            continue;
        };
        let flagged = |kind: IssueKind| -> Vec<Region> {
            parsed
                .iter()
                .filter(|(k, region)| *k == kind && region.contains(cx, cy, image_size, config))
                .map(|(_, region)| region.clone())
                .collect()
        };

        if !flagged(IssueKind::FalsePositive).is_empty() {
            debug!("Dropping false-positive contour centred at ({:.0}, {:.0})", cx, cy);
            outcome.dropped_contours += 1;
            continue;
        }

        let mut points = contour.points.clone();
        for region in flagged(IssueKind::Deviation) {
            let band = match region.vertical {
                band @ (VerticalBand::Top | VerticalBand::Bottom) => band,
                VerticalBand::Middle => continue,
            };
            if let Some(straightened) = straighten_band(&points, band, image_size.1, config) {
                points = straightened;
                outcome.straightened_bands += 1;
            }
        }

        if points.len() >= 3 {
            improved.push(Contour::new(points));
        }
    }

    outcome.contours_out = improved.len();
    (improved, outcome)
}

/// Replace the points inside a horizontal band with a level segment spanning them
fn straighten_band(
    points: &[Point],
    band: VerticalBand,
    height: u32,
    config: &FeedbackConfig,
) -> Option<Vec<Point>> {
    let index = band_index_v(band);
    let in_band = |p: &Point| band_contains(index, p.y as f64, height as f64, config);

    let first = points.iter().position(in_band)?;
    let band_points: Vec<&Point> = points.iter().filter(|p| in_band(p)).collect();

    let avg_y = band_points.iter().map(|p| p.y as f64).sum::<f64>() / band_points.len() as f64;
    let min_x = band_points.iter().map(|p| p.x).min()?;
    let max_x = band_points.iter().map(|p| p.x).max()?;
    let level = avg_y.round() as i32;

    // Keep the direction of travel through the band
    let mut segment = [Point::new(min_x, level), Point::new(max_x, level)];
    if band_points[0].x > band_points[band_points.len() - 1].x {
        segment.reverse();
    }

    let mut result: Vec<Point> = points.iter().filter(|p| !in_band(p)).copied().collect();
    let insert_at = points[..first].iter().filter(|p| !in_band(p)).count();
    result.insert(insert_at, segment[1]);
    result.insert(insert_at, segment[0]);

    (result.len() >= 3).then_some(result)
}

/// Runs the review-and-patch rounds over a set of boundary contours
#[derive(Debug, Clone, Default)]
pub struct FeedbackLoop {
    pub config: FeedbackConfig,
}

impl FeedbackLoop {
    pub fn new(config: FeedbackConfig) -> Self {
        Self { config }
    }

    /// Run every configured round in order; the last round is feedback-free.
    ///
    /// Reviewer failures and unparseable responses count as rounds with no issues.
    pub async fn run<R: BoundaryReviewer>(
        &self,
        contours: Vec<Contour>,
        image_size: (u32, u32),
        reviewer: &R,
    ) -> FeedbackHistory {
        let mut current = contours;
        let mut rounds = Vec::with_capacity(self.config.iterations);

        for round in 0..self.config.iterations {
            if round + 1 == self.config.iterations {
                info!("Round {}: final round, keeping {} contours", round + 1, current.len());
                rounds.push(RoundOutcome {
                    round,
                    contours_in: current.len(),
                    contours_out: current.len(),
                    feedback_free: true,
                    ..RoundOutcome::default()
                });
                break;
            }

            let response = match reviewer.review(&current, round).await {
                Ok(raw) => match parse_response::<FeedbackResponse>(&raw) {
                    Ok(response) => response,
                    Err(e) => {
                        warn!("Round {}: unreadable review ({:#}), no changes", round + 1, e);
                        FeedbackResponse::default()
                    }
                },
                Err(e) => {
                    warn!("Round {}: review failed ({:#}), no changes", round + 1, e);
                    FeedbackResponse::default()
                }
            };

            let (next, mut outcome) =
                apply_feedback(&current, &response.issues, image_size, &self.config);
            outcome.round = round;
            outcome.overall_assessment = response.overall_assessment;

            info!(
                "Round {}: {} issues, {} -> {} contours",
                round + 1,
                outcome.issues.len(),
                outcome.contours_in,
                outcome.contours_out
            );

            current = next;
            rounds.push(outcome);
        }

        FeedbackHistory {
            rounds,
            final_contours: current,
        }
    }
}
