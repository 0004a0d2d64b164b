use petgraph::algo::connected_components;
use petgraph::graph::{NodeIndex, UnGraph};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Pixel coordinate of a corner candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Point) -> f64 {
        let dx = (self.x - other.x) as f64;
        let dy = (self.y - other.y) as f64;
        (dx * dx + dy * dy).sqrt()
    }
}

fn default_valid() -> bool {
    true
}

/// Vertex candidate of the foundation perimeter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Corner {
    pub id: usize,
    #[serde(flatten)]
    pub position: Point,
    #[serde(default = "default_valid")]
    pub is_valid: bool,
    /// Id of this corner in the candidate model it was rebuilt from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_id: Option<usize>,
}

impl Corner {
    pub fn new(id: usize, position: Point) -> Self {
        Self {
            id,
            position,
            is_valid: true,
            original_id: None,
        }
    }
}

/// Directed edge between two consecutive corners
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wall {
    pub id: usize,
    pub start_corner_id: usize,
    pub end_corner_id: usize,
    pub length_pixels: f64,
    /// Physical length such as `12'-6"`, set once the model is calibrated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<String>,
}

impl Wall {
    pub fn touches(&self, corner_id: usize) -> bool {
        self.start_corner_id == corner_id || self.end_corner_id == corner_id
    }
}

/// Axis-aligned bounds of a corner set, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: i32,
    pub min_y: i32,
    pub max_x: i32,
    pub max_y: i32,
}

impl BoundingBox {
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut bbox = BoundingBox {
            min_x: first.x,
            min_y: first.y,
            max_x: first.x,
            max_y: first.y,
        };
        for p in iter {
            bbox.min_x = bbox.min_x.min(p.x);
            bbox.min_y = bbox.min_y.min(p.y);
            bbox.max_x = bbox.max_x.max(p.x);
            bbox.max_y = bbox.max_y.max(p.y);
        }
        Some(bbox)
    }

    pub fn width(&self) -> i32 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> i32 {
        self.max_y - self.min_y
    }
}

/// Ordered corner loop plus the walls derived from it.
///
/// A freshly built model holds one wall per corner, wall `i` joining corner
/// `i` to corner `(i + 1) % n`. Wall filtering may leave fewer walls than
/// corners; such a model is partial until rebuilt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeometryModel {
    pub corners: Vec<Corner>,
    pub walls: Vec<Wall>,
    /// Inches per pixel, once calibrated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_factor: Option<f64>,
}

impl GeometryModel {
    /// Build a closed model from an already ordered point sequence
    pub fn from_points(points: &[Point]) -> Self {
        let corners = points
            .iter()
            .enumerate()
            .map(|(id, &p)| Corner::new(id, p))
            .collect();
        Self::from_corners(corners)
    }

    /// Build a closed model over corners that keep their existing ids
    pub fn from_corners(corners: Vec<Corner>) -> Self {
        let mut model = Self {
            corners,
            walls: Vec::new(),
            scale_factor: None,
        };
        model.rebuild_walls();
        model
    }

    /// Recreate the closed wall loop from the current corner order
    pub fn rebuild_walls(&mut self) {
        let n = self.corners.len();
        self.walls = (0..n)
            .map(|i| {
                let start = &self.corners[i];
                let end = &self.corners[(i + 1) % n];
                Wall {
                    id: i + 1,
                    start_corner_id: start.id,
                    end_corner_id: end.id,
                    length_pixels: start.position.distance_to(&end.position),
                    length: None,
                }
            })
            .collect();
        self.scale_factor = None;
    }

    /// Recompute pixel lengths of the walls currently in the model after
    /// corners have moved; physical lengths are redone if a scale is set
    pub fn refresh_wall_lengths(&mut self) {
        let positions: HashMap<usize, Point> =
            self.corners.iter().map(|c| (c.id, c.position)).collect();

        for wall in &mut self.walls {
            if let (Some(start), Some(end)) = (
                positions.get(&wall.start_corner_id),
                positions.get(&wall.end_corner_id),
            ) {
                wall.length_pixels = start.distance_to(end);
            }
        }

        if let Some(scale) = self.scale_factor {
            crate::calibration::apply_scale(self, scale);
        }
    }

    pub fn corner(&self, id: usize) -> Option<&Corner> {
        self.corners.iter().find(|c| c.id == id)
    }

    pub fn corner_mut(&mut self, id: usize) -> Option<&mut Corner> {
        self.corners.iter_mut().find(|c| c.id == id)
    }

    pub fn adjacent_walls(&self, corner_id: usize) -> impl Iterator<Item = &Wall> {
        self.walls.iter().filter(move |w| w.touches(corner_id))
    }

    pub fn is_corner_valid(&self, id: usize) -> bool {
        self.corner(id).map(|c| c.is_valid).unwrap_or(false)
    }

    pub fn valid_corner_count(&self) -> usize {
        self.corners.iter().filter(|c| c.is_valid).count()
    }

    pub fn average_wall_length(&self) -> f64 {
        if self.walls.is_empty() {
            return 0.0;
        }
        self.walls.iter().map(|w| w.length_pixels).sum::<f64>() / self.walls.len() as f64
    }

    pub fn longest_wall(&self) -> Option<&Wall> {
        self.walls
            .iter()
            .max_by(|a, b| a.length_pixels.total_cmp(&b.length_pixels))
    }

    pub fn bounding_box(&self) -> Option<BoundingBox> {
        BoundingBox::from_points(self.corners.iter().map(|c| &c.position))
    }

    /// True when the model is a complete closed loop: one wall per corner,
    /// every corner starting and ending exactly one wall, all connected
    pub fn is_full_loop(&self) -> bool {
        self.corners.len() >= 3 && self.walls.len() == self.corners.len() && self.forms_single_cycle()
    }

    fn forms_single_cycle(&self) -> bool {
        let mut graph: UnGraph<usize, usize> = UnGraph::new_undirected();
        let mut nodes: HashMap<usize, NodeIndex> = HashMap::new();
        let mut starts: HashMap<usize, usize> = HashMap::new();
        let mut ends: HashMap<usize, usize> = HashMap::new();

        for corner in &self.corners {
            nodes.insert(corner.id, graph.add_node(corner.id));
        }

        for wall in &self.walls {
            let (Some(&a), Some(&b)) = (
                nodes.get(&wall.start_corner_id),
                nodes.get(&wall.end_corner_id),
            ) else {
                return false;
            };
            graph.add_edge(a, b, wall.id);
            *starts.entry(wall.start_corner_id).or_default() += 1;
            *ends.entry(wall.end_corner_id).or_default() += 1;
        }

        let balanced = self.corners.iter().all(|c| {
            starts.get(&c.id).copied().unwrap_or(0) == 1 && ends.get(&c.id).copied().unwrap_or(0) == 1
        });

        balanced && connected_components(&graph) == 1
    }

    /// Serialize into the corner/wall shape exchanged with classifiers
    pub fn to_payload(&self) -> GeometryPayload {
        let walls = self
            .walls
            .iter()
            .filter_map(|wall| {
                let start = self.corner(wall.start_corner_id)?.position;
                let end = self.corner(wall.end_corner_id)?.position;
                Some(WallRecord {
                    id: wall.id,
                    start_corner_id: wall.start_corner_id,
                    end_corner_id: wall.end_corner_id,
                    start_x: start.x,
                    start_y: start.y,
                    end_x: end.x,
                    end_y: end.y,
                    length_pixels: wall.length_pixels,
                    length: wall.length.clone(),
                })
            })
            .collect();

        GeometryPayload {
            corners: self.corners.clone(),
            walls,
        }
    }
}

/// Wire form of a wall, carrying endpoint coordinates alongside the ids
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WallRecord {
    pub id: usize,
    pub start_corner_id: usize,
    pub end_corner_id: usize,
    pub start_x: i32,
    pub start_y: i32,
    pub end_x: i32,
    pub end_y: i32,
    pub length_pixels: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryPayload {
    pub corners: Vec<Corner>,
    pub walls: Vec<WallRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rectangle() -> GeometryModel {
        GeometryModel::from_points(&[
            Point::new(0, 0),
            Point::new(300, 0),
            Point::new(300, 200),
            Point::new(0, 200),
        ])
    }

    #[test]
    fn test_walls_close_the_loop() {
        let model = rectangle();

        assert_eq!(model.walls.len(), 4);
        assert_eq!(model.walls[3].start_corner_id, 3);
        assert_eq!(model.walls[3].end_corner_id, 0);
        assert_eq!(model.walls[0].id, 1);
        assert_eq!(model.walls[0].length_pixels, 300.0);
        assert!(model.corners.iter().all(|c| c.is_valid));
        assert!(model.is_full_loop());
    }

    #[test]
    fn test_partial_model_is_not_a_loop() {
        let mut model = rectangle();
        model.walls.remove(1);

        assert!(!model.is_full_loop());
    }

    #[test]
    fn test_adjacent_walls() {
        let model = rectangle();
        let ids: Vec<usize> = model.adjacent_walls(0).map(|w| w.id).collect();

        assert_eq!(ids, vec![1, 4]);
    }

    #[test]
    fn test_refresh_wall_lengths_after_move() {
        let mut model = rectangle();
        model.corner_mut(1).unwrap().position = Point::new(400, 0);
        model.refresh_wall_lengths();

        assert_eq!(model.walls[0].length_pixels, 400.0);
        assert_eq!(model.longest_wall().unwrap().id, 1);
    }

    #[test]
    fn test_payload_shape() {
        let json = serde_json::to_value(rectangle().to_payload()).unwrap();

        assert_eq!(json["corners"][1]["x"], 300);
        assert_eq!(json["corners"][1]["is_valid"], true);
        assert!(json["corners"][1].get("original_id").is_none());
        assert_eq!(json["walls"][1]["start_x"], 300);
        assert_eq!(json["walls"][1]["end_y"], 200);
        assert_eq!(json["walls"][1]["length_pixels"], 200.0);
    }

    #[test]
    fn test_bounding_box() {
        let bbox = rectangle().bounding_box().unwrap();

        assert_eq!(bbox.width(), 300);
        assert_eq!(bbox.height(), 200);
        assert!(GeometryModel::default().bounding_box().is_none());
    }
}
