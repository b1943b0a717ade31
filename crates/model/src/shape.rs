//! Geometric payloads owned by labels.
//!
//! A shape has no identity on its own; it is addressed through the
//! [`IndexedShape`] wrapper stored in an item's shape map.

use serde::{Deserialize, Serialize};

use crate::domain::{LabelId, ShapeId, ShapeTypeName};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Vector2D {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Vector3D {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3D {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Axis-aligned 2D box stored by its two corners.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rect {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl Default for Rect {
    fn default() -> Self {
        Self {
            x1: -1.0,
            y1: -1.0,
            x2: -1.0,
            y2: -1.0,
        }
    }
}

impl Rect {
    pub fn x(&self) -> f64 {
        self.x1.min(self.x2)
    }

    pub fn y(&self) -> f64 {
        self.y1.min(self.y2)
    }

    pub fn w(&self) -> f64 {
        (self.x2 - self.x1).abs()
    }

    pub fn h(&self) -> f64 {
        (self.y2 - self.y1).abs()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathPointType {
    #[default]
    Vertex,
    Midpoint,
    Bezier,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathPoint2D {
    pub x: f64,
    pub y: f64,
    #[serde(rename = "type")]
    pub point_type: PathPointType,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Polygon {
    pub points: Vec<PathPoint2D>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Cube {
    pub center: Vector3D,
    pub size: Vector3D,
    pub orientation: Vector3D,
    pub anchor_index: u32,
    pub surface_id: i64,
}

impl Default for Cube {
    fn default() -> Self {
        Self {
            center: Vector3D::default(),
            size: Vector3D::new(1.0, 1.0, 1.0),
            orientation: Vector3D::default(),
            anchor_index: 0,
            surface_id: -1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Plane3D {
    pub center: Vector3D,
    pub orientation: Vector3D,
}

/// Shape payload keyed by its type discriminant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Shape {
    Rect(Rect),
    Polygon2d(Polygon),
    PathPoint2d(PathPoint2D),
    Cube(Cube),
    /// Ground plane marker rendered as a grid.
    Grid(Plane3D),
}

impl Default for Shape {
    fn default() -> Self {
        Shape::Rect(Rect::default())
    }
}

impl Shape {
    pub fn type_name(&self) -> ShapeTypeName {
        match self {
            Shape::Rect(_) => ShapeTypeName::Rect,
            Shape::Polygon2d(_) => ShapeTypeName::Polygon2d,
            Shape::PathPoint2d(_) => ShapeTypeName::PathPoint2d,
            Shape::Cube(_) => ShapeTypeName::Cube,
            Shape::Grid(_) => ShapeTypeName::Grid,
        }
    }

    pub fn as_rect(&self) -> Option<&Rect> {
        match self {
            Shape::Rect(rect) => Some(rect),
            _ => None,
        }
    }
}

impl From<Rect> for Shape {
    fn from(value: Rect) -> Self {
        Shape::Rect(value)
    }
}

impl From<Polygon> for Shape {
    fn from(value: Polygon) -> Self {
        Shape::Polygon2d(value)
    }
}

impl From<PathPoint2D> for Shape {
    fn from(value: PathPoint2D) -> Self {
        Shape::PathPoint2d(value)
    }
}

impl From<Cube> for Shape {
    fn from(value: Cube) -> Self {
        Shape::Cube(value)
    }
}

impl From<Plane3D> for Shape {
    fn from(value: Plane3D) -> Self {
        Shape::Grid(value)
    }
}

/// A shape together with its id and the labels that own it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexedShape {
    pub id: ShapeId,
    #[serde(rename = "label")]
    pub labels: Vec<LabelId>,
    pub shape: Shape,
}

impl IndexedShape {
    pub fn type_name(&self) -> ShapeTypeName {
        self.shape.type_name()
    }

    pub fn is_owned_by(&self, label: LabelId) -> bool {
        self.labels.contains(&label)
    }
}

pub fn make_rect(x1: f64, y1: f64, x2: f64, y2: f64) -> Rect {
    Rect { x1, y1, x2, y2 }
}

pub fn make_polygon(points: &[PathPoint2D]) -> Polygon {
    Polygon {
        points: points.to_vec(),
    }
}

pub fn make_path_point(x: f64, y: f64, point_type: PathPointType) -> PathPoint2D {
    PathPoint2D { x, y, point_type }
}

pub fn make_cube(center: Vector3D, size: Vector3D, orientation: Vector3D) -> Cube {
    Cube {
        center,
        size,
        orientation,
        ..Cube::default()
    }
}

pub fn make_plane(center: Vector3D, orientation: Vector3D) -> Plane3D {
    Plane3D {
        center,
        orientation,
    }
}

pub fn make_indexed_shape(id: ShapeId, labels: &[LabelId], shape: &Shape) -> IndexedShape {
    IndexedShape {
        id,
        labels: labels.to_vec(),
        shape: shape.clone(),
    }
}
