use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Wire sentinel for "no reference".
            pub const NONE: Self = Self(-1);

            pub fn is_none(self) -> bool {
                self.0 < 0
            }

            pub fn is_some(self) -> bool {
                !self.is_none()
            }

            /// The id after this one, or `None` once the `i64` range is spent.
            pub fn next(self) -> Option<Self> {
                self.0.checked_add(1).map(Self)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::NONE
            }
        }

        impl From<$name> for i64 {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(LabelId);
id_newtype!(ShapeId);
id_newtype!(TrackId);
id_newtype!(ItemId);
id_newtype!(SensorId);
id_newtype!(ViewerConfigId);

/// Kind of annotation a label represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelTypeName {
    #[default]
    Empty,
    #[serde(rename = "box2d")]
    Box2d,
    #[serde(rename = "polygon2d")]
    Polygon2d,
    #[serde(rename = "polyline2d")]
    Polyline2d,
    Tag,
    #[serde(rename = "box3d")]
    Box3d,
    #[serde(rename = "plane3d")]
    Plane3d,
}

impl LabelTypeName {
    /// Whether a label of this type may own a shape of the given type.
    pub fn accepts(self, shape: ShapeTypeName) -> bool {
        match self {
            LabelTypeName::Empty => true,
            LabelTypeName::Box2d => shape == ShapeTypeName::Rect,
            LabelTypeName::Polygon2d | LabelTypeName::Polyline2d => matches!(
                shape,
                ShapeTypeName::Polygon2d | ShapeTypeName::PathPoint2d
            ),
            LabelTypeName::Tag => false,
            LabelTypeName::Box3d => shape == ShapeTypeName::Cube,
            LabelTypeName::Plane3d => shape == ShapeTypeName::Grid,
        }
    }
}

impl fmt::Display for LabelTypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LabelTypeName::Empty => "empty",
            LabelTypeName::Box2d => "box2d",
            LabelTypeName::Polygon2d => "polygon2d",
            LabelTypeName::Polyline2d => "polyline2d",
            LabelTypeName::Tag => "tag",
            LabelTypeName::Box3d => "box3d",
            LabelTypeName::Plane3d => "plane3d",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeTypeName {
    Rect,
    #[serde(rename = "polygon2d")]
    Polygon2d,
    #[serde(rename = "path_point2d")]
    PathPoint2d,
    Cube,
    Grid,
}

impl fmt::Display for ShapeTypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ShapeTypeName::Rect => "rect",
            ShapeTypeName::Polygon2d => "polygon2d",
            ShapeTypeName::PathPoint2d => "path_point2d",
            ShapeTypeName::Cube => "cube",
            ShapeTypeName::Grid => "grid",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewerConfigType {
    Image,
    PointCloud,
}

/// Kind of sensor data an item or sensor carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    #[default]
    Image,
    Video,
    PointCloud,
    PointCloudTracking,
    #[serde(rename = "image_3d")]
    Image3d,
}

/// Entity families that can be referenced by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Item,
    Label,
    Shape,
    Track,
    Sensor,
    ViewerConfig,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Item => "item",
            EntityKind::Label => "label",
            EntityKind::Shape => "shape",
            EntityKind::Track => "track",
            EntityKind::Sensor => "sensor",
            EntityKind::ViewerConfig => "viewer config",
        };
        f.write_str(name)
    }
}
