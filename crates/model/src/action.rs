//! The closed set of intents understood by the reducer.
//!
//! Actions describe a desired transition and never carry ids for entities
//! they create; ids and orders are allocated by [`crate::reducer::apply`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    domain::{LabelId, LabelTypeName, SensorId, ShapeId, TrackId, ViewerConfigId},
    error::ApplyError,
    shape::{Cube, PathPoint2D, Plane3D, Polygon, Shape, Vector3D, make_rect},
    states::{AttributeMap, Label, LabelParams, ViewerConfig, make_label},
};

/// Label fields that may be edited after creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<Vec<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<AttributeMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manual: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensors: Option<Vec<SensorId>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<LabelId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shapes: Option<Vec<ShapeId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<AttributeMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label_type: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_type: Option<u32>,
}

/// Track a set of labels is linked into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackTarget {
    New,
    Existing(TrackId),
}

/// One member of a track created by [`Action::AddTrack`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackLabel {
    pub item_index: usize,
    pub label: Label,
    #[serde(default)]
    pub shapes: Vec<Shape>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionScope {
    Task,
    User,
    Session,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Action {
    /// Creates a label from `label` in the item at `item_index`.
    ///
    /// `shapes` are created and owned by the new label. Ids already listed in
    /// the template's `shapes` name existing shapes of the same item that the
    /// label shares; a template `parent` attaches the label under that label.
    AddLabel {
        item_index: usize,
        label: Label,
        #[serde(default)]
        shapes: Vec<Shape>,
    },
    ChangeLabel {
        label_id: LabelId,
        patch: LabelPatch,
    },
    DeleteLabel {
        label_id: LabelId,
    },
    LinkLabelsToTrack {
        label_ids: Vec<LabelId>,
        track: TrackTarget,
    },
    ChangeShape {
        shape_id: ShapeId,
        patch: Map<String, Value>,
    },
    AddTrack {
        labels: Vec<TrackLabel>,
    },
    DeleteTrack {
        track_id: TrackId,
    },
    AddViewerConfig {
        config: ViewerConfig,
    },
    ChangeViewerConfig {
        config_id: ViewerConfigId,
        patch: Map<String, Value>,
    },
    Select(SelectPatch),
    GoToItem {
        item_index: usize,
    },
    InitSession {
        id: String,
        start_time: i64,
    },
    LoadItem {
        item_index: usize,
        sensor: SensorId,
    },
    Submit {
        time: i64,
    },
}

impl Action {
    /// Every wire tag of the vocabulary.
    pub const TAGS: [&'static str; 14] = [
        "add_label",
        "change_label",
        "delete_label",
        "link_labels_to_track",
        "change_shape",
        "add_track",
        "delete_track",
        "add_viewer_config",
        "change_viewer_config",
        "select",
        "go_to_item",
        "init_session",
        "load_item",
        "submit",
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Action::AddLabel { .. } => "add_label",
            Action::ChangeLabel { .. } => "change_label",
            Action::DeleteLabel { .. } => "delete_label",
            Action::LinkLabelsToTrack { .. } => "link_labels_to_track",
            Action::ChangeShape { .. } => "change_shape",
            Action::AddTrack { .. } => "add_track",
            Action::DeleteTrack { .. } => "delete_track",
            Action::AddViewerConfig { .. } => "add_viewer_config",
            Action::ChangeViewerConfig { .. } => "change_viewer_config",
            Action::Select(_) => "select",
            Action::GoToItem { .. } => "go_to_item",
            Action::InitSession { .. } => "init_session",
            Action::LoadItem { .. } => "load_item",
            Action::Submit { .. } => "submit",
        }
    }

    /// The branch of the state tree the action primarily edits.
    pub fn scope(&self) -> ActionScope {
        match self {
            Action::AddLabel { .. }
            | Action::ChangeLabel { .. }
            | Action::DeleteLabel { .. }
            | Action::LinkLabelsToTrack { .. }
            | Action::ChangeShape { .. }
            | Action::AddTrack { .. }
            | Action::DeleteTrack { .. }
            | Action::Submit { .. } => ActionScope::Task,
            Action::AddViewerConfig { .. }
            | Action::ChangeViewerConfig { .. }
            | Action::Select(_)
            | Action::GoToItem { .. } => ActionScope::User,
            Action::InitSession { .. } | Action::LoadItem { .. } => ActionScope::Session,
        }
    }

    /// Decodes an action from its wire form.
    ///
    /// An unknown `type` tag is reported as [`ApplyError::UnsupportedAction`];
    /// a known tag with a malformed payload as [`ApplyError::Validation`].
    pub fn from_json(value: &Value) -> Result<Self, ApplyError> {
        let tag = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| ApplyError::validation("action has no `type` tag"))?;
        if !Self::TAGS.contains(&tag) {
            return Err(ApplyError::UnsupportedAction(tag.to_string()));
        }
        serde_json::from_value(value.clone())
            .map_err(|error| ApplyError::validation(format!("malformed `{tag}` action: {error}")))
    }
}

pub fn add_label(item_index: usize, label: Label, shapes: Vec<Shape>) -> Action {
    Action::AddLabel {
        item_index,
        label,
        shapes,
    }
}

fn typed_label(label_type: LabelTypeName, category: &[u32]) -> Label {
    make_label(LabelParams {
        label_type: Some(label_type),
        category: Some(category.to_vec()),
        ..LabelParams::default()
    })
}

/// Adds a 2D bounding box with top-left corner `(x, y)` and size `w` x `h`.
pub fn add_box2d_label(item_index: usize, category: &[u32], x: f64, y: f64, w: f64, h: f64) -> Action {
    let rect = make_rect(x, y, x + w, y + h);
    add_label(
        item_index,
        typed_label(LabelTypeName::Box2d, category),
        vec![rect.into()],
    )
}

pub fn add_polygon2d_label(item_index: usize, category: &[u32], points: &[PathPoint2D]) -> Action {
    let polygon = Polygon {
        points: points.to_vec(),
    };
    add_label(
        item_index,
        typed_label(LabelTypeName::Polygon2d, category),
        vec![polygon.into()],
    )
}

pub fn add_box3d_label(
    item_index: usize,
    category: &[u32],
    center: Vector3D,
    size: Vector3D,
    orientation: Vector3D,
) -> Action {
    let cube = Cube {
        center,
        size,
        orientation,
        ..Cube::default()
    };
    add_label(
        item_index,
        typed_label(LabelTypeName::Box3d, category),
        vec![cube.into()],
    )
}

pub fn add_plane3d_label(item_index: usize, center: Vector3D, orientation: Vector3D) -> Action {
    let plane = Plane3D {
        center,
        orientation,
    };
    add_label(
        item_index,
        typed_label(LabelTypeName::Plane3d, &[]),
        vec![plane.into()],
    )
}

pub fn change_label(label_id: LabelId, patch: LabelPatch) -> Action {
    Action::ChangeLabel { label_id, patch }
}

pub fn change_category(label_id: LabelId, category: &[u32]) -> Action {
    change_label(
        label_id,
        LabelPatch {
            category: Some(category.to_vec()),
            ..LabelPatch::default()
        },
    )
}

pub fn delete_label(label_id: LabelId) -> Action {
    Action::DeleteLabel { label_id }
}

pub fn link_labels_to_track(label_ids: &[LabelId], track: TrackTarget) -> Action {
    Action::LinkLabelsToTrack {
        label_ids: label_ids.to_vec(),
        track,
    }
}

fn patch_object(patch: Value) -> Result<Map<String, Value>, ApplyError> {
    match patch {
        Value::Object(map) => Ok(map),
        other => Err(ApplyError::validation(format!(
            "a patch must be a JSON object, got `{other}`"
        ))),
    }
}

/// Builds a shape patch; `patch` must be a JSON object.
pub fn change_shape(shape_id: ShapeId, patch: Value) -> Result<Action, ApplyError> {
    Ok(Action::ChangeShape {
        shape_id,
        patch: patch_object(patch)?,
    })
}

pub fn add_track(labels: Vec<TrackLabel>) -> Action {
    Action::AddTrack { labels }
}

pub fn delete_track(track_id: TrackId) -> Action {
    Action::DeleteTrack { track_id }
}

pub fn add_viewer_config(config: ViewerConfig) -> Action {
    Action::AddViewerConfig { config }
}

pub fn change_viewer_config(config_id: ViewerConfigId, patch: Value) -> Result<Action, ApplyError> {
    Ok(Action::ChangeViewerConfig {
        config_id,
        patch: patch_object(patch)?,
    })
}

pub fn select(patch: SelectPatch) -> Action {
    Action::Select(patch)
}

pub fn select_labels(labels: &[LabelId], shapes: &[ShapeId]) -> Action {
    select(SelectPatch {
        labels: Some(labels.to_vec()),
        shapes: Some(shapes.to_vec()),
        ..SelectPatch::default()
    })
}

pub fn go_to_item(item_index: usize) -> Action {
    Action::GoToItem { item_index }
}

pub fn init_session(id: impl Into<String>, start_time: i64) -> Action {
    Action::InitSession {
        id: id.into(),
        start_time,
    }
}

pub fn load_item(item_index: usize, sensor: SensorId) -> Action {
    Action::LoadItem { item_index, sensor }
}

pub fn submit(time: i64) -> Action {
    Action::Submit { time }
}

#[cfg(test)]
#[path = "tests/action_tests.rs"]
mod tests;
