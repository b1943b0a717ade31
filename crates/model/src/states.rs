//! State tree records and their factories.
//!
//! Every record implements [`Default`] with the canonical defaults and is
//! deserialized with `#[serde(default)]`, so a partial document always yields
//! a complete record. Records placed in a [`State`] are shared behind [`Arc`]
//! and are never mutated in place.

use std::{collections::BTreeMap, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    domain::{
        DataType, ItemId, LabelId, LabelTypeName, SensorId, ShapeId, TrackId, ViewerConfigId,
        ViewerConfigType,
    },
    shape::{IndexedShape, Vector2D, Vector3D},
};

/// Attribute id to selected value indices.
pub type AttributeMap = BTreeMap<u32, Vec<u32>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Label {
    pub id: LabelId,
    pub item: ItemId,
    pub sensors: Vec<SensorId>,
    #[serde(rename = "type")]
    pub label_type: LabelTypeName,
    pub category: Vec<u32>,
    pub attributes: AttributeMap,
    pub parent: LabelId,
    pub children: Vec<LabelId>,
    pub shapes: Vec<ShapeId>,
    pub track: TrackId,
    pub order: i64,
    /// False when the label was produced by interpolation rather than a user.
    pub manual: bool,
}

impl Default for Label {
    fn default() -> Self {
        Self {
            id: LabelId::NONE,
            item: ItemId::NONE,
            sensors: vec![SensorId::NONE],
            label_type: LabelTypeName::Empty,
            category: Vec::new(),
            attributes: AttributeMap::new(),
            parent: LabelId::NONE,
            children: Vec::new(),
            shapes: Vec::new(),
            track: TrackId::NONE,
            order: 0,
            manual: true,
        }
    }
}

/// Overrides applied on top of the label defaults by [`make_label`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelParams {
    pub id: Option<LabelId>,
    pub item: Option<ItemId>,
    pub sensors: Option<Vec<SensorId>>,
    #[serde(rename = "type")]
    pub label_type: Option<LabelTypeName>,
    pub category: Option<Vec<u32>>,
    pub attributes: Option<AttributeMap>,
    pub parent: Option<LabelId>,
    pub children: Option<Vec<LabelId>>,
    pub shapes: Option<Vec<ShapeId>>,
    pub track: Option<TrackId>,
    pub order: Option<i64>,
    pub manual: Option<bool>,
}

pub fn make_label(params: LabelParams) -> Label {
    let defaults = Label::default();
    Label {
        id: params.id.unwrap_or(defaults.id),
        item: params.item.unwrap_or(defaults.item),
        sensors: params.sensors.unwrap_or(defaults.sensors),
        label_type: params.label_type.unwrap_or(defaults.label_type),
        category: params.category.unwrap_or(defaults.category),
        attributes: params.attributes.unwrap_or(defaults.attributes),
        parent: params.parent.unwrap_or(defaults.parent),
        children: params.children.unwrap_or(defaults.children),
        shapes: params.shapes.unwrap_or(defaults.shapes),
        track: params.track.unwrap_or(defaults.track),
        order: params.order.unwrap_or(defaults.order),
        manual: params.manual.unwrap_or(defaults.manual),
    }
}

/// Labels of one real-world object across items, keyed by item index.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Track {
    pub id: TrackId,
    pub labels: BTreeMap<usize, LabelId>,
}

pub fn make_track(id: TrackId, labels: BTreeMap<usize, LabelId>) -> Track {
    Track { id, labels }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Intrinsics {
    pub focal: Vector2D,
    pub center: Vector2D,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Extrinsics {
    pub translation: Vector3D,
    pub rotation: Vector3D,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Sensor {
    pub id: SensorId,
    pub name: String,
    #[serde(rename = "type")]
    pub sensor_type: DataType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intrinsics: Option<Intrinsics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extrinsics: Option<Extrinsics>,
}

pub fn make_sensor(
    id: SensorId,
    name: impl Into<String>,
    sensor_type: DataType,
    intrinsics: Option<Intrinsics>,
    extrinsics: Option<Extrinsics>,
) -> Sensor {
    Sensor {
        id,
        name: name.into(),
        sensor_type,
        intrinsics,
        extrinsics,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageViewerConfig {
    pub image_width: u32,
    pub image_height: u32,
    pub view_scale: f64,
    pub display_left: f64,
    pub display_top: f64,
    pub show: bool,
    pub sensor: SensorId,
}

impl Default for ImageViewerConfig {
    fn default() -> Self {
        Self {
            image_width: 0,
            image_height: 0,
            view_scale: 1.0,
            display_left: 0.0,
            display_top: 0.0,
            show: true,
            sensor: SensorId::NONE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PointCloudViewerConfig {
    pub position: Vector3D,
    pub target: Vector3D,
    pub vertical_axis: Vector3D,
    pub lock_status: u32,
    pub show: bool,
    pub sensor: SensorId,
}

impl Default for PointCloudViewerConfig {
    fn default() -> Self {
        Self {
            position: Vector3D::new(0.0, 10.0, 0.0),
            target: Vector3D::new(0.0, 0.0, 0.0),
            vertical_axis: Vector3D::new(0.0, 0.0, 1.0),
            lock_status: 0,
            show: true,
            sensor: SensorId::NONE,
        }
    }
}

/// Per-sensor display parameters, bound to exactly one sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViewerConfig {
    Image(ImageViewerConfig),
    PointCloud(PointCloudViewerConfig),
}

impl ViewerConfig {
    pub fn config_type(&self) -> ViewerConfigType {
        match self {
            ViewerConfig::Image(_) => ViewerConfigType::Image,
            ViewerConfig::PointCloud(_) => ViewerConfigType::PointCloud,
        }
    }

    pub fn sensor(&self) -> SensorId {
        match self {
            ViewerConfig::Image(config) => config.sensor,
            ViewerConfig::PointCloud(config) => config.sensor,
        }
    }

    pub fn with_sensor(mut self, sensor: SensorId) -> Self {
        match &mut self {
            ViewerConfig::Image(config) => config.sensor = sensor,
            ViewerConfig::PointCloud(config) => config.sensor = sensor,
        }
        self
    }
}

pub fn make_image_viewer_config(sensor: SensorId) -> ViewerConfig {
    ViewerConfig::Image(ImageViewerConfig {
        sensor,
        ..ImageViewerConfig::default()
    })
}

pub fn make_point_cloud_viewer_config(sensor: SensorId) -> ViewerConfig {
    ViewerConfig::PointCloud(PointCloudViewerConfig {
        sensor,
        ..PointCloudViewerConfig::default()
    })
}

/// Default viewer config for a data type, unbound to any sensor.
///
/// Only image and point cloud data have a viewer; every other data type
/// yields `None` and the caller decides what to show.
pub fn make_default_viewer_config(data_type: DataType) -> Option<ViewerConfig> {
    match data_type {
        DataType::Image => Some(make_image_viewer_config(SensorId::NONE)),
        DataType::PointCloud => Some(make_point_cloud_viewer_config(SensorId::NONE)),
        DataType::Video | DataType::PointCloudTracking | DataType::Image3d => None,
    }
}

/// One frame of the task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Item {
    pub id: ItemId,
    pub index: usize,
    pub video_name: String,
    pub urls: BTreeMap<SensorId, String>,
    pub labels: BTreeMap<LabelId, Arc<Label>>,
    pub shapes: BTreeMap<ShapeId, Arc<IndexedShape>>,
    pub timestamp: i64,
}

impl Default for Item {
    fn default() -> Self {
        Self {
            id: ItemId::NONE,
            index: 0,
            video_name: String::new(),
            urls: BTreeMap::new(),
            labels: BTreeMap::new(),
            shapes: BTreeMap::new(),
            timestamp: -1,
        }
    }
}

pub fn make_item(id: ItemId, index: usize) -> Item {
    Item {
        id,
        index,
        ..Item::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Attribute {
    pub name: String,
    pub tool_type: String,
    pub tag_text: String,
    pub values: Vec<String>,
}

/// Static task metadata fixed at task creation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    pub project_name: String,
    pub item_type: DataType,
    /// Admitted label types; empty admits every type.
    pub label_types: Vec<LabelTypeName>,
    pub policy_types: Vec<String>,
    pub task_size: usize,
    pub tracking: bool,
    pub handler_url: String,
    pub page_title: String,
    pub instruction_page: String,
    pub bundle_file: String,
    /// Category names indexed by category id; empty admits every id.
    pub categories: Vec<String>,
    pub attributes: Vec<Attribute>,
    pub task_id: String,
    pub submit_time: i64,
    pub demo_mode: bool,
    pub submitted: bool,
    pub autosave: bool,
}

pub fn make_task_config(project_name: impl Into<String>, item_type: DataType) -> TaskConfig {
    TaskConfig {
        project_name: project_name.into(),
        item_type,
        ..TaskConfig::default()
    }
}

/// Allocation counters; the only source of new ids and orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskStatus {
    pub max_label_id: LabelId,
    pub max_shape_id: ShapeId,
    pub max_order: i64,
    pub max_track_id: TrackId,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self {
            max_label_id: LabelId::NONE,
            max_shape_id: ShapeId::NONE,
            max_order: -1,
            max_track_id: TrackId::NONE,
        }
    }
}

impl TaskStatus {
    /// Counter-wise maximum of two statuses.
    pub fn merge(self, other: TaskStatus) -> TaskStatus {
        TaskStatus {
            max_label_id: self.max_label_id.max(other.max_label_id),
            max_shape_id: self.max_shape_id.max(other.max_shape_id),
            max_order: self.max_order.max(other.max_order),
            max_track_id: self.max_track_id.max(other.max_track_id),
        }
    }

    /// True when no counter of `self` is behind `earlier`.
    pub fn dominates(&self, earlier: &TaskStatus) -> bool {
        self.max_label_id >= earlier.max_label_id
            && self.max_shape_id >= earlier.max_shape_id
            && self.max_order >= earlier.max_order
            && self.max_track_id >= earlier.max_track_id
    }
}

/// The persisted unit.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Task {
    pub config: Arc<TaskConfig>,
    pub status: TaskStatus,
    pub items: Vec<Arc<Item>>,
    pub tracks: BTreeMap<TrackId, Arc<Track>>,
    pub sensors: BTreeMap<SensorId, Arc<Sensor>>,
}

/// Builds a task, renumbering item indices to their position.
pub fn make_task(config: TaskConfig, items: Vec<Item>, sensors: Vec<Sensor>) -> Task {
    Task {
        config: Arc::new(config),
        status: TaskStatus::default(),
        items: items
            .into_iter()
            .enumerate()
            .map(|(index, item)| Arc::new(Item { index, ..item }))
            .collect(),
        tracks: BTreeMap::new(),
        sensors: sensors
            .into_iter()
            .map(|sensor| (sensor.id, Arc::new(sensor)))
            .collect(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Select {
    pub item: usize,
    pub labels: Vec<LabelId>,
    pub shapes: Vec<ShapeId>,
    pub category: u32,
    pub attributes: AttributeMap,
    pub label_type: u32,
    pub policy_type: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Layout {
    pub toolbar_width: u32,
    pub max_viewer_config_id: ViewerConfigId,
    pub assistant_view_ratio: f64,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            toolbar_width: 200,
            max_viewer_config_id: ViewerConfigId(0),
            assistant_view_ratio: 0.3,
        }
    }
}

/// Per-session UI state; not persisted with the task.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    pub id: String,
    pub select: Select,
    pub layout: Layout,
    pub viewer_configs: BTreeMap<ViewerConfigId, ViewerConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemStatus {
    pub sensor_data_loaded: BTreeMap<SensorId, bool>,
}

impl ItemStatus {
    pub fn is_loaded(&self) -> bool {
        !self.sensor_data_loaded.is_empty() && self.sensor_data_loaded.values().all(|v| *v)
    }
}

pub fn make_item_status(sensors: impl IntoIterator<Item = SensorId>) -> ItemStatus {
    ItemStatus {
        sensor_data_loaded: sensors.into_iter().map(|sensor| (sensor, false)).collect(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Session {
    pub id: String,
    pub start_time: i64,
    pub item_statuses: Vec<ItemStatus>,
}

/// Root of the state tree. Cloning is cheap: only the branch handles are copied.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct State {
    pub task: Arc<Task>,
    pub user: Arc<User>,
    pub session: Arc<Session>,
}

#[derive(Debug, Clone, Default)]
pub struct StateParams {
    pub task: Option<Task>,
    pub user: Option<User>,
    pub session: Option<Session>,
}

pub fn make_state(params: StateParams) -> State {
    State {
        task: Arc::new(params.task.unwrap_or_default()),
        user: Arc::new(params.user.unwrap_or_default()),
        session: Arc::new(params.session.unwrap_or_default()),
    }
}

impl State {
    pub fn from_task(task: Task) -> Self {
        make_state(StateParams {
            task: Some(task),
            ..StateParams::default()
        })
    }
}

#[cfg(test)]
#[path = "tests/states_tests.rs"]
mod tests;
