//! Read side of the state graph: id lookups, render ordering and the
//! referential-integrity audit.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    sync::Arc,
};

use serde::{Deserialize, Serialize};

use crate::{
    domain::{EntityKind, ItemId, LabelId, ShapeId},
    shape::IndexedShape,
    states::{Item, Label, State, Task, TaskStatus},
};

impl Task {
    pub fn item(&self, index: usize) -> Option<&Arc<Item>> {
        self.items.get(index)
    }

    pub fn item_index_of(&self, item: ItemId) -> Option<usize> {
        self.items.iter().position(|candidate| candidate.id == item)
    }

    /// Locates a label and the index of the item that owns it.
    pub fn find_label(&self, id: LabelId) -> Option<(usize, &Arc<Label>)> {
        self.items
            .iter()
            .enumerate()
            .find_map(|(index, item)| item.labels.get(&id).map(|label| (index, label)))
    }

    pub fn find_shape(&self, id: ShapeId) -> Option<(usize, &Arc<IndexedShape>)> {
        self.items
            .iter()
            .enumerate()
            .find_map(|(index, item)| item.shapes.get(&id).map(|shape| (index, shape)))
    }

    pub fn label_count(&self) -> usize {
        self.items.iter().map(|item| item.labels.len()).sum()
    }

    /// Highest ids and order actually present in the task.
    pub fn observed_status(&self) -> TaskStatus {
        let mut status = TaskStatus::default();
        for item in &self.items {
            for label in item.labels.values() {
                status.max_label_id = status.max_label_id.max(label.id);
                status.max_order = status.max_order.max(label.order);
            }
            for shape in item.shapes.values() {
                status.max_shape_id = status.max_shape_id.max(shape.id);
            }
        }
        for track in self.tracks.keys() {
            status.max_track_id = status.max_track_id.max(*track);
        }
        status
    }

    /// Raises the counters so that no id present in the task can be allocated again.
    pub fn reconcile_status(&mut self) {
        self.status = self.status.merge(self.observed_status());
    }
}

/// Labels of an item in stacking order: ascending `order`, ties broken by id.
pub fn labels_in_render_order(item: &Item) -> Vec<&Arc<Label>> {
    let mut labels: Vec<&Arc<Label>> = item.labels.values().collect();
    labels.sort_by_key(|label| (label.order, label.id));
    labels
}

/// Items in index order.
pub fn items_in_order(task: &Task) -> Vec<&Arc<Item>> {
    let mut items: Vec<&Arc<Item>> = task.items.iter().collect();
    items.sort_by_key(|item| item.index);
    items
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub kind: EntityKind,
    pub id: i64,
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.kind, self.id, self.message)
    }
}

#[derive(Default)]
struct Audit {
    violations: Vec<Violation>,
}

impl Audit {
    fn report(&mut self, kind: EntityKind, id: impl Into<i64>, message: impl Into<String>) {
        self.violations.push(Violation {
            kind,
            id: id.into(),
            message: message.into(),
        });
    }
}

/// Checks every cross reference of the state. An empty result means the state
/// is consistent.
pub fn check_integrity(state: &State) -> Vec<Violation> {
    let mut audit = Audit::default();
    let task = &state.task;
    let status = task.status;

    let mut item_ids = BTreeSet::new();
    let mut label_ids = BTreeSet::new();
    let mut shape_ids = BTreeSet::new();

    for (position, item) in task.items.iter().enumerate() {
        if item.index != position {
            audit.report(
                EntityKind::Item,
                item.id,
                format!("index {} stored at position {position}", item.index),
            );
        }
        if item.id.is_some() && !item_ids.insert(item.id) {
            audit.report(EntityKind::Item, item.id, "duplicate item id");
        }

        check_item_labels(&mut audit, task, item, &mut label_ids);
        check_item_shapes(&mut audit, item, status.max_shape_id, &mut shape_ids);
    }

    for (key, track) in &task.tracks {
        if *key != track.id {
            audit.report(EntityKind::Track, track.id, format!("stored under key {key}"));
        }
        if track.id > status.max_track_id {
            audit.report(EntityKind::Track, track.id, "id above max_track_id");
        }
        for (item_index, label_id) in &track.labels {
            let resolved = task
                .items
                .get(*item_index)
                .and_then(|item| item.labels.get(label_id));
            match resolved {
                Some(label) if label.track == track.id => {}
                Some(label) => audit.report(
                    EntityKind::Track,
                    track.id,
                    format!("label {label_id} points to track {}", label.track),
                ),
                None => audit.report(
                    EntityKind::Track,
                    track.id,
                    format!("label {label_id} missing from item index {item_index}"),
                ),
            }
        }
    }

    for (id, config) in &state.user.viewer_configs {
        let sensor = config.sensor();
        if sensor.is_some() && !task.sensors.contains_key(&sensor) {
            audit.report(
                EntityKind::ViewerConfig,
                *id,
                format!("bound to unknown sensor {sensor}"),
            );
        }
    }

    audit.violations
}

fn check_item_labels(
    audit: &mut Audit,
    task: &Task,
    item: &Item,
    label_ids: &mut BTreeSet<LabelId>,
) {
    let status = task.status;
    let mut orders: BTreeMap<i64, LabelId> = BTreeMap::new();

    for (key, label) in &item.labels {
        let id = label.id;
        if *key != id {
            audit.report(EntityKind::Label, id, format!("stored under key {key}"));
        }
        if !label_ids.insert(id) {
            audit.report(EntityKind::Label, id, "duplicate label id");
        }
        if label.item != item.id {
            audit.report(
                EntityKind::Label,
                id,
                format!("claims item {} but is stored in item {}", label.item, item.id),
            );
        }
        if id > status.max_label_id {
            audit.report(EntityKind::Label, id, "id above max_label_id");
        }
        if label.order > status.max_order {
            audit.report(EntityKind::Label, id, "order above max_order");
        }
        if let Some(other) = orders.insert(label.order, id) {
            audit.report(
                EntityKind::Label,
                id,
                format!("order {} shared with label {other}", label.order),
            );
        }

        if label.parent.is_some() {
            match item.labels.get(&label.parent) {
                Some(parent) if parent.children.contains(&id) => {}
                Some(_) => audit.report(
                    EntityKind::Label,
                    id,
                    format!("parent {} does not list it as a child", label.parent),
                ),
                None => audit.report(
                    EntityKind::Label,
                    id,
                    format!("parent {} missing", label.parent),
                ),
            }
        }
        for child in &label.children {
            match item.labels.get(child) {
                Some(child_label) if child_label.parent == id => {}
                Some(_) => audit.report(
                    EntityKind::Label,
                    id,
                    format!("child {child} names another parent"),
                ),
                None => audit.report(EntityKind::Label, id, format!("child {child} missing")),
            }
        }
        for shape_id in &label.shapes {
            match item.shapes.get(shape_id) {
                Some(shape) if shape.is_owned_by(id) => {}
                Some(_) => audit.report(
                    EntityKind::Label,
                    id,
                    format!("shape {shape_id} does not list it as owner"),
                ),
                None => audit.report(EntityKind::Label, id, format!("shape {shape_id} missing")),
            }
        }
        if label.track.is_some() {
            let linked = task
                .tracks
                .get(&label.track)
                .and_then(|track| track.labels.get(&item.index));
            if linked != Some(&id) {
                audit.report(
                    EntityKind::Label,
                    id,
                    format!("track {} does not reference it", label.track),
                );
            }
        }
        for sensor in &label.sensors {
            if sensor.is_some() && !task.sensors.contains_key(sensor) {
                audit.report(EntityKind::Label, id, format!("unknown sensor {sensor}"));
            }
        }
    }
}

fn check_item_shapes(
    audit: &mut Audit,
    item: &Item,
    max_shape_id: ShapeId,
    shape_ids: &mut BTreeSet<ShapeId>,
) {
    for (key, shape) in &item.shapes {
        let id = shape.id;
        if *key != id {
            audit.report(EntityKind::Shape, id, format!("stored under key {key}"));
        }
        if id > max_shape_id {
            audit.report(EntityKind::Shape, id, "id above max_shape_id");
        }
        if !shape_ids.insert(id) {
            audit.report(EntityKind::Shape, id, "duplicate shape id");
        }
        if shape.labels.is_empty() {
            audit.report(EntityKind::Shape, id, "has no owning label");
        }
        for owner in &shape.labels {
            let listed = item
                .labels
                .get(owner)
                .is_some_and(|label| label.shapes.contains(&id));
            if !listed {
                audit.report(
                    EntityKind::Shape,
                    id,
                    format!("owner {owner} does not list it"),
                );
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/graph_tests.rs"]
mod tests;
