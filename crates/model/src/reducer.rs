//! The apply engine: the only code that advances a [`State`].
//!
//! Each transition works on a private copy of the touched branches and the
//! copy is published only when every check has passed, so a failed action
//! never leaves a half-updated tree behind. Untouched items, labels, shapes
//! and tracks stay shared with the prior state.

use std::{collections::BTreeSet, sync::Arc};

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::{
    action::{Action, LabelPatch, TrackLabel, TrackTarget},
    domain::{EntityKind, LabelId, LabelTypeName, SensorId, ShapeId, TrackId},
    error::ApplyError,
    merge::merge_patch_at,
    overlay,
    shape::{Shape, make_indexed_shape},
    states::{Label, State, Task, TaskConfig, make_track},
};

/// Computes the state that follows `state` under `action`.
pub fn apply(state: &State, action: &Action) -> Result<State, ApplyError> {
    let result = match action {
        Action::AddLabel {
            item_index,
            label,
            shapes,
        } => with_task(state, |task| {
            add_label(task, *item_index, label, shapes).map(|_| ())
        }),
        Action::ChangeLabel { label_id, patch } => {
            with_task(state, |task| change_label(task, *label_id, patch))
        }
        Action::DeleteLabel { label_id } => delete_label(state, *label_id),
        Action::LinkLabelsToTrack { label_ids, track } => with_task(state, |task| {
            link_labels_to_track(task, label_ids, *track).map(|_| ())
        }),
        Action::ChangeShape { shape_id, patch } => {
            with_task(state, |task| change_shape(task, *shape_id, patch))
        }
        Action::AddTrack { labels } => {
            with_task(state, |task| add_track(task, labels).map(|_| ()))
        }
        Action::DeleteTrack { track_id } => {
            with_task(state, |task| delete_track(task, *track_id))
        }
        Action::AddViewerConfig { config } => overlay::add_viewer_config(state, config),
        Action::ChangeViewerConfig { config_id, patch } => {
            overlay::change_viewer_config(state, *config_id, patch)
        }
        Action::Select(patch) => Ok(overlay::select(state, patch)),
        Action::GoToItem { item_index } => Ok(overlay::go_to_item(state, *item_index)),
        Action::InitSession { id, start_time } => Ok(overlay::init_session(state, id, *start_time)),
        Action::LoadItem { item_index, sensor } => overlay::load_item(state, *item_index, *sensor),
        Action::Submit { time } => with_task(state, |task| {
            let config = Arc::make_mut(&mut task.config);
            config.submitted = true;
            config.submit_time = *time;
            Ok(())
        }),
    };

    match &result {
        Ok(_) => debug!(action = action.name(), "applied action"),
        Err(error) => warn!(action = action.name(), %error, "rejected action"),
    }
    result
}

/// Decodes a wire action and applies it.
pub fn apply_json(state: &State, action: &Value) -> Result<State, ApplyError> {
    let action = Action::from_json(action).inspect_err(|error| {
        warn!(%error, "rejected undecodable action");
    })?;
    apply(state, &action)
}

fn with_task<F>(state: &State, edit: F) -> Result<State, ApplyError>
where
    F: FnOnce(&mut Task) -> Result<(), ApplyError>,
{
    let mut task = Task::clone(&state.task);
    edit(&mut task)?;
    Ok(State {
        task: Arc::new(task),
        user: Arc::clone(&state.user),
        session: Arc::clone(&state.session),
    })
}

fn validate_label_type(config: &TaskConfig, label_type: LabelTypeName) -> Result<(), ApplyError> {
    if !config.label_types.is_empty() && !config.label_types.contains(&label_type) {
        return Err(ApplyError::validation(format!(
            "label type `{label_type}` is not enabled for this task"
        )));
    }
    Ok(())
}

fn validate_categories(config: &TaskConfig, category: &[u32]) -> Result<(), ApplyError> {
    if config.categories.is_empty() {
        return Ok(());
    }
    if let Some(bad) = category
        .iter()
        .find(|id| **id as usize >= config.categories.len())
    {
        return Err(ApplyError::validation(format!(
            "category {bad} is outside the {} configured categories",
            config.categories.len()
        )));
    }
    Ok(())
}

fn validate_sensors(task: &Task, sensors: &[SensorId]) -> Result<(), ApplyError> {
    match sensors
        .iter()
        .find(|sensor| sensor.is_some() && !task.sensors.contains_key(sensor))
    {
        Some(missing) => Err(ApplyError::not_found(EntityKind::Sensor, *missing)),
        None => Ok(()),
    }
}

/// Maps an exhausted allocation counter to a consistency error.
pub(crate) fn allocate<T>(next: Option<T>, counter: &str) -> Result<T, ApplyError> {
    next.ok_or_else(|| ApplyError::consistency(format!("{counter} counter exhausted")))
}

fn ensure_distinct<T: Ord + Copy + std::fmt::Display>(ids: &[T], what: &str) -> Result<(), ApplyError> {
    let mut seen = BTreeSet::new();
    match ids.iter().find(|id| !seen.insert(**id)) {
        Some(duplicate) => Err(ApplyError::validation(format!(
            "{what} {duplicate} listed twice"
        ))),
        None => Ok(()),
    }
}

pub(crate) fn add_label(
    task: &mut Task,
    item_index: usize,
    template: &Label,
    shapes: &[Shape],
) -> Result<LabelId, ApplyError> {
    let item_count = task.items.len();
    let item = task.items.get(item_index).ok_or_else(|| {
        ApplyError::consistency(format!(
            "item index {item_index} is out of range for {item_count} items"
        ))
    })?;

    validate_label_type(&task.config, template.label_type)?;
    validate_categories(&task.config, &template.category)?;
    validate_sensors(task, &template.sensors)?;
    if !template.children.is_empty() {
        return Err(ApplyError::validation("a new label cannot carry children"));
    }
    if template.track.is_some() {
        return Err(ApplyError::validation(
            "a new label cannot name a track; link it after creation",
        ));
    }
    if let Some(shape) = shapes
        .iter()
        .find(|shape| !template.label_type.accepts(shape.type_name()))
    {
        return Err(ApplyError::validation(format!(
            "a `{}` label cannot own a `{}` shape",
            template.label_type,
            shape.type_name()
        )));
    }
    if template.parent.is_some() && !item.labels.contains_key(&template.parent) {
        return Err(ApplyError::not_found(EntityKind::Label, template.parent));
    }
    ensure_distinct(&template.shapes, "shape")?;
    if let Some(missing) = template
        .shapes
        .iter()
        .find(|shape| !item.shapes.contains_key(shape))
    {
        return Err(ApplyError::not_found(EntityKind::Shape, *missing));
    }
    let item_id = item.id;

    let label_id = allocate(task.status.max_label_id.next(), "label id")?;
    let order = allocate(task.status.max_order.checked_add(1), "label order")?;
    let mut shape_ids = template.shapes.clone();
    let mut max_shape_id = task.status.max_shape_id;
    let mut created = Vec::with_capacity(shapes.len());
    for shape in shapes {
        max_shape_id = allocate(max_shape_id.next(), "shape id")?;
        shape_ids.push(max_shape_id);
        created.push(make_indexed_shape(max_shape_id, &[label_id], shape));
    }

    let label = Label {
        id: label_id,
        item: item_id,
        children: Vec::new(),
        shapes: shape_ids,
        track: TrackId::NONE,
        order,
        ..template.clone()
    };

    let item = Arc::make_mut(&mut task.items[item_index]);
    for shared in &template.shapes {
        if let Some(shape) = item.shapes.get_mut(shared) {
            Arc::make_mut(shape).labels.push(label_id);
        }
    }
    for shape in created {
        item.shapes.insert(shape.id, Arc::new(shape));
    }
    if let Some(parent) = item.labels.get_mut(&template.parent) {
        Arc::make_mut(parent).children.push(label_id);
    }
    item.labels.insert(label_id, Arc::new(label));

    task.status.max_label_id = label_id;
    task.status.max_shape_id = max_shape_id;
    task.status.max_order = order;
    Ok(label_id)
}

fn change_label(task: &mut Task, label_id: LabelId, patch: &LabelPatch) -> Result<(), ApplyError> {
    let (item_index, _) = task
        .find_label(label_id)
        .ok_or_else(|| ApplyError::not_found(EntityKind::Label, label_id))?;
    if let Some(category) = &patch.category {
        validate_categories(&task.config, category)?;
    }
    if let Some(sensors) = &patch.sensors {
        validate_sensors(task, sensors)?;
    }

    let item = Arc::make_mut(&mut task.items[item_index]);
    if let Some(label) = item.labels.get_mut(&label_id) {
        let label = Arc::make_mut(label);
        if let Some(category) = &patch.category {
            label.category = category.clone();
        }
        if let Some(attributes) = &patch.attributes {
            label.attributes = attributes.clone();
        }
        if let Some(manual) = patch.manual {
            label.manual = manual;
        }
        if let Some(sensors) = &patch.sensors {
            label.sensors = sensors.clone();
        }
    }
    Ok(())
}

fn change_shape(
    task: &mut Task,
    shape_id: ShapeId,
    patch: &Map<String, Value>,
) -> Result<(), ApplyError> {
    let (item_index, shape) = task
        .find_shape(shape_id)
        .ok_or_else(|| ApplyError::not_found(EntityKind::Shape, shape_id))?;
    let patched: Shape = merge_patch_at(&shape.shape, "/data", patch)?;

    let item = Arc::make_mut(&mut task.items[item_index]);
    if let Some(shape) = item.shapes.get_mut(&shape_id) {
        Arc::make_mut(shape).shape = patched;
    }
    Ok(())
}

fn delete_label(state: &State, label_id: LabelId) -> Result<State, ApplyError> {
    let mut task = Task::clone(&state.task);
    let (item_index, label) = task
        .find_label(label_id)
        .ok_or_else(|| ApplyError::not_found(EntityKind::Label, label_id))?;
    let label = Arc::clone(label);

    let mut removed_shapes = Vec::new();
    {
        let item = Arc::make_mut(&mut task.items[item_index]);
        item.labels.remove(&label_id);

        if let Some(parent) = item.labels.get_mut(&label.parent) {
            Arc::make_mut(parent).children.retain(|child| *child != label_id);
        }
        for child in &label.children {
            if let Some(child) = item.labels.get_mut(child) {
                if child.parent == label_id {
                    Arc::make_mut(child).parent = LabelId::NONE;
                }
            }
        }
        for shape_id in &label.shapes {
            let exclusive = match item.shapes.get(shape_id) {
                Some(shape) => shape.labels.iter().all(|owner| *owner == label_id),
                None => continue,
            };
            if exclusive {
                item.shapes.remove(shape_id);
                removed_shapes.push(*shape_id);
            } else if let Some(shape) = item.shapes.get_mut(shape_id) {
                Arc::make_mut(shape).labels.retain(|owner| *owner != label_id);
            }
        }
    }

    if label.track.is_some() {
        detach_from_track(&mut task, label.track, label_id);
    }

    let select = &state.user.select;
    let user = if select.labels.contains(&label_id)
        || select.shapes.iter().any(|shape| removed_shapes.contains(shape))
    {
        let mut user = state.user.as_ref().clone();
        user.select.labels.retain(|id| *id != label_id);
        user.select.shapes.retain(|id| !removed_shapes.contains(id));
        Arc::new(user)
    } else {
        Arc::clone(&state.user)
    };

    Ok(State {
        task: Arc::new(task),
        user,
        session: Arc::clone(&state.session),
    })
}

/// Removes `label_id` from the track's label map and drops the track once empty.
fn detach_from_track(task: &mut Task, track_id: TrackId, label_id: LabelId) {
    let now_empty = match task.tracks.get_mut(&track_id) {
        Some(track) => {
            let track = Arc::make_mut(track);
            track.labels.retain(|_, member| *member != label_id);
            track.labels.is_empty()
        }
        None => false,
    };
    if now_empty {
        task.tracks.remove(&track_id);
        debug!(track = %track_id, "removed empty track");
    }
}

pub(crate) fn link_labels_to_track(
    task: &mut Task,
    label_ids: &[LabelId],
    target: TrackTarget,
) -> Result<TrackId, ApplyError> {
    if label_ids.is_empty() {
        return Err(ApplyError::validation("no labels to link"));
    }
    ensure_distinct(label_ids, "label")?;

    let mut members = Vec::with_capacity(label_ids.len());
    let mut slots = BTreeSet::new();
    for id in label_ids {
        let (item_index, _) = task
            .find_label(*id)
            .ok_or_else(|| ApplyError::not_found(EntityKind::Label, *id))?;
        if !slots.insert(item_index) {
            return Err(ApplyError::consistency(format!(
                "a track holds one label per item but several labels of item index {item_index} were given"
            )));
        }
        members.push((item_index, *id));
    }

    let track_id = match target {
        TrackTarget::New => allocate(task.status.max_track_id.next(), "track id")?,
        TrackTarget::Existing(track_id) => {
            let track = task.tracks.get(&track_id).ok_or_else(|| {
                ApplyError::consistency(format!("track {track_id} does not exist"))
            })?;
            for (item_index, id) in &members {
                if let Some(held) = track.labels.get(item_index) {
                    if held != id {
                        return Err(ApplyError::consistency(format!(
                            "track {track_id} already holds label {held} at item index {item_index}"
                        )));
                    }
                }
            }
            track_id
        }
    };

    for (item_index, id) in &members {
        let previous = task.items[*item_index]
            .labels
            .get(id)
            .map(|label| label.track)
            .unwrap_or(TrackId::NONE);
        if previous.is_some() && previous != track_id {
            detach_from_track(task, previous, *id);
        }
        let item = Arc::make_mut(&mut task.items[*item_index]);
        if let Some(label) = item.labels.get_mut(id) {
            Arc::make_mut(label).track = track_id;
        }
    }

    let track = task
        .tracks
        .entry(track_id)
        .or_insert_with(|| Arc::new(make_track(track_id, Default::default())));
    let track = Arc::make_mut(track);
    for (item_index, id) in members {
        track.labels.insert(item_index, id);
    }

    if matches!(target, TrackTarget::New) {
        task.status.max_track_id = track_id;
    }
    Ok(track_id)
}

fn add_track(task: &mut Task, labels: &[TrackLabel]) -> Result<TrackId, ApplyError> {
    if labels.is_empty() {
        return Err(ApplyError::validation("a track needs at least one label"));
    }
    let mut slots = BTreeSet::new();
    if let Some(repeated) = labels.iter().find(|entry| !slots.insert(entry.item_index)) {
        return Err(ApplyError::consistency(format!(
            "a track holds one label per item but item index {} was given twice",
            repeated.item_index
        )));
    }

    let mut label_ids = Vec::with_capacity(labels.len());
    for entry in labels {
        label_ids.push(add_label(task, entry.item_index, &entry.label, &entry.shapes)?);
    }
    link_labels_to_track(task, &label_ids, TrackTarget::New)
}

fn delete_track(task: &mut Task, track_id: TrackId) -> Result<(), ApplyError> {
    let track = task
        .tracks
        .remove(&track_id)
        .ok_or_else(|| ApplyError::not_found(EntityKind::Track, track_id))?;
    for (item_index, label_id) in &track.labels {
        let Some(item) = task.items.get_mut(*item_index) else {
            continue;
        };
        let linked = item
            .labels
            .get(label_id)
            .is_some_and(|label| label.track == track_id);
        if linked {
            let item = Arc::make_mut(item);
            if let Some(label) = item.labels.get_mut(label_id) {
                Arc::make_mut(label).track = TrackId::NONE;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/reducer_tests.rs"]
mod tests;
