//! Per-user and per-session transitions. None of them touch the task.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use crate::{
    action::SelectPatch,
    domain::{EntityKind, SensorId, ViewerConfigId},
    error::ApplyError,
    merge::merge_patch,
    reducer::allocate,
    states::{ItemStatus, Session, State, User, ViewerConfig, make_item_status},
};

fn with_user(state: &State, user: User) -> State {
    State {
        task: Arc::clone(&state.task),
        user: Arc::new(user),
        session: Arc::clone(&state.session),
    }
}

fn with_session(state: &State, session: Session) -> State {
    State {
        task: Arc::clone(&state.task),
        user: Arc::clone(&state.user),
        session: Arc::new(session),
    }
}

/// Applies a selection patch. Selection is advisory: a patch naming an item,
/// label or shape that does not exist leaves the state as it was. Category,
/// attribute and type picks need no item.
pub fn select(state: &State, patch: &SelectPatch) -> State {
    let mut next = state.user.select.clone();
    if let Some(item) = patch.item {
        if item != next.item {
            next.labels.clear();
            next.shapes.clear();
        }
        next.item = item;
    }
    if let Some(labels) = &patch.labels {
        next.labels = labels.clone();
    }
    if let Some(shapes) = &patch.shapes {
        next.shapes = shapes.clone();
    }

    let names_entities = patch.item.is_some() || patch.labels.is_some() || patch.shapes.is_some();
    if names_entities {
        let Some(item) = state.task.items.get(next.item) else {
            debug!(item = next.item, "ignored selection of unknown item");
            return state.clone();
        };
        if let Some(label) = next.labels.iter().find(|id| !item.labels.contains_key(id)) {
            debug!(label = %label, "ignored selection of unknown label");
            return state.clone();
        }
        if let Some(shape) = next.shapes.iter().find(|id| !item.shapes.contains_key(id)) {
            debug!(shape = %shape, "ignored selection of unknown shape");
            return state.clone();
        }
    }

    if let Some(category) = patch.category {
        next.category = category;
    }
    if let Some(attributes) = &patch.attributes {
        next.attributes = attributes.clone();
    }
    if let Some(label_type) = patch.label_type {
        next.label_type = label_type;
    }
    if let Some(policy_type) = patch.policy_type {
        next.policy_type = policy_type;
    }

    if next == state.user.select {
        return state.clone();
    }
    let mut user = User::clone(&state.user);
    user.select = next;
    with_user(state, user)
}

/// Moves the cursor to another item and clears the label and shape selection.
pub fn go_to_item(state: &State, item_index: usize) -> State {
    if item_index >= state.task.items.len() {
        debug!(item = item_index, "ignored move to unknown item");
        return state.clone();
    }
    let mut user = User::clone(&state.user);
    user.select.item = item_index;
    user.select.labels.clear();
    user.select.shapes.clear();
    with_user(state, user)
}

fn validate_sensor(state: &State, sensor: SensorId) -> Result<(), ApplyError> {
    if sensor.is_some() && !state.task.sensors.contains_key(&sensor) {
        return Err(ApplyError::not_found(EntityKind::Sensor, sensor));
    }
    Ok(())
}

pub fn add_viewer_config(state: &State, config: &ViewerConfig) -> Result<State, ApplyError> {
    validate_sensor(state, config.sensor())?;
    let mut user = User::clone(&state.user);
    let id = user.layout.max_viewer_config_id;
    user.layout.max_viewer_config_id = allocate(id.next(), "viewer config id")?;
    user.viewer_configs.insert(id, config.clone());
    Ok(with_user(state, user))
}

pub fn change_viewer_config(
    state: &State,
    config_id: ViewerConfigId,
    patch: &Map<String, Value>,
) -> Result<State, ApplyError> {
    let current = state
        .user
        .viewer_configs
        .get(&config_id)
        .ok_or_else(|| ApplyError::not_found(EntityKind::ViewerConfig, config_id))?;
    let patched: ViewerConfig = merge_patch(current, patch, &["type"])?;
    validate_sensor(state, patched.sensor())?;

    let mut user = User::clone(&state.user);
    user.viewer_configs.insert(config_id, patched);
    Ok(with_user(state, user))
}

/// Starts a session with one unloaded status per item.
pub fn init_session(state: &State, id: &str, start_time: i64) -> State {
    let item_statuses = state
        .task
        .items
        .iter()
        .map(|item| make_item_status(item.urls.keys().copied()))
        .collect();
    with_session(
        state,
        Session {
            id: id.to_string(),
            start_time,
            item_statuses,
        },
    )
}

/// Records that the data of `sensor` finished loading for an item.
pub fn load_item(state: &State, item_index: usize, sensor: SensorId) -> Result<State, ApplyError> {
    if item_index >= state.task.items.len() {
        return Err(ApplyError::not_found(EntityKind::Item, item_index as i64));
    }
    if sensor.is_none() {
        return Err(ApplyError::validation("load_item needs a sensor id"));
    }
    validate_sensor(state, sensor)?;

    let mut session = Session::clone(&state.session);
    if session.item_statuses.len() < state.task.items.len() {
        session
            .item_statuses
            .resize_with(state.task.items.len(), ItemStatus::default);
    }
    session.item_statuses[item_index]
        .sensor_data_loaded
        .insert(sensor, true);
    Ok(with_session(state, session))
}

#[cfg(test)]
#[path = "tests/overlay_tests.rs"]
mod tests;
