use std::{fs, path::Path, sync::Arc};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::ValueEnum;
use label_model::{
    action,
    domain::{DataType, ItemId, SensorId},
    states::{
        make_default_viewer_config, make_item, make_sensor, make_task, make_task_config, Task,
    },
    State,
};
use label_store::Store;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::Settings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "snake_case")]
pub enum TaskDataType {
    Image,
    PointCloud,
}

impl From<TaskDataType> for DataType {
    fn from(value: TaskDataType) -> Self {
        match value {
            TaskDataType::Image => DataType::Image,
            TaskDataType::PointCloud => DataType::PointCloud,
        }
    }
}

/// Builds a task with `items` empty items served by one sensor, opens a
/// session for it and attaches the sensor's default viewer.
pub fn new_task(
    settings: &Settings,
    project: &str,
    items: usize,
    data_type: TaskDataType,
    url_prefix: Option<&str>,
) -> Result<State> {
    let data_type = DataType::from(data_type);
    let sensor = SensorId(0);
    let items = (0..items)
        .map(|index| {
            let mut item = make_item(ItemId(index as i64), index);
            if let Some(prefix) = url_prefix {
                item.urls.insert(sensor, format!("{prefix}{index}"));
            }
            item
        })
        .collect();
    let task = make_task(
        make_task_config(project, data_type),
        items,
        vec![make_sensor(sensor, "default", data_type, None, None)],
    );

    let mut store = Store::new(State::from_task(task), settings.history_depth);
    let started = Utc::now();
    store.dispatch(&action::init_session(
        format!("labeltool-{}", started.format("%Y%m%d%H%M%S")),
        started.timestamp_millis(),
    ))?;
    if let Some(config) = make_default_viewer_config(data_type) {
        store.dispatch(&action::add_viewer_config(config.with_sensor(sensor)))?;
    }
    Ok(store.state().clone())
}

/// Parses either a JSON array of actions or one action per line.
pub fn parse_actions(raw: &str) -> Result<Vec<Value>> {
    let trimmed = raw.trim_start();
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).context("actions file is not a JSON array");
    }
    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(number, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("line {} is not a JSON action", number + 1))
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReplayReport {
    pub applied: usize,
    pub rejected: usize,
}

/// Dispatches `actions` in order through a store seeded with `state`.
pub fn replay(
    settings: &Settings,
    state: State,
    actions: &[Value],
    submit: bool,
) -> Result<(State, ReplayReport)> {
    let mut task = Task::clone(&state.task);
    let observed = task.observed_status();
    if !task.status.dominates(&observed) {
        warn!("task counters lag behind stored ids; reconciling");
        task.reconcile_status();
    }
    let state = State {
        task: Arc::new(task),
        ..state
    };

    let mut store = Store::new(state, settings.history_depth);
    let mut report = ReplayReport::default();
    for (position, raw) in actions.iter().enumerate() {
        match store.dispatch_json(raw) {
            Ok(_) => report.applied += 1,
            Err(error) if settings.strict => {
                bail!("action {position} rejected: {error}");
            }
            Err(error) => {
                warn!(position, %error, "skipping rejected action");
                report.rejected += 1;
            }
        }
    }
    if submit {
        store.dispatch(&action::submit(Utc::now().timestamp_millis()))?;
    }
    info!(
        applied = report.applied,
        rejected = report.rejected,
        revision = store.revision(),
        "replay finished"
    );
    Ok((store.state().clone(), report))
}

pub fn read_state(path: &Path) -> Result<State> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read state file '{}'", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("'{}' is not a state document", path.display()))
}

pub fn read_actions(path: &Path) -> Result<Vec<Value>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read actions file '{}'", path.display()))?;
    parse_actions(&raw).with_context(|| format!("invalid actions file '{}'", path.display()))
}

pub fn render_state(state: &State, pretty: bool) -> Result<String> {
    let rendered = if pretty {
        serde_json::to_string_pretty(state)
    } else {
        serde_json::to_string(state)
    };
    rendered.context("failed to serialize state")
}

/// Writes to `out`, or to stdout when no path is given.
pub fn write_output(out: Option<&Path>, rendered: &str) -> Result<()> {
    match out {
        Some(path) => fs::write(path, format!("{rendered}\n"))
            .with_context(|| format!("failed to write '{}'", path.display())),
        None => {
            println!("{rendered}");
            Ok(())
        }
    }
}

#[cfg(test)]
#[path = "tests/commands_tests.rs"]
mod tests;
