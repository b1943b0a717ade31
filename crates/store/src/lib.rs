//! Single-writer dispatcher around [`label_model::apply`].
//!
//! The store owns the current [`State`], keeps bounded undo/redo history of
//! task edits and broadcasts every published state to subscribers.

use std::{collections::VecDeque, sync::Arc};

use label_model::{
    action::ActionScope,
    domain::{LabelId, ShapeId},
    states::{Task, User},
    Action, ActionError, ApplyError, State,
};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 256;
pub const DEFAULT_HISTORY_DEPTH: usize = 100;

#[derive(Debug, Clone)]
pub enum StoreEvent {
    Published { revision: u64, state: State },
    Rejected { error: ActionError },
}

pub struct Store {
    state: State,
    revision: u64,
    history_depth: usize,
    undo: VecDeque<State>,
    redo: VecDeque<State>,
    events: broadcast::Sender<StoreEvent>,
}

impl Store {
    pub fn new(state: State, history_depth: usize) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state,
            revision: 0,
            history_depth,
            undo: VecDeque::new(),
            redo: VecDeque::new(),
            events,
        }
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    /// Number of states published since construction.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Applies one action. A rejected action leaves the store as it was and
    /// is reported to subscribers as [`StoreEvent::Rejected`].
    pub fn dispatch(&mut self, action: &Action) -> Result<State, ApplyError> {
        let next = label_model::apply(&self.state, action).inspect_err(|error| self.reject(error))?;
        let touches_task = action.scope() == ActionScope::Task;
        self.commit(next, touches_task);
        Ok(self.state.clone())
    }

    /// Decodes a wire action and dispatches it.
    pub fn dispatch_json(&mut self, action: &Value) -> Result<State, ApplyError> {
        let action = Action::from_json(action).inspect_err(|error| self.reject(error))?;
        self.dispatch(&action)
    }

    /// Applies `actions` in order and publishes once. If any action is
    /// rejected none of them take effect.
    pub fn dispatch_batch(&mut self, actions: &[Action]) -> Result<State, ApplyError> {
        let mut working = self.state.clone();
        for (position, action) in actions.iter().enumerate() {
            working = label_model::apply(&working, action).inspect_err(|error| {
                debug!(position, action = action.name(), "batch aborted");
                self.reject(error);
            })?;
        }
        let touches_task = actions
            .iter()
            .any(|action| action.scope() == ActionScope::Task);
        self.commit(working, touches_task);
        Ok(self.state.clone())
    }

    /// Restores the task as it was before the last task edit. Returns `false`
    /// when there is nothing to undo.
    pub fn undo(&mut self) -> bool {
        let Some(entry) = self.undo.pop_back() else {
            return false;
        };
        push_bounded(&mut self.redo, self.state.clone(), self.history_depth);
        self.restore(&entry);
        info!(revision = self.revision, "undo");
        true
    }

    pub fn redo(&mut self) -> bool {
        let Some(entry) = self.redo.pop_back() else {
            return false;
        };
        push_bounded(&mut self.undo, self.state.clone(), self.history_depth);
        self.restore(&entry);
        info!(revision = self.revision, "redo");
        true
    }

    fn commit(&mut self, next: State, touches_task: bool) {
        if touches_task && !Arc::ptr_eq(&next.task, &self.state.task) {
            push_bounded(&mut self.undo, self.state.clone(), self.history_depth);
            self.redo.clear();
        }
        self.publish(next);
    }

    /// Takes the task of `entry` but keeps the current counters, user and
    /// session.
    fn restore(&mut self, entry: &State) {
        let mut task = Task::clone(&entry.task);
        task.status = self.state.task.status.merge(entry.task.status);
        let task = Arc::new(task);
        let user = prune_selection(&task, &self.state.user);
        self.publish(State {
            task,
            user,
            session: Arc::clone(&self.state.session),
        });
    }

    fn publish(&mut self, state: State) {
        self.state = state;
        self.revision += 1;
        let _ = self.events.send(StoreEvent::Published {
            revision: self.revision,
            state: self.state.clone(),
        });
    }

    fn reject(&self, error: &ApplyError) {
        warn!(%error, revision = self.revision, "store rejected action");
        let _ = self.events.send(StoreEvent::Rejected {
            error: error.clone().into(),
        });
    }
}

fn push_bounded(history: &mut VecDeque<State>, state: State, depth: usize) {
    if depth == 0 {
        return;
    }
    while history.len() >= depth {
        history.pop_front();
    }
    history.push_back(state);
}

/// Drops selected labels and shapes that the restored task no longer holds.
fn prune_selection(task: &Task, user: &Arc<User>) -> Arc<User> {
    let item = task.items.get(user.select.item);
    let label_kept = |id: &LabelId| item.is_some_and(|item| item.labels.contains_key(id));
    let shape_kept = |id: &ShapeId| item.is_some_and(|item| item.shapes.contains_key(id));
    if user.select.labels.iter().all(label_kept) && user.select.shapes.iter().all(shape_kept) {
        return Arc::clone(user);
    }
    let mut pruned = User::clone(user);
    pruned.select.labels.retain(label_kept);
    pruned.select.shapes.retain(shape_kept);
    Arc::new(pruned)
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
