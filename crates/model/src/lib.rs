//! Immutable state model and action reducer of a multi-sensor labeling tool.
//!
//! Every transition goes through [`apply`], which takes a [`State`] and an
//! [`Action`] and returns the next [`State`] without touching the prior one.

pub mod action;
pub mod domain;
pub mod error;
pub mod graph;
pub mod merge;
pub mod overlay;
pub mod reducer;
pub mod shape;
pub mod states;

pub use action::Action;
pub use error::{ActionError, ApplyError, ErrorCode};
pub use reducer::{apply, apply_json};
pub use states::State;
