use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::EntityKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Validation,
    NotFound,
    Consistency,
    UnsupportedAction,
}

/// Serializable error record handed to the user-facing layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionError {
    pub code: ErrorCode,
    pub message: String,
}

impl ActionError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Why an action could not be applied. The prior state is always left intact.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplyError {
    #[error("invalid action payload: {0}")]
    Validation(String),
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: i64 },
    #[error("consistency violation: {0}")]
    Consistency(String),
    #[error("unsupported action `{0}`")]
    UnsupportedAction(String),
}

impl ApplyError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn consistency(message: impl Into<String>) -> Self {
        Self::Consistency(message.into())
    }

    pub fn not_found(kind: EntityKind, id: impl Into<i64>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            ApplyError::Validation(_) => ErrorCode::Validation,
            ApplyError::NotFound { .. } => ErrorCode::NotFound,
            ApplyError::Consistency(_) => ErrorCode::Consistency,
            ApplyError::UnsupportedAction(_) => ErrorCode::UnsupportedAction,
        }
    }
}

impl From<ApplyError> for ActionError {
    fn from(value: ApplyError) -> Self {
        Self {
            code: value.code(),
            message: value.to_string(),
        }
    }
}
