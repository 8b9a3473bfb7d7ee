use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NotFound,
    Validation,
    InvalidTransition,
    InvalidImport,
    Internal,
}

/// Rejections raised by manual entry before anything is saved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Name is required")]
    EmptyName,
    #[error("At least one console is required")]
    EmptyConsoles,
    #[error("grade must be between 0 and {max}, got {actual}")]
    GradeOutOfRange { max: u8, actual: u8 },
    #[error("unknown status '{0}' (expected todo, in-progress or completed)")]
    UnknownStatus(String),
}

impl ValidationError {
    pub fn code(&self) -> ErrorCode {
        ErrorCode::Validation
    }
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("invalid JSON file: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("invalid format: expected a JSON array of games")]
    NotAnArray,
    #[error("entry {index} is invalid: {reason}")]
    InvalidEntry { index: usize, reason: String },
}

impl ImportError {
    pub fn code(&self) -> ErrorCode {
        ErrorCode::InvalidImport
    }
}
