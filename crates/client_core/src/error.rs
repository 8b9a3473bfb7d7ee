use shared::{
    domain::{GameId, GameStatus},
    error::{ErrorCode, ImportError, ValidationError},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BacklogError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("no game with id '{0}'")]
    NotFound(GameId),
    #[error("cannot move game '{id}' from {from} to {to}")]
    InvalidTransition {
        id: GameId,
        from: GameStatus,
        to: GameStatus,
    },
    #[error(transparent)]
    InvalidImport(#[from] ImportError),
    #[error("storage failure: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl BacklogError {
    pub fn code(&self) -> ErrorCode {
        match self {
            BacklogError::Validation(_) => ErrorCode::Validation,
            BacklogError::NotFound(_) => ErrorCode::NotFound,
            BacklogError::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            BacklogError::InvalidImport(_) => ErrorCode::InvalidImport,
            BacklogError::Storage(_) => ErrorCode::Internal,
        }
    }
}
