pub mod domain;
pub mod error;
pub mod query;
pub mod transfer;

pub use domain::{Game, GameId, GameStatus, Grade, NewGame, DEFAULT_COVER_URL};
pub use error::{ErrorCode, ImportError, ValidationError};
