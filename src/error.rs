use thiserror::Error;

use crate::tracker::TrackerError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("not found")]
    NotFound,

    #[error("already exists")]
    AlreadyExists,

    #[error("session lookup collision")]
    TokenLookupCollision,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("password hashing failed: {0}")]
    Hashing(String),

    #[error("invalid token format")]
    InvalidTokenFormat,

    #[error("storage call interrupted: {0}")]
    Interrupted(String),

    #[error("change rejected: {0}")]
    Rejected(#[from] TrackerError),
}

pub type Result<T> = std::result::Result<T, Error>;
