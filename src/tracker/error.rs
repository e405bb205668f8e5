use thiserror::Error;

/// Failure reasons surfaced by [`TableService`](super::TableService).
///
/// Raw storage errors never cross this boundary; they are folded into
/// [`TrackerError::StorageUnavailable`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrackerError {
    #[error("not authenticated")]
    Unauthenticated,

    #[error("table not found")]
    NotFound,

    #[error("invalid table: {0}")]
    InvalidTable(String),

    #[error("invalid measurement: {0}")]
    InvalidMeasurement(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Advisory only. Logged by the service, never returned from an operation.
    #[error("advisory log append failed: {0}")]
    LogAppendFailed(String),
}
