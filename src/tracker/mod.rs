//! Table update rules and the operations built on them.

mod error;
pub mod rules;
mod service;

pub use error::TrackerError;
pub use rules::TableChange;
pub use service::{DEFAULT_STORAGE_TIMEOUT, NewTable, SharedClock, TableService};

/// Answers "who is calling" for a core operation.
///
/// Operations never look identity up on their own; the caller passes a value
/// implementing this trait, typically an [`auth::SessionContext`](crate::auth::SessionContext).
pub trait IdentityProvider {
    /// The owner id of the current caller, or `None` when there is no session.
    fn current_owner(&self) -> Option<&str>;
}
