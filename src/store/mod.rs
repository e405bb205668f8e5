pub mod demo;
mod memory;
mod schema;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::tracker::TableChange;
use crate::types::*;

/// Store defines the storage backend interface.
///
/// Every table operation is scoped to an owner id: a table that exists but
/// belongs to another owner is reported exactly like a missing one.
pub trait Store: Send + Sync {
    fn initialize(&self) -> Result<()>;

    // Owner operations
    fn create_owner(&self, owner: &Owner) -> Result<()>;
    fn get_owner(&self, id: &str) -> Result<Option<Owner>>;
    fn get_owner_by_name(&self, name: &str) -> Result<Option<Owner>>;
    fn list_owners(&self) -> Result<Vec<Owner>>;
    fn update_owner_password(&self, id: &str, password_hash: &str) -> Result<()>;
    fn has_owner(&self) -> Result<bool>;

    // Session operations
    fn create_session(&self, session: &Session) -> Result<()>;
    fn get_session_by_lookup(&self, lookup: &str) -> Result<Option<Session>>;
    fn delete_session(&self, id: &str) -> Result<bool>;
    fn delete_owner_sessions(&self, owner_id: &str) -> Result<usize>;
    fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<usize>;

    // Table operations
    /// Lists the owner's tables, newest first.
    fn list_tables(&self, owner_id: &str) -> Result<Vec<Table>>;
    fn get_table(&self, owner_id: &str, id: &str) -> Result<Option<Table>>;
    /// Persists a new table and returns it with its assigned id.
    fn insert_table(&self, owner_id: &str, draft: &TableDraft) -> Result<Table>;
    /// Applies `change` as a single atomic read-modify-write.
    /// Returns `None` when the table does not resolve for this owner.
    fn update_table(&self, owner_id: &str, id: &str, change: &TableChange)
    -> Result<Option<Table>>;
    fn delete_table(&self, owner_id: &str, id: &str) -> Result<bool>;

    // Advisory history
    fn append_event(&self, event: &TableEvent) -> Result<()>;
    fn append_measurement(&self, record: &MeasurementRecord) -> Result<()>;
}
