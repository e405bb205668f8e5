use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::Store;
use crate::error::{Error, Result};
use crate::tracker::TableChange;
use crate::types::*;

/// A non-persistent store, used for demo mode and tests.
///
/// Every mutation happens under one write lock, which gives table updates the
/// same atomicity as the SQLite transaction.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    owners: Vec<Owner>,
    sessions: Vec<Session>,
    tables: Vec<Table>,
    events: Vec<TableEvent>,
    measurements: Vec<MeasurementRecord>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Snapshot of the advisory event log for a table.
    #[must_use]
    pub fn events(&self, table_id: &str) -> Vec<TableEvent> {
        self.read()
            .events
            .iter()
            .filter(|e| e.table_id == table_id)
            .cloned()
            .collect()
    }

    /// Snapshot of the advisory measurement history for a table.
    #[must_use]
    pub fn measurements(&self, table_id: &str) -> Vec<MeasurementRecord> {
        self.read()
            .measurements
            .iter()
            .filter(|m| m.table_id == table_id)
            .cloned()
            .collect()
    }
}

impl Inner {
    fn table_mut(&mut self, owner_id: &str, id: &str) -> Option<&mut Table> {
        self.tables
            .iter_mut()
            .find(|t| t.id == id && t.owner_id == owner_id)
    }
}

impl Store for MemoryStore {
    fn initialize(&self) -> Result<()> {
        Ok(())
    }

    // Owner operations

    fn create_owner(&self, owner: &Owner) -> Result<()> {
        let mut inner = self.write();
        if inner
            .owners
            .iter()
            .any(|o| o.id == owner.id || o.name == owner.name)
        {
            return Err(Error::AlreadyExists);
        }
        inner.owners.push(owner.clone());
        Ok(())
    }

    fn get_owner(&self, id: &str) -> Result<Option<Owner>> {
        Ok(self.read().owners.iter().find(|o| o.id == id).cloned())
    }

    fn get_owner_by_name(&self, name: &str) -> Result<Option<Owner>> {
        Ok(self.read().owners.iter().find(|o| o.name == name).cloned())
    }

    fn list_owners(&self) -> Result<Vec<Owner>> {
        let mut owners = self.read().owners.clone();
        owners.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(owners)
    }

    fn update_owner_password(&self, id: &str, password_hash: &str) -> Result<()> {
        let mut inner = self.write();
        let owner = inner
            .owners
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or(Error::NotFound)?;
        owner.password_hash = password_hash.to_string();
        Ok(())
    }

    fn has_owner(&self) -> Result<bool> {
        Ok(!self.read().owners.is_empty())
    }

    // Session operations

    fn create_session(&self, session: &Session) -> Result<()> {
        let mut inner = self.write();
        if inner
            .sessions
            .iter()
            .any(|s| s.token_lookup == session.token_lookup)
        {
            return Err(Error::TokenLookupCollision);
        }
        inner.sessions.push(session.clone());
        Ok(())
    }

    fn get_session_by_lookup(&self, lookup: &str) -> Result<Option<Session>> {
        Ok(self
            .read()
            .sessions
            .iter()
            .find(|s| s.token_lookup == lookup)
            .cloned())
    }

    fn delete_session(&self, id: &str) -> Result<bool> {
        let mut inner = self.write();
        let before = inner.sessions.len();
        inner.sessions.retain(|s| s.id != id);
        Ok(inner.sessions.len() < before)
    }

    fn delete_owner_sessions(&self, owner_id: &str) -> Result<usize> {
        let mut inner = self.write();
        let before = inner.sessions.len();
        inner.sessions.retain(|s| s.owner_id != owner_id);
        Ok(before - inner.sessions.len())
    }

    fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut inner = self.write();
        let before = inner.sessions.len();
        inner.sessions.retain(|s| !s.is_expired(now));
        Ok(before - inner.sessions.len())
    }

    // Table operations

    fn list_tables(&self, owner_id: &str) -> Result<Vec<Table>> {
        // Reverse insertion order first so the stable sort breaks ties newest-first.
        let mut tables: Vec<Table> = self
            .read()
            .tables
            .iter()
            .rev()
            .filter(|t| t.owner_id == owner_id)
            .cloned()
            .collect();
        tables.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tables)
    }

    fn get_table(&self, owner_id: &str, id: &str) -> Result<Option<Table>> {
        Ok(self
            .read()
            .tables
            .iter()
            .find(|t| t.id == id && t.owner_id == owner_id)
            .cloned())
    }

    fn insert_table(&self, owner_id: &str, draft: &TableDraft) -> Result<Table> {
        let mut inner = self.write();
        if !inner.owners.iter().any(|o| o.id == owner_id) {
            return Err(Error::NotFound);
        }
        let table = Table::from_draft(Uuid::new_v4().to_string(), owner_id.to_string(), draft);
        inner.tables.push(table.clone());
        Ok(table)
    }

    fn update_table(
        &self,
        owner_id: &str,
        id: &str,
        change: &TableChange,
    ) -> Result<Option<Table>> {
        let mut inner = self.write();
        let Some(table) = inner.table_mut(owner_id, id) else {
            return Ok(None);
        };
        change.apply(table)?;
        Ok(Some(table.clone()))
    }

    fn delete_table(&self, owner_id: &str, id: &str) -> Result<bool> {
        let mut inner = self.write();
        let before = inner.tables.len();
        inner
            .tables
            .retain(|t| !(t.id == id && t.owner_id == owner_id));
        Ok(inner.tables.len() < before)
    }

    // Advisory history

    fn append_event(&self, event: &TableEvent) -> Result<()> {
        self.write().events.push(event.clone());
        Ok(())
    }

    fn append_measurement(&self, record: &MeasurementRecord) -> Result<()> {
        self.write().measurements.push(record.clone());
        Ok(())
    }
}
