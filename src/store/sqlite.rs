use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use uuid::Uuid;

use super::Store;
use super::schema::SCHEMA;
use crate::error::{Error, Result};
use crate::tracker::TableChange;
use crate::types::*;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const TABLE_COLUMNS: &str = "id, owner_id, name, description, harvest_previous, harvest_latest, \
     water_change_previous, water_change_latest, ph_value, ppm_value, last_measured_at, \
     nutrient_ml, created_at";

const SESSION_COLUMNS: &str = "id, owner_id, token_hash, token_lookup, created_at, expires_at";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns a guard to the underlying database connection.
    /// This allows consuming applications to execute custom SQL.
    pub fn connection(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn()
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Handle SQLite's default datetime format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

/// Fixed-width UTC timestamps, so text comparison in SQL is chronological.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn optional_datetime(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    Ok(row.get::<_, Option<String>>(idx)?.map(|s| parse_datetime(&s)))
}

fn table_from_row(row: &Row<'_>) -> rusqlite::Result<Table> {
    Ok(Table {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        harvest_previous: optional_datetime(row, 4)?,
        harvest_latest: optional_datetime(row, 5)?,
        water_change_previous: optional_datetime(row, 6)?,
        water_change_latest: optional_datetime(row, 7)?,
        ph_value: row.get(8)?,
        ppm_value: row.get(9)?,
        last_measured_at: optional_datetime(row, 10)?,
        nutrient_ml: row.get(11)?,
        created_at: parse_datetime(&row.get::<_, String>(12)?),
    })
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        token_hash: row.get(2)?,
        token_lookup: row.get(3)?,
        created_at: parse_datetime(&row.get::<_, String>(4)?),
        expires_at: parse_datetime(&row.get::<_, String>(5)?),
    })
}

fn owner_from_row(row: &Row<'_>) -> rusqlite::Result<Owner> {
    Ok(Owner {
        id: row.get(0)?,
        name: row.get(1)?,
        password_hash: row.get(2)?,
        created_at: parse_datetime(&row.get::<_, String>(3)?),
    })
}

fn select_table(conn: &Connection, owner_id: &str, id: &str) -> Result<Option<Table>> {
    conn.query_row(
        &format!("SELECT {TABLE_COLUMNS} FROM hydroponic_tables WHERE id = ?1 AND owner_id = ?2"),
        params![id, owner_id],
        table_from_row,
    )
    .optional()
    .map_err(Error::from)
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

impl Store for SqliteStore {
    fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    // Owner operations

    fn create_owner(&self, owner: &Owner) -> Result<()> {
        let result = self.conn().execute(
            "INSERT INTO owners (id, name, password_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                owner.id,
                owner.name,
                owner.password_hash,
                format_datetime(&owner.created_at),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_constraint_violation(&e) => Err(Error::AlreadyExists),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn get_owner(&self, id: &str) -> Result<Option<Owner>> {
        self.conn()
            .query_row(
                "SELECT id, name, password_hash, created_at FROM owners WHERE id = ?1",
                params![id],
                owner_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    fn get_owner_by_name(&self, name: &str) -> Result<Option<Owner>> {
        self.conn()
            .query_row(
                "SELECT id, name, password_hash, created_at FROM owners WHERE name = ?1",
                params![name],
                owner_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    fn list_owners(&self) -> Result<Vec<Owner>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT id, name, password_hash, created_at FROM owners ORDER BY name")?;
        let rows = stmt.query_map([], owner_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn update_owner_password(&self, id: &str, password_hash: &str) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE owners SET password_hash = ?1 WHERE id = ?2",
            params![password_hash, id],
        )?;

        if rows == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    fn has_owner(&self) -> Result<bool> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM owners", [], |row| row.get(0))?;
        Ok(count > 0)
    }

    // Session operations

    fn create_session(&self, session: &Session) -> Result<()> {
        let result = self.conn().execute(
            "INSERT INTO sessions (id, owner_id, token_hash, token_lookup, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                session.id,
                session.owner_id,
                session.token_hash,
                session.token_lookup,
                format_datetime(&session.created_at),
                format_datetime(&session.expires_at),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_constraint_violation(&e) => Err(Error::TokenLookupCollision),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn get_session_by_lookup(&self, lookup: &str) -> Result<Option<Session>> {
        self.conn()
            .query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE token_lookup = ?1"),
                params![lookup],
                session_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    fn delete_session(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    fn delete_owner_sessions(&self, owner_id: &str) -> Result<usize> {
        let rows = self
            .conn()
            .execute("DELETE FROM sessions WHERE owner_id = ?1", params![owner_id])?;
        Ok(rows)
    }

    fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<usize> {
        let rows = self.conn().execute(
            "DELETE FROM sessions WHERE expires_at <= ?1",
            params![format_datetime(&now)],
        )?;
        Ok(rows)
    }

    // Table operations

    fn list_tables(&self, owner_id: &str) -> Result<Vec<Table>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {TABLE_COLUMNS} FROM hydroponic_tables
             WHERE owner_id = ?1 ORDER BY created_at DESC, rowid DESC"
        ))?;

        let rows = stmt.query_map(params![owner_id], table_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn get_table(&self, owner_id: &str, id: &str) -> Result<Option<Table>> {
        select_table(&self.conn(), owner_id, id)
    }

    fn insert_table(&self, owner_id: &str, draft: &TableDraft) -> Result<Table> {
        let table = Table::from_draft(Uuid::new_v4().to_string(), owner_id.to_string(), draft);

        self.conn().execute(
            &format!(
                "INSERT INTO hydroponic_tables ({TABLE_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
            ),
            params![
                table.id,
                table.owner_id,
                table.name,
                table.description,
                table.harvest_previous.as_ref().map(format_datetime),
                table.harvest_latest.as_ref().map(format_datetime),
                table.water_change_previous.as_ref().map(format_datetime),
                table.water_change_latest.as_ref().map(format_datetime),
                table.ph_value,
                table.ppm_value,
                table.last_measured_at.as_ref().map(format_datetime),
                table.nutrient_ml,
                format_datetime(&table.created_at),
            ],
        )?;

        Ok(table)
    }

    fn update_table(
        &self,
        owner_id: &str,
        id: &str,
        change: &TableChange,
    ) -> Result<Option<Table>> {
        let mut conn = self.conn();
        // IMMEDIATE takes the write lock before the read, so no other writer
        // can slip in between the select and the update.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some(mut table) = select_table(&tx, owner_id, id)? else {
            return Ok(None);
        };
        change.apply(&mut table)?;

        tx.execute(
            "UPDATE hydroponic_tables SET
                 harvest_previous = ?1, harvest_latest = ?2,
                 water_change_previous = ?3, water_change_latest = ?4,
                 ph_value = ?5, ppm_value = ?6, last_measured_at = ?7,
                 nutrient_ml = ?8
             WHERE id = ?9 AND owner_id = ?10",
            params![
                table.harvest_previous.as_ref().map(format_datetime),
                table.harvest_latest.as_ref().map(format_datetime),
                table.water_change_previous.as_ref().map(format_datetime),
                table.water_change_latest.as_ref().map(format_datetime),
                table.ph_value,
                table.ppm_value,
                table.last_measured_at.as_ref().map(format_datetime),
                table.nutrient_ml,
                table.id,
                table.owner_id,
            ],
        )?;
        tx.commit()?;

        Ok(Some(table))
    }

    fn delete_table(&self, owner_id: &str, id: &str) -> Result<bool> {
        let rows = self.conn().execute(
            "DELETE FROM hydroponic_tables WHERE id = ?1 AND owner_id = ?2",
            params![id, owner_id],
        )?;
        Ok(rows > 0)
    }

    // Advisory history

    fn append_event(&self, event: &TableEvent) -> Result<()> {
        self.conn().execute(
            "INSERT INTO events (table_id, event_type, created_at) VALUES (?1, ?2, ?3)",
            params![
                event.table_id,
                event.kind.as_str(),
                format_datetime(&event.occurred_at),
            ],
        )?;
        Ok(())
    }

    fn append_measurement(&self, record: &MeasurementRecord) -> Result<()> {
        self.conn().execute(
            "INSERT INTO measurement_history (table_id, ph_value, ppm_value, measured_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                record.table_id,
                record.ph_value,
                record.ppm_value,
                format_datetime(&record.measured_at),
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration as ChronoDuration, TimeZone};
    use tempfile::TempDir;

    use super::*;
    use crate::tracker::TrackerError;

    fn t(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 8, minute, 0).unwrap()
    }

    fn open_store(temp: &TempDir) -> SqliteStore {
        let store = SqliteStore::new(temp.path().join("test.db")).unwrap();
        store.initialize().unwrap();
        store
    }

    fn owner(id: &str) -> Owner {
        Owner {
            id: id.to_string(),
            name: format!("{id}-name"),
            password_hash: "hash".to_string(),
            created_at: Utc::now(),
        }
    }

    fn draft(name: &str, created_at: DateTime<Utc>) -> TableDraft {
        TableDraft {
            name: name.to_string(),
            description: None,
            ph_value: None,
            ppm_value: None,
            created_at,
        }
    }

    #[test]
    fn test_initialize_creates_tables() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);

        let conn = store.conn();
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"owners".to_string()));
        assert!(tables.contains(&"sessions".to_string()));
        assert!(tables.contains(&"hydroponic_tables".to_string()));
        assert!(tables.contains(&"events".to_string()));
        assert!(tables.contains(&"measurement_history".to_string()));
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);
        store.initialize().unwrap();
    }

    #[test]
    fn test_owner_name_is_unique() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);

        store.create_owner(&owner("owner-1")).unwrap();
        let mut dup = owner("owner-2");
        dup.name = "owner-1-name".to_string();

        assert!(matches!(store.create_owner(&dup), Err(Error::AlreadyExists)));
        assert!(store.has_owner().unwrap());
        assert_eq!(
            store.get_owner_by_name("owner-1-name").unwrap().unwrap().id,
            "owner-1"
        );
    }

    #[test]
    fn test_update_missing_owner_password() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);

        let result = store.update_owner_password("nobody", "hash");
        assert!(matches!(result, Err(Error::NotFound)));
    }

    #[test]
    fn test_table_crud_is_owner_scoped() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);
        store.create_owner(&owner("owner-1")).unwrap();
        store.create_owner(&owner("owner-2")).unwrap();

        let table = store.insert_table("owner-1", &draft("Lettuce A", t(0))).unwrap();
        assert!(!table.id.is_empty());
        assert_eq!(table.nutrient_ml, 0.0);

        let fetched = store.get_table("owner-1", &table.id).unwrap().unwrap();
        assert_eq!(fetched, table);

        assert!(store.get_table("owner-2", &table.id).unwrap().is_none());
        assert!(!store.delete_table("owner-2", &table.id).unwrap());
        assert!(
            store
                .update_table("owner-2", &table.id, &TableChange::ResetNutrient)
                .unwrap()
                .is_none()
        );

        assert!(store.delete_table("owner-1", &table.id).unwrap());
        assert!(store.get_table("owner-1", &table.id).unwrap().is_none());
    }

    #[test]
    fn test_list_tables_newest_first() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);
        store.create_owner(&owner("owner-1")).unwrap();

        store.insert_table("owner-1", &draft("old", t(0))).unwrap();
        store.insert_table("owner-1", &draft("new", t(30))).unwrap();
        store.insert_table("owner-1", &draft("mid", t(10))).unwrap();

        let names: Vec<String> = store
            .list_tables("owner-1")
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, ["new", "mid", "old"]);
    }

    #[test]
    fn test_update_table_round_trips_event_slots() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);
        store.create_owner(&owner("owner-1")).unwrap();
        let table = store.insert_table("owner-1", &draft("Lettuce A", t(0))).unwrap();

        for minute in [1, 2] {
            store
                .update_table(
                    "owner-1",
                    &table.id,
                    &TableChange::RecordEvent {
                        kind: EventKind::WaterChange,
                        at: t(minute),
                    },
                )
                .unwrap();
        }

        let fetched = store.get_table("owner-1", &table.id).unwrap().unwrap();
        assert_eq!(fetched.water_change_previous, Some(t(1)));
        assert_eq!(fetched.water_change_latest, Some(t(2)));
        assert_eq!(fetched.harvest_latest, None);
    }

    #[test]
    fn test_concurrent_nutrient_adds_are_not_lost() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(open_store(&temp));
        store.create_owner(&owner("owner-1")).unwrap();
        let table = store.insert_table("owner-1", &draft("Lettuce A", t(0))).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                let id = table.id.clone();
                std::thread::spawn(move || {
                    for _ in 0..5 {
                        store
                            .update_table("owner-1", &id, &TableChange::AddNutrient(10.0))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let fetched = store.get_table("owner-1", &table.id).unwrap().unwrap();
        assert_eq!(fetched.nutrient_ml, 400.0);
    }

    #[test]
    fn test_overflowing_nutrient_add_is_rolled_back() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);
        store.create_owner(&owner("owner-1")).unwrap();
        let table = store.insert_table("owner-1", &draft("Lettuce A", t(0))).unwrap();
        let add = TableChange::AddNutrient(f64::MAX);

        store.update_table("owner-1", &table.id, &add).unwrap();
        let result = store.update_table("owner-1", &table.id, &add);

        assert!(matches!(
            result,
            Err(Error::Rejected(TrackerError::InvalidAmount(_)))
        ));
        let fetched = store.get_table("owner-1", &table.id).unwrap().unwrap();
        assert_eq!(fetched.nutrient_ml, f64::MAX);
    }

    #[test]
    fn test_history_rows_outlive_deleted_table() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);
        store.create_owner(&owner("owner-1")).unwrap();
        let table = store.insert_table("owner-1", &draft("Lettuce A", t(0))).unwrap();

        store
            .append_event(&TableEvent {
                table_id: table.id.clone(),
                kind: EventKind::Harvest,
                occurred_at: t(1),
            })
            .unwrap();
        store
            .append_measurement(&MeasurementRecord {
                table_id: table.id.clone(),
                ph_value: Some(6.2),
                ppm_value: None,
                measured_at: t(2),
            })
            .unwrap();
        store.delete_table("owner-1", &table.id).unwrap();

        let conn = store.conn();
        let event_type: String = conn
            .query_row(
                "SELECT event_type FROM events WHERE table_id = ?1",
                params![table.id],
                |row| row.get(0),
            )
            .unwrap();
        let measurements: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM measurement_history WHERE table_id = ?1",
                params![table.id],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(event_type, "harvest");
        assert_eq!(measurements, 1);
    }

    #[test]
    fn test_session_lookup_collision_and_expiry() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);
        store.create_owner(&owner("owner-1")).unwrap();

        let now = t(0);
        let session = Session {
            id: "session-1".to_string(),
            owner_id: "owner-1".to_string(),
            token_hash: "hash1".to_string(),
            token_lookup: "lookup12".to_string(),
            created_at: now,
            expires_at: now + ChronoDuration::hours(1),
        };
        store.create_session(&session).unwrap();

        let mut clash = session.clone();
        clash.id = "session-2".to_string();
        assert!(matches!(
            store.create_session(&clash),
            Err(Error::TokenLookupCollision)
        ));

        let fetched = store.get_session_by_lookup("lookup12").unwrap().unwrap();
        assert_eq!(fetched.expires_at, session.expires_at);

        assert_eq!(store.delete_expired_sessions(now).unwrap(), 0);
        assert_eq!(
            store
                .delete_expired_sessions(now + ChronoDuration::hours(2))
                .unwrap(),
            1
        );
        assert!(store.get_session_by_lookup("lookup12").unwrap().is_none());
    }
}
