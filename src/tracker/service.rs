use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use mockable::Clock;
use tracing::{error, info, warn};

use super::rules::{normalize_description, validate_amount, validate_measurement, validate_name};
use super::{IdentityProvider, TableChange, TrackerError};
use crate::error::Error;
use crate::store::Store;
use crate::types::{EventKind, MeasurementRecord, Table, TableDraft, TableEvent};

pub type SharedClock = Arc<dyn Clock + Send + Sync>;

pub const DEFAULT_STORAGE_TIMEOUT: Duration = Duration::from_secs(5);

/// Caller input for creating a table, before validation.
#[derive(Debug, Clone, Default)]
pub struct NewTable {
    pub name: String,
    pub description: Option<String>,
    pub ph: Option<f64>,
    pub ppm: Option<f64>,
}

/// The table operations exposed to the presentation layer.
///
/// Every storage call runs on the blocking pool and is bounded by `timeout`;
/// a call that fails or times out surfaces as
/// [`TrackerError::StorageUnavailable`]. A change the store rejects (such as a
/// nutrient total that would overflow) keeps its own [`TrackerError`]. History appends after a successful
/// write are advisory: their failures are logged and counted, never returned.
pub struct TableService {
    store: Arc<dyn Store>,
    clock: SharedClock,
    timeout: Duration,
    advisory_failures: AtomicU64,
}

fn resolve_owner<C: IdentityProvider + ?Sized>(caller: &C) -> Result<String, TrackerError> {
    caller
        .current_owner()
        .map(str::to_string)
        .ok_or(TrackerError::Unauthenticated)
}

impl TableService {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, clock: SharedClock, timeout: Duration) -> Self {
        Self {
            store,
            clock,
            timeout,
            advisory_failures: AtomicU64::new(0),
        }
    }

    /// Number of history appends dropped since startup.
    #[must_use]
    pub fn advisory_failures(&self) -> u64 {
        self.advisory_failures.load(Ordering::Relaxed)
    }

    pub async fn list_tables<C: IdentityProvider + ?Sized>(
        &self,
        caller: &C,
    ) -> Result<Vec<Table>, TrackerError> {
        let owner = resolve_owner(caller)?;
        self.primary("list_tables", move |store| store.list_tables(&owner))
            .await
    }

    pub async fn get_table<C: IdentityProvider + ?Sized>(
        &self,
        caller: &C,
        id: &str,
    ) -> Result<Table, TrackerError> {
        let owner = resolve_owner(caller)?;
        let id = id.to_string();
        self.primary("get_table", move |store| store.get_table(&owner, &id))
            .await?
            .ok_or(TrackerError::NotFound)
    }

    pub async fn create_table<C: IdentityProvider + ?Sized>(
        &self,
        caller: &C,
        new: NewTable,
    ) -> Result<Table, TrackerError> {
        let owner = resolve_owner(caller)?;
        let name = validate_name(&new.name)?;
        let description = normalize_description(new.description.as_deref())?;
        let (ph_value, ppm_value) = validate_measurement(new.ph, new.ppm)?;

        let draft = TableDraft {
            name,
            description,
            ph_value,
            ppm_value,
            created_at: self.clock.utc(),
        };
        let table = self
            .primary("create_table", move |store| store.insert_table(&owner, &draft))
            .await?;

        info!(table_id = %table.id, name = %table.name, "Created table");
        Ok(table)
    }

    pub async fn delete_table<C: IdentityProvider + ?Sized>(
        &self,
        caller: &C,
        id: &str,
    ) -> Result<(), TrackerError> {
        let owner = resolve_owner(caller)?;
        let table_id = id.to_string();
        let deleted = self
            .primary("delete_table", move |store| store.delete_table(&owner, &table_id))
            .await?;

        if !deleted {
            return Err(TrackerError::NotFound);
        }
        info!(table_id = id, "Deleted table");
        Ok(())
    }

    /// Shifts the event pair for `kind` and records the new latest as now.
    pub async fn record_event<C: IdentityProvider + ?Sized>(
        &self,
        caller: &C,
        id: &str,
        kind: EventKind,
    ) -> Result<Table, TrackerError> {
        let owner = resolve_owner(caller)?;
        let at = self.clock.utc();
        let table = self
            .apply("record_event", owner, id, TableChange::RecordEvent { kind, at })
            .await?;

        let event = TableEvent {
            table_id: table.id.clone(),
            kind,
            occurred_at: table.event_slots(kind).1.unwrap_or(at),
        };
        self.advisory("append_event", &table.id, move |store| {
            store.append_event(&event)
        })
        .await;

        Ok(table)
    }

    pub async fn record_harvest<C: IdentityProvider + ?Sized>(
        &self,
        caller: &C,
        id: &str,
    ) -> Result<Table, TrackerError> {
        self.record_event(caller, id, EventKind::Harvest).await
    }

    pub async fn record_water_change<C: IdentityProvider + ?Sized>(
        &self,
        caller: &C,
        id: &str,
    ) -> Result<Table, TrackerError> {
        self.record_event(caller, id, EventKind::WaterChange).await
    }

    /// Partially updates pH and/or PPM. With neither value present nothing
    /// is written and the current table is returned.
    pub async fn update_measurement<C: IdentityProvider + ?Sized>(
        &self,
        caller: &C,
        id: &str,
        ph: Option<f64>,
        ppm: Option<f64>,
    ) -> Result<Table, TrackerError> {
        let owner = resolve_owner(caller)?;
        let (ph, ppm) = validate_measurement(ph, ppm)?;

        if ph.is_none() && ppm.is_none() {
            let table_id = id.to_string();
            return self
                .primary("get_table", move |store| store.get_table(&owner, &table_id))
                .await?
                .ok_or(TrackerError::NotFound);
        }

        let at = self.clock.utc();
        let table = self
            .apply("update_measurement", owner, id, TableChange::Measure { ph, ppm, at })
            .await?;

        let record = MeasurementRecord {
            table_id: table.id.clone(),
            ph_value: ph,
            ppm_value: ppm,
            measured_at: at,
        };
        self.advisory("append_measurement", &table.id, move |store| {
            store.append_measurement(&record)
        })
        .await;

        Ok(table)
    }

    pub async fn add_nutrient<C: IdentityProvider + ?Sized>(
        &self,
        caller: &C,
        id: &str,
        amount: f64,
    ) -> Result<Table, TrackerError> {
        let owner = resolve_owner(caller)?;
        let amount = validate_amount(amount)?;
        self.apply("add_nutrient", owner, id, TableChange::AddNutrient(amount))
            .await
    }

    pub async fn reset_nutrient<C: IdentityProvider + ?Sized>(
        &self,
        caller: &C,
        id: &str,
    ) -> Result<Table, TrackerError> {
        let owner = resolve_owner(caller)?;
        self.apply("reset_nutrient", owner, id, TableChange::ResetNutrient)
            .await
    }

    async fn apply(
        &self,
        operation: &'static str,
        owner: String,
        id: &str,
        change: TableChange,
    ) -> Result<Table, TrackerError> {
        let id = id.to_string();
        self.primary(operation, move |store| {
            store.update_table(&owner, &id, &change)
        })
        .await?
        .ok_or(TrackerError::NotFound)
    }

    async fn primary<T, F>(&self, operation: &'static str, f: F) -> Result<T, TrackerError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn Store) -> crate::error::Result<T> + Send + 'static,
    {
        self.call(f).await.inspect_err(|e| {
            if let TrackerError::StorageUnavailable(_) = e {
                error!(operation, error = %e, "Storage call failed");
            }
        })
    }

    async fn advisory<F>(&self, operation: &'static str, table_id: &str, f: F)
    where
        F: FnOnce(&dyn Store) -> crate::error::Result<()> + Send + 'static,
    {
        if let Err(e) = self.call(f).await {
            let failure = TrackerError::LogAppendFailed(e.to_string());
            self.advisory_failures.fetch_add(1, Ordering::Relaxed);
            warn!(operation, table_id, error = %failure, "Advisory append dropped");
        }
    }

    async fn call<T, F>(&self, f: F) -> Result<T, TrackerError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn Store) -> crate::error::Result<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let abandoned = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&abandoned);

        let task = tokio::task::spawn_blocking(move || {
            // A call still queued when the caller timed out must not write.
            if flag.load(Ordering::Acquire) {
                return Err(Error::Interrupted("caller timed out".to_string()));
            }
            f(store.as_ref())
        });

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result.map_err(|e| match e {
                Error::Rejected(rejected) => rejected,
                e => TrackerError::StorageUnavailable(e.to_string()),
            }),
            Ok(Err(e)) => Err(TrackerError::StorageUnavailable(format!(
                "storage task failed: {e}"
            ))),
            Err(_) => {
                abandoned.store(true, Ordering::Release);
                Err(TrackerError::StorageUnavailable(format!(
                    "timed out after {}ms",
                    self.timeout.as_millis()
                )))
            }
        }
    }
}
