use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A hydroponic growing table and its latest tracked state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub id: String,
    #[serde(skip)]
    pub owner_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub harvest_previous: Option<DateTime<Utc>>,
    pub harvest_latest: Option<DateTime<Utc>>,
    pub water_change_previous: Option<DateTime<Utc>>,
    pub water_change_latest: Option<DateTime<Utc>>,
    pub ph_value: Option<f64>,
    pub ppm_value: Option<f64>,
    pub last_measured_at: Option<DateTime<Utc>>,
    pub nutrient_ml: f64,
    pub created_at: DateTime<Utc>,
}

impl Table {
    /// Builds the initial state of a table from a validated draft.
    #[must_use]
    pub fn from_draft(id: String, owner_id: String, draft: &TableDraft) -> Self {
        let measured = draft.ph_value.is_some() || draft.ppm_value.is_some();
        Self {
            id,
            owner_id,
            name: draft.name.clone(),
            description: draft.description.clone(),
            harvest_previous: None,
            harvest_latest: None,
            water_change_previous: None,
            water_change_latest: None,
            ph_value: draft.ph_value,
            ppm_value: draft.ppm_value,
            last_measured_at: measured.then_some(draft.created_at),
            nutrient_ml: 0.0,
            created_at: draft.created_at,
        }
    }

    /// Returns the `(previous, latest)` slots for an event kind.
    #[must_use]
    pub fn event_slots(&self, kind: EventKind) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        match kind {
            EventKind::Harvest => (self.harvest_previous, self.harvest_latest),
            EventKind::WaterChange => (self.water_change_previous, self.water_change_latest),
        }
    }

    pub fn event_slots_mut(
        &mut self,
        kind: EventKind,
    ) -> (&mut Option<DateTime<Utc>>, &mut Option<DateTime<Utc>>) {
        match kind {
            EventKind::Harvest => (&mut self.harvest_previous, &mut self.harvest_latest),
            EventKind::WaterChange => {
                (&mut self.water_change_previous, &mut self.water_change_latest)
            }
        }
    }
}

/// Validated input for inserting a new table. The store assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDraft {
    pub name: String,
    pub description: Option<String>,
    pub ph_value: Option<f64>,
    pub ppm_value: Option<f64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Harvest,
    WaterChange,
}

impl EventKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Harvest => "harvest",
            EventKind::WaterChange => "water_change",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "harvest" => Ok(EventKind::Harvest),
            "water_change" => Ok(EventKind::WaterChange),
            other => Err(format!("unknown event kind: {other}")),
        }
    }
}

/// Append-only record of a harvest or water change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableEvent {
    pub table_id: String,
    pub kind: EventKind,
    pub occurred_at: DateTime<Utc>,
}

/// Append-only record of a pH/PPM reading as it was submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    pub table_id: String,
    pub ph_value: Option<f64>,
    pub ppm_value: Option<f64>,
    pub measured_at: DateTime<Utc>,
}

/// The identity that owns tables. Holds the shared dashboard password.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Owner {
    pub id: String,
    pub name: String,
    #[serde(skip)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub owner_id: String,
    #[serde(skip)]
    pub token_hash: String,
    #[serde(skip)]
    pub token_lookup: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
