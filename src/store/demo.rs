//! Sample data for demo mode.
//!
//! Demo mode is an explicit configuration choice: the server runs on a
//! [`MemoryStore`](super::MemoryStore) seeded with the tables below, and
//! nothing is persisted.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use super::Store;
use crate::error::Result;
use crate::tracker::TableChange;
use crate::types::{EventKind, Owner, Table, TableDraft};

pub const DEMO_OWNER_NAME: &str = "demo";

struct Sample {
    name: &'static str,
    description: Option<&'static str>,
    ph: Option<f64>,
    ppm: Option<f64>,
    harvest_days_ago: &'static [i64],
    water_change_days_ago: &'static [i64],
    nutrient_ml: f64,
}

const SAMPLES: &[Sample] = &[
    Sample {
        name: "Lettuce A",
        description: Some("Rack 1, nutrient film"),
        ph: Some(6.2),
        ppm: Some(840.0),
        harvest_days_ago: &[42, 14],
        water_change_days_ago: &[10, 3],
        nutrient_ml: 250.0,
    },
    Sample {
        name: "Pak Choi B",
        description: Some("Rack 2, deep water"),
        ph: Some(6.5),
        ppm: Some(1050.0),
        harvest_days_ago: &[21],
        water_change_days_ago: &[6],
        nutrient_ml: 120.0,
    },
    Sample {
        name: "Basil C",
        description: None,
        ph: None,
        ppm: None,
        harvest_days_ago: &[],
        water_change_days_ago: &[],
        nutrient_ml: 0.0,
    },
];

#[must_use]
pub fn demo_owner(password_hash: String, now: DateTime<Utc>) -> Owner {
    Owner {
        id: Uuid::new_v4().to_string(),
        name: DEMO_OWNER_NAME.to_string(),
        password_hash,
        created_at: now,
    }
}

/// Inserts the sample tables for `owner_id`, oldest first.
pub fn seed(store: &dyn Store, owner_id: &str, now: DateTime<Utc>) -> Result<Vec<Table>> {
    let mut seeded = Vec::with_capacity(SAMPLES.len());

    for (offset, sample) in (0_i64..).zip(SAMPLES) {
        let draft = TableDraft {
            name: sample.name.to_string(),
            description: sample.description.map(str::to_string),
            ph_value: sample.ph,
            ppm_value: sample.ppm,
            created_at: now - Duration::days(60) + Duration::minutes(offset),
        };
        let mut table = store.insert_table(owner_id, &draft)?;

        let events = sample
            .harvest_days_ago
            .iter()
            .map(|days| (EventKind::Harvest, *days))
            .chain(
                sample
                    .water_change_days_ago
                    .iter()
                    .map(|days| (EventKind::WaterChange, *days)),
            );
        let mut changes: Vec<TableChange> = events
            .map(|(kind, days)| TableChange::RecordEvent {
                kind,
                at: now - Duration::days(days),
            })
            .collect();
        if sample.nutrient_ml > 0.0 {
            changes.push(TableChange::AddNutrient(sample.nutrient_ml));
        }

        for change in &changes {
            if let Some(updated) = store.update_table(owner_id, &table.id, change)? {
                table = updated;
            }
        }
        seeded.push(table);
    }

    tracing::info!(tables = seeded.len(), "Seeded demo tables");
    Ok(seeded)
}
