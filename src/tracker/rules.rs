use std::ops::RangeInclusive;

use chrono::{DateTime, Utc};

use super::TrackerError;
use crate::types::{EventKind, Table};

pub const PH_RANGE: RangeInclusive<f64> = 0.0..=14.0;
pub const MAX_TABLE_NAME_LEN: usize = 100;
pub const MAX_DESCRIPTION_LEN: usize = 1000;

/// A single atomic mutation of a table.
///
/// Stores apply a change inside their read-modify-write section, so
/// concurrent changes to the same table never observe each other's stale
/// state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TableChange {
    /// Shift `latest` into `previous` and record a new `latest`.
    RecordEvent { kind: EventKind, at: DateTime<Utc> },
    /// Partial pH/PPM update; `None` leaves the stored value untouched.
    Measure {
        ph: Option<f64>,
        ppm: Option<f64>,
        at: DateTime<Utc>,
    },
    AddNutrient(f64),
    ResetNutrient,
}

impl TableChange {
    /// Applies the change in place. A rejected change leaves `table` untouched.
    pub fn apply(&self, table: &mut Table) -> Result<(), TrackerError> {
        match *self {
            TableChange::RecordEvent { kind, at } => {
                let (previous, latest) = table.event_slots_mut(kind);
                let shifted = latest.take();
                // latest never moves behind previous, even with a lagging clock
                let recorded = match shifted {
                    Some(old) if old > at => old,
                    _ => at,
                };
                *previous = shifted;
                *latest = Some(recorded);
            }
            TableChange::Measure { ph, ppm, at } => {
                if ph.is_none() && ppm.is_none() {
                    return Ok(());
                }
                if let Some(ph) = ph {
                    table.ph_value = Some(ph);
                }
                if let Some(ppm) = ppm {
                    table.ppm_value = Some(ppm);
                }
                table.last_measured_at = Some(at);
            }
            TableChange::AddNutrient(amount) => {
                let total = table.nutrient_ml + amount;
                if !total.is_finite() {
                    return Err(TrackerError::InvalidAmount(format!(
                        "adding {amount} ml would overflow the nutrient total"
                    )));
                }
                table.nutrient_ml = total;
            }
            TableChange::ResetNutrient => {
                table.nutrient_ml = 0.0;
            }
        }
        Ok(())
    }
}

pub fn validate_name(name: &str) -> Result<String, TrackerError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(TrackerError::InvalidTable("name cannot be empty".to_string()));
    }
    if name.chars().count() > MAX_TABLE_NAME_LEN {
        return Err(TrackerError::InvalidTable(format!(
            "name cannot exceed {MAX_TABLE_NAME_LEN} characters"
        )));
    }
    Ok(name.to_string())
}

/// Trims a description; blank descriptions are stored as absent.
pub fn normalize_description(description: Option<&str>) -> Result<Option<String>, TrackerError> {
    let Some(description) = description.map(str::trim).filter(|d| !d.is_empty()) else {
        return Ok(None);
    };
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(TrackerError::InvalidTable(format!(
            "description cannot exceed {MAX_DESCRIPTION_LEN} characters"
        )));
    }
    Ok(Some(description.to_string()))
}

pub fn validate_ph(ph: f64) -> Result<f64, TrackerError> {
    if ph.is_finite() && PH_RANGE.contains(&ph) {
        Ok(ph)
    } else {
        Err(TrackerError::InvalidMeasurement(format!(
            "pH must be between 0 and 14, got {ph}"
        )))
    }
}

pub fn validate_ppm(ppm: f64) -> Result<f64, TrackerError> {
    if ppm.is_finite() && ppm >= 0.0 {
        Ok(ppm)
    } else {
        Err(TrackerError::InvalidMeasurement(format!(
            "PPM cannot be negative, got {ppm}"
        )))
    }
}

pub fn validate_amount(amount: f64) -> Result<f64, TrackerError> {
    if amount.is_finite() && amount > 0.0 {
        Ok(amount)
    } else {
        Err(TrackerError::InvalidAmount(format!(
            "nutrient amount must be positive, got {amount}"
        )))
    }
}

/// Validates an optional pH/PPM pair, as submitted on create or update.
pub fn validate_measurement(
    ph: Option<f64>,
    ppm: Option<f64>,
) -> Result<(Option<f64>, Option<f64>), TrackerError> {
    let ph = ph.map(validate_ph).transpose()?;
    let ppm = ppm.map(validate_ppm).transpose()?;
    Ok((ph, ppm))
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::types::TableDraft;

    fn t(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, hour, 0, 0).unwrap()
    }

    fn table() -> Table {
        let draft = TableDraft {
            name: "Lettuce A".to_string(),
            description: None,
            ph_value: None,
            ppm_value: None,
            created_at: t(0),
        };
        Table::from_draft("table-1".to_string(), "owner-1".to_string(), &draft)
    }

    #[test]
    fn test_first_event_leaves_previous_empty() {
        let mut table = table();
        TableChange::RecordEvent {
            kind: EventKind::Harvest,
            at: t(1),
        }
        .apply(&mut table).unwrap();

        assert_eq!(table.harvest_previous, None);
        assert_eq!(table.harvest_latest, Some(t(1)));
        assert_eq!(table.water_change_latest, None);
    }

    #[test]
    fn test_second_event_shifts_latest_into_previous() {
        let mut table = table();
        table.harvest_previous = Some(t(0));

        for hour in [1, 2] {
            TableChange::RecordEvent {
                kind: EventKind::Harvest,
                at: t(hour),
            }
            .apply(&mut table).unwrap();
        }

        assert_eq!(table.harvest_previous, Some(t(1)));
        assert_eq!(table.harvest_latest, Some(t(2)));
    }

    #[test]
    fn test_event_kinds_are_independent() {
        let mut table = table();
        TableChange::RecordEvent {
            kind: EventKind::WaterChange,
            at: t(3),
        }
        .apply(&mut table).unwrap();

        assert_eq!(table.event_slots(EventKind::WaterChange), (None, Some(t(3))));
        assert_eq!(table.event_slots(EventKind::Harvest), (None, None));
    }

    #[test]
    fn test_lagging_clock_keeps_latest_ordered() {
        let mut table = table();
        table.harvest_latest = Some(t(5));

        TableChange::RecordEvent {
            kind: EventKind::Harvest,
            at: t(5) - Duration::minutes(10),
        }
        .apply(&mut table).unwrap();

        assert_eq!(table.harvest_previous, Some(t(5)));
        assert_eq!(table.harvest_latest, Some(t(5)));
    }

    #[test]
    fn test_measure_is_partial() {
        let mut table = table();
        table.ppm_value = Some(800.0);

        TableChange::Measure {
            ph: Some(6.5),
            ppm: None,
            at: t(4),
        }
        .apply(&mut table).unwrap();

        assert_eq!(table.ph_value, Some(6.5));
        assert_eq!(table.ppm_value, Some(800.0));
        assert_eq!(table.last_measured_at, Some(t(4)));
    }

    #[test]
    fn test_empty_measure_changes_nothing() {
        let mut table = table();
        let before = table.clone();

        TableChange::Measure {
            ph: None,
            ppm: None,
            at: t(4),
        }
        .apply(&mut table).unwrap();

        assert_eq!(table, before);
    }

    #[test]
    fn test_nutrient_add_and_reset() {
        let mut table = table();
        TableChange::AddNutrient(50.0).apply(&mut table).unwrap();
        TableChange::AddNutrient(25.0).apply(&mut table).unwrap();
        assert_eq!(table.nutrient_ml, 75.0);

        TableChange::ResetNutrient.apply(&mut table).unwrap();
        assert_eq!(table.nutrient_ml, 0.0);
    }

    #[test]
    fn test_nutrient_overflow_is_rejected() {
        let mut table = table();
        TableChange::AddNutrient(f64::MAX).apply(&mut table).unwrap();

        let result = TableChange::AddNutrient(f64::MAX).apply(&mut table);

        assert!(matches!(result, Err(TrackerError::InvalidAmount(_))));
        assert_eq!(table.nutrient_ml, f64::MAX);
    }

    #[test]
    fn test_validate_ph_bounds() {
        assert_eq!(validate_ph(0.0), Ok(0.0));
        assert_eq!(validate_ph(14.0), Ok(14.0));
        assert!(matches!(validate_ph(15.0), Err(TrackerError::InvalidMeasurement(_))));
        assert!(matches!(validate_ph(-0.1), Err(TrackerError::InvalidMeasurement(_))));
        assert!(matches!(validate_ph(f64::NAN), Err(TrackerError::InvalidMeasurement(_))));
    }

    #[test]
    fn test_validate_ppm_bounds() {
        assert_eq!(validate_ppm(0.0), Ok(0.0));
        assert!(matches!(validate_ppm(-1.0), Err(TrackerError::InvalidMeasurement(_))));
        assert!(matches!(
            validate_ppm(f64::INFINITY),
            Err(TrackerError::InvalidMeasurement(_))
        ));
    }

    #[test]
    fn test_validate_measurement_rejects_either_side() {
        assert!(validate_measurement(Some(15.0), None).is_err());
        assert!(validate_measurement(Some(6.0), Some(-5.0)).is_err());
        assert_eq!(validate_measurement(None, None), Ok((None, None)));
    }

    #[test]
    fn test_validate_amount() {
        assert_eq!(validate_amount(50.0), Ok(50.0));
        assert!(matches!(validate_amount(0.0), Err(TrackerError::InvalidAmount(_))));
        assert!(matches!(validate_amount(-5.0), Err(TrackerError::InvalidAmount(_))));
    }

    #[test]
    fn test_validate_name_trims() {
        assert_eq!(validate_name("  Lettuce A "), Ok("Lettuce A".to_string()));
        assert!(matches!(validate_name("   "), Err(TrackerError::InvalidTable(_))));
        assert!(validate_name(&"x".repeat(MAX_TABLE_NAME_LEN + 1)).is_err());
    }

    #[test]
    fn test_blank_description_is_absent() {
        assert_eq!(normalize_description(Some("  ")), Ok(None));
        assert_eq!(normalize_description(None), Ok(None));
        assert_eq!(
            normalize_description(Some(" rack 2 ")),
            Ok(Some("rack 2".to_string()))
        );
    }
}
