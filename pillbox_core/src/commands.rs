//! Record and cancel commands against today's window.
//!
//! Both commands resolve the day window once, when processing starts, and
//! every later step uses that window. A command that straddles midnight
//! therefore acts on the day it started in.

use crate::ledger::{truncate_to_seconds, Insertion, IntakeLedger};
use crate::medications::MedicationStore;
use crate::{DayWindow, Error, IntakeRecord, Result, Slot};
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

/// Log one intake of `slot` for `medication_id`
///
/// Validation happens before the ledger is touched. The uniqueness check and
/// the insert are a single ledger operation (see [`IntakeLedger::insert_unique`]),
/// so concurrent duplicates resolve to one success and `AlreadyRecorded`.
pub fn record_intake<M, L>(
    medications: &M,
    ledger: &L,
    window: &DayWindow,
    now: DateTime<Utc>,
    medication_id: Uuid,
    slot: Slot,
) -> Result<IntakeRecord>
where
    M: MedicationStore + ?Sized,
    L: IntakeLedger + ?Sized,
{
    let medication = medications
        .get(medication_id)?
        .ok_or(Error::UnknownMedication(medication_id))?;

    if !medication.slots.contains(slot) {
        return Err(Error::SlotNotScheduled {
            medication_id,
            slot,
        });
    }

    let record = IntakeRecord::new(medication_id, slot, occurrence_in(window, now));

    match ledger.insert_unique(record, window)? {
        Insertion::Inserted(record) => {
            tracing::info!(
                "Recorded {} for {} at {}",
                slot,
                medication.name,
                record.occurred_at
            );
            Ok(record)
        }
        Insertion::Existing(existing) => {
            tracing::info!(
                "Rejected duplicate {} for {} (recorded at {})",
                slot,
                medication.name,
                existing.occurred_at
            );
            Err(Error::AlreadyRecorded {
                medication_id,
                slot,
            })
        }
    }
}

/// Remove today's record of `slot` for `medication_id`
pub fn cancel_intake<L>(
    ledger: &L,
    window: &DayWindow,
    medication_id: Uuid,
    slot: Slot,
) -> Result<IntakeRecord>
where
    L: IntakeLedger + ?Sized,
{
    match ledger.remove_in_window(medication_id, slot, window)? {
        Some(record) => {
            tracing::info!("Cancelled {} for {} ({})", slot, medication_id, record.id);
            Ok(record)
        }
        None => Err(Error::NoRecordToCancel {
            medication_id,
            slot,
        }),
    }
}

/// Timestamp for a new record: `now` to the second, kept inside `window`
///
/// `now` can run past the window's end when the command started just before
/// midnight; the record then lands on the last second of the starting day.
fn occurrence_in(window: &DayWindow, now: DateTime<Utc>) -> DateTime<Utc> {
    let occurred_at = truncate_to_seconds(now);
    if occurred_at >= window.end {
        window.end - Duration::seconds(1)
    } else if occurred_at < window.start {
        window.start
    } else {
        occurred_at
    }
}
