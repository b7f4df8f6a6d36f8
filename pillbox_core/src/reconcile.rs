//! Reconciliation of declared schedules against the intake ledger.
//!
//! For one user and one day window this produces, per active medication,
//! exactly one [`SlotStatus`] per declared slot. Outstanding slots sort
//! before taken ones; inside each group slots keep day order.

use crate::ledger::IntakeLedger;
use crate::medications::MedicationStore;
use crate::{DayView, DayWindow, IntakeRecord, Medication, MedicationDay, Result, Slot, SlotStatus};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Build the day view for `owner_id` from the stores
pub fn day_view<M, L>(
    medications: &M,
    ledger: &L,
    owner_id: &str,
    window: &DayWindow,
) -> Result<DayView>
where
    M: MedicationStore + ?Sized,
    L: IntakeLedger + ?Sized,
{
    let active: Vec<Medication> = medications
        .list_by_owner(owner_id)?
        .into_iter()
        .filter(|m| m.active)
        .collect();

    if active.is_empty() {
        tracing::debug!("No active medications for {}", owner_id);
        return Ok(DayView {
            window: *window,
            medications: Vec::new(),
        });
    }

    let ids: Vec<Uuid> = active.iter().map(|m| m.id).collect();
    let records = ledger.records_for_medications(&ids, window)?;

    Ok(DayView {
        window: *window,
        medications: reconcile(&active, &records, window),
    })
}

/// Join medications with the records of one window
///
/// Inactive medications and records outside the window are ignored. When the
/// ledger holds more than one record for a pair, the earliest one counts.
pub fn reconcile(
    medications: &[Medication],
    records: &[IntakeRecord],
    window: &DayWindow,
) -> Vec<MedicationDay> {
    let mut lookup: HashMap<(Uuid, Slot), &IntakeRecord> = HashMap::new();
    for record in records.iter().filter(|r| window.contains(r.occurred_at)) {
        lookup
            .entry((record.medication_id, record.slot))
            .and_modify(|kept| {
                if record.occurred_at < kept.occurred_at {
                    *kept = record;
                }
            })
            .or_insert(record);
    }

    let mut days: Vec<MedicationDay> = medications
        .iter()
        .filter(|m| m.active)
        .map(|med| {
            let mut slots: Vec<SlotStatus> = med
                .slots
                .iter()
                .map(|slot| {
                    let taken_at = lookup.get(&(med.id, slot)).map(|r| r.occurred_at);
                    SlotStatus {
                        slot,
                        taken: taken_at.is_some(),
                        taken_at,
                        due_at: slot.due_at(window),
                    }
                })
                .collect();
            slots.sort_by_key(|s| (s.taken, s.slot));

            let recorded: HashSet<Slot> = lookup
                .keys()
                .filter(|(id, _)| *id == med.id)
                .map(|(_, slot)| *slot)
                .collect();

            MedicationDay {
                medication_id: med.id,
                name: med.name.clone(),
                kind: med.kind,
                alarm_enabled: med.alarm_enabled,
                recorded_count: recorded.len(),
                slots,
            }
        })
        .collect();

    days.sort_by(|a, b| {
        a.name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then(a.medication_id.cmp(&b.medication_id))
    });
    days
}
