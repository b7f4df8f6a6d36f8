//! Historical "what was taken on this day" query.

use crate::ledger::IntakeLedger;
use crate::medications::MedicationStore;
use crate::{CalendarEntry, DayWindow, Medication, Result};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use uuid::Uuid;

/// Records in `window` whose medication belongs to `owner_id`
///
/// The ledger narrows to the day first; each distinct medication in that
/// slice is looked up once and kept only if `owner_id` owns it. Retired
/// medications still appear. Records whose medication no longer exists are
/// dropped.
pub fn calendar_view<M, L>(
    medications: &M,
    ledger: &L,
    owner_id: &str,
    window: &DayWindow,
) -> Result<Vec<CalendarEntry>>
where
    M: MedicationStore + ?Sized,
    L: IntakeLedger + ?Sized,
{
    let records = ledger.records_in_window(window)?;
    let mut owners: HashMap<Uuid, Option<Medication>> = HashMap::new();
    let mut entries = Vec::new();

    for record in records {
        let medication = match owners.entry(record.medication_id) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                let found = medications
                    .get(record.medication_id)?
                    .filter(|m| m.owner_id == owner_id);
                e.insert(found)
            }
        };

        if let Some(med) = medication {
            entries.push(CalendarEntry {
                medication_name: med.name.clone(),
                kind: med.kind,
                record,
            });
        }
    }

    entries.sort_by(|a, b| {
        a.record
            .occurred_at
            .cmp(&b.record.occurred_at)
            .then(a.record.slot.cmp(&b.record.slot))
    });

    tracing::debug!(
        "Calendar for {} on {}: {} entries",
        owner_id,
        window.date,
        entries.len()
    );
    Ok(entries)
}
