//! Pending-dose alarm derived from today's reconciliation.
//!
//! A medication raises the alarm when it is active, has alarms enabled, and
//! fewer of its currently declared slots are taken today than it declares.
//! Records for slots dropped from the schedule mid-day do not count.

use crate::MedicationDay;

/// True when any alarm-enabled medication still owes a dose
pub fn pending_alarm(days: &[MedicationDay]) -> bool {
    days.iter().any(owes_dose)
}

/// Alarm-enabled medications still owing a dose, in view order
pub fn pending_medications(days: &[MedicationDay]) -> Vec<&MedicationDay> {
    days.iter().filter(|d| owes_dose(d)).collect()
}

fn owes_dose(day: &MedicationDay) -> bool {
    day.alarm_enabled && day.taken_count() < day.declared_count()
}
