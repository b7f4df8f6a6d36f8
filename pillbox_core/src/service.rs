//! Service facade exposing the intake operations.
//!
//! `IntakeService` owns the two stores, the day resolver and the clock, and
//! turns each public operation into one call of the underlying engine with a
//! single, freshly resolved day window.

use crate::clock::{Clock, SystemClock};
use crate::ledger::IntakeLedger;
use crate::medications::MedicationStore;
use crate::{
    alarm, calendar, commands, export, reconcile, CalendarEntry, DayResolver, DayView, Error,
    IntakeRecord, Result, Slot,
};
use chrono::NaiveDate;
use std::path::Path;
use uuid::Uuid;

pub struct IntakeService<M, L, C = SystemClock> {
    medications: M,
    ledger: L,
    resolver: DayResolver,
    clock: C,
}

impl<M, L, C> IntakeService<M, L, C>
where
    M: MedicationStore,
    L: IntakeLedger,
    C: Clock,
{
    pub fn new(medications: M, ledger: L, resolver: DayResolver, clock: C) -> Self {
        Self {
            medications,
            ledger,
            resolver,
            clock,
        }
    }

    pub fn medications(&self) -> &M {
        &self.medications
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn resolver(&self) -> &DayResolver {
        &self.resolver
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Per-slot taken/pending view of today's active medications
    pub fn today_view(&self, owner_id: &str) -> Result<DayView> {
        let window = self.resolver.today(&self.clock)?;
        reconcile::day_view(&self.medications, &self.ledger, owner_id, &window)
    }

    /// Same reconciliation for an arbitrary date
    pub fn day_view(&self, owner_id: &str, date: NaiveDate) -> Result<DayView> {
        let window = self.resolver.window_for(date)?;
        reconcile::day_view(&self.medications, &self.ledger, owner_id, &window)
    }

    /// Record today's intake of `slot`
    pub fn record(&self, medication_id: Uuid, slot: Slot) -> Result<IntakeRecord> {
        let window = self.resolver.today(&self.clock)?;
        commands::record_intake(
            &self.medications,
            &self.ledger,
            &window,
            self.clock.now(),
            medication_id,
            slot,
        )
    }

    /// Cancel today's intake of `slot`
    pub fn cancel(&self, medication_id: Uuid, slot: Slot) -> Result<()> {
        let window = self.resolver.today(&self.clock)?;
        commands::cancel_intake(&self.ledger, &window, medication_id, slot)?;
        Ok(())
    }

    /// Whether any active, alarm-enabled medication still owes a dose today
    pub fn alarm_state(&self, owner_id: &str) -> Result<bool> {
        let view = self.today_view(owner_id)?;
        Ok(alarm::pending_alarm(&view.medications))
    }

    /// Everything `owner_id` recorded on `date`
    pub fn calendar_view(&self, owner_id: &str, date: NaiveDate) -> Result<Vec<CalendarEntry>> {
        let window = self.resolver.window_for(date)?;
        calendar::calendar_view(&self.medications, &self.ledger, owner_id, &window)
    }

    /// Append calendar entries for `from..=to` to a CSV file
    pub fn export_calendar(
        &self,
        owner_id: &str,
        from: NaiveDate,
        to: NaiveDate,
        csv_path: &Path,
    ) -> Result<usize> {
        if to < from {
            return Err(Error::InvalidDate(format!("{} is before {}", to, from)));
        }

        let mut entries = Vec::new();
        for date in from.iter_days().take_while(|d| *d <= to) {
            entries.extend(self.calendar_view(owner_id, date)?);
        }
        export::append_calendar_csv(&entries, csv_path, self.resolver.offset())
    }
}
