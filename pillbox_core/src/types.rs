//! Core domain types for the Pillbox intake system.
//!
//! This module defines the fundamental types used throughout the system:
//! - Daily slots and slot sets
//! - Medications (the schedule model)
//! - Intake records (the ledger entries)
//! - Reconciled day views and calendar entries

use crate::{DayWindow, Error};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Slots
// ============================================================================

/// One of the three fixed daily intake buckets
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    Morning,
    Lunch,
    Evening,
}

impl Slot {
    /// All slots in day order
    pub const ALL: [Slot; 3] = [Slot::Morning, Slot::Lunch, Slot::Evening];

    pub fn as_str(&self) -> &'static str {
        match self {
            Slot::Morning => "morning",
            Slot::Lunch => "lunch",
            Slot::Evening => "evening",
        }
    }

    /// Local wall-clock hour the dose is nominally due (08:00, 13:00, 19:00)
    pub fn nominal_hour(&self) -> i64 {
        match self {
            Slot::Morning => 8,
            Slot::Lunch => 13,
            Slot::Evening => 19,
        }
    }

    /// Instant this slot is due inside the given day window
    pub fn due_at(&self, window: &DayWindow) -> DateTime<Utc> {
        window.start + Duration::hours(self.nominal_hour())
    }

    fn bit(self) -> u8 {
        match self {
            Slot::Morning => 0b001,
            Slot::Lunch => 0b010,
            Slot::Evening => 0b100,
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Slot {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "morning" => Ok(Slot::Morning),
            "lunch" => Ok(Slot::Lunch),
            "evening" => Ok(Slot::Evening),
            _ => Err(Error::InvalidSlot(s.to_string())),
        }
    }
}

/// A set of slots with at most one entry per slot
///
/// Serialized as an ordered list. Deserializing a list with duplicates
/// collapses them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<Slot>", into = "Vec<Slot>")]
pub struct SlotSet(u8);

impl SlotSet {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn all() -> Self {
        Slot::ALL.into_iter().collect()
    }

    pub fn insert(&mut self, slot: Slot) {
        self.0 |= slot.bit();
    }

    pub fn remove(&mut self, slot: Slot) {
        self.0 &= !slot.bit();
    }

    pub fn contains(&self, slot: Slot) -> bool {
        self.0 & slot.bit() != 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Iterate in day order (morning, lunch, evening)
    pub fn iter(&self) -> impl Iterator<Item = Slot> + '_ {
        Slot::ALL.into_iter().filter(move |s| self.contains(*s))
    }

    /// Parse a comma separated list such as "morning,evening"
    pub fn parse_list(input: &str) -> crate::Result<Self> {
        input
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Slot::from_str)
            .collect()
    }
}

impl FromIterator<Slot> for SlotSet {
    fn from_iter<I: IntoIterator<Item = Slot>>(iter: I) -> Self {
        let mut set = SlotSet::empty();
        for slot in iter {
            set.insert(slot);
        }
        set
    }
}

impl From<Vec<Slot>> for SlotSet {
    fn from(slots: Vec<Slot>) -> Self {
        slots.into_iter().collect()
    }
}

impl From<SlotSet> for Vec<Slot> {
    fn from(set: SlotSet) -> Self {
        set.iter().collect()
    }
}

impl fmt::Display for SlotSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(|s| s.as_str()).collect();
        f.write_str(&names.join(","))
    }
}

// ============================================================================
// Schedule model
// ============================================================================

/// Classification tag, no scheduling effect
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MedicationKind {
    #[serde(alias = "pill")]
    Prescription,
    Supplement,
}

impl MedicationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MedicationKind::Prescription => "prescription",
            MedicationKind::Supplement => "supplement",
        }
    }
}

impl FromStr for MedicationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "prescription" | "pill" => Ok(MedicationKind::Prescription),
            "supplement" => Ok(MedicationKind::Supplement),
            other => Err(Error::InvalidMedication(format!(
                "unknown kind '{}' (expected prescription or supplement)",
                other
            ))),
        }
    }
}

/// A user-owned medication and its recurring daily schedule
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Medication {
    pub id: Uuid,
    pub owner_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub slots: SlotSet,
    pub active: bool,
    pub alarm_enabled: bool,
    pub kind: MedicationKind,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Medication {
    /// New active medication with alarms enabled
    pub fn new(
        owner_id: impl Into<String>,
        name: impl Into<String>,
        kind: MedicationKind,
        slots: SlotSet,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.into(),
            name: name.into(),
            description: None,
            slots,
            active: true,
            alarm_enabled: true,
            kind,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns a list of problems; empty means valid
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.owner_id.trim().is_empty() {
            errors.push(format!("Medication '{}' has empty owner", self.id));
        }
        if self.name.trim().is_empty() {
            errors.push(format!("Medication '{}' has empty name", self.id));
        }
        if self.slots.is_empty() {
            errors.push(format!("Medication '{}' has no slots", self.id));
        }
        errors
    }
}

// ============================================================================
// Ledger entries
// ============================================================================

/// A single logged intake of one slot
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct IntakeRecord {
    pub id: Uuid,
    pub medication_id: Uuid,
    pub slot: Slot,
    pub occurred_at: DateTime<Utc>,
}

impl IntakeRecord {
    pub fn new(medication_id: Uuid, slot: Slot, occurred_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            medication_id,
            slot,
            occurred_at,
        }
    }
}

// ============================================================================
// Read views
// ============================================================================

/// Reconciled state of one declared slot on one day
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SlotStatus {
    pub slot: Slot,
    pub taken: bool,
    pub taken_at: Option<DateTime<Utc>>,
    pub due_at: DateTime<Utc>,
}

impl SlotStatus {
    /// Untaken and past its nominal time
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        !self.taken && now >= self.due_at
    }
}

/// One medication's reconciled schedule for a day
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MedicationDay {
    pub medication_id: Uuid,
    pub name: String,
    pub kind: MedicationKind,
    pub alarm_enabled: bool,
    /// Distinct slots with a record in the window, declared or not
    pub recorded_count: usize,
    pub slots: Vec<SlotStatus>,
}

impl MedicationDay {
    pub fn declared_count(&self) -> usize {
        self.slots.len()
    }

    /// Declared slots with a record today
    pub fn taken_count(&self) -> usize {
        self.slots.iter().filter(|s| s.taken).count()
    }

    pub fn pending(&self) -> impl Iterator<Item = &SlotStatus> {
        self.slots.iter().filter(|s| !s.taken)
    }
}

/// All active medications of one user for one day
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DayView {
    pub window: DayWindow,
    pub medications: Vec<MedicationDay>,
}

/// A ledger record joined with its medication's display fields
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CalendarEntry {
    pub record: IntakeRecord,
    pub medication_name: String,
    pub kind: MedicationKind,
}
