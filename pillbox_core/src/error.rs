//! Error types for the pillbox_core library.

use crate::Slot;
use std::io;
use uuid::Uuid;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for pillbox_core operations
///
/// Variants fall into two groups. Request rejections (bad input, or a
/// conflict with the current ledger) leave every store untouched and are
/// reported to the caller by name. Everything else is an infrastructure
/// failure the caller may retry.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A backing store is unusable (bad file, lock failure, invariant broken on disk)
    #[error("Store error: {0}")]
    Store(String),

    /// Slot name is not one of morning, lunch, evening
    #[error("invalid slot '{0}' (expected morning, lunch or evening)")]
    InvalidSlot(String),

    /// Slot is valid but not part of the medication's schedule
    #[error("medication {medication_id} is not scheduled for {slot}")]
    SlotNotScheduled { medication_id: Uuid, slot: Slot },

    /// No medication with this id exists
    #[error("unknown medication {0}")]
    UnknownMedication(Uuid),

    /// Date input could not be parsed or has no representable day window
    #[error("invalid date '{0}' (expected YYYY-MM-DD)")]
    InvalidDate(String),

    /// A record for this slot already exists in today's window
    #[error("already recorded {slot} for medication {medication_id} today")]
    AlreadyRecorded { medication_id: Uuid, slot: Slot },

    /// Nothing recorded for this slot today
    #[error("no {slot} record to cancel for medication {medication_id} today")]
    NoRecordToCancel { medication_id: Uuid, slot: Slot },

    /// Medication fields failed validation
    #[error("invalid medication: {0}")]
    InvalidMedication(String),

    /// Another medication already uses this id
    #[error("medication {0} already exists")]
    MedicationExists(Uuid),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True for expected, named outcomes of a single request.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Error::InvalidSlot(_)
                | Error::SlotNotScheduled { .. }
                | Error::UnknownMedication(_)
                | Error::InvalidDate(_)
                | Error::AlreadyRecorded { .. }
                | Error::NoRecordToCancel { .. }
                | Error::InvalidMedication(_)
                | Error::MedicationExists(_)
        )
    }
}
