#![forbid(unsafe_code)]

//! Core domain model and business logic for the Pillbox intake system.
//!
//! This crate provides:
//! - Domain types (slots, medications, intake records, day views)
//! - Day-window resolution in a reference time zone
//! - Persistence (medication registry, day-partitioned intake ledger)
//! - Reconciliation, record/cancel commands, alarm and calendar queries
//! - CSV export

pub mod types;
pub mod error;
pub mod clock;
pub mod config;
pub mod logging;
pub mod day_window;
pub mod medications;
pub mod ledger;
pub mod reconcile;
pub mod commands;
pub mod alarm;
pub mod calendar;
pub mod export;
pub mod service;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::Config;
pub use day_window::{DayResolver, DayWindow};
pub use medications::{JsonMedicationStore, MedicationRegistry, MedicationStore};
pub use ledger::{Insertion, IntakeLedger, JsonlLedger};
pub use service::IntakeService;
