//! CSV export of calendar entries.
//!
//! Rows are appended; the header is written only when the target file is
//! new or empty, and the file is fsynced before returning.

use crate::{CalendarEntry, Result};
use chrono::FixedOffset;
use std::fs::OpenOptions;
use std::path::Path;

/// A row in the CSV output
#[derive(Debug, serde::Serialize)]
struct CsvRow {
    date: String,
    record_id: String,
    medication_id: String,
    medication: String,
    kind: &'static str,
    slot: &'static str,
    occurred_at: String,
}

impl CsvRow {
    fn new(entry: &CalendarEntry, offset: FixedOffset) -> Self {
        let local = entry.record.occurred_at.with_timezone(&offset);
        CsvRow {
            date: local.date_naive().to_string(),
            record_id: entry.record.id.to_string(),
            medication_id: entry.record.medication_id.to_string(),
            medication: entry.medication_name.clone(),
            kind: entry.kind.as_str(),
            slot: entry.record.slot.as_str(),
            occurred_at: local.to_rfc3339(),
        }
    }
}

/// Append entries to `csv_path`, returning how many rows were written
///
/// Timestamps are written in the reference offset so the `date` column
/// matches the day the entry was reported under.
pub fn append_calendar_csv(
    entries: &[CalendarEntry],
    csv_path: &Path,
    offset: FixedOffset,
) -> Result<usize> {
    if let Some(parent) = csv_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(csv_path)?;

    let needs_headers = file.metadata()?.len() == 0;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(needs_headers)
        .from_writer(file);

    for entry in entries {
        writer.serialize(CsvRow::new(entry, offset))?;
    }

    writer.flush()?;
    let file = writer
        .into_inner()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    file.sync_all()?;

    tracing::info!("Exported {} intakes to {:?}", entries.len(), csv_path);
    Ok(entries.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{IntakeRecord, MedicationKind, Slot};
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn entry(name: &str, hour: u32) -> CalendarEntry {
        CalendarEntry {
            record: IntakeRecord::new(
                Uuid::new_v4(),
                Slot::Morning,
                Utc.with_ymd_and_hms(2024, 1, 15, hour, 0, 0).unwrap(),
            ),
            medication_name: name.into(),
            kind: MedicationKind::Supplement,
        }
    }

    #[test]
    fn test_export_writes_header_once() {
        let temp_dir = tempfile::tempdir().unwrap();
        let csv_path = temp_dir.path().join("out").join("intakes.csv");
        let utc = FixedOffset::east_opt(0).unwrap();

        assert_eq!(append_calendar_csv(&[entry("A", 8)], &csv_path, utc).unwrap(), 1);
        assert_eq!(
            append_calendar_csv(&[entry("B", 9), entry("C", 10)], &csv_path, utc).unwrap(),
            2
        );

        let mut reader = csv::Reader::from_path(&csv_path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(&headers[0], "date");
        assert_eq!(reader.records().count(), 3);
    }

    #[test]
    fn test_export_uses_reference_offset_for_date() {
        let temp_dir = tempfile::tempdir().unwrap();
        let csv_path = temp_dir.path().join("intakes.csv");
        let seoul = FixedOffset::east_opt(9 * 3600).unwrap();

        // 20:00 UTC on the 15th is the 16th in +09:00
        append_calendar_csv(&[entry("A", 20)], &csv_path, seoul).unwrap();

        let mut reader = csv::Reader::from_path(&csv_path).unwrap();
        let row = reader.records().next().unwrap().unwrap();
        assert_eq!(&row[0], "2024-01-16");
        assert!(row[6].ends_with("+09:00"));
    }
}
