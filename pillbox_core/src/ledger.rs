//! Intake ledger persisted as day-partitioned JSON Lines.
//!
//! Records are appended to `intakes-YYYY-MM-DD.jsonl` (UTC date of
//! `occurred_at`), so a day window touches at most two partitions no matter
//! how long the history grows. All mutations hold an exclusive lock on
//! `ledger.lock` for the whole check-then-write sequence; readers take a
//! shared lock on the same file.

use crate::{DayWindow, Error, IntakeRecord, Result, Slot};
use chrono::{DateTime, Duration, NaiveDate, SubsecRound, Utc};
use fs2::FileExt;
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use uuid::Uuid;

/// Outcome of a conditional insert
#[derive(Clone, Debug, PartialEq)]
pub enum Insertion {
    /// No record existed; this one was written
    Inserted(IntakeRecord),
    /// A record for the same medication and slot already exists in the window
    Existing(IntakeRecord),
}

/// Intake store capable of the atomic operations the command layer needs
pub trait IntakeLedger {
    /// Insert `record` unless one for the same (medication, slot) lies in `window`.
    ///
    /// The existence check and the write are a single atomic decision.
    fn insert_unique(&self, record: IntakeRecord, window: &DayWindow) -> Result<Insertion>;

    /// Delete and return the record for (medication, slot) in `window`, if any.
    fn remove_in_window(
        &self,
        medication_id: Uuid,
        slot: Slot,
        window: &DayWindow,
    ) -> Result<Option<IntakeRecord>>;

    /// All records with `occurred_at` inside `window`
    fn records_in_window(&self, window: &DayWindow) -> Result<Vec<IntakeRecord>>;

    /// Records inside `window` restricted to the given medications
    fn records_for_medications(
        &self,
        medication_ids: &[Uuid],
        window: &DayWindow,
    ) -> Result<Vec<IntakeRecord>> {
        let wanted: HashSet<Uuid> = medication_ids.iter().copied().collect();
        Ok(self
            .records_in_window(window)?
            .into_iter()
            .filter(|r| wanted.contains(&r.medication_id))
            .collect())
    }
}

/// Held for the duration of a ledger operation; released on drop
struct LedgerLock(File);

impl Drop for LedgerLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.0) {
            tracing::warn!("Failed to release ledger lock: {}", e);
        }
    }
}

/// JSONL ledger rooted at a directory
#[derive(Clone, Debug)]
pub struct JsonlLedger {
    dir: PathBuf,
}

impl JsonlLedger {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Partition file holding records for a UTC date
    pub fn partition_path(&self, date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("intakes-{}.jsonl", date.format("%Y-%m-%d")))
    }

    fn lock(&self, exclusive: bool) -> Result<LedgerLock> {
        std::fs::create_dir_all(&self.dir)?;
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(self.dir.join("ledger.lock"))?;
        if exclusive {
            file.lock_exclusive()?;
        } else {
            file.lock_shared()?;
        }
        Ok(LedgerLock(file))
    }

    /// UTC dates whose partitions may hold records of `window`
    fn partitions_for(&self, window: &DayWindow) -> Result<Vec<NaiveDate>> {
        let first = window.start.date_naive();
        let last = (window.end - Duration::nanoseconds(1)).date_naive();
        let mut dates = Vec::new();
        let mut date = first;
        while date <= last {
            dates.push(date);
            date = date
                .succ_opt()
                .ok_or_else(|| Error::Store(format!("date overflow after {}", date)))?;
        }
        Ok(dates)
    }

    fn window_records(&self, window: &DayWindow) -> Result<Vec<IntakeRecord>> {
        let mut records = Vec::new();
        for date in self.partitions_for(window)? {
            records.extend(
                read_partition(&self.partition_path(date))?
                    .into_iter()
                    .filter(|r| window.contains(r.occurred_at)),
            );
        }
        Ok(records)
    }

    fn append(&self, record: &IntakeRecord) -> Result<()> {
        let path = self.partition_path(record.occurred_at.date_naive());
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;
        let torn = ends_mid_line(&mut file)?;

        let mut writer = BufWriter::new(&file);
        if torn {
            tracing::warn!("Partition {:?} ends mid-line; starting a new line", path);
            writer.write_all(b"\n")?;
        }
        let line = serde_json::to_string(record)?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        drop(writer);
        file.sync_data()?;

        tracing::debug!("Appended intake {} to {:?}", record.id, path);
        Ok(())
    }

    /// Rewrite a partition without the given record id (temp file + rename)
    fn rewrite_without(&self, date: NaiveDate, record_id: Uuid) -> Result<()> {
        let path = self.partition_path(date);
        let kept: Vec<IntakeRecord> = read_partition(&path)?
            .into_iter()
            .filter(|r| r.id != record_id)
            .collect();

        let temp = NamedTempFile::new_in(&self.dir)?;
        {
            let mut writer = BufWriter::new(temp.as_file());
            for record in &kept {
                writer.write_all(serde_json::to_string(record)?.as_bytes())?;
                writer.write_all(b"\n")?;
            }
            writer.flush()?;
        }
        temp.as_file().sync_all()?;
        temp.persist(&path).map_err(|e| Error::Io(e.error))?;

        tracing::debug!("Rewrote {:?} with {} records", path, kept.len());
        Ok(())
    }

    /// Every record across all partitions, oldest first
    pub fn all_records(&self) -> Result<Vec<IntakeRecord>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let _lock = self.lock(false)?;
        let mut records = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let is_partition = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("intakes-") && n.ends_with(".jsonl"))
                .unwrap_or(false);
            if is_partition {
                records.extend(read_partition(&path)?);
            }
        }
        records.sort_by_key(|r| r.occurred_at);
        Ok(records)
    }
}

/// True when a non-empty file does not end with a newline
fn ends_mid_line(file: &mut File) -> Result<bool> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(false);
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

fn matches_pair(record: &IntakeRecord, medication_id: Uuid, slot: Slot) -> bool {
    record.medication_id == medication_id && record.slot == slot
}

fn earliest(records: Vec<IntakeRecord>) -> Option<IntakeRecord> {
    records.into_iter().min_by_key(|r| r.occurred_at)
}

impl IntakeLedger for JsonlLedger {
    fn insert_unique(&self, record: IntakeRecord, window: &DayWindow) -> Result<Insertion> {
        if !window.contains(record.occurred_at) {
            return Err(Error::Store(format!(
                "record at {} lies outside window {}..{}",
                record.occurred_at, window.start, window.end
            )));
        }

        let _lock = self.lock(true)?;
        let existing = earliest(
            self.window_records(window)?
                .into_iter()
                .filter(|r| matches_pair(r, record.medication_id, record.slot))
                .collect(),
        );
        if let Some(existing) = existing {
            tracing::debug!(
                "Intake for {} {} already present ({})",
                record.medication_id,
                record.slot,
                existing.id
            );
            return Ok(Insertion::Existing(existing));
        }

        self.append(&record)?;
        Ok(Insertion::Inserted(record))
    }

    fn remove_in_window(
        &self,
        medication_id: Uuid,
        slot: Slot,
        window: &DayWindow,
    ) -> Result<Option<IntakeRecord>> {
        let _lock = self.lock(true)?;
        let found = earliest(
            self.window_records(window)?
                .into_iter()
                .filter(|r| matches_pair(r, medication_id, slot))
                .collect(),
        );
        let Some(record) = found else {
            return Ok(None);
        };

        self.rewrite_without(record.occurred_at.date_naive(), record.id)?;
        Ok(Some(record))
    }

    fn records_in_window(&self, window: &DayWindow) -> Result<Vec<IntakeRecord>> {
        let _lock = self.lock(false)?;
        let records = self.window_records(window)?;
        tracing::debug!("Read {} intakes for {}", records.len(), window.date);
        Ok(records)
    }
}

/// Read every parseable record of one partition file
///
/// Missing files are empty. Corrupt lines are skipped with a warning so a
/// torn write cannot hide the rest of the day.
fn read_partition(path: &Path) -> Result<Vec<IntakeRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();

    for (line_num, line_result) in reader.lines().enumerate() {
        let line = line_result?;
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<IntakeRecord>(&line) {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::warn!(
                    "Skipping unreadable intake at {:?}:{}: {}",
                    path,
                    line_num + 1,
                    e
                );
            }
        }
    }

    Ok(records)
}

/// Truncate to whole seconds so stored and compared instants agree
pub fn truncate_to_seconds(instant: DateTime<Utc>) -> DateTime<Utc> {
    instant.trunc_subsecs(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DayResolver;
    use chrono::{FixedOffset, TimeZone};
    use std::sync::Arc;
    use std::thread;

    fn window(date: (i32, u32, u32)) -> DayWindow {
        DayResolver::utc()
            .window_for(NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap())
            .unwrap()
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, h, m, 0).unwrap()
    }

    #[test]
    fn test_insert_then_read_back() {
        let temp_dir = tempfile::tempdir().unwrap();
        let ledger = JsonlLedger::new(temp_dir.path());
        let med = Uuid::new_v4();
        let day = window((2024, 1, 15));

        let record = IntakeRecord::new(med, Slot::Morning, at(8, 5));
        let outcome = ledger.insert_unique(record.clone(), &day).unwrap();
        assert_eq!(outcome, Insertion::Inserted(record.clone()));

        let records = ledger.records_in_window(&day).unwrap();
        assert_eq!(records, vec![record]);
        assert!(ledger.partition_path(day.date).exists());
    }

    #[test]
    fn test_second_insert_in_window_returns_existing() {
        let temp_dir = tempfile::tempdir().unwrap();
        let ledger = JsonlLedger::new(temp_dir.path());
        let med = Uuid::new_v4();
        let day = window((2024, 1, 15));

        let first = IntakeRecord::new(med, Slot::Lunch, at(12, 0));
        ledger.insert_unique(first.clone(), &day).unwrap();

        let second = IntakeRecord::new(med, Slot::Lunch, at(18, 0));
        let outcome = ledger.insert_unique(second, &day).unwrap();
        assert_eq!(outcome, Insertion::Existing(first));
        assert_eq!(ledger.records_in_window(&day).unwrap().len(), 1);
    }

    #[test]
    fn test_insert_outside_window_is_refused() {
        let temp_dir = tempfile::tempdir().unwrap();
        let ledger = JsonlLedger::new(temp_dir.path());
        let record = IntakeRecord::new(Uuid::new_v4(), Slot::Morning, at(8, 0));

        let result = ledger.insert_unique(record, &window((2024, 1, 16)));
        assert!(matches!(result, Err(Error::Store(_))));
    }

    #[test]
    fn test_remove_only_touches_matching_record() {
        let temp_dir = tempfile::tempdir().unwrap();
        let ledger = JsonlLedger::new(temp_dir.path());
        let med = Uuid::new_v4();
        let day = window((2024, 1, 15));

        let morning = IntakeRecord::new(med, Slot::Morning, at(8, 0));
        let evening = IntakeRecord::new(med, Slot::Evening, at(19, 0));
        ledger.insert_unique(morning.clone(), &day).unwrap();
        ledger.insert_unique(evening.clone(), &day).unwrap();

        let removed = ledger.remove_in_window(med, Slot::Morning, &day).unwrap();
        assert_eq!(removed, Some(morning));
        assert_eq!(ledger.records_in_window(&day).unwrap(), vec![evening]);

        let again = ledger.remove_in_window(med, Slot::Morning, &day).unwrap();
        assert!(again.is_none());
    }

    #[test]
    fn test_offset_window_spans_two_partitions() {
        let temp_dir = tempfile::tempdir().unwrap();
        let ledger = JsonlLedger::new(temp_dir.path());
        let resolver = DayResolver::new(FixedOffset::east_opt(9 * 3600).unwrap());
        let day = resolver
            .window_for(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap())
            .unwrap();
        let med = Uuid::new_v4();

        // 23:00 UTC on the 14th is 08:00 local on the 15th
        let early = IntakeRecord::new(med, Slot::Morning, Utc.with_ymd_and_hms(2024, 1, 14, 23, 0, 0).unwrap());
        let late = IntakeRecord::new(med, Slot::Evening, Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap());
        ledger.insert_unique(early, &day).unwrap();
        ledger.insert_unique(late, &day).unwrap();

        assert_eq!(ledger.records_in_window(&day).unwrap().len(), 2);
        assert!(ledger.partition_path(NaiveDate::from_ymd_opt(2024, 1, 14).unwrap()).exists());
        assert!(ledger.partition_path(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()).exists());
    }

    #[test]
    fn test_records_for_medications_filters_ids() {
        let temp_dir = tempfile::tempdir().unwrap();
        let ledger = JsonlLedger::new(temp_dir.path());
        let day = window((2024, 1, 15));
        let mine = Uuid::new_v4();
        let other = Uuid::new_v4();

        ledger.insert_unique(IntakeRecord::new(mine, Slot::Morning, at(8, 0)), &day).unwrap();
        ledger.insert_unique(IntakeRecord::new(other, Slot::Morning, at(8, 0)), &day).unwrap();

        let records = ledger.records_for_medications(&[mine], &day).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].medication_id, mine);
    }

    #[test]
    fn test_corrupt_lines_are_skipped() {
        let temp_dir = tempfile::tempdir().unwrap();
        let ledger = JsonlLedger::new(temp_dir.path());
        let day = window((2024, 1, 15));
        let record = IntakeRecord::new(Uuid::new_v4(), Slot::Morning, at(8, 0));
        ledger.insert_unique(record.clone(), &day).unwrap();

        let mut file = OpenOptions::new()
            .append(true)
            .open(ledger.partition_path(day.date))
            .unwrap();
        writeln!(file, "{{ not json").unwrap();

        assert_eq!(ledger.records_in_window(&day).unwrap(), vec![record]);
    }

    #[test]
    fn test_append_after_torn_line_starts_fresh() {
        let temp_dir = tempfile::tempdir().unwrap();
        let ledger = JsonlLedger::new(temp_dir.path());
        let day = window((2024, 1, 15));
        let med = Uuid::new_v4();
        ledger
            .insert_unique(IntakeRecord::new(med, Slot::Morning, at(8, 0)), &day)
            .unwrap();

        let mut file = OpenOptions::new()
            .append(true)
            .open(ledger.partition_path(day.date))
            .unwrap();
        write!(file, "{{\"id\":\"0000").unwrap();
        drop(file);

        let lunch = IntakeRecord::new(med, Slot::Lunch, at(12, 0));
        ledger.insert_unique(lunch.clone(), &day).unwrap();

        let records = ledger.records_in_window(&day).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.contains(&lunch));
    }

    #[test]
    fn test_concurrent_inserts_keep_one_record() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dir = Arc::new(temp_dir.path().to_path_buf());
        let med = Uuid::new_v4();
        let day = window((2024, 1, 15));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let dir = Arc::clone(&dir);
                thread::spawn(move || {
                    let ledger = JsonlLedger::new(dir.as_path());
                    let record = IntakeRecord::new(med, Slot::Evening, at(19, i));
                    ledger.insert_unique(record, &day).unwrap()
                })
            })
            .collect();

        let inserted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|o| matches!(o, Insertion::Inserted(_)))
            .count();

        assert_eq!(inserted, 1);
        let ledger = JsonlLedger::new(dir.as_path());
        assert_eq!(ledger.records_in_window(&day).unwrap().len(), 1);
    }

    #[test]
    fn test_truncate_to_seconds() {
        let instant = Utc.with_ymd_and_hms(2024, 1, 15, 8, 0, 1).unwrap() + Duration::milliseconds(750);
        assert_eq!(
            truncate_to_seconds(instant),
            Utc.with_ymd_and_hms(2024, 1, 15, 8, 0, 1).unwrap()
        );
    }
}
