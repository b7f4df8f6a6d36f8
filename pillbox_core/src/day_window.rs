//! Calendar-day boundaries in the reference time zone.
//!
//! Every component that needs "today" or "that day" goes through
//! [`DayResolver`], so all of them agree on where a day starts and ends.

use crate::clock::Clock;
use crate::{Error, Result};
use chrono::{DateTime, FixedOffset, NaiveDate, Offset, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Half-open `[start, end)` range covering one local calendar day
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DayWindow {
    pub date: NaiveDate,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DayWindow {
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }
}

/// Maps dates and instants to day windows for one fixed UTC offset
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DayResolver {
    offset: FixedOffset,
}

impl Default for DayResolver {
    fn default() -> Self {
        Self::utc()
    }
}

impl DayResolver {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    pub fn utc() -> Self {
        Self {
            offset: Utc.fix(),
        }
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Window for a local calendar date
    pub fn window_for(&self, date: NaiveDate) -> Result<DayWindow> {
        let next = date
            .succ_opt()
            .ok_or_else(|| Error::InvalidDate(date.to_string()))?;
        Ok(DayWindow {
            date,
            start: self.local_midnight(date)?,
            end: self.local_midnight(next)?,
        })
    }

    /// Window of the local day an instant belongs to
    pub fn window_containing(&self, instant: DateTime<Utc>) -> Result<DayWindow> {
        self.window_for(instant.with_timezone(&self.offset).date_naive())
    }

    /// Window of the current local day per the given clock
    pub fn today(&self, clock: &dyn Clock) -> Result<DayWindow> {
        self.window_containing(clock.now())
    }

    /// Parse a `YYYY-MM-DD` date
    pub fn parse_date(input: &str) -> Result<NaiveDate> {
        NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d")
            .map_err(|_| Error::InvalidDate(input.to_string()))
    }

    fn local_midnight(&self, date: NaiveDate) -> Result<DateTime<Utc>> {
        let naive = date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| Error::InvalidDate(date.to_string()))?;
        self.offset
            .from_local_datetime(&naive)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| Error::InvalidDate(date.to_string()))
    }
}
