//! Send Window - timezone-aware eligibility for step sends

use super::validation::{parse_timezone, parse_window_time};
use chrono::{DateTime, Duration, LocalResult, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use cloudgreet_common::{Error, Result};
use cloudgreet_storage::models::Sequence;

/// Daily `[start, end)` window in a local timezone
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SendWindow {
    start: NaiveTime,
    end: NaiveTime,
    tz: Tz,
}

impl SendWindow {
    /// Build from `HH:MM` bounds and an IANA zone name
    pub fn new(start: &str, end: &str, timezone: &str) -> Result<Self> {
        let start = parse_window_time(start)
            .ok_or_else(|| Error::validation(format!("Invalid send window start: {}", start)))?;
        let end = parse_window_time(end)
            .ok_or_else(|| Error::validation(format!("Invalid send window end: {}", end)))?;
        let tz = parse_timezone(timezone)
            .ok_or_else(|| Error::validation(format!("Unknown timezone: {}", timezone)))?;

        if start >= end {
            return Err(Error::validation(
                "Send window start must be before send window end",
            ));
        }

        Ok(Self { start, end, tz })
    }

    /// Window configured on a sequence
    pub fn for_sequence(sequence: &Sequence) -> Result<Self> {
        Self::new(
            &sequence.send_window_start,
            &sequence.send_window_end,
            &sequence.timezone,
        )
    }

    /// Whether `at` falls inside the window in local time
    pub fn is_open(&self, at: DateTime<Utc>) -> bool {
        let local = at.with_timezone(&self.tz).time();
        local >= self.start && local < self.end
    }

    /// Earliest instant at or after `at` when the window is open
    pub fn next_open(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        if self.is_open(at) {
            return at;
        }

        let local = at.with_timezone(&self.tz);
        let mut date = local.date_naive();
        if local.time() >= self.start {
            date = date.succ_opt().unwrap_or(date);
        }

        // A start time skipped by DST has no local match on that day; the
        // earliest valid instant after it is used instead.
        loop {
            let candidate = self.resolve(date.and_time(self.start));
            if candidate > at {
                return candidate;
            }
            match date.succ_opt() {
                Some(next) => date = next,
                None => return at,
            }
        }
    }

    fn resolve(&self, naive: NaiveDateTime) -> DateTime<Utc> {
        let mut probe = naive;
        for _ in 0..=(24 * 60) {
            match self.tz.from_local_datetime(&probe) {
                LocalResult::Single(dt) => return dt.with_timezone(&Utc),
                LocalResult::Ambiguous(earliest, _) => return earliest.with_timezone(&Utc),
                LocalResult::None => probe += Duration::minutes(1),
            }
        }
        naive.and_utc()
    }
}
