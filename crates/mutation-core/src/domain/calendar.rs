//! Calendar arithmetic in the system's reference timezone.
//!
//! "Today", "start of today", the dispatch hour and the weekday digit all
//! follow the reference zone, not UTC: a pause set at 23:30 local time must
//! expire half an hour later, whatever the UTC date says.

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

pub const HOUR_MS: i64 = 3_600_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceCalendar {
    tz: Tz,
}

impl ReferenceCalendar {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.tz).date_naive()
    }

    /// `YYYY-MM-DD` key used for same-day caches.
    pub fn date_key(&self, now: DateTime<Utc>) -> String {
        self.today(now).format("%Y-%m-%d").to_string()
    }

    /// Hour of day (0-23) in the reference zone.
    pub fn hour(&self, now: DateTime<Utc>) -> u32 {
        now.with_timezone(&self.tz).hour()
    }

    /// Day-of-week digit, Sunday = 0 ... Saturday = 6.
    pub fn weekday_digit(&self, now: DateTime<Utc>) -> u32 {
        now.with_timezone(&self.tz).weekday().num_days_from_sunday()
    }

    /// Epoch millis of local midnight for the current reference date.
    pub fn start_of_today_ms(&self, now: DateTime<Utc>) -> i64 {
        let midnight = self.today(now).and_time(NaiveTime::MIN);
        match self.tz.from_local_datetime(&midnight).earliest() {
            Some(local) => local.timestamp_millis(),
            // Midnight skipped by a DST jump; the first valid instant is one hour on.
            None => self
                .tz
                .from_local_datetime(&(midnight + chrono::Duration::hours(1)))
                .earliest()
                .map(|local| local.timestamp_millis())
                .unwrap_or_else(|| now.timestamp_millis()),
        }
    }

    /// Whether an epoch-millis timestamp falls on the current reference date.
    pub fn is_today(&self, timestamp_ms: i64, now: DateTime<Utc>) -> bool {
        match Utc.timestamp_millis_opt(timestamp_ms).single() {
            Some(at) => self.today(at) == self.today(now),
            None => false,
        }
    }
}
