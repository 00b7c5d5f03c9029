//! Publication-slot arithmetic for RIB snapshots.
//!
//! The archive publishes a full table dump every two hours, on even UTC
//! hours. A [`TimeBucket`] names one such slot and fully determines the
//! snapshot filename and download URL.

use serde::{Deserialize, Serialize};
use std::fmt;
use time::{Date, Month, OffsetDateTime};

/**
 * One publication slot: a UTC calendar day and an even hour in [0, 22]
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeBucket {
    date: Date,
    hour: u8,
}

impl TimeBucket {
    // Most recent slot at or before `now`; odd hours round down within the same day
    pub fn resolve(now: OffsetDateTime) -> Self {
        let now = now.to_offset(time::UtcOffset::UTC);
        let hour = now.hour();
        Self {
            date: now.date(),
            hour: hour - hour % 2,
        }
    }

    pub fn date(&self) -> Date {
        self.date
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn filename(&self) -> SnapshotFilename {
        let name = format!(
            "rib.{:04}{:02}{:02}.{:02}00.bz2",
            self.date.year(),
            u8::from(self.date.month()),
            self.date.day(),
            self.hour
        );
        SnapshotFilename { name, bucket: *self }
    }

    // Year-month directory the archive groups snapshots under, e.g. "2024.03"
    pub fn month_slug(&self) -> String {
        format!("{:04}.{:02}", self.date.year(), u8::from(self.date.month()))
    }
}

/**
 * Name of a snapshot file, always of the form `rib.YYYYMMDD.HH00.bz2`
 *
 * The fixed-width layout makes lexical order equal to chronological order.
 */
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SnapshotFilename {
    name: String,
    bucket: TimeBucket,
}

impl SnapshotFilename {
    pub fn parse(name: &str) -> Option<Self> {
        Self::bucket_of(name).map(|bucket| bucket.filename())
    }

    pub fn as_str(&self) -> &str {
        &self.name
    }

    pub fn bucket(&self) -> TimeBucket {
        self.bucket
    }

    fn bucket_of(name: &str) -> Option<TimeBucket> {
        let stamp = name.strip_prefix("rib.")?.strip_suffix("00.bz2")?;
        let (day, hour) = stamp.split_once('.')?;
        if day.len() != 8 || hour.len() != 2 || !day.bytes().chain(hour.bytes()).all(|b| b.is_ascii_digit()) {
            return None;
        }

        let year: i32 = day[0..4].parse().ok()?;
        let month: u8 = day[4..6].parse().ok()?;
        let dom: u8 = day[6..8].parse().ok()?;
        let hour: u8 = hour.parse().ok()?;
        if hour > 22 || hour % 2 != 0 {
            return None;
        }

        let date = Date::from_calendar_date(year, Month::try_from(month).ok()?, dom).ok()?;
        Some(TimeBucket { date, hour })
    }
}

impl TryFrom<String> for SnapshotFilename {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("not a snapshot filename: {value:?}"))
    }
}

impl From<SnapshotFilename> for String {
    fn from(value: SnapshotFilename) -> Self {
        value.name
    }
}

impl fmt::Display for SnapshotFilename {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/**
 * Where to download a snapshot from, and what to call it locally
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRequest {
    pub url: String,
    pub filename: SnapshotFilename,
}

impl SnapshotRequest {
    // <base>/<YYYY.MM>/RIBS/<filename>
    pub fn new(base_url: &str, bucket: &TimeBucket) -> Self {
        let filename = bucket.filename();
        let url = format!(
            "{}/{}/RIBS/{}",
            base_url.trim_end_matches('/'),
            bucket.month_slug(),
            filename
        );
        Self { url, filename }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_odd_hour_rounds_down() {
        let bucket = TimeBucket::resolve(datetime!(2024-03-05 13:47:00 UTC));
        assert_eq!(bucket.filename().as_str(), "rib.20240305.1200.bz2");
    }

    #[test]
    fn test_midnight_slot() {
        let bucket = TimeBucket::resolve(datetime!(2024-03-05 00:10:00 UTC));
        assert_eq!(bucket.filename().as_str(), "rib.20240305.0000.bz2");
    }

    #[test]
    fn test_single_digit_hours_are_padded() {
        let even = TimeBucket::resolve(datetime!(2024-03-05 02:00:00 UTC));
        let odd = TimeBucket::resolve(datetime!(2024-03-05 03:59:59 UTC));
        assert_eq!(even.filename().as_str(), "rib.20240305.0200.bz2");
        assert_eq!(odd.filename(), even.filename());
    }

    #[test]
    fn test_last_slot_stays_on_same_day() {
        let bucket = TimeBucket::resolve(datetime!(2024-12-31 23:59:59 UTC));
        assert_eq!(bucket.filename().as_str(), "rib.20241231.2200.bz2");
        assert_eq!(bucket.month_slug(), "2024.12");
    }

    #[test]
    fn test_non_utc_input_is_normalized() {
        let bucket = TimeBucket::resolve(datetime!(2024-03-05 01:30:00 +02:00));
        assert_eq!(bucket.filename().as_str(), "rib.20240304.2200.bz2");
    }

    #[test]
    fn test_every_minute_of_a_day() {
        let start = datetime!(2024-02-29 00:00:00 UTC);
        for minute in 0..(24 * 60) {
            let now = start + time::Duration::minutes(minute);
            let bucket = TimeBucket::resolve(now);

            assert_eq!(bucket.hour() % 2, 0);
            assert!(bucket.hour() <= 22);
            assert_eq!(bucket.date(), now.date());

            let window_start = start + time::Duration::hours((minute / 120) * 2);
            assert_eq!(bucket, TimeBucket::resolve(window_start));
        }
    }

    #[test]
    fn test_request_url() {
        let bucket = TimeBucket::resolve(datetime!(2024-03-05 13:47:00 UTC));
        let request = SnapshotRequest::new("http://archive.routeviews.org/bgpdata/", &bucket);
        assert_eq!(
            request.url,
            "http://archive.routeviews.org/bgpdata/2024.03/RIBS/rib.20240305.1200.bz2"
        );
        assert_eq!(request.filename.as_str(), "rib.20240305.1200.bz2");
    }

    #[test]
    fn test_parse_filename() {
        let name = SnapshotFilename::parse("rib.20240305.1200.bz2").unwrap();
        assert_eq!(name.bucket().hour(), 12);
        assert_eq!(name.bucket().date(), time::macros::date!(2024-03-05));

        assert!(SnapshotFilename::parse("rib.20240305.1300.bz2").is_none());
        assert!(SnapshotFilename::parse("rib.20240305.2400.bz2").is_none());
        assert!(SnapshotFilename::parse("rib.20240230.1200.bz2").is_none());
        assert!(SnapshotFilename::parse("updates.20240305.1200.bz2").is_none());
    }

    #[test]
    fn test_filenames_order_chronologically() {
        let earlier = SnapshotFilename::parse("rib.20240305.2200.bz2").unwrap();
        let later = SnapshotFilename::parse("rib.20240306.0000.bz2").unwrap();
        assert!(earlier < later);
    }
}
