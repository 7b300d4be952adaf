use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use std::fmt;

/// Hours between the bucket a cycle measures and the bucket its forecasts target.
pub const FORECAST_HORIZON_HOURS: i64 = 12;

/// Canonical hourly key for a reading record: a UTC instant with the
/// minute, second and sub-second components zeroed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Bucket(DateTime<Utc>);

impl Bucket {
    /// Floors `instant` to the start of its UTC hour.
    pub fn floor(instant: DateTime<Utc>) -> Self {
        let secs = instant.timestamp().div_euclid(3600) * 3600;
        let floored = Utc
            .timestamp_opt(secs, 0)
            .single()
            .unwrap_or_else(|| {
                instant
                    .with_minute(0)
                    .and_then(|dt| dt.with_second(0))
                    .and_then(|dt| dt.with_nanosecond(0))
                    .unwrap_or(instant)
            });
        Self(floored)
    }

    pub fn horizon(self) -> Self {
        Self(self.0 + Duration::hours(FORECAST_HORIZON_HOURS))
    }

    pub fn offset_hours(self, hours: i64) -> Self {
        Self(self.0 + Duration::hours(hours))
    }

    pub fn instant(self) -> DateTime<Utc> {
        self.0
    }

    pub fn epoch_seconds(self) -> i64 {
        self.0.timestamp()
    }

    /// Local wall-clock hour key (`YYYY-MM-DDTHH:00`) in `tz`.
    pub fn local_hour_key(self, tz: Tz) -> String {
        self.0.with_timezone(&tz).format("%Y-%m-%dT%H:00").to_string()
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

pub fn current_bucket() -> Bucket {
    Bucket::floor(Utc::now())
}

pub fn horizon_bucket(bucket: Bucket) -> Bucket {
    bucket.horizon()
}

const MONTHS: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// Short `HH:00` axis label in the display timezone.
pub fn display_hour_label(bucket: Bucket, tz: Tz) -> String {
    bucket.instant().with_timezone(&tz).format("%H:00").to_string()
}

/// Long `D Month HH:00` label in the display timezone.
pub fn display_long_label(bucket: Bucket, tz: Tz) -> String {
    use chrono::Datelike;

    let local = bucket.instant().with_timezone(&tz);
    let month = MONTHS[local.month0() as usize];
    format!("{} {} {}:00", local.day(), month, local.hour())
}

/// Parses a maintenance cutoff. Date-only values mean midnight UTC.
pub fn parse_cutoff(raw: &str) -> Result<DateTime<Utc>, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("empty date".to_string());
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&midnight));
        }
    }
    Err(format!("unrecognized date {trimmed:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s)
            .single()
            .expect("valid utc")
    }

    #[test]
    fn floors_to_utc_hour() {
        let instant = utc(2025, 3, 9, 17, 42, 13) + Duration::milliseconds(987);
        let bucket = Bucket::floor(instant);
        assert_eq!(bucket.instant(), utc(2025, 3, 9, 17, 0, 0));
        assert_eq!(Bucket::floor(bucket.instant()), bucket);
    }

    #[test]
    fn horizon_is_twelve_hours_ahead_across_midnight() {
        let bucket = Bucket::floor(utc(2025, 12, 31, 18, 5, 0));
        assert_eq!(horizon_bucket(bucket).instant(), utc(2026, 1, 1, 6, 0, 0));
    }

    #[test]
    fn local_hour_key_uses_named_timezone() {
        let bucket = Bucket::floor(utc(2025, 6, 1, 21, 0, 0));
        assert_eq!(
            bucket.local_hour_key(chrono_tz::Asia::Tokyo),
            "2025-06-02T06:00"
        );
        assert_eq!(bucket.local_hour_key(chrono_tz::UTC), "2025-06-01T21:00");
    }

    #[test]
    fn local_hour_key_follows_dst_rules() {
        // 2025-03-30 01:00 UTC is 03:00 CEST, the first hour after the spring gap.
        let bucket = Bucket::floor(utc(2025, 3, 30, 1, 0, 0));
        assert_eq!(
            bucket.local_hour_key(chrono_tz::Europe::Berlin),
            "2025-03-30T03:00"
        );
    }

    #[test]
    fn display_labels_render_in_display_timezone() {
        let bucket = Bucket::floor(utc(2025, 1, 4, 20, 0, 0));
        let tz = chrono_tz::Asia::Tokyo;
        assert_eq!(display_hour_label(bucket, tz), "05:00");
        assert_eq!(display_long_label(bucket, tz), "5 January 5:00");
    }

    #[test]
    fn parses_date_only_and_iso_cutoffs() {
        assert_eq!(
            parse_cutoff("2025-02-01").expect("date"),
            utc(2025, 2, 1, 0, 0, 0)
        );
        assert_eq!(
            parse_cutoff("2025-02-01T10:30:00+02:00").expect("rfc3339"),
            utc(2025, 2, 1, 8, 30, 0)
        );
        assert_eq!(
            parse_cutoff("2025-02-01T10:30").expect("naive"),
            utc(2025, 2, 1, 10, 30, 0)
        );
        assert!(parse_cutoff("yesterday").is_err());
        assert!(parse_cutoff("2025-13-01").is_err());
    }
}
