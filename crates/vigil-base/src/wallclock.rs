//! Wall-clock helpers shared by the loggers and the image/log archive
//! layout. All times are UTC; date math uses Howard Hinnant's civil
//! calendar algorithms (public domain,
//! <http://howardhinnant.github.io/date_algorithms.html>) so no calendar
//! crate is needed.

use std::time::{SystemTime, UNIX_EPOCH};

/// A broken-down UTC instant with millisecond resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    pub year: i64,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    pub millisecond: u32,
}

impl Timestamp {
    pub fn now() -> Self {
        let elapsed = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        Self::from_unix_millis(elapsed.as_millis() as i64)
    }

    pub fn from_unix_millis(millis: i64) -> Self {
        let secs = millis.div_euclid(1000);
        let millisecond = millis.rem_euclid(1000) as u32;
        let days = secs.div_euclid(86_400);
        let time_of_day = secs.rem_euclid(86_400) as u32;
        let (year, month, day) = civil_from_days(days);
        Self {
            year,
            month,
            day,
            hour: time_of_day / 3600,
            minute: (time_of_day % 3600) / 60,
            second: time_of_day % 60,
            millisecond,
        }
    }

    /// Days since the Unix epoch for this timestamp's date.
    pub fn epoch_days(&self) -> i64 {
        days_from_civil(self.year, self.month, self.day)
    }

    /// `YYYY-MM-DD`
    pub fn date(&self) -> String {
        format!("{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }

    /// `YYYYMMDDHH`, used for hour-granular log file names.
    pub fn date_hour_compact(&self) -> String {
        format!("{:04}{:02}{:02}{:02}", self.year, self.month, self.day, self.hour)
    }

    /// `HHmmssfff`, used for image file names.
    pub fn time_compact_millis(&self) -> String {
        format!("{:02}{:02}{:02}{:03}", self.hour, self.minute, self.second, self.millisecond)
    }

    /// `YYYY-MM-DDTHH:MM:SS.fff`
    pub fn datetime(&self) -> String {
        format!(
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}",
            self.year, self.month, self.day, self.hour, self.minute, self.second, self.millisecond
        )
    }
}

/// Convert days since the Unix epoch to a civil date (year, month, day).
pub fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u32;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    (if m <= 2 { y + 1 } else { y }, m, d)
}

/// Convert a civil date to days since the Unix epoch.
pub fn days_from_civil(y: i64, m: u32, d: u32) -> i64 {
    let y = if m <= 2 { y - 1 } else { y };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = (y - era * 400) as u32;
    let mp = if m > 2 { m - 3 } else { m + 9 };
    let doy = (153 * mp + 2) / 5 + d - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe as i64 - 719_468
}

/// Parse a `YYYY-MM-DD` folder name back into a civil date.
pub fn parse_date(name: &str) -> Option<(i64, u32, u32)> {
    let mut parts = name.splitn(3, '-');
    let year: i64 = parts.next()?.parse().ok()?;
    let month: u32 = parts.next()?.parse().ok()?;
    let day: u32 = parts.next()?.parse().ok()?;
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }
    Some((year, month, day))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_is_1970() {
        assert_eq!(civil_from_days(0), (1970, 1, 1));
        assert_eq!(days_from_civil(1970, 1, 1), 0);
    }

    #[test]
    fn civil_round_trip() {
        for days in [-1, 0, 1, 365, 11_016, 19_723, 20_666] {
            let (y, m, d) = civil_from_days(days);
            assert_eq!(days_from_civil(y, m, d), days);
        }
    }

    #[test]
    fn known_date() {
        // 2026-08-01 is 20666 days after the epoch.
        assert_eq!(civil_from_days(20_666), (2026, 8, 1));
    }

    #[test]
    fn timestamp_formats() {
        // 2024-03-05 07:08:09.123 UTC
        let millis = (days_from_civil(2024, 3, 5) * 86_400 + 7 * 3600 + 8 * 60 + 9) * 1000 + 123;
        let ts = Timestamp::from_unix_millis(millis);
        assert_eq!(ts.date(), "2024-03-05");
        assert_eq!(ts.date_hour_compact(), "2024030507");
        assert_eq!(ts.time_compact_millis(), "070809123");
        assert_eq!(ts.datetime(), "2024-03-05T07:08:09.123");
        assert_eq!(ts.epoch_days(), days_from_civil(2024, 3, 5));
    }

    #[test]
    fn parse_date_accepts_folder_names() {
        assert_eq!(parse_date("2026-08-01"), Some((2026, 8, 1)));
        assert_eq!(parse_date("2026-13-01"), None);
        assert_eq!(parse_date("junk"), None);
    }
}
