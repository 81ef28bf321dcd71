use anyhow::{anyhow, Result};
use chrono::{DateTime, Local, LocalResult, NaiveDateTime, TimeZone};
use now::DateTimeNow;

/// Timestamp format used for the date column of every log file. The first 10
/// characters form the day key, the first 7 the month key.
pub const STAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn format_stamp(moment: DateTime<Local>) -> String {
    moment.format(STAMP_FORMAT).to_string()
}

pub fn parse_stamp(value: &str) -> Result<DateTime<Local>> {
    let naive = NaiveDateTime::parse_from_str(value.trim(), STAMP_FORMAT)?;
    match Local.from_local_datetime(&naive) {
        LocalResult::Single(v) | LocalResult::Ambiguous(v, _) => Ok(v),
        LocalResult::None => Err(anyhow!("timestamp {value:?} does not exist in local time")),
    }
}

pub fn same_day(a: DateTime<Local>, b: DateTime<Local>) -> bool {
    a.beginning_of_day() == b.beginning_of_day()
}

pub fn same_month(a: DateTime<Local>, b: DateTime<Local>) -> bool {
    a.beginning_of_month() == b.beginning_of_month()
}

/// Formats a number of seconds as HH:MM:SS, the way screen-time totals are
/// stored on disk. Totals within a day never exceed two hour digits.
pub fn secs_to_hms(total: u64) -> String {
    let (hours, rest) = (total / 3600, total % 3600);
    let (minutes, seconds) = (rest / 60, rest % 60);
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

pub fn hms_to_secs(value: &str) -> Result<u64> {
    let mut parts = value.trim().splitn(3, ':');
    let mut take = || -> Result<u64> {
        Ok(parts
            .next()
            .ok_or_else(|| anyhow!("expected HH:MM:SS, got {value:?}"))?
            .parse::<u64>()?)
    };
    let (hours, minutes, seconds) = (take()?, take()?, take()?);
    Ok(hours * 3600 + minutes * 60 + seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamp_round_trip() -> Result<()> {
        let parsed = parse_stamp("2024-03-01 10:00:00")?;
        assert_eq!(format_stamp(parsed), "2024-03-01 10:00:00");
        Ok(())
    }

    #[test]
    fn stamp_rejects_garbage() {
        assert!(parse_stamp("Total").is_err());
        assert!(parse_stamp("2024-03-01").is_err());
    }

    #[test]
    fn day_and_month_comparison() -> Result<()> {
        let a = parse_stamp("2024-01-31 23:59:50")?;
        let b = parse_stamp("2024-02-01 00:00:10")?;
        let c = parse_stamp("2024-01-31 08:00:00")?;
        assert!(!same_day(a, b));
        assert!(!same_month(a, b));
        assert!(same_day(a, c));
        assert!(same_month(a, c));
        Ok(())
    }

    #[test]
    fn hms_round_trip() -> Result<()> {
        assert_eq!(secs_to_hms(0), "00:00:00");
        assert_eq!(secs_to_hms(30), "00:00:30");
        assert_eq!(secs_to_hms(8 * 3600 + 29 * 60 + 40), "08:29:40");
        assert_eq!(hms_to_secs("08:29:40")?, 8 * 3600 + 29 * 60 + 40);
        assert!(hms_to_secs("08:29").is_err());
        Ok(())
    }
}
