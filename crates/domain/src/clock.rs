//! Wall-clock conversion between planner output and the store.
//!
//! Planner phases emit naive `%Y-%m-%d %H:%M:%S` strings in the owner's
//! timezone; everything persisted or compared is UTC.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::{Error, Result};

pub const WALL_CLOCK_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse an IANA timezone name, falling back to UTC on garbage input.
pub fn parse_tz(name: &str) -> Tz {
    name.parse().unwrap_or(Tz::UTC)
}

/// Interpret a naive wall-clock string in `tz_name` and convert to UTC.
pub fn wall_clock_to_utc(raw: &str, tz_name: &str) -> Result<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(raw.trim(), WALL_CLOCK_FORMAT)
        .map_err(|e| Error::Other(format!("bad wall clock {raw:?}: {e}")))?;

    let tz = parse_tz(tz_name);
    // Ambiguous local times (DST fold) resolve to the earlier instant;
    // nonexistent ones (DST gap) are rejected.
    match tz.from_local_datetime(&naive) {
        chrono::LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
        chrono::LocalResult::Ambiguous(earlier, _) => Ok(earlier.with_timezone(&Utc)),
        chrono::LocalResult::None => Err(Error::Other(format!(
            "wall clock {raw:?} does not exist in {tz_name}"
        ))),
    }
}

/// Render a UTC instant in the planner's wall-clock format.
pub fn format_utc(dt: DateTime<Utc>) -> String {
    dt.format(WALL_CLOCK_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn utc_passthrough() {
        let dt = wall_clock_to_utc("2024-06-15 10:30:00", "UTC").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2024, 6, 15, 10, 30, 0).unwrap());
    }

    #[test]
    fn offset_timezone_converts() {
        // Asia/Shanghai is UTC+8 year-round.
        let dt = wall_clock_to_utc("2024-06-15 10:00:00", "Asia/Shanghai").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2024, 6, 15, 2, 0, 0).unwrap());
    }

    #[test]
    fn unknown_timezone_falls_back_to_utc() {
        let dt = wall_clock_to_utc("2024-06-15 10:00:00", "Mars/Olympus").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2024, 6, 15, 10, 0, 0).unwrap());
    }

    #[test]
    fn garbage_input_is_rejected() {
        assert!(wall_clock_to_utc("next tuesday", "UTC").is_err());
    }

    #[test]
    fn format_roundtrip() {
        let dt = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        let s = format_utc(dt);
        assert_eq!(s, "2025-01-02 03:04:05");
        assert_eq!(wall_clock_to_utc(&s, "UTC").unwrap(), dt);
    }
}
