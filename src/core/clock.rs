//! Wall-clock access and the build timestamp format.

use chrono::{DateTime, Utc};

/// Format of the value stamped into the marker line.
pub const STAMP_FORMAT: &str = "%Y-%m-%d %H:%M UTC";

pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

/// Reads the system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Always returns the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Render an instant as `YYYY-MM-DD HH:MM UTC` (seconds are dropped).
pub fn format_stamp(at: DateTime<Utc>) -> String {
    at.format(STAMP_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_stamp_truncates_to_minutes() {
        let at = DateTime::parse_from_rfc3339("2024-06-01T12:34:56Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(format_stamp(at), "2024-06-01 12:34 UTC");
    }

    #[test]
    fn format_stamp_converts_offsets_to_utc() {
        let at = DateTime::parse_from_rfc3339("2024-01-01T01:05:00+02:00")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(format_stamp(at), "2023-12-31 23:05 UTC");
    }

    #[test]
    fn fixed_clock_returns_its_instant() {
        let at = DateTime::parse_from_rfc3339("2024-06-01T12:34:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(FixedClock(at).now(), at);
    }
}
