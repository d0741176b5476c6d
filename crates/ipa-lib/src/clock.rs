//! Time source injected into passes

use chrono::{DateTime, Timelike, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Hour of day (0-23, UTC) used by schedule rules
    fn hour(&self) -> u32 {
        self.now().hour()
    }
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock frozen at a given instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
    /// A clock frozen at `hour`:00 UTC on an arbitrary day
    pub fn at_hour(hour: u32) -> Self {
        let base = DateTime::parse_from_rfc3339("2024-06-01T00:00:00Z")
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());
        Self(base + chrono::Duration::hours(i64::from(hour % 24)))
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock_hour() {
        assert_eq!(FixedClock::at_hour(23).hour(), 23);
        assert_eq!(FixedClock::at_hour(0).hour(), 0);
        assert_eq!(FixedClock::at_hour(25).hour(), 1);
    }
}
