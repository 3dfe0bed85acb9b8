use std::fmt;

use chrono::{DateTime, Utc};

const SECS_PER_DAY: i64 = 24 * 60 * 60;

/// Coarse time remaining until a capsule opens, as shown on capsule cards.
/// Months are 30 days and years 365 days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Countdown {
    Ready,
    Years(i64),
    Months(i64),
    Days(i64),
}

impl Countdown {
    pub fn between(unlock_date: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let remaining = unlock_date - now;
        if remaining.num_milliseconds() <= 0 {
            return Self::Ready;
        }

        let days = remaining.num_seconds() / SECS_PER_DAY;
        let years = days / 365;
        let months = days / 30;

        if years > 0 {
            Self::Years(years)
        } else if months > 0 {
            Self::Months(months)
        } else {
            Self::Days(days)
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

impl fmt::Display for Countdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (n, unit) = match *self {
            Self::Ready => return f.write_str("Ready to open!"),
            Self::Years(n) => (n, "year"),
            Self::Months(n) => (n, "month"),
            Self::Days(n) => (n, "day"),
        };
        let plural = if n == 1 { "" } else { "s" };
        write!(f, "{} {}{} remaining", n, unit, plural)
    }
}
