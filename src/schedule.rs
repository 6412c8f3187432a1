//! Backup schedule expressions
//!
//! A schedule expression describes the recurring cadence of backup cycles.
//! The grammar is deliberately small:
//!
//! - `"daily"` — next UTC midnight
//! - `"hourly"` — next top of the hour (UTC)
//! - `"every <n><unit>"` — fixed interval, unit one of `s`, `m`, `h`, `d`
//!   (the `every ` prefix is optional, so `"30m"` also parses)
//!
//! Expressions are parsed when the configuration is loaded; an unparseable
//! expression is a fatal startup error.

use chrono::{DateTime, Duration as ChronoDuration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// A parsed schedule expression
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Schedule {
    /// Trigger at every UTC midnight
    Daily,
    /// Trigger at the top of every hour
    Hourly,
    /// Trigger on a fixed interval
    Every(Duration),
}

impl Default for Schedule {
    /// The original service backed up once a day
    fn default() -> Self {
        Schedule::Daily
    }
}

impl Schedule {
    /// The first trigger instant strictly after `now`
    ///
    /// `Daily` and `Hourly` snap to calendar boundaries so that runs land at
    /// predictable times regardless of when the process started; `Every`
    /// counts from `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Schedule::Daily => now
                .date_naive()
                .succ_opt()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc())
                .unwrap_or_else(|| now + ChronoDuration::days(1)),
            Schedule::Hourly => {
                let top_of_hour = now
                    .with_minute(0)
                    .and_then(|t| t.with_second(0))
                    .and_then(|t| t.with_nanosecond(0))
                    .unwrap_or(now);
                top_of_hour + ChronoDuration::hours(1)
            }
            Schedule::Every(interval) => {
                now + ChronoDuration::from_std(*interval)
                    .unwrap_or_else(|_| ChronoDuration::days(1))
            }
        }
    }
}

impl FromStr for Schedule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let expr = s.trim().to_ascii_lowercase();
        match expr.as_str() {
            "daily" => return Ok(Schedule::Daily),
            "hourly" => return Ok(Schedule::Hourly),
            _ => {}
        }

        let interval = expr.strip_prefix("every ").unwrap_or(&expr).trim();
        let (digits, unit) = interval.split_at(
            interval
                .find(|c: char| !c.is_ascii_digit())
                .ok_or_else(|| format!("schedule '{s}' is missing a unit (s, m, h or d)"))?,
        );
        let n: u64 = digits
            .parse()
            .map_err(|_| format!("schedule '{s}' has an invalid interval count"))?;
        if n == 0 {
            return Err(format!("schedule '{s}' must have a non-zero interval"));
        }

        let seconds = match unit {
            "s" => n,
            "m" => n * 60,
            "h" => n * 3600,
            "d" => n * 86_400,
            other => return Err(format!("unknown schedule unit '{other}' in '{s}'")),
        };
        Ok(Schedule::Every(Duration::from_secs(seconds)))
    }
}

impl TryFrom<String> for Schedule {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Schedule> for String {
    fn from(schedule: Schedule) -> Self {
        schedule.to_string()
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schedule::Daily => write!(f, "daily"),
            Schedule::Hourly => write!(f, "hourly"),
            Schedule::Every(d) => write!(f, "every {}s", d.as_secs()),
        }
    }
}
