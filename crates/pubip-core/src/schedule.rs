// # Cycle schedule
//
// Two expression forms are accepted:
//
// - `@every <duration>`: fixed interval, Go-style duration (`5m`, `1h30m`,
//   `90s`, `1.5h`, `250ms`)
// - anything else: a cron expression with a leading seconds field, or one of
//   the `@hourly`/`@daily`/`@weekly`/`@monthly`/`@yearly` macros
//
// `@every` intervals are truncated to whole seconds and never shorter
// than one second.
//
// Intervals are measured from the moment the previous wait began, with no
// correction for time spent running a cycle.

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};

const EVERY_PREFIX: &str = "@every";

/// Shortest `@every` interval
const MIN_INTERVAL_SECS: u64 = 1;

/// When reconciliation cycles fire
#[derive(Debug, Clone)]
pub enum Schedule {
    /// Fixed interval
    Every(Duration),
    /// Cron expression (seconds resolution)
    Cron(Box<cron::Schedule>),
}

impl Schedule {
    /// Parse a schedule expression
    pub fn parse(expression: &str) -> Result<Self> {
        let expression = expression.trim();
        if expression.is_empty() {
            return Err(Error::schedule("schedule expression cannot be empty"));
        }

        if let Some(rest) = expression.strip_prefix(EVERY_PREFIX) {
            let interval = parse_duration(rest.trim())?;
            if interval.is_zero() {
                return Err(Error::schedule(format!(
                    "interval must be positive: {expression:?}"
                )));
            }
            return Ok(Schedule::Every(whole_seconds(interval)));
        }

        cron::Schedule::from_str(expression)
            .map(|schedule| Schedule::Cron(Box::new(schedule)))
            .map_err(|e| Error::schedule(format!("invalid cron expression {expression:?}: {e}")))
    }

    /// How long to wait from `now` until the next tick
    ///
    /// Returns `None` when a cron expression has no future occurrence.
    pub fn next_delay(&self, now: DateTime<Utc>) -> Option<Duration> {
        match self {
            Schedule::Every(interval) => Some(*interval),
            Schedule::Cron(schedule) => {
                let next = schedule.after(&now).next()?;
                Some((next - now).to_std().unwrap_or(Duration::ZERO))
            }
        }
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schedule::Every(interval) => write!(f, "{EVERY_PREFIX} {interval:?}"),
            Schedule::Cron(schedule) => write!(f, "{schedule}"),
        }
    }
}

impl FromStr for Schedule {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Schedule::parse(s)
    }
}

/// Round an interval down to whole seconds, with a floor of one second
fn whole_seconds(interval: Duration) -> Duration {
    Duration::from_secs(interval.as_secs().max(MIN_INTERVAL_SECS))
}

/// Parse a Go-style duration string such as `1h30m` or `2.5s`
pub fn parse_duration(text: &str) -> Result<Duration> {
    if text.is_empty() {
        return Err(Error::schedule("duration cannot be empty"));
    }
    if text == "0" {
        return Ok(Duration::ZERO);
    }

    let invalid = || Error::schedule(format!("invalid duration {text:?}"));
    let mut total_nanos: f64 = 0.0;
    let mut rest = text;

    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(invalid)?;
        if number_len == 0 {
            return Err(invalid());
        }
        let value: f64 = rest[..number_len].parse().map_err(|_| invalid())?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let nanos_per_unit = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return Err(invalid()),
        };
        rest = &rest[unit_len..];

        total_nanos += value * nanos_per_unit;
    }

    if !total_nanos.is_finite() || total_nanos > u64::MAX as f64 {
        return Err(invalid());
    }
    Ok(Duration::from_nanos(total_nanos.round() as u64))
}
