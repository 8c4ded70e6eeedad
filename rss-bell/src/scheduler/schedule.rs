//! Fire-time computation.
//!
//! [`BaseSchedule`] turns a schedule expression into successive fire times;
//! [`JitteredSchedule`] adds a fresh random delay to every one of them.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Local, SubsecRound, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;

use crate::{Error, Result};

const DAY_NAMES: [&str; 8] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT", "SUN"];

/// Time zone cron fields are evaluated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleZone {
    Local,
    Named(Tz),
}

/// A schedule without jitter.
#[derive(Debug, Clone)]
pub enum BaseSchedule {
    /// Fires when any of `schedules` fires.
    Cron {
        schedules: Vec<cron::Schedule>,
        zone: ScheduleZone,
    },
    /// Fixed interval, from `@every <duration>`.
    Every(Duration),
}

impl BaseSchedule {
    /// Parse a schedule expression.
    ///
    /// Accepted forms:
    /// - 5-field cron (`min hour dom month dow`), `0`/`7` meaning Sunday;
    ///   when both day fields are restricted, either one matching fires
    /// - 6/7-field cron with a leading seconds field
    /// - `@yearly`, `@annually`, `@monthly`, `@weekly`, `@daily`,
    ///   `@midnight`, `@hourly`
    /// - `@every 1h30m` (units `h`, `m`, `s`; at least one second)
    ///
    /// Cron forms may be prefixed with `CRON_TZ=<zone>` or `TZ=<zone>`;
    /// otherwise the host's local time zone applies.
    pub fn parse(spec: &str) -> Result<Self> {
        let trimmed = spec.trim();
        if trimmed.is_empty() {
            return Err(Error::schedule(spec, "empty expression"));
        }

        let (zone, expr) = split_zone(trimmed)?;

        if let Some(interval) = expr.strip_prefix("@every") {
            let interval = parse_interval(interval.trim())
                .ok_or_else(|| Error::schedule(spec, "invalid @every duration"))?;
            return Ok(Self::Every(interval));
        }

        let exprs = match expr.to_ascii_lowercase().as_str() {
            "@yearly" | "@annually" => vec!["0 0 0 1 1 *".to_string()],
            "@monthly" => vec!["0 0 0 1 * *".to_string()],
            "@weekly" => vec!["0 0 0 * * SUN".to_string()],
            "@daily" | "@midnight" => vec!["0 0 0 * * *".to_string()],
            "@hourly" => vec!["0 0 * * * *".to_string()],
            other if other.starts_with('@') => {
                return Err(Error::schedule(spec, "unknown descriptor"));
            }
            _ => normalize_fields(expr).map_err(|reason| Error::schedule(spec, reason))?,
        };

        let schedules = exprs
            .iter()
            .map(|expr| {
                cron::Schedule::from_str(expr).map_err(|e| Error::schedule(spec, e.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::Cron { schedules, zone })
    }

    /// First fire time strictly after `from`, if any.
    pub fn next_after(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Cron { schedules, zone } => schedules
                .iter()
                .filter_map(|schedule| match zone {
                    ScheduleZone::Local => next_in_zone(schedule, from, &Local),
                    ScheduleZone::Named(tz) => next_in_zone(schedule, from, tz),
                })
                .min(),
            Self::Every(interval) => {
                let interval = TimeDelta::from_std(*interval).ok()?;
                from.trunc_subsecs(0).checked_add_signed(interval)
            }
        }
    }
}

fn next_in_zone<Z: TimeZone>(
    schedule: &cron::Schedule,
    from: DateTime<Utc>,
    zone: &Z,
) -> Option<DateTime<Utc>> {
    schedule
        .after(&from.with_timezone(zone))
        .next()
        .map(|dt| dt.with_timezone(&Utc))
}

fn split_zone(expr: &str) -> Result<(ScheduleZone, &str)> {
    let Some(assignment) = expr
        .strip_prefix("CRON_TZ=")
        .or_else(|| expr.strip_prefix("TZ="))
    else {
        return Ok((ScheduleZone::Local, expr));
    };

    let (name, rest) = assignment
        .split_once(char::is_whitespace)
        .ok_or_else(|| Error::schedule(expr, "missing expression after time zone"))?;
    let tz = name
        .parse::<Tz>()
        .map_err(|_| Error::schedule(expr, format!("unknown time zone '{}'", name)))?;
    Ok((ScheduleZone::Named(tz), rest.trim()))
}

/// Convert a 5-field expression into 6-field expressions with seconds.
///
/// Standard cron fires when either day field matches if both are
/// restricted, while `cron::Schedule` requires both. Such expressions are
/// split into one schedule per day field.
fn normalize_fields(expr: &str) -> std::result::Result<Vec<String>, String> {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    match fields.len() {
        5 => {
            let (minute, hour, day_of_month, month) = (fields[0], fields[1], fields[2], fields[3]);
            let day_of_week = translate_day_of_week(fields[4])?;
            if is_unrestricted(day_of_month) || is_unrestricted(&day_of_week) {
                return Ok(vec![format!(
                    "0 {minute} {hour} {day_of_month} {month} {day_of_week}"
                )]);
            }
            Ok(vec![
                format!("0 {minute} {hour} {day_of_month} {month} *"),
                format!("0 {minute} {hour} * {month} {day_of_week}"),
            ])
        }
        6 | 7 => Ok(vec![fields.join(" ")]),
        n => Err(format!("expected 5 to 7 fields, found {}", n)),
    }
}

fn is_unrestricted(field: &str) -> bool {
    matches!(field, "*" | "?" | "*/1")
}

/// Map numeric days (`0`-`7`, Sunday being `0` and `7`) onto day names.
fn translate_day_of_week(field: &str) -> std::result::Result<String, String> {
    let parts = field
        .split(',')
        .map(|part| {
            let (range, step) = match part.split_once('/') {
                Some((range, step)) => (range, Some(step)),
                None => (part, None),
            };

            let range = match range.split_once('-') {
                _ if range == "*" || range == "?" => range.to_string(),
                Some(("0", "6" | "7")) => "*".to_string(),
                Some(("1", "7")) if step.is_none() => "*".to_string(),
                // `5-7` would wrap through the week.
                Some((start, "7")) if step.is_none() && start != "0" => {
                    format!("{}-SAT,SUN", day_name(start)?)
                }
                Some((start, end)) => format!("{}-{}", day_name(start)?, day_name(end)?),
                None => day_name(range)?,
            };

            Ok(match step {
                Some(step) => format!("{}/{}", range, step),
                None => range,
            })
        })
        .collect::<std::result::Result<Vec<_>, String>>()?;
    Ok(parts.join(","))
}

fn day_name(value: &str) -> std::result::Result<String, String> {
    match value.parse::<usize>() {
        Ok(n) => DAY_NAMES
            .get(n)
            .map(|name| name.to_string())
            .ok_or_else(|| format!("day of week out of range: {}", n)),
        Err(_) => Ok(value.to_ascii_uppercase()),
    }
}

/// Parse `1h30m`, `90s`, `2m`. Returns `None` below one second.
fn parse_interval(value: &str) -> Option<Duration> {
    if value.is_empty() {
        return None;
    }

    let mut total = 0u64;
    let mut digits = String::new();
    for c in value.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let amount: u64 = digits.parse().ok()?;
        digits.clear();
        let unit = match c {
            'h' => 3600,
            'm' => 60,
            's' => 1,
            _ => return None,
        };
        total = total.checked_add(amount.checked_mul(unit)?)?;
    }

    // Trailing number without a unit.
    if !digits.is_empty() || total == 0 {
        return None;
    }
    Some(Duration::from_secs(total))
}

/// A base schedule plus a uniformly random delay in `[0, max_delay)`.
///
/// The delay is redrawn on every call to [`JitteredSchedule::next`].
#[derive(Debug, Clone)]
pub struct JitteredSchedule {
    base: BaseSchedule,
    max_delay: Duration,
}

impl JitteredSchedule {
    pub fn new(base: BaseSchedule, max_delay: Duration) -> Self {
        Self { base, max_delay }
    }

    pub fn parse(spec: &str, max_delay_secs: u32) -> Result<Self> {
        Ok(Self::new(
            BaseSchedule::parse(spec)?,
            Duration::from_secs(u64::from(max_delay_secs)),
        ))
    }

    pub fn base(&self) -> &BaseSchedule {
        &self.base
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Next fire time after `from`, jitter included.
    pub fn next(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let base = self.base.next_after(from)?;
        Some(base + self.jitter())
    }

    fn jitter(&self) -> TimeDelta {
        let max_ms = self.max_delay.as_millis() as f64;
        if max_ms <= 0.0 {
            return TimeDelta::zero();
        }
        TimeDelta::milliseconds((rand::random::<f64>() * max_ms) as i64)
    }
}
