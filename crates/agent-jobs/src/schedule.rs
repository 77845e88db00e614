//! Cron schedules for scheduled jobs.
//!
//! Expressions are evaluated with the `cron` crate in a configurable
//! timezone. Field layout follows classic cron-expression conventions:
//!
//! | Fields | Layout                                       |
//! |--------|----------------------------------------------|
//! | 5      | `min hour day-of-month month day-of-week`    |
//! | 6      | `min hour day-of-month month day-of-week year` |
//! | 7      | `sec min hour day-of-month month day-of-week year` |
//!
//! Descriptors such as `@hourly`, `@daily`, `@weekly`, `@monthly` and
//! `@yearly` are accepted as well. Five and six field forms fire at second 0.
//! Day-of-week values are `0-6` starting on Sunday, with `7` also meaning
//! Sunday, or `SUN`-`SAT`.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::SchedulerError;

/// A parsed cron schedule bound to a timezone.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expression: String,
    schedule: cron::Schedule,
    timezone: Tz,
}

const WEEKDAYS: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

fn weekday(value: &str) -> Option<&'static str> {
    match value.parse::<usize>() {
        Ok(day) if day <= 7 => Some(WEEKDAYS[day % 7]),
        _ => None,
    }
}

/// Rewrite one day-of-week list item with day names, which the `cron` crate
/// reads independently of its own 1-based numbering.
fn day_of_week_item(item: &str) -> String {
    let (range, step) = match item.split_once('/') {
        Some((range, step)) => (range, Some(step)),
        None => (item, None),
    };
    let name = |value: &str| weekday(value).unwrap_or(value).to_string();

    let mapped = match range.split_once('-') {
        // a range ending on Sunday (7) wraps past Saturday
        Some((start, "7")) if step.is_none() => match start.parse::<usize>() {
            Ok(0) => "SUN-SAT".to_string(),
            Ok(7) => "SUN".to_string(),
            Ok(day) if day < 7 => format!("{}-SAT,SUN", WEEKDAYS[day]),
            _ => format!("{}-SUN", start),
        },
        Some((start, end)) => format!("{}-{}", name(start), name(end)),
        None => name(range),
    };
    match step {
        Some(step) => format!("{}/{}", mapped, step),
        None => mapped,
    }
}

fn day_of_week(field: &str) -> String {
    field
        .split(',')
        .map(day_of_week_item)
        .collect::<Vec<_>>()
        .join(",")
}

/// Rewrite an expression into the seven-field form understood by `cron`.
fn normalize(expr: &str) -> String {
    if expr.starts_with('@') {
        return expr.to_string();
    }
    let mut fields: Vec<String> = expr.split_whitespace().map(str::to_string).collect();
    let day_of_week_index = match fields.len() {
        5 | 6 => Some(4),
        7 => Some(5),
        _ => None,
    };
    if let Some(field) = day_of_week_index.and_then(|index| fields.get_mut(index)) {
        *field = day_of_week(field);
    }
    match fields.len() {
        5 | 6 => format!("0 {}", fields.join(" ")),
        _ => fields.join(" "),
    }
}

impl CronSchedule {
    /// Parse `expr`, evaluating fire times in `timezone`.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::InvalidCron` if the expression is not valid.
    pub fn parse(expr: &str, timezone: Tz) -> Result<Self, SchedulerError> {
        let trimmed = expr.trim();
        if trimmed.is_empty() {
            return Err(SchedulerError::InvalidCron(
                "cron expression cannot be empty".to_string(),
            ));
        }

        let schedule = cron::Schedule::from_str(&normalize(trimmed))
            .map_err(|e| SchedulerError::InvalidCron(format!("'{}': {}", expr, e)))?;

        Ok(Self {
            expression: trimmed.to_string(),
            schedule,
            timezone,
        })
    }

    /// The expression as registered.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Next fire time strictly after `now`, or `None` if the schedule has no
    /// future occurrences.
    pub fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let local = now.with_timezone(&self.timezone);
        self.schedule
            .after(&local)
            .next()
            .map(|next| next.with_timezone(&Utc))
    }

    /// Time remaining until the next fire time.
    pub fn until_next(&self) -> Option<Duration> {
        let now = Utc::now();
        let next = self.next_after(now)?;
        Some((next - now).to_std().unwrap_or(Duration::ZERO))
    }
}

/// Validate a cron expression.
///
/// # Example
///
/// ```
/// use agent_jobs::validate_cron_expression;
///
/// assert!(validate_cron_expression("@hourly").is_ok());
/// assert!(validate_cron_expression("30 4 * * *").is_ok());     // 4:30 AM daily
/// assert!(validate_cron_expression("* * * * * * *").is_ok());  // every second
///
/// assert!(validate_cron_expression("@time").is_err());
/// assert!(validate_cron_expression("").is_err());
/// ```
pub fn validate_cron_expression(expr: &str) -> Result<(), SchedulerError> {
    CronSchedule::parse(expr, Tz::UTC).map(|_| ())
}
