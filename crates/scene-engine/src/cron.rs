//! Cron expressions for scheduled scene activation
//!
//! Supports the classic five fields (`minute hour day-of-month month
//! day-of-week`) and an optional leading seconds field. Each field accepts
//! `*`, single values, lists (`1,15`), ranges (`1-5`) and steps (`*/10`,
//! `0-30/5`). Months and weekdays also accept three-letter names. Day of
//! week runs 0-7 where both 0 and 7 are Sunday. When both day fields are
//! restricted a day matches if either one matches.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Timelike};
use chrono::offset::LocalResult;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors in cron expressions
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("invalid cron expression '{expression}': {reason}")]
    InvalidExpression { expression: String, reason: String },

    #[error("{field} value {value} out of range {min}-{max}")]
    OutOfRange {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },
}

/// Result type for schedule parsing
pub type ScheduleResult<T> = Result<T, ScheduleError>;

struct FieldSpec {
    name: &'static str,
    min: u32,
    max: u32,
    names: &'static [&'static str],
}

const SECONDS: FieldSpec = FieldSpec {
    name: "second",
    min: 0,
    max: 59,
    names: &[],
};

const MINUTES: FieldSpec = FieldSpec {
    name: "minute",
    min: 0,
    max: 59,
    names: &[],
};

const HOURS: FieldSpec = FieldSpec {
    name: "hour",
    min: 0,
    max: 23,
    names: &[],
};

const DAYS_OF_MONTH: FieldSpec = FieldSpec {
    name: "day of month",
    min: 1,
    max: 31,
    names: &[],
};

const MONTHS: FieldSpec = FieldSpec {
    name: "month",
    min: 1,
    max: 12,
    names: &[
        "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
    ],
};

const DAYS_OF_WEEK: FieldSpec = FieldSpec {
    name: "day of week",
    min: 0,
    max: 7,
    names: &["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"],
};

/// Give up searching for a match after this many years
const SEARCH_YEARS: i32 = 5;

/// Set of allowed values for one field, as a bitmask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct FieldSet(u64);

impl FieldSet {
    fn insert(&mut self, value: u32) {
        self.0 |= 1 << value;
    }

    fn contains(self, value: u32) -> bool {
        (self.0 & (1 << value)) != 0
    }
}

/// A parsed cron schedule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    expression: String,
    seconds: FieldSet,
    minutes: FieldSet,
    hours: FieldSet,
    days_of_month: FieldSet,
    months: FieldSet,
    days_of_week: FieldSet,
    day_of_month_restricted: bool,
    day_of_week_restricted: bool,
}

impl CronSchedule {
    /// Parse a cron expression
    pub fn parse(expression: &str) -> ScheduleResult<Self> {
        let trimmed = expression.trim();
        let expanded = match trimmed {
            "@yearly" | "@annually" => "0 0 1 1 *",
            "@monthly" => "0 0 1 * *",
            "@weekly" => "0 0 * * 0",
            "@daily" | "@midnight" => "0 0 * * *",
            "@hourly" => "0 * * * *",
            other => other,
        };

        let fields: Vec<&str> = expanded.split_whitespace().collect();
        let (second, rest) = match fields.len() {
            5 => ("0", &fields[..]),
            6 => (fields[0], &fields[1..]),
            n => {
                return Err(ScheduleError::InvalidExpression {
                    expression: trimmed.to_string(),
                    reason: format!("expected 5 or 6 fields, found {}", n),
                })
            }
        };

        let mut days_of_week = parse_field(trimmed, rest[4], &DAYS_OF_WEEK)?;
        if days_of_week.contains(7) {
            days_of_week.insert(0);
        }

        Ok(Self {
            expression: trimmed.to_string(),
            seconds: parse_field(trimmed, second, &SECONDS)?,
            minutes: parse_field(trimmed, rest[0], &MINUTES)?,
            hours: parse_field(trimmed, rest[1], &HOURS)?,
            days_of_month: parse_field(trimmed, rest[2], &DAYS_OF_MONTH)?,
            months: parse_field(trimmed, rest[3], &MONTHS)?,
            days_of_week,
            day_of_month_restricted: !rest[2].starts_with('*'),
            day_of_week_restricted: !rest[4].starts_with('*'),
        })
    }

    /// The expression this schedule was parsed from
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Next firing time strictly after `after`, in the same time zone
    ///
    /// Local times that do not exist (DST gaps) are skipped; ambiguous local
    /// times (DST overlaps) resolve to the earlier instant. Returns `None`
    /// when nothing matches within the next few years (e.g. `30 2` in
    /// February).
    pub fn next_after<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        let tz = after.timezone();
        let start = after.naive_local().with_nanosecond(0)? + Duration::seconds(1);
        let limit_year = start.year() + SEARCH_YEARS;
        let mut t = start;

        while t.year() <= limit_year {
            if !self.months.contains(t.month()) {
                t = first_of_next_month(t)?;
                continue;
            }
            if !self.day_matches(t.date()) {
                t = t.date().succ_opt()?.and_hms_opt(0, 0, 0)?;
                continue;
            }
            if !self.hours.contains(t.hour()) {
                t = t.with_minute(0)?.with_second(0)? + Duration::hours(1);
                continue;
            }
            if !self.minutes.contains(t.minute()) {
                t = t.with_second(0)? + Duration::minutes(1);
                continue;
            }
            if !self.seconds.contains(t.second()) {
                t += Duration::seconds(1);
                continue;
            }

            match tz.from_local_datetime(&t) {
                LocalResult::Single(dt) => return Some(dt),
                LocalResult::Ambiguous(earliest, _) => return Some(earliest),
                LocalResult::None => t += Duration::seconds(1),
            }
        }

        None
    }

    fn day_matches(&self, date: NaiveDate) -> bool {
        let dom = self.days_of_month.contains(date.day());
        let dow = self
            .days_of_week
            .contains(date.weekday().num_days_from_sunday());

        if self.day_of_month_restricted && self.day_of_week_restricted {
            dom || dow
        } else {
            dom && dow
        }
    }
}

impl FromStr for CronSchedule {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

fn first_of_next_month(t: NaiveDateTime) -> Option<NaiveDateTime> {
    let (year, month) = if t.month() == 12 {
        (t.year() + 1, 1)
    } else {
        (t.year(), t.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0)
}

fn parse_field(expression: &str, text: &str, spec: &FieldSpec) -> ScheduleResult<FieldSet> {
    let mut set = FieldSet::default();

    for item in text.split(',') {
        let (range, step) = match item.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step.parse().map_err(|_| invalid(expression, item))?;
                if step == 0 {
                    return Err(ScheduleError::InvalidExpression {
                        expression: expression.to_string(),
                        reason: format!("step cannot be 0 in '{}'", item),
                    });
                }
                (range, Some(step))
            }
            None => (item, None),
        };

        let (start, end) = if range == "*" {
            (spec.min, spec.max)
        } else if let Some((a, b)) = range.split_once('-') {
            (
                parse_value(expression, a, spec)?,
                parse_value(expression, b, spec)?,
            )
        } else {
            let value = parse_value(expression, range, spec)?;
            // `5/10` means every 10 starting at 5
            (value, if step.is_some() { spec.max } else { value })
        };

        if start > end {
            return Err(ScheduleError::InvalidExpression {
                expression: expression.to_string(),
                reason: format!("range start exceeds end in '{}'", item),
            });
        }

        let step = step.unwrap_or(1) as usize;
        for value in (start..=end).step_by(step) {
            set.insert(value);
        }
    }

    Ok(set)
}

fn parse_value(expression: &str, text: &str, spec: &FieldSpec) -> ScheduleResult<u32> {
    if let Some(pos) = spec
        .names
        .iter()
        .position(|name| name.eq_ignore_ascii_case(text))
    {
        return Ok(spec.min + pos as u32);
    }

    let value: u32 = text.parse().map_err(|_| invalid(expression, text))?;
    if value < spec.min || value > spec.max {
        return Err(ScheduleError::OutOfRange {
            field: spec.name,
            value,
            min: spec.min,
            max: spec.max,
        });
    }
    Ok(value)
}

fn invalid(expression: &str, token: &str) -> ScheduleError {
    ScheduleError::InvalidExpression {
        expression: expression.to_string(),
        reason: format!("unexpected token '{}'", token),
    }
}
