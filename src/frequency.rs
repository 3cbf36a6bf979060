//! Frequency registry and calendar arithmetic.
//!
//! Frequencies are looked up by name from a static, read-only table. Calendar
//! units (month, year) advance by calendar months so that windows follow the
//! calendar from their origin; fixed units advance by exact durations.

use chrono::{DateTime, Datelike, Duration, Months, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{HadleyError, Result};

/// A unit of time that images can be windowed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Year,
    Month,
    Week,
    Day,
    Hour,
    Minute,
}

impl TimeUnit {
    /// Registry name of the unit
    pub fn name(&self) -> &'static str {
        match self {
            TimeUnit::Year => "year",
            TimeUnit::Month => "month",
            TimeUnit::Week => "week",
            TimeUnit::Day => "day",
            TimeUnit::Hour => "hour",
            TimeUnit::Minute => "minute",
        }
    }

    /// Fixed length of the unit, `None` for calendar units.
    pub fn fixed_duration(&self) -> Option<Duration> {
        match self {
            TimeUnit::Year | TimeUnit::Month => None,
            TimeUnit::Week => Some(Duration::weeks(1)),
            TimeUnit::Day => Some(Duration::days(1)),
            TimeUnit::Hour => Some(Duration::hours(1)),
            TimeUnit::Minute => Some(Duration::minutes(1)),
        }
    }

    /// Number of calendar months per step, `None` for fixed units.
    fn months_per_step(&self) -> Option<u32> {
        match self {
            TimeUnit::Year => Some(12),
            TimeUnit::Month => Some(1),
            _ => None,
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TimeUnit {
    type Err = HadleyError;

    fn from_str(s: &str) -> Result<Self> {
        get_frequency(s).map(|freq| freq.unit)
    }
}

/// How a timestamp is turned into a cyclic coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoordinateFormat {
    /// Month of year, 1-12
    MonthOfYear,
    /// Day of year, 1-366
    DayOfYear,
}

impl CoordinateFormat {
    /// Format the cyclic coordinate of a timestamp, without zero padding.
    pub fn format(&self, time: &DateTime<Utc>) -> String {
        self.value(time).to_string()
    }

    /// Numeric cyclic coordinate of a timestamp.
    pub fn value(&self, time: &DateTime<Utc>) -> u32 {
        match self {
            CoordinateFormat::MonthOfYear => time.month(),
            CoordinateFormat::DayOfYear => time.ordinal(),
        }
    }
}

/// An immutable descriptor for a time unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frequency {
    pub unit: TimeUnit,
}

impl Frequency {
    pub fn name(&self) -> &'static str {
        self.unit.name()
    }
}

/// A frequency that climatologies can be computed at, with its default coordinate range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClimatologyFrequency {
    pub unit: TimeUnit,
    pub date_format: CoordinateFormat,
    pub default_start: u32,
    pub default_end: u32,
}

impl ClimatologyFrequency {
    pub fn name(&self) -> &'static str {
        self.unit.name()
    }

    /// Cyclic coordinate string of a timestamp
    pub fn coordinate(&self, time: &DateTime<Utc>) -> String {
        self.date_format.format(time)
    }
}

static TIME_FREQUENCIES: Lazy<BTreeMap<&'static str, Frequency>> = Lazy::new(|| {
    [
        TimeUnit::Year,
        TimeUnit::Month,
        TimeUnit::Week,
        TimeUnit::Day,
        TimeUnit::Hour,
        TimeUnit::Minute,
    ]
    .into_iter()
    .map(|unit| (unit.name(), Frequency { unit }))
    .collect()
});

static CLIMATOLOGY_FREQUENCIES: Lazy<BTreeMap<&'static str, ClimatologyFrequency>> =
    Lazy::new(|| {
        let mut table = BTreeMap::new();
        table.insert(
            "month",
            ClimatologyFrequency {
                unit: TimeUnit::Month,
                date_format: CoordinateFormat::MonthOfYear,
                default_start: 1,
                default_end: 12,
            },
        );
        table.insert(
            "day",
            ClimatologyFrequency {
                unit: TimeUnit::Day,
                date_format: CoordinateFormat::DayOfYear,
                default_start: 1,
                default_end: 366,
            },
        );
        table
    });

/// Get a time frequency by name, e.g. "hour".
pub fn get_frequency(name: &str) -> Result<Frequency> {
    get_option(name, &TIME_FREQUENCIES)
}

/// Get a climatology frequency by name, either "month" or "day".
pub fn get_climatology_frequency(name: &str) -> Result<ClimatologyFrequency> {
    get_option(name, &CLIMATOLOGY_FREQUENCIES)
}

/// Look up a registry entry, failing with a hint at the closest valid name.
fn get_option<T: Copy>(name: &str, options: &BTreeMap<&'static str, T>) -> Result<T> {
    let key = name.to_lowercase();
    options
        .get(key.as_str())
        .copied()
        .ok_or_else(|| HadleyError::UnknownFrequency {
            name: name.to_string(),
            options: options.keys().map(|k| k.to_string()).collect(),
            hint: closest_option(&key, options.keys().copied())
                .map(|closest| format!(" Did you mean '{}'?", closest))
                .unwrap_or_default(),
        })
}

/// Find the closest option by edit distance, if it is similar enough.
pub(crate) fn closest_option<'a>(
    name: &str,
    options: impl Iterator<Item = &'a str>,
) -> Option<&'a str> {
    options
        .map(|option| (option, similarity(name, option)))
        .filter(|(_, score)| *score >= 0.6)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(option, _)| option)
}

fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 1.0;
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.iter().enumerate() {
        let mut row = vec![i + 1; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            row[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(row[j] + 1);
        }
        prev = row;
    }

    1.0 - prev[b.len()] as f64 / longest as f64
}

/// Advance a timestamp by a whole number of units.
///
/// Month and year steps clamp to the end of shorter months.
pub fn advance(time: DateTime<Utc>, steps: i64, unit: TimeUnit) -> Result<DateTime<Utc>> {
    let out_of_range = || {
        HadleyError::invalid_parameter(
            "time",
            format!("advancing {} by {} {}s is out of range", time, steps, unit),
        )
    };

    match (unit.fixed_duration(), unit.months_per_step()) {
        (Some(duration), _) => {
            let millis = duration
                .num_milliseconds()
                .checked_mul(steps)
                .ok_or_else(out_of_range)?;
            time.checked_add_signed(Duration::milliseconds(millis))
                .ok_or_else(out_of_range)
        }
        (None, Some(per_step)) => {
            let months = u32::try_from(steps.unsigned_abs())
                .ok()
                .and_then(|m| m.checked_mul(per_step))
                .ok_or_else(out_of_range)?;
            if steps >= 0 {
                time.checked_add_months(Months::new(months))
            } else {
                time.checked_sub_months(Months::new(months))
            }
            .ok_or_else(out_of_range)
        }
        (None, None) => Err(out_of_range()),
    }
}

/// Number of whole units between `start` and `end`, i.e. the largest `n` with
/// `advance(start, n) <= end`. `end` must not precede `start`.
pub fn whole_units(start: DateTime<Utc>, end: DateTime<Utc>, unit: TimeUnit) -> Result<i64> {
    if end < start {
        return Err(HadleyError::invalid_parameter(
            "end",
            format!("end {} precedes start {}", end, start),
        ));
    }

    if let Some(duration) = unit.fixed_duration() {
        return Ok((end - start).num_milliseconds() / duration.num_milliseconds());
    }

    // Estimate from calendar fields, then correct for day-of-month overshoot
    let per_step = i64::from(unit.months_per_step().unwrap_or(1));
    let months = i64::from(end.year() - start.year()) * 12 + i64::from(end.month())
        - i64::from(start.month());
    let mut steps = (months / per_step).max(0);
    while steps > 0 && advance(start, steps, unit)? > end {
        steps -= 1;
    }
    while advance(start, steps + 1, unit)? <= end {
        steps += 1;
    }
    Ok(steps)
}

/// Fractional number of units between two timestamps. Negative when `end`
/// precedes `start`.
pub fn difference(start: DateTime<Utc>, end: DateTime<Utc>, unit: TimeUnit) -> Result<f64> {
    if end < start {
        return difference(end, start, unit).map(|d| -d);
    }

    if let Some(duration) = unit.fixed_duration() {
        return Ok((end - start).num_milliseconds() as f64 / duration.num_milliseconds() as f64);
    }

    let whole = whole_units(start, end, unit)?;
    let lower = advance(start, whole, unit)?;
    let upper = advance(start, whole + 1, unit)?;
    let fraction =
        (end - lower).num_milliseconds() as f64 / (upper - lower).num_milliseconds() as f64;
    Ok(whole as f64 + fraction)
}

/// Convert epoch milliseconds into a UTC timestamp.
pub fn from_millis(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(millis).ok_or_else(|| {
        HadleyError::invalid_parameter("time", format!("{} ms is out of range", millis))
    })
}
