//! Time windows.
//!
//! Aggregation windows are consecutive whole units offset from the first
//! timestamp of a series; they are not aligned to the calendar. Rolling windows
//! are placed around a single timestamp according to an [`Align`] policy.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{HadleyError, Result};
use crate::frequency::{advance, whole_units, TimeUnit};

/// Nudge applied to exclusive window edges so the center image is always included
fn edge_nudge() -> Duration {
    Duration::seconds(1)
}

/// Start times of the windows covering `[start, end]` in steps of one `unit`.
///
/// Window `i` covers `[advance(start, i), advance(start, i + 1))`. At least one
/// window is always produced, and the last window always contains `end`.
pub fn window_starts(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    unit: TimeUnit,
) -> Result<Vec<DateTime<Utc>>> {
    let steps = whole_units(start, end, unit)? + 1;
    (0..steps).map(|i| advance(start, i, unit)).collect()
}

/// Where a rolling window sits relative to its center time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Align {
    /// The window ends at the center time
    Left,
    /// The window is split evenly around the center time
    Center,
    /// The window starts at the center time
    Right,
}

impl Align {
    pub fn name(&self) -> &'static str {
        match self {
            Align::Left => "left",
            Align::Center => "center",
            Align::Right => "right",
        }
    }
}

impl fmt::Display for Align {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Align {
    type Err = HadleyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "left" => Ok(Align::Left),
            "center" => Ok(Align::Center),
            "right" => Ok(Align::Right),
            _ => Err(HadleyError::InvalidParameter {
                param: "align".to_string(),
                message: format!("Unknown alignment: {}. Must be one of: left, center, right", s),
            }),
        }
    }
}

/// A half-open time interval `[start, end)` around a center time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub align: Align,
}

impl Window {
    /// Place a window of `size` units around `center`.
    ///
    /// - left: `(center - size, center]`
    /// - center: `[center - size / 2, center + size / 2)`
    /// - right: `[center, center + size)`
    pub fn around(center: DateTime<Utc>, size: u32, unit: TimeUnit, align: Align) -> Result<Self> {
        if size == 0 {
            return Err(HadleyError::invalid_parameter(
                "window_size",
                "window size must be at least 1",
            ));
        }
        let size = i64::from(size);

        let (start, end) = match align {
            Align::Left => (advance(center, -size, unit)? + edge_nudge(), center + edge_nudge()),
            Align::Right => (center, advance(center, size, unit)?),
            Align::Center => (
                half_offset(center, size, unit, -1)?,
                half_offset(center, size, unit, 1)?,
            ),
        };

        Ok(Self { start, end, align })
    }

    pub fn contains(&self, time: &DateTime<Utc>) -> bool {
        self.start <= *time && *time < self.end
    }
}

/// Offset `center` by half of `size` units in `direction`.
fn half_offset(
    center: DateTime<Utc>,
    size: i64,
    unit: TimeUnit,
    direction: i64,
) -> Result<DateTime<Utc>> {
    let whole = advance(center, direction * (size / 2), unit)?;
    if size % 2 == 0 {
        return Ok(whole);
    }
    // Half of the next unit past the whole steps
    let next = advance(whole, direction, unit)?;
    Ok(whole + (next - whole) / 2)
}
