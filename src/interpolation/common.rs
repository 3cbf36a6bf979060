//! Shared helpers for temporal interpolation.

use chrono::{DateTime, Utc};

use crate::error::{HadleyError, Result};
use crate::image::Image;
use crate::series::TimeSeries;

/// Fractional position of `target` between `x1` and `x2`, in milliseconds
pub fn fraction(x1: DateTime<Utc>, x2: DateTime<Utc>, target: DateTime<Utc>) -> f64 {
    let span = (x2 - x1).num_milliseconds();
    if span == 0 {
        return 0.0;
    }
    (target - x1).num_milliseconds() as f64 / span as f64
}

/// The `before` images strictly before `target` followed by the `after` images
/// at or after it, in time order.
pub fn bracket(
    series: &TimeSeries,
    target: DateTime<Utc>,
    before: usize,
    after: usize,
) -> Result<Vec<&Image>> {
    let (start, end) = series.time_range().map_err(|_| HadleyError::InsufficientNeighbors {
        message: "cannot interpolate an empty time series".to_string(),
    })?;
    if target < start || target > end {
        return Err(HadleyError::InsufficientNeighbors {
            message: format!(
                "target time {} is outside the series range {} to {}",
                target, start, end
            ),
        });
    }

    let images = series.images();
    let split = images.partition_point(|img| img.time_start.is_some_and(|t| t < target));

    if split < before || images.len() - split < after {
        return Err(HadleyError::InsufficientNeighbors {
            message: format!(
                "{} images before and {} at or after {} are required, found {} and {}",
                before,
                after,
                target,
                split,
                images.len() - split
            ),
        });
    }

    Ok(images[split - before..split + after].iter().collect())
}
