//! Temporal aggregation of a time series to a coarser frequency.

use tracing::debug;

use crate::error::{HadleyError, Result};
use crate::frequency::{advance, get_frequency, TimeUnit};
use crate::image::Bounds;
use crate::reducer::{reduce_images, Reducer};
use crate::series::TimeSeries;
use crate::window::window_starts;

/// Aggregate a series to `frequency` ("year", "month", "week", "day", "hour" or
/// "minute"), reducing the images in each window with `reducer`.
///
/// Windows without images produce nothing. Each output image copies the
/// properties of the first image in its window and spans from the first to
/// the last image actually present. Going to a finer frequency than the series
/// spacing returns one image per input image.
pub fn aggregate(
    series: &TimeSeries,
    frequency: &str,
    reducer: &dyn Reducer,
    keep_bandnames: bool,
) -> Result<TimeSeries> {
    let unit = get_frequency(frequency)
        .map_err(|_| HadleyError::InvalidFrequency {
            name: frequency.to_string(),
            message: "must be one of year, month, week, day, hour, minute".to_string(),
        })?
        .unit;
    aggregate_by(series, unit, reducer, keep_bandnames)
}

/// [`aggregate`] with an already resolved unit.
pub fn aggregate_by(
    series: &TimeSeries,
    unit: TimeUnit,
    reducer: &dyn Reducer,
    keep_bandnames: bool,
) -> Result<TimeSeries> {
    let mut aggregated = Vec::new();

    if let (Some(start), Some(end)) = (series.start_time(), series.end_time()) {
        let starts = window_starts(start, end, unit)?;
        debug!(
            windows = starts.len(),
            unit = %unit,
            reducer = reducer.name(),
            "Aggregating time series"
        );

        for (i, window_start) in starts.iter().enumerate() {
            let window_end = match starts.get(i + 1) {
                Some(next) => *next,
                None => advance(start, i as i64 + 1, unit)?,
            };

            let selected = series.select(*window_start, window_end);
            let (Some(first), Some(last)) = (selected.first(), selected.last()) else {
                debug!(window_start = %window_start, "Dropping empty window");
                continue;
            };

            let refs: Vec<_> = selected.iter().collect();
            let mut reduced = reduce_images(&refs, reducer)?.copy_properties(first);
            reduced.id = first.id.clone();
            reduced.time_start = first.time_start;
            reduced.time_end = last.time_end.or(last.time_start);
            reduced.footprint =
                Bounds::union_all(selected.iter().filter_map(|img| img.footprint.as_ref()));

            if keep_bandnames {
                reduced = reduced.rename(first.bands().to_vec())?;
            }
            aggregated.push(reduced);
        }
    }

    let mut output = TimeSeries::new(aggregated)?;
    output.set_id(series.id().map(str::to_string));
    Ok(output)
}

impl TimeSeries {
    /// Aggregate to a named frequency; see [`aggregate`].
    pub fn aggregate_time(
        &self,
        frequency: &str,
        reducer: &dyn Reducer,
        keep_bandnames: bool,
    ) -> Result<TimeSeries> {
        aggregate(self, frequency, reducer, keep_bandnames)
    }

    pub fn resample_hourly(
        &self,
        reducer: &dyn Reducer,
        keep_bandnames: bool,
    ) -> Result<TimeSeries> {
        aggregate_by(self, TimeUnit::Hour, reducer, keep_bandnames)
    }

    pub fn resample_daily(
        &self,
        reducer: &dyn Reducer,
        keep_bandnames: bool,
    ) -> Result<TimeSeries> {
        aggregate_by(self, TimeUnit::Day, reducer, keep_bandnames)
    }

    pub fn resample_weekly(
        &self,
        reducer: &dyn Reducer,
        keep_bandnames: bool,
    ) -> Result<TimeSeries> {
        aggregate_by(self, TimeUnit::Week, reducer, keep_bandnames)
    }

    pub fn resample_monthly(
        &self,
        reducer: &dyn Reducer,
        keep_bandnames: bool,
    ) -> Result<TimeSeries> {
        aggregate_by(self, TimeUnit::Month, reducer, keep_bandnames)
    }

    pub fn resample_annually(
        &self,
        reducer: &dyn Reducer,
        keep_bandnames: bool,
    ) -> Result<TimeSeries> {
        aggregate_by(self, TimeUnit::Year, reducer, keep_bandnames)
    }
}
