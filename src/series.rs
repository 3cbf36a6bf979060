//! Chronologically ordered image collections.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use crate::error::{HadleyError, Result};
use crate::frequency::{difference, TimeUnit};
use crate::image::{Bounds, Image, TIME_START};
use crate::reducer::Reducer;

/// An ordered collection of time-stamped images.
///
/// Every image has a start time and all images share the same band count and
/// grid shape, so any subset can be reduced together.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    id: Option<String>,
    images: Vec<Image>,
}

impl TimeSeries {
    /// Create a time series, sorting images by start time.
    pub fn new(mut images: Vec<Image>) -> Result<Self> {
        if let Some(missing) = images.iter().position(|img| img.time_start.is_none()) {
            return Err(HadleyError::missing_property(
                TIME_START,
                format!(
                    "image {} ({}) has no start time; set one with Image::with_time",
                    missing,
                    images[missing].id.as_deref().unwrap_or("null")
                ),
            ));
        }

        if let Some((first, rest)) = images.split_first() {
            for image in rest {
                first.check_same_bands(image)?;
            }
        }

        images.sort_by_key(|img| img.time_start);
        Ok(Self { id: None, images })
    }

    /// Builder: set the collection identifier
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub(crate) fn set_id(&mut self, id: Option<String>) {
        self.id = id;
    }

    pub fn images(&self) -> &[Image] {
        &self.images
    }

    pub fn into_images(self) -> Vec<Image> {
        self.images
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Start times of every image, in order
    pub fn times(&self) -> Vec<DateTime<Utc>> {
        self.images.iter().filter_map(|img| img.time_start).collect()
    }

    /// Start time of the earliest image
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.images.first().and_then(|img| img.time_start)
    }

    /// Start time of the latest image
    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.images.last().and_then(|img| img.time_start)
    }

    /// Start and end time, failing on an empty series
    pub fn time_range(&self) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        match (self.start_time(), self.end_time()) {
            (Some(start), Some(end)) => Ok((start, end)),
            _ => Err(HadleyError::invalid_parameter(
                "series",
                "the time series contains no images",
            )),
        }
    }

    /// Image at `index`; negative indices count back from the end.
    pub fn get_image(&self, index: isize) -> Option<&Image> {
        let len = self.images.len() as isize;
        let index = if index < 0 { len + index } else { index };
        if (0..len).contains(&index) {
            self.images.get(index as usize)
        } else {
            None
        }
    }

    /// The last image in the series
    pub fn last(&self) -> Option<&Image> {
        self.images.last()
    }

    /// Images with start times in `[start, end)`
    pub fn select(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> &[Image] {
        let lo = self
            .images
            .partition_point(|img| img.time_start.is_some_and(|t| t < start));
        let hi = self
            .images
            .partition_point(|img| img.time_start.is_some_and(|t| t < end));
        if hi <= lo {
            &[]
        } else {
            &self.images[lo..hi]
        }
    }

    /// A new series with only the images in `[start, end)`
    pub fn filter_date(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> TimeSeries {
        TimeSeries {
            id: self.id.clone(),
            images: self.select(start, end).to_vec(),
        }
    }

    /// Union of all image footprints
    pub fn bounds(&self) -> Option<Bounds> {
        Bounds::union_all(self.images.iter().filter_map(|img| img.footprint.as_ref()))
    }

    /// Reduce the time intervals between consecutive images, e.g. the mean
    /// number of days between images.
    pub fn interval(&self, unit: TimeUnit, reducer: &dyn Reducer) -> Result<f64> {
        let times = self.times();
        if times.len() < 2 {
            return Err(HadleyError::invalid_parameter(
                "series",
                "at least two images are needed to compute an interval",
            ));
        }

        let diffs = times
            .windows(2)
            .map(|pair| difference(pair[0], pair[1], unit).map(|d| d as f32))
            .collect::<Result<Vec<_>>>()?;

        reducer
            .reduce(&diffs)
            .map(f64::from)
            .ok_or_else(|| HadleyError::invalid_parameter("reducer", "reducer produced no value"))
    }

    /// Summary statistics of the series.
    pub fn describe(&self, unit: TimeUnit) -> Result<SeriesSummary> {
        let (start, end) = self.time_range()?;
        let mean_interval = if self.len() > 1 {
            Some(self.interval(unit, &crate::reducer::Mean)?)
        } else {
            None
        };

        Ok(SeriesSummary {
            id: self.id.clone(),
            images: self.len(),
            start,
            end,
            mean_interval,
            unit,
        })
    }
}

/// Descriptive statistics about a time series
#[derive(Debug, Clone, Serialize)]
pub struct SeriesSummary {
    pub id: Option<String>,
    pub images: usize,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub mean_interval: Option<f64>,
    pub unit: TimeUnit,
}

impl fmt::Display for SeriesSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.id.as_deref().unwrap_or("null"))?;
        writeln!(f, "\tImages: {}", self.images)?;
        writeln!(f, "\tStart date: {}", self.start.format("%Y-%m-%d %H:%M:%S UTC"))?;
        writeln!(f, "\tEnd date: {}", self.end.format("%Y-%m-%d %H:%M:%S UTC"))?;
        match self.mean_interval {
            Some(interval) => write!(f, "\tMean interval: {:.2} {}s", interval, self.unit),
            None => write!(f, "\tMean interval: n/a"),
        }
    }
}
