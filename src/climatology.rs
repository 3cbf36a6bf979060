//! Climatologies and anomalies.
//!
//! A climatology summarizes a multi-year series at a cyclic coordinate such as
//! month of year or day of year. Building one is a two-phase reduction: the raw
//! series is first aggregated to the climatology frequency, then every image
//! sharing a coordinate is reduced across years. Coordinates without data are
//! dropped, so climatologies may be sparse. Day 366 only collects leap years and
//! is kept as-is, since anomalies match on the same coordinate strings.

use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::aggregate::aggregate_by;
use crate::error::{HadleyError, Result};
use crate::frequency::{get_climatology_frequency, ClimatologyFrequency};
use crate::image::{Image, COORDINATE_KEY, DIMENSION_KEY};
use crate::reducer::{reduce_images, Mean, Reducer, StdDev};
use crate::series::TimeSeries;

/// A collection of images tagged with cyclic coordinates instead of timestamps.
#[derive(Clone)]
pub struct Climatology {
    id: Option<String>,
    images: Vec<Image>,
    /// Name of the statistic reduced across years, e.g. "mean"
    pub statistic: String,
    pub frequency: ClimatologyFrequency,
    /// Reducer used to aggregate raw data to the climatology frequency
    pub reducer: Arc<dyn Reducer>,
    pub start: u32,
    pub end: u32,
}

impl fmt::Debug for Climatology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Climatology")
            .field("id", &self.id)
            .field("images", &self.images.len())
            .field("statistic", &self.statistic)
            .field("frequency", &self.frequency.name())
            .field("reducer", &self.reducer.name())
            .field("start", &self.start)
            .field("end", &self.end)
            .finish()
    }
}

impl Climatology {
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn images(&self) -> &[Image] {
        &self.images
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Coordinate strings present, in order
    pub fn coordinates(&self) -> Vec<&str> {
        self.images.iter().filter_map(Image::coordinate).collect()
    }

    /// The image at a coordinate, matched by exact string equality
    pub fn get(&self, coordinate: &str) -> Option<&Image> {
        self.images
            .iter()
            .find(|img| img.coordinate() == Some(coordinate))
    }

    /// Whether `other` was aggregated at the same frequency with the same reducer.
    fn check_compatible(&self, other: &Climatology) -> Result<()> {
        if self.frequency.unit != other.frequency.unit {
            return Err(HadleyError::IncompatibleClimatology {
                message: format!(
                    "frequencies differ: '{}' and '{}'",
                    self.frequency.name(),
                    other.frequency.name()
                ),
            });
        }
        if self.reducer.name() != other.reducer.name() {
            return Err(HadleyError::IncompatibleClimatology {
                message: format!(
                    "aggregation reducers differ: '{}' and '{}'",
                    self.reducer.name(),
                    other.reducer.name()
                ),
            });
        }
        Ok(())
    }
}

/// Build a climatology of `series` at `frequency` ("month" or "day").
///
/// Raw images are first aggregated to the frequency with `aggregation_reducer`,
/// then each coordinate in `[start, end]` is reduced with `climatology_reducer`.
/// `start` and `end` default to the full range of the frequency.
pub fn build_climatology(
    series: &TimeSeries,
    frequency: &str,
    climatology_reducer: &dyn Reducer,
    aggregation_reducer: Arc<dyn Reducer>,
    start: Option<u32>,
    end: Option<u32>,
    keep_bandnames: bool,
) -> Result<Climatology> {
    let freq = get_climatology_frequency(frequency)?;
    let start = start.unwrap_or(freq.default_start);
    let end = end.unwrap_or(freq.default_end);
    if start < freq.default_start || end > freq.default_end || start > end {
        return Err(HadleyError::invalid_parameter(
            "start/end",
            format!(
                "coordinates {}..={} must lie within {}..={} for frequency '{}'",
                start,
                end,
                freq.default_start,
                freq.default_end,
                freq.name()
            ),
        ));
    }

    let aggregated = aggregate_by(series, freq.unit, aggregation_reducer.as_ref(), true)?;
    let bounds = series.bounds();

    // Tag each aggregated image with its cyclic coordinate
    let tagged: Vec<(u32, &Image)> = aggregated
        .images()
        .iter()
        .filter_map(|img| img.time_start.map(|t| (freq.date_format.value(&t), img)))
        .collect();

    let mut images = Vec::new();
    for coordinate in start..=end {
        let bucket: Vec<&Image> = tagged
            .iter()
            .filter(|(c, _)| *c == coordinate)
            .map(|(_, img)| *img)
            .collect();
        let Some(first) = bucket.first() else {
            debug!(coordinate, frequency = freq.name(), "No images for coordinate");
            continue;
        };

        let coord = first
            .time_start
            .map(|t| freq.coordinate(&t))
            .unwrap_or_else(|| coordinate.to_string());

        let mut reduced = reduce_images(&bucket, climatology_reducer)?.clip(bounds);
        reduced.id = series.id().map(str::to_string);
        reduced.set(DIMENSION_KEY, freq.name());
        reduced.set(COORDINATE_KEY, coord);

        if keep_bandnames {
            reduced = reduced.rename(first.bands().to_vec())?;
        }
        images.push(reduced);
    }

    debug!(
        images = images.len(),
        frequency = freq.name(),
        statistic = climatology_reducer.name(),
        "Built climatology"
    );

    Ok(Climatology {
        id: series.id().map(str::to_string),
        images,
        statistic: climatology_reducer.name().to_string(),
        frequency: freq,
        reducer: aggregation_reducer,
        start,
        end,
    })
}

/// Compute anomalies of `observations` relative to a mean climatology.
///
/// Observations are aggregated to the climatology frequency with the
/// climatology's reducer, then the matching coordinate of `mean` is subtracted.
/// With `std`, the difference is divided by the matching standard deviation.
/// Observations whose coordinate is missing from a sparse climatology are dropped.
pub fn anomaly(
    observations: &TimeSeries,
    mean: &Climatology,
    std: Option<&Climatology>,
) -> Result<TimeSeries> {
    if let Some(std) = std {
        mean.check_compatible(std)?;
    }

    let aggregated = aggregate_by(observations, mean.frequency.unit, mean.reducer.as_ref(), true)?;

    let mut anomalies = Vec::new();
    for image in aggregated.images() {
        let Some(time) = image.time_start else {
            continue;
        };
        let coordinate = mean.frequency.coordinate(&time);

        let Some(mean_image) = mean.get(&coordinate) else {
            debug!(coordinate = %coordinate, "No climatology image for coordinate");
            continue;
        };
        let mut result = image.subtract(mean_image)?;

        if let Some(std) = std {
            let Some(std_image) = std.get(&coordinate) else {
                debug!(coordinate = %coordinate, "No standard deviation image for coordinate");
                continue;
            };
            result = result.divide(std_image)?;
        }
        anomalies.push(result);
    }

    let mut output = TimeSeries::new(anomalies)?;
    output.set_id(observations.id().map(str::to_string));
    Ok(output)
}

impl TimeSeries {
    /// Mean climatology, aggregating raw data with `reducer`.
    pub fn climatology_mean(
        &self,
        frequency: &str,
        reducer: Arc<dyn Reducer>,
        start: Option<u32>,
        end: Option<u32>,
        keep_bandnames: bool,
    ) -> Result<Climatology> {
        build_climatology(self, frequency, &Mean, reducer, start, end, keep_bandnames)
    }

    /// Standard deviation climatology, aggregating raw data with `reducer`.
    pub fn climatology_std(
        &self,
        frequency: &str,
        reducer: Arc<dyn Reducer>,
        start: Option<u32>,
        end: Option<u32>,
        keep_bandnames: bool,
    ) -> Result<Climatology> {
        build_climatology(self, frequency, &StdDev, reducer, start, end, keep_bandnames)
    }

    /// Anomalies relative to a climatology; see [`anomaly`].
    pub fn climatology_anomaly(
        &self,
        mean: &Climatology,
        std: Option<&Climatology>,
    ) -> Result<TimeSeries> {
        anomaly(self, mean, std)
    }
}
