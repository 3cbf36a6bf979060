//! Rolling reductions and gap-filling over moving time windows.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{HadleyError, Result};
use crate::frequency::{get_frequency, TimeUnit};
use crate::image::{Image, TIME_START};
use crate::reducer::{reduce_images, Reducer};
use crate::series::TimeSeries;
use crate::window::{Align, Window};

/// Window size, in units, of a rolling image
pub const WINDOW_SIZE_KEY: &str = "hadley:window_size";
/// Time unit of a rolling window
pub const WINDOW_UNIT_KEY: &str = "hadley:window_unit";
/// Alignment of a rolling window
pub const WINDOW_ALIGN_KEY: &str = "hadley:window_align";
/// Number of images that fell into a rolling window
pub const WINDOW_COUNT_KEY: &str = "hadley:window_count";

fn parse_unit(unit: &str) -> Result<TimeUnit> {
    Ok(get_frequency(unit)?.unit)
}

/// Images in the window of `size` units placed around `center`.
pub fn get_window(
    series: &TimeSeries,
    center: DateTime<Utc>,
    size: u32,
    unit: &str,
    align: Align,
) -> Result<TimeSeries> {
    let window = Window::around(center, size, parse_unit(unit)?, align)?;
    Ok(series.filter_date(window.start, window.end))
}

/// Reduce the window around every image.
///
/// Each output image keeps the metadata of the image its window was placed
/// around and is tagged with the window size, unit, alignment and the number
/// of images reduced. Images whose window holds fewer than `min_observations`
/// images, themselves included, are dropped.
pub fn rolling(
    series: &TimeSeries,
    size: u32,
    unit: &str,
    align: Align,
    min_observations: usize,
    reducer: &dyn Reducer,
    keep_bandnames: bool,
) -> Result<TimeSeries> {
    let unit = parse_unit(unit)?;
    let mut output = Vec::with_capacity(series.len());

    for image in series.images() {
        let Some(center) = image.time_start else {
            continue;
        };
        let window = Window::around(center, size, unit, align)?;
        let neighbors = series.select(window.start, window.end);

        if neighbors.len() < min_observations {
            debug!(
                center = %center,
                count = neighbors.len(),
                min_observations,
                "Dropping image with too few observations"
            );
            continue;
        }

        let refs: Vec<&Image> = neighbors.iter().collect();
        let mut reduced = reduce_images(&refs, reducer)?.copy_properties(image);
        reduced.id = image.id.clone();
        reduced.time_start = image.time_start;
        reduced.time_end = image.time_end;
        reduced.footprint = image.footprint;
        reduced.set(WINDOW_SIZE_KEY, size as f64);
        reduced.set(WINDOW_UNIT_KEY, unit.name());
        reduced.set(WINDOW_ALIGN_KEY, align.name());
        reduced.set(WINDOW_COUNT_KEY, neighbors.len());

        if keep_bandnames {
            reduced = reduced.rename(image.bands().to_vec())?;
        }
        output.push(reduced);
    }

    debug!(
        input = series.len(),
        output = output.len(),
        size,
        unit = %unit,
        align = %align,
        "Computed rolling reduction"
    );

    let mut result = TimeSeries::new(output)?;
    result.set_id(series.id().map(str::to_string));
    Ok(result)
}

/// Fill masked pixels from a reduction of each image's window.
///
/// Valid pixels are never changed. Pixels still masked after filling from the
/// window (gaps wider than the window) are set to `fill_value` when given and
/// left masked otherwise.
pub fn fill_gaps(
    series: &TimeSeries,
    size: u32,
    unit: &str,
    align: Align,
    reducer: &dyn Reducer,
    fill_value: Option<f32>,
) -> Result<TimeSeries> {
    let unit = parse_unit(unit)?;
    let mut output = Vec::with_capacity(series.len());

    for image in series.images() {
        let center = image.time_start.ok_or_else(|| {
            HadleyError::missing_property(TIME_START, "image has no start time")
        })?;
        let window = Window::around(center, size, unit, align)?;
        let refs: Vec<&Image> = series.select(window.start, window.end).iter().collect();
        let neighborhood = reduce_images(&refs, reducer)?;

        output.push(image.clone().fill_masked(&neighborhood, fill_value)?);
    }

    let mut result = TimeSeries::new(output)?;
    result.set_id(series.id().map(str::to_string));
    Ok(result)
}

impl TimeSeries {
    /// Rolling reduction; see [`rolling`].
    pub fn rolling_time(
        &self,
        size: u32,
        unit: &str,
        align: Align,
        min_observations: usize,
        reducer: &dyn Reducer,
        keep_bandnames: bool,
    ) -> Result<TimeSeries> {
        rolling(self, size, unit, align, min_observations, reducer, keep_bandnames)
    }

    /// Gap-fill masked pixels; see [`fill_gaps`].
    pub fn fill_gaps(
        &self,
        size: u32,
        unit: &str,
        align: Align,
        reducer: &dyn Reducer,
        fill_value: Option<f32>,
    ) -> Result<TimeSeries> {
        fill_gaps(self, size, unit, align, reducer, fill_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reducer::{Count, Mean};
    use chrono::{Duration, TimeZone};

    fn center() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 6, 15, 0, 0, 0).unwrap()
    }

    /// Daily images valued by their day offset from the center
    fn series(offsets: std::ops::RangeInclusive<i64>) -> TimeSeries {
        TimeSeries::new(
            offsets
                .map(|i| {
                    Image::constant(&["b"], i as f32, (1, 1))
                        .with_time(center() + Duration::days(i))
                        .with_id(format!("day{}", i))
                })
                .collect(),
        )
        .unwrap()
        .with_id("daily")
    }

    fn offsets(s: &TimeSeries) -> Vec<f32> {
        s.images().iter().filter_map(|img| img.value(0, 0, 0)).collect()
    }

    #[test]
    fn test_window_membership() {
        let s = series(-3..=3);
        let window = |align| get_window(&s, center(), 3, "day", align).unwrap();
        assert_eq!(offsets(&window(Align::Center)), vec![-1.0, 0.0, 1.0]);
        assert_eq!(offsets(&window(Align::Left)), vec![-2.0, -1.0, 0.0]);
        assert_eq!(offsets(&window(Align::Right)), vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_unknown_window_unit() {
        let s = series(0..=1);
        assert!(matches!(
            get_window(&s, center(), 3, "fortnight", Align::Center),
            Err(HadleyError::UnknownFrequency { .. })
        ));
    }

    #[test]
    fn test_rolling_mean_and_metadata() {
        let s = series(0..=4);
        let rolled = rolling(&s, 3, "day", Align::Center, 1, &Mean, true).unwrap();
        assert_eq!(rolled.len(), 5);
        assert_eq!(rolled.id(), Some("daily"));
        assert_eq!(offsets(&rolled), vec![0.5, 1.0, 2.0, 3.0, 3.5]);

        let first = &rolled.images()[0];
        assert_eq!(first.id.as_deref(), Some("day0"));
        assert_eq!(first.bands(), &["b".to_string()]);
        assert_eq!(first.get(WINDOW_SIZE_KEY).and_then(|v| v.as_number()), Some(3.0));
        assert_eq!(first.get(WINDOW_UNIT_KEY).and_then(|v| v.as_text()), Some("day"));
        assert_eq!(first.get(WINDOW_ALIGN_KEY).and_then(|v| v.as_text()), Some("center"));
        assert_eq!(first.get(WINDOW_COUNT_KEY).and_then(|v| v.as_number()), Some(2.0));
        assert_eq!(rolled.images()[2].get(WINDOW_COUNT_KEY).and_then(|v| v.as_number()), Some(3.0));
    }

    #[test]
    fn test_rolling_min_observations() {
        let s = series(0..=4);
        let rolled = rolling(&s, 3, "day", Align::Right, 3, &Count, false).unwrap();
        assert_eq!(rolled.len(), 3);
        assert_eq!(rolled.images()[0].bands(), &["b_count".to_string()]);
        assert_eq!(rolled.images()[2].id.as_deref(), Some("day2"));
    }

    fn gappy() -> TimeSeries {
        TimeSeries::new(vec![
            Image::constant(&["b"], 1.0, (1, 1)).with_time(center() - Duration::days(1)),
            Image::constant(&["b"], 0.0, (1, 1))
                .with_time(center())
                .masked_where(|_, _, _| true),
            Image::constant(&["b"], 2.0, (1, 1)).with_time(center() + Duration::days(1)),
        ])
        .unwrap()
    }

    #[test]
    fn test_fill_gaps_from_neighbors() {
        let filled = fill_gaps(&gappy(), 3, "day", Align::Center, &Mean, None).unwrap();
        assert_eq!(filled.len(), 3);
        assert_eq!(filled.images()[1].value(0, 0, 0), Some(1.5));
        // Valid pixels are untouched
        assert_eq!(filled.images()[0].value(0, 0, 0), Some(1.0));
        assert_eq!(filled.images()[2].value(0, 0, 0), Some(2.0));
    }

    #[test]
    fn test_fill_gaps_with_fill_value() {
        let masked = TimeSeries::new(
            (0..3)
                .map(|i| {
                    Image::constant(&["b"], 9.0, (1, 1))
                        .with_time(center() + Duration::days(i))
                        .masked_where(|_, _, _| true)
                })
                .collect(),
        )
        .unwrap();

        let left_masked = fill_gaps(&masked, 3, "day", Align::Center, &Mean, None).unwrap();
        assert_eq!(left_masked.images()[1].value(0, 0, 0), None);

        let filled = fill_gaps(&masked, 3, "day", Align::Center, &Mean, Some(5.0)).unwrap();
        assert!(filled.images().iter().all(|img| img.value(0, 0, 0) == Some(5.0)));
    }

    #[test]
    fn test_fill_gaps_window_too_narrow() {
        let filled = fill_gaps(&gappy(), 1, "hour", Align::Center, &Mean, None).unwrap();
        assert_eq!(filled.images()[1].value(0, 0, 0), None);
    }
}
