//! Integration tests for hadley
//!
//! These tests load NetCDF files from disk, run them through the processing
//! pipeline and write the results back, verifying values end to end.

#![cfg(feature = "netcdf")]

mod common;

use chrono::{TimeZone, Utc};
use common::assertions::{assert_array_approx_eq, assert_pixel_approx_eq};
use common::test_data::{self, GRID};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use tempfile::TempDir;

use hadley::export::{export_series, ExportOptions};
use hadley::netcdf_io::{load_series, write_climatology, write_series};
use hadley::reducer::{Mean, Reducer};
use hadley::{Align, Coordinate, Dataset, HadleyError, PropertyValue, TimeSeries};

const DAYS: usize = 60;

fn daily_series() -> (TempDir, TimeSeries) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("daily.nc");
    test_data::create_daily_nc(&path, DAYS).unwrap();
    let series = load_series(&path, None).unwrap();
    (dir, series)
}

fn monthly_series(months: usize) -> (TempDir, TimeSeries) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("monthly.nc");
    test_data::create_monthly_nc(&path, months).unwrap();
    let series = load_series(&path, None).unwrap();
    (dir, series)
}

#[test]
fn test_load_daily_series() {
    let (_dir, series) = daily_series();

    assert_eq!(series.len(), DAYS);
    assert_eq!(series.id(), Some("daily"));
    assert_eq!(
        series.start_time(),
        Some(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap())
    );
    assert_eq!(
        series.end_time(),
        Some(Utc.with_ymd_and_hms(2020, 2, 29, 0, 0, 0).unwrap())
    );

    let first = &series.images()[0];
    assert_eq!(first.bands(), &["tmax".to_string(), "tmin".to_string()]);
    assert_eq!(first.shape(), GRID);
    assert_eq!(first.id.as_deref(), Some("daily/20200101T000000"));
    assert_eq!(
        first.get("title"),
        Some(&PropertyValue::from("Daily Test Data"))
    );

    // The fill value is masked, its neighbors are not
    assert_eq!(first.value(0, 0, 0), None);
    assert_eq!(first.value(0, 1, 1), Some(0.0));
    assert_eq!(first.value(1, 0, 0), Some(-10.0));
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let result = load_series(&dir.path().join("missing.nc"), None);
    assert!(matches!(result, Err(HadleyError::Io(_))));
}

#[test]
fn test_monthly_aggregation_round_trip() {
    let (dir, series) = daily_series();

    let monthly = series.aggregate_time("month", &Mean, true).unwrap();
    assert_eq!(monthly.len(), 2);
    assert_eq!(
        monthly.times(),
        vec![
            Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2020, 2, 1, 0, 0, 0).unwrap(),
        ]
    );

    // January holds days 0..=30, February days 31..=59
    assert_pixel_approx_eq(monthly.images()[0].value(0, 1, 1), 15.0, None);
    assert_pixel_approx_eq(monthly.images()[1].value(0, 1, 1), 45.0, None);
    // The masked first day is left out of the January mean
    assert_pixel_approx_eq(monthly.images()[0].value(0, 0, 0), 15.5, None);

    let output = dir.path().join("monthly_mean.nc");
    write_series(&monthly, &output, -32_768.0).unwrap();
    let reloaded = load_series(&output, None).unwrap();

    assert_eq!(reloaded.times(), monthly.times());
    let values: Vec<f32> = reloaded
        .images()
        .iter()
        .filter_map(|img| img.value(1, 1, 2))
        .collect();
    assert_array_approx_eq(&values, &[5.0, 35.0], None);
}

#[test]
fn test_aggregation_renames_bands() {
    let (_dir, series) = daily_series();
    let weekly = series.aggregate_time("week", &Mean, false).unwrap();
    assert_eq!(
        weekly.images()[0].bands(),
        &["tmax_mean".to_string(), "tmin_mean".to_string()]
    );
}

#[test]
fn test_climatology_and_anomaly() {
    let (dir, series) = monthly_series(36);
    let reducer: Arc<dyn Reducer> = Arc::new(Mean);

    let mean = series
        .climatology_mean("month", reducer.clone(), None, None, true)
        .unwrap();
    assert_eq!(mean.len(), 12);
    assert_eq!(mean.statistic, "mean");

    // March is 3, 13 and 23 across the three years
    let march = mean.get("3").unwrap();
    assert_pixel_approx_eq(march.value(0, 0, 0), 13.0, None);

    let dataset = Dataset::from_climatology(&mean).unwrap();
    assert_eq!(dataset.dimension(), "month");
    assert_eq!(dataset.coordinates().len(), 12);
    assert_eq!(
        dataset.value("tmax", &Coordinate::Index(12), 1, 2),
        Some(22.0)
    );

    let anomalies = series.climatology_anomaly(&mean, None).unwrap();
    assert_eq!(anomalies.len(), 36);
    // January 2022 is 21 against a January mean of 11
    assert_pixel_approx_eq(anomalies.images()[24].value(0, 1, 1), 10.0, None);
    assert_pixel_approx_eq(anomalies.images()[0].value(0, 1, 1), -10.0, None);

    let std = series
        .climatology_std("month", reducer, None, None, true)
        .unwrap();
    let standardized = series.climatology_anomaly(&mean, Some(&std)).unwrap();
    let expected = 10.0 / (200.0f32 / 3.0).sqrt();
    assert_pixel_approx_eq(
        standardized.images()[24].value(0, 0, 0),
        expected,
        Some(1e-4),
    );

    let output = dir.path().join("climatology.nc");
    write_climatology(&mean, &output, -32_768.0).unwrap();
    assert!(output.exists());
}

#[test]
fn test_interpolate_between_days() {
    let (_dir, series) = daily_series();
    let target = Utc.with_ymd_and_hms(2020, 1, 2, 12, 0, 0).unwrap();

    let linear = series.interpolate_time(target, "linear").unwrap();
    assert_eq!(linear.time_start, Some(target));
    assert_pixel_approx_eq(linear.value(0, 1, 1), 1.5, None);

    let nearest = series.interpolate_time(target, "nearest").unwrap();
    assert_pixel_approx_eq(nearest.value(1, 1, 1), -8.0, None);

    let before = Utc.with_ymd_and_hms(2019, 12, 31, 0, 0, 0).unwrap();
    assert!(matches!(
        series.interpolate_time(before, "linear"),
        Err(HadleyError::InsufficientNeighbors { .. })
    ));
}

#[test]
fn test_rolling_and_gap_fill() {
    let (_dir, series) = daily_series();

    let rolled = series
        .rolling_time(3, "day", Align::Left, 1, &Mean, true)
        .unwrap();
    assert_eq!(rolled.len(), DAYS);
    // Day 10 averages days 8, 9 and 10
    assert_pixel_approx_eq(rolled.images()[10].value(0, 1, 1), 9.0, None);

    let filled = series
        .fill_gaps(3, "day", Align::Center, &Mean, None)
        .unwrap();
    // The masked first pixel takes the value of the only valid neighbor
    assert_pixel_approx_eq(filled.images()[0].value(0, 0, 0), 1.0, None);
    assert_pixel_approx_eq(filled.images()[0].value(0, 1, 1), 0.0, None);
}

#[tokio::test]
async fn test_export_and_merge() {
    let (_dir, series) = daily_series();
    let subset = TimeSeries::new(series.images()[..5].to_vec())
        .unwrap()
        .with_id("daily");
    let out = tempfile::tempdir().unwrap();

    let options = ExportOptions {
        prefix: Some("run".to_string()),
        file_per_band: true,
        workers: 2,
        ..Default::default()
    };
    let files = export_series(&subset, out.path(), &options).await.unwrap();
    assert_eq!(files.len(), 10);
    assert_eq!(
        files[1].path.file_name().and_then(|n| n.to_str()),
        Some("run_daily_20200101T000000.time.20200101T000000.tmin.nc")
    );

    let dataset = subset.to_dataset(&ExportOptions::default()).await.unwrap();
    assert_eq!(dataset.variable_names(), vec!["tmax", "tmin"]);
    assert_eq!(dataset.coordinates().len(), 5);

    let first = dataset.coordinates()[0].clone();
    assert_eq!(dataset.value("tmax", &first, 0, 0), None);
    assert_eq!(dataset.value("tmin", &first, 0, 0), Some(-10.0));
}
