//! Test data generation utilities.
//!
//! This module provides functions to generate NetCDF time series with known
//! values for testing the hadley pipeline end to end.

use chrono::{Datelike, Months, NaiveDate};
use std::path::Path;

// Use the netcdf crate's error type directly
use netcdf::Error;
type Result<T> = std::result::Result<T, Error>;

/// Fill value used by the generated files
pub const FILL_VALUE: f32 = -9999.0;

/// Grid shape (rows, cols) of every generated file
pub const GRID: (usize, usize) = (2, 3);

/// Creates a daily NetCDF file starting 2020-01-01.
///
/// * `tmax` at step `t` is `t` everywhere, except pixel (0, 0) of the first
///   step which holds the fill value.
/// * `tmin` at step `t` is `t - 10`.
pub fn create_daily_nc(path: &Path, days: usize) -> Result<()> {
    let offsets: Vec<f64> = (0..days).map(|d| d as f64).collect();
    let tmax = |t: usize, y: usize, x: usize| {
        if t == 0 && y == 0 && x == 0 {
            FILL_VALUE
        } else {
            t as f32
        }
    };
    let tmin = |t: usize, _: usize, _: usize| t as f32 - 10.0;

    write_nc(
        path,
        "Daily Test Data",
        &offsets,
        &[("tmax", &tmax), ("tmin", &tmin)],
    )
}

/// Creates a monthly NetCDF file with one image on the first of each month
/// from January 2020.
///
/// `tmax` is the month number plus 10 per year after 2020, so March 2021 is 13.
pub fn create_monthly_nc(path: &Path, months: usize) -> Result<()> {
    let epoch = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
    let dates: Vec<NaiveDate> = (0..months)
        .map(|m| epoch.checked_add_months(Months::new(m as u32)).unwrap())
        .collect();
    let offsets: Vec<f64> = dates
        .iter()
        .map(|d| (*d - epoch).num_days() as f64)
        .collect();

    let tmax = move |t: usize, _: usize, _: usize| {
        let date = dates[t];
        date.month() as f32 + 10.0 * (date.year() - 2020) as f32
    };

    write_nc(path, "Monthly Test Data", &offsets, &[("tmax", &tmax)])
}

type Generator<'a> = &'a dyn Fn(usize, usize, usize) -> f32;

fn write_nc(
    path: &Path,
    title: &str,
    day_offsets: &[f64],
    variables: &[(&str, Generator<'_>)],
) -> Result<()> {
    let (rows, cols) = GRID;
    let mut file = netcdf::create(path)?;

    // Add dimensions
    file.add_dimension("time", day_offsets.len())?;
    file.add_dimension("lat", rows)?;
    file.add_dimension("lon", cols)?;

    // Add file attributes
    file.add_attribute("title", title)?;
    file.add_attribute("institution", "hadley test suite")?;

    {
        let mut time_var = file.add_variable::<f64>("time", &["time"])?;
        time_var.put_attribute("units", "days since 2020-01-01 00:00:00")?;
        time_var.put_values(day_offsets, ..)?;
    }

    {
        let lat_values: Vec<f64> = (0..rows).map(|i| 40.0 + i as f64).collect();
        let mut lat_var = file.add_variable::<f64>("lat", &["lat"])?;
        lat_var.put_attribute("units", "degrees_north")?;
        lat_var.put_values(&lat_values, ..)?;
    }

    {
        let lon_values: Vec<f64> = (0..cols).map(|i| -120.0 + i as f64).collect();
        let mut lon_var = file.add_variable::<f64>("lon", &["lon"])?;
        lon_var.put_attribute("units", "degrees_east")?;
        lon_var.put_values(&lon_values, ..)?;
    }

    for (name, generate) in variables {
        let mut values = Vec::with_capacity(day_offsets.len() * rows * cols);
        for t in 0..day_offsets.len() {
            for y in 0..rows {
                for x in 0..cols {
                    values.push(generate(t, y, x));
                }
            }
        }

        let mut var = file.add_variable::<f32>(name, &["time", "lat", "lon"])?;
        var.put_attribute("_FillValue", FILL_VALUE)?;
        var.put_attribute("units", "degC")?;
        var.put_values(&values, ..)?;
    }

    Ok(())
}
