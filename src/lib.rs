//! # hadley
//!
//! Time-series resampling, climatology and gap-filling for raster image collections.
//!
//! This library provides the core functionality for treating a collection of
//! timestamped, multi-band images as a time series: aggregating it to coarser
//! frequencies, building climatologies and anomalies, interpolating in time,
//! applying rolling reductions and writing results to NetCDF.
//!
//! ## Key Features
//!
//! - **Resampling**: Aggregate images to hourly, daily, weekly, monthly or yearly steps
//! - **Climatologies**: Month and day-of-year means and standard deviations, with anomalies
//! - **Temporal interpolation**: Nearest, linear and cubic interpolation between images
//! - **Rolling windows**: Moving reductions and gap-filling of masked pixels
//! - **Export**: Concurrent per-image NetCDF export and merging into a labelled dataset
//!
//! ## Architecture
//!
//! - **Data Layer**: `Image` and `TimeSeries` hold masked band stacks in memory
//! - **Processing**: Frequency registry, reducers, windows and interpolators
//! - **IO Layer**: NetCDF loading and export (behind the `netcdf` feature)

pub mod aggregate;
pub mod climatology;
pub mod config;
pub mod dataset;
pub mod error;
#[cfg(feature = "netcdf")]
pub mod export;
pub mod frequency;
pub mod image;
pub mod interpolation;
pub mod logging;
#[cfg(feature = "netcdf")]
pub mod netcdf_io;
pub mod reducer;
pub mod rolling;
pub mod series;
pub mod window;

pub use climatology::Climatology;
pub use config::Config;
pub use dataset::{Coordinate, Dataset};
pub use error::{HadleyError, Result};
#[cfg(feature = "netcdf")]
pub use export::{ExportOptions, ExportedFile};
pub use frequency::{get_climatology_frequency, get_frequency, TimeUnit};
pub use image::{Bounds, Image, PropertyValue};
pub use interpolation::{get_interpolator, Interpolator};
pub use logging::{
    init_tracing, log_error, log_operation_end, log_operation_start, log_series_stats,
    log_timed_operation,
};
pub use reducer::{get_reducer, Reducer};
pub use series::TimeSeries;
pub use window::Align;
