//! Temporal interpolation between images.
//!
//! An interpolator estimates an image at an arbitrary time from the images
//! bracketing it. Each method declares how many neighbors it needs on either
//! side of the target and combines them with a scalar kernel applied pixel by
//! pixel.

pub mod common;
pub mod cubic;
pub mod linear;
pub mod nearest;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{HadleyError, Result};
use crate::image::Image;
use crate::series::TimeSeries;

pub use cubic::cubic;
pub use linear::linear;
pub use nearest::nearest;

/// Names accepted by [`get_interpolator`]
pub const INTERPOLATION_METHODS: [&str; 3] = ["cubic", "linear", "nearest"];

/// Trait for interpolation methods
pub trait Interpolator: Send + Sync {
    /// Number of images needed strictly before the target and at or after it
    fn neighbors(&self) -> (usize, usize);

    /// Interpolate one pixel from its neighbor values at fractional position `mu`
    /// between the two images bracketing the target.
    fn kernel(&self, values: &[f32], mu: f64) -> f32;

    /// Interpolate whole images. A pixel is valid only where every neighbor is.
    fn interpolate_images(&self, images: &[&Image], mu: f64) -> Result<Image> {
        Image::zip_map(images, |values| self.kernel(values, mu))
    }

    /// Get the name of this interpolation method
    fn name(&self) -> &str;
}

/// Get an interpolator by name
pub fn get_interpolator(name: &str) -> Result<Box<dyn Interpolator>> {
    match name.to_lowercase().as_str() {
        "nearest" => Ok(Box::new(nearest::NearestInterpolator)),
        "linear" => Ok(Box::new(linear::LinearInterpolator)),
        "cubic" => Ok(Box::new(cubic::CubicInterpolator)),
        _ => Err(HadleyError::InvalidParameter {
            param: "interpolation".to_string(),
            message: format!(
                "Unknown interpolation method: {}. Must be one of: {}",
                name,
                INTERPOLATION_METHODS.join(", ")
            ),
        }),
    }
}

/// Interpolate `series` at `target` with the named method.
///
/// The target must lie within the time range of the series and have enough
/// neighbors on each side for the method, otherwise this fails with
/// [`HadleyError::InsufficientNeighbors`]. The result is stamped with `target`
/// and carries no other metadata.
pub fn interpolate(series: &TimeSeries, target: DateTime<Utc>, method: &str) -> Result<Image> {
    let interpolator = get_interpolator(method)?;
    interpolate_with(series, target, interpolator.as_ref())
}

/// [`interpolate`] with an already resolved method.
pub fn interpolate_with(
    series: &TimeSeries,
    target: DateTime<Utc>,
    interpolator: &dyn Interpolator,
) -> Result<Image> {
    let (before, after) = interpolator.neighbors();
    if before == 0 || after == 0 {
        return Err(HadleyError::invalid_parameter(
            "interpolator",
            format!(
                "{} needs at least one neighbor on each side, got ({}, {})",
                interpolator.name(),
                before,
                after
            ),
        ));
    }
    let neighbors = common::bracket(series, target, before, after)?;

    let x1 = neighbors[before - 1].time_start;
    let x2 = neighbors[before].time_start;
    let mu = match (x1, x2) {
        (Some(x1), Some(x2)) => common::fraction(x1, x2, target),
        _ => {
            return Err(HadleyError::invalid_parameter(
                "series",
                "bracketing images have no start time",
            ))
        }
    };

    debug!(
        method = interpolator.name(),
        target = %target,
        mu,
        "Interpolating image"
    );

    Ok(interpolator.interpolate_images(&neighbors, mu)?.with_time(target))
}

impl TimeSeries {
    /// Interpolate an image at `target`; see [`interpolate`].
    pub fn interpolate_time(&self, target: DateTime<Utc>, method: &str) -> Result<Image> {
        interpolate(self, target, method)
    }
}
