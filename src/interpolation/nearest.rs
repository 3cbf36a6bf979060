//! Nearest neighbor interpolation.
//!
//! Picks whichever of the two bracketing images is closer to the target,
//! taking the later image at exactly the midpoint.

use super::Interpolator;
use crate::error::Result;
use crate::image::Image;

/// Pick `y1` when `mu` is below one half, otherwise `y2`
pub fn nearest(y1: f64, y2: f64, mu: f64) -> f64 {
    if mu < 0.5 {
        y1
    } else {
        y2
    }
}

/// Nearest neighbor interpolator
pub struct NearestInterpolator;

impl Interpolator for NearestInterpolator {
    fn neighbors(&self) -> (usize, usize) {
        (1, 1)
    }

    fn kernel(&self, values: &[f32], mu: f64) -> f32 {
        nearest(f64::from(values[0]), f64::from(values[1]), mu) as f32
    }

    /// The chosen image is copied whole, mask included.
    fn interpolate_images(&self, images: &[&Image], mu: f64) -> Result<Image> {
        let chosen = if mu < 0.5 { images[0] } else { images[1] };
        Image::with_mask(
            chosen.bands().to_vec(),
            chosen.data().clone(),
            chosen.valid().clone(),
        )
    }

    fn name(&self) -> &str {
        "nearest"
    }
}
