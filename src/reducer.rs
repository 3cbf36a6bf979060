//! Pixel-wise statistical reducers.
//!
//! A reducer collapses the valid values of one pixel across a set of images into
//! a single value. Callers can supply their own by implementing [`Reducer`]; the
//! built-in statistics are available by name through [`get_reducer`].

use ndarray::Array3;
use std::fmt::Debug;
use std::sync::Arc;

use crate::error::{HadleyError, Result};
use crate::image::Image;

/// Trait for pixel-wise statistics
pub trait Reducer: Debug + Send + Sync {
    /// Reduce the valid values of one pixel. `values` may be empty, in which
    /// case returning `None` masks the output pixel.
    fn reduce(&self, values: &[f32]) -> Option<f32>;

    /// Name of the statistic, appended to band names when they are not kept
    fn name(&self) -> &str;
}

#[derive(Debug, Clone, Copy)]
pub struct Mean;

impl Reducer for Mean {
    fn reduce(&self, values: &[f32]) -> Option<f32> {
        if values.is_empty() {
            return None;
        }
        let sum: f64 = values.iter().map(|v| f64::from(*v)).sum();
        Some((sum / values.len() as f64) as f32)
    }

    fn name(&self) -> &str {
        "mean"
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Median;

impl Reducer for Median {
    fn reduce(&self, values: &[f32]) -> Option<f32> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 0 {
            Some((sorted[mid - 1] + sorted[mid]) / 2.0)
        } else {
            Some(sorted[mid])
        }
    }

    fn name(&self) -> &str {
        "median"
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Min;

impl Reducer for Min {
    fn reduce(&self, values: &[f32]) -> Option<f32> {
        values.iter().copied().reduce(f32::min)
    }

    fn name(&self) -> &str {
        "min"
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Max;

impl Reducer for Max {
    fn reduce(&self, values: &[f32]) -> Option<f32> {
        values.iter().copied().reduce(f32::max)
    }

    fn name(&self) -> &str {
        "max"
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Sum;

impl Reducer for Sum {
    fn reduce(&self, values: &[f32]) -> Option<f32> {
        if values.is_empty() {
            return None;
        }
        Some(values.iter().map(|v| f64::from(*v)).sum::<f64>() as f32)
    }

    fn name(&self) -> &str {
        "sum"
    }
}

/// Population standard deviation
#[derive(Debug, Clone, Copy)]
pub struct StdDev;

impl Reducer for StdDev {
    fn reduce(&self, values: &[f32]) -> Option<f32> {
        variance(values).map(|v| v.sqrt() as f32)
    }

    fn name(&self) -> &str {
        "stdDev"
    }
}

/// Population variance
#[derive(Debug, Clone, Copy)]
pub struct Variance;

impl Reducer for Variance {
    fn reduce(&self, values: &[f32]) -> Option<f32> {
        variance(values).map(|v| v as f32)
    }

    fn name(&self) -> &str {
        "variance"
    }
}

/// Number of valid values; never masks
#[derive(Debug, Clone, Copy)]
pub struct Count;

impl Reducer for Count {
    fn reduce(&self, values: &[f32]) -> Option<f32> {
        Some(values.len() as f32)
    }

    fn name(&self) -> &str {
        "count"
    }
}

#[derive(Debug, Clone, Copy)]
pub struct First;

impl Reducer for First {
    fn reduce(&self, values: &[f32]) -> Option<f32> {
        values.first().copied()
    }

    fn name(&self) -> &str {
        "first"
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Last;

impl Reducer for Last {
    fn reduce(&self, values: &[f32]) -> Option<f32> {
        values.last().copied()
    }

    fn name(&self) -> &str {
        "last"
    }
}

fn variance(values: &[f32]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().map(|v| f64::from(*v)).sum::<f64>() / n;
    Some(
        values
            .iter()
            .map(|v| (f64::from(*v) - mean).powi(2))
            .sum::<f64>()
            / n,
    )
}

/// Names accepted by [`get_reducer`]
pub const REDUCER_NAMES: [&str; 10] = [
    "count", "first", "last", "max", "mean", "median", "min", "stddev", "sum", "variance",
];

/// Get a built-in reducer by name
pub fn get_reducer(name: &str) -> Result<Arc<dyn Reducer>> {
    match name.to_lowercase().as_str() {
        "mean" => Ok(Arc::new(Mean)),
        "median" => Ok(Arc::new(Median)),
        "min" => Ok(Arc::new(Min)),
        "max" => Ok(Arc::new(Max)),
        "sum" => Ok(Arc::new(Sum)),
        "stddev" | "std" => Ok(Arc::new(StdDev)),
        "variance" => Ok(Arc::new(Variance)),
        "count" => Ok(Arc::new(Count)),
        "first" => Ok(Arc::new(First)),
        "last" => Ok(Arc::new(Last)),
        _ => Err(HadleyError::InvalidParameter {
            param: "reducer".to_string(),
            message: format!(
                "Unknown reducer: {}. Must be one of: {}",
                name,
                REDUCER_NAMES.join(", ")
            ),
        }),
    }
}

/// Reduce a set of compatible images pixel by pixel.
///
/// Masked input pixels are skipped. Output bands are named
/// `{band}_{reducer}` after the first image's bands, and the result carries no
/// time, properties or footprint.
pub fn reduce_images(images: &[&Image], reducer: &dyn Reducer) -> Result<Image> {
    let first = images.first().ok_or_else(|| {
        HadleyError::invalid_parameter("images", "cannot reduce an empty set of images")
    })?;
    for image in &images[1..] {
        first.check_compatible(image)?;
    }

    let dim = first.data().raw_dim();
    let mut data = Array3::<f32>::zeros(dim);
    let mut valid = Array3::from_elem(dim, false);
    let mut values = Vec::with_capacity(images.len());

    for ((idx, out), out_valid) in data.indexed_iter_mut().zip(valid.iter_mut()) {
        values.clear();
        values.extend(
            images
                .iter()
                .filter(|img| img.valid()[idx])
                .map(|img| img.data()[idx]),
        );
        if let Some(value) = reducer.reduce(&values) {
            *out = value;
            *out_valid = true;
        }
    }

    let bands = first
        .bands()
        .iter()
        .map(|band| format!("{}_{}", band, reducer.name()))
        .collect();

    Image::with_mask(bands, data, valid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_statistics() {
        let values = [1.0, 2.0, 3.0, 6.0];
        assert_eq!(Mean.reduce(&values), Some(3.0));
        assert_eq!(Median.reduce(&values), Some(2.5));
        assert_eq!(Min.reduce(&values), Some(1.0));
        assert_eq!(Max.reduce(&values), Some(6.0));
        assert_eq!(Sum.reduce(&values), Some(12.0));
        assert_eq!(Count.reduce(&values), Some(4.0));
        assert_eq!(First.reduce(&values), Some(1.0));
        assert_eq!(Last.reduce(&values), Some(6.0));
        assert_eq!(Variance.reduce(&values), Some(3.5));
        assert!((StdDev.reduce(&values).unwrap() - 3.5f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn test_empty_values() {
        assert_eq!(Mean.reduce(&[]), None);
        assert_eq!(StdDev.reduce(&[]), None);
        assert_eq!(Count.reduce(&[]), Some(0.0));
    }

    #[test]
    fn test_get_reducer() {
        assert_eq!(get_reducer("MEAN").unwrap().name(), "mean");
        assert_eq!(get_reducer("stdDev").unwrap().name(), "stdDev");
        assert!(get_reducer("mode").is_err());
    }

    #[test]
    fn test_reduce_images_skips_masked() {
        let a = Image::constant(&["b"], 1.0, (1, 2));
        let b = Image::constant(&["b"], 3.0, (1, 2)).masked_where(|_, _, x| x == 0);
        let c = Image::constant(&["b"], 0.0, (1, 2)).masked_where(|_, _, _| true);

        let reduced = reduce_images(&[&a, &b, &c], &Mean).unwrap();
        assert_eq!(reduced.bands(), &["b_mean".to_string()]);
        assert_eq!(reduced.value(0, 0, 0), Some(1.0));
        assert_eq!(reduced.value(0, 0, 1), Some(2.0));
    }

    #[test]
    fn test_reduce_images_all_masked() {
        let a = Image::constant(&["b"], 1.0, (1, 1)).masked_where(|_, _, _| true);
        let reduced = reduce_images(&[&a], &Max).unwrap();
        assert_eq!(reduced.value(0, 0, 0), None);
    }

    #[test]
    fn test_reduce_images_incompatible() {
        let a = Image::constant(&["b"], 1.0, (1, 1));
        let b = Image::constant(&["b"], 1.0, (2, 1));
        assert!(reduce_images(&[&a, &b], &Mean).is_err());
        assert!(reduce_images(&[], &Mean).is_err());
    }
}
