//! Raster images with named bands, a validity mask and time-stamped metadata.
//!
//! An [`Image`] stores its pixels as a `(band, row, column)` array alongside a
//! boolean mask of the same shape. Masked pixels (`false` in the mask) carry no
//! data: they are skipped by reducers and are the pixels gap-filling replaces.

use chrono::{DateTime, Utc};
use ndarray::{Array2, Array3, ArrayView2, Axis, Zip};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{HadleyError, Result};

/// Name of the image start-time property, used in error messages
pub const TIME_START: &str = "system:time_start";
/// Property naming the dimension a derived image belongs to (e.g. "month")
pub const DIMENSION_KEY: &str = "hadley:dimension";
/// Property naming the coordinate of a derived image along its dimension
pub const COORDINATE_KEY: &str = "hadley:coordinate";

/// Possible property values attached to an image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    /// String property
    Text(String),
    /// Numeric property (stored as f64 for simplicity)
    Number(f64),
    /// Array of numbers
    NumberArray(Vec<f64>),
}

impl PropertyValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            PropertyValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Text(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::Text(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Number(value)
    }
}

impl From<usize> for PropertyValue {
    fn from(value: usize) -> Self {
        PropertyValue::Number(value as f64)
    }
}

/// Spatial footprint of an image in its native coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
}

impl Bounds {
    /// The smallest bounds covering both `self` and `other`
    pub fn union(&self, other: &Bounds) -> Bounds {
        Bounds {
            x_min: self.x_min.min(other.x_min),
            y_min: self.y_min.min(other.y_min),
            x_max: self.x_max.max(other.x_max),
            y_max: self.y_max.max(other.y_max),
        }
    }

    /// Union of an iterator of bounds, `None` when empty
    pub fn union_all<'a>(bounds: impl IntoIterator<Item = &'a Bounds>) -> Option<Bounds> {
        bounds
            .into_iter()
            .fold(None, |acc: Option<Bounds>, b| match acc {
                Some(acc) => Some(acc.union(b)),
                None => Some(*b),
            })
    }
}

/// A multi-band raster with a timestamp and free-form properties.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    /// Identifier, the `system:id` equivalent
    pub id: Option<String>,
    bands: Vec<String>,
    data: Array3<f32>,
    valid: Array3<bool>,
    /// Non-system properties
    pub properties: BTreeMap<String, PropertyValue>,
    /// Start of the time covered by the image
    pub time_start: Option<DateTime<Utc>>,
    /// End of the time covered by the image
    pub time_end: Option<DateTime<Utc>>,
    /// Spatial footprint, `None` for unbounded images
    pub footprint: Option<Bounds>,
}

impl Image {
    /// Create an unmasked image from band names and a `(band, row, col)` array.
    pub fn new(bands: Vec<String>, data: Array3<f32>) -> Result<Self> {
        let valid = Array3::from_elem(data.raw_dim(), true);
        Self::with_mask(bands, data, valid)
    }

    /// Create an image with an explicit validity mask.
    pub fn with_mask(bands: Vec<String>, data: Array3<f32>, valid: Array3<bool>) -> Result<Self> {
        if bands.len() != data.len_of(Axis(0)) {
            return Err(HadleyError::IncompatibleBands {
                message: format!(
                    "{} band names given for {} bands of data",
                    bands.len(),
                    data.len_of(Axis(0))
                ),
            });
        }
        if valid.shape() != data.shape() {
            return Err(HadleyError::IncompatibleBands {
                message: format!(
                    "mask shape {:?} does not match data shape {:?}",
                    valid.shape(),
                    data.shape()
                ),
            });
        }

        Ok(Self {
            id: None,
            bands,
            data,
            valid,
            properties: BTreeMap::new(),
            time_start: None,
            time_end: None,
            footprint: None,
        })
    }

    /// An image where every band has the same constant value.
    pub fn constant(bands: &[&str], value: f32, shape: (usize, usize)) -> Self {
        let data = Array3::from_elem((bands.len(), shape.0, shape.1), value);
        Self {
            id: None,
            bands: bands.iter().map(|b| b.to_string()).collect(),
            valid: Array3::from_elem(data.raw_dim(), true),
            data,
            properties: BTreeMap::new(),
            time_start: None,
            time_end: None,
            footprint: None,
        }
    }

    /// Builder: set the start time
    pub fn with_time(mut self, time: DateTime<Utc>) -> Self {
        self.time_start = Some(time);
        self
    }

    /// Builder: set the identifier
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Builder: set a property
    pub fn with_property(mut self, key: &str, value: impl Into<PropertyValue>) -> Self {
        self.set(key, value);
        self
    }

    /// Builder: replace the validity mask
    pub fn masked_where(mut self, mask: impl Fn(usize, usize, usize) -> bool) -> Self {
        for ((b, y, x), valid) in self.valid.indexed_iter_mut() {
            if mask(b, y, x) {
                *valid = false;
            }
        }
        self
    }

    pub fn set(&mut self, key: &str, value: impl Into<PropertyValue>) {
        self.properties.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    /// The dimension tag set on derived images
    pub fn dimension(&self) -> Option<&str> {
        self.get(DIMENSION_KEY).and_then(PropertyValue::as_text)
    }

    /// The coordinate tag set on derived images
    pub fn coordinate(&self) -> Option<&str> {
        self.get(COORDINATE_KEY).and_then(PropertyValue::as_text)
    }

    pub fn bands(&self) -> &[String] {
        &self.bands
    }

    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    pub fn valid(&self) -> &Array3<bool> {
        &self.valid
    }

    /// Grid shape as `(rows, cols)`
    pub fn shape(&self) -> (usize, usize) {
        let shape = self.data.shape();
        (shape[1], shape[2])
    }

    pub fn band_index(&self, name: &str) -> Option<usize> {
        self.bands.iter().position(|b| b == name)
    }

    /// View of one band's pixel values
    pub fn band(&self, index: usize) -> ArrayView2<'_, f32> {
        self.data.index_axis(Axis(0), index)
    }

    /// View of one band's validity mask
    pub fn band_mask(&self, index: usize) -> ArrayView2<'_, bool> {
        self.valid.index_axis(Axis(0), index)
    }

    /// Pixel value, `None` if masked or out of bounds
    pub fn value(&self, band: usize, row: usize, col: usize) -> Option<f32> {
        match self.valid.get((band, row, col)) {
            Some(true) => self.data.get((band, row, col)).copied(),
            _ => None,
        }
    }

    /// Number of unmasked pixels across all bands
    pub fn valid_count(&self) -> usize {
        self.valid.iter().filter(|v| **v).count()
    }

    /// Rename bands, keeping their order.
    pub fn rename(mut self, bands: Vec<String>) -> Result<Self> {
        if bands.len() != self.bands.len() {
            return Err(HadleyError::IncompatibleBands {
                message: format!(
                    "cannot rename {} bands to {:?}",
                    self.bands.len(),
                    bands
                ),
            });
        }
        self.bands = bands;
        Ok(self)
    }

    /// Copy all properties of `other` onto this image, overwriting existing keys.
    pub fn copy_properties(mut self, other: &Image) -> Self {
        for (key, value) in &other.properties {
            self.properties.insert(key.clone(), value.clone());
        }
        self
    }

    /// Bound the image to a footprint.
    pub fn clip(mut self, bounds: Option<Bounds>) -> Self {
        if bounds.is_some() {
            self.footprint = bounds;
        }
        self
    }

    /// Fail unless `other` has the same band count and grid shape.
    pub fn check_compatible(&self, other: &Image) -> Result<()> {
        if self.data.shape() != other.data.shape() {
            return Err(HadleyError::IncompatibleBands {
                message: format!(
                    "image {:?} has shape {:?} ({:?}) but image {:?} has shape {:?} ({:?})",
                    self.id,
                    self.data.shape(),
                    self.bands,
                    other.id,
                    other.data.shape(),
                    other.bands
                ),
            });
        }
        Ok(())
    }

    /// Fail unless `other` is compatible and has the same band names in the same order.
    pub fn check_same_bands(&self, other: &Image) -> Result<()> {
        self.check_compatible(other)?;
        if self.bands != other.bands {
            return Err(HadleyError::IncompatibleBands {
                message: format!(
                    "image {:?} has bands {:?} but image {:?} has bands {:?}",
                    self.id, self.bands, other.id, other.bands
                ),
            });
        }
        Ok(())
    }

    /// Combine compatible images pixel by pixel.
    ///
    /// `op` receives one value per image and the output pixel is valid only where
    /// every input pixel is valid and `op` returns a finite value. The result takes
    /// its band names from the first image and carries no metadata.
    pub fn zip_map(images: &[&Image], op: impl Fn(&[f32]) -> f32) -> Result<Image> {
        let first = images.first().ok_or_else(|| {
            HadleyError::invalid_parameter("images", "at least one image is required")
        })?;
        for image in &images[1..] {
            first.check_compatible(image)?;
        }

        let mut data = Array3::<f32>::zeros(first.data.raw_dim());
        let mut valid = Array3::from_elem(first.data.raw_dim(), false);
        let mut values = vec![0.0f32; images.len()];

        for ((idx, out), out_valid) in data.indexed_iter_mut().zip(valid.iter_mut()) {
            if !images.iter().all(|img| img.valid[idx]) {
                continue;
            }
            for (slot, img) in values.iter_mut().zip(images) {
                *slot = img.data[idx];
            }
            let result = op(&values);
            if result.is_finite() {
                *out = result;
                *out_valid = true;
            }
        }

        Image::with_mask(first.bands.clone(), data, valid)
    }

    /// Pixel-wise `self - other`, keeping this image's metadata.
    pub fn subtract(&self, other: &Image) -> Result<Image> {
        self.binary_op(other, |a, b| a - b)
    }

    /// Pixel-wise `self / other`, keeping this image's metadata. Division by zero masks the pixel.
    pub fn divide(&self, other: &Image) -> Result<Image> {
        self.binary_op(other, |a, b| a / b)
    }

    fn binary_op(&self, other: &Image, op: impl Fn(f32, f32) -> f32) -> Result<Image> {
        let combined = Image::zip_map(&[self, other], |v| op(v[0], v[1]))?;
        Ok(Image {
            id: self.id.clone(),
            properties: self.properties.clone(),
            time_start: self.time_start,
            time_end: self.time_end,
            footprint: self.footprint,
            ..combined
        })
    }

    /// Replace masked pixels with values from `other` where `other` is valid,
    /// then with `fill_value` (if any) where both are masked.
    pub fn fill_masked(mut self, other: &Image, fill_value: Option<f32>) -> Result<Image> {
        self.check_compatible(other)?;

        Zip::from(&mut self.data)
            .and(&mut self.valid)
            .and(&other.data)
            .and(&other.valid)
            .for_each(|value, valid, &other_value, &other_valid| {
                if *valid {
                    return;
                }
                if other_valid {
                    *value = other_value;
                    *valid = true;
                } else if let Some(fill) = fill_value {
                    *value = fill;
                    *valid = true;
                }
            });

        Ok(self)
    }

    /// Pixel values of one band with masked pixels replaced by `nodata`
    pub fn band_filled(&self, index: usize, nodata: f32) -> Array2<f32> {
        let mut out = self.band(index).to_owned();
        Zip::from(&mut out)
            .and(self.band_mask(index))
            .for_each(|value, &valid| {
                if !valid {
                    *value = nodata;
                }
            });
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_property_value_serialization() {
        let text = PropertyValue::Text("test".to_string());
        assert_eq!(serde_json::to_string(&text).unwrap(), r#""test""#);

        let number = PropertyValue::Number(42.0);
        assert_eq!(serde_json::to_string(&number).unwrap(), "42.0");

        let array = PropertyValue::NumberArray(vec![1.0, 2.0, 3.0]);
        assert_eq!(serde_json::to_string(&array).unwrap(), "[1.0,2.0,3.0]");
    }

    #[test]
    fn test_band_count_mismatch() {
        let data = Array3::<f32>::zeros((2, 1, 1));
        assert!(Image::new(vec!["a".to_string()], data).is_err());
    }

    #[test]
    fn test_subtract_propagates_mask() {
        let a = Image::new(vec!["b".to_string()], array![[[5.0f32, 3.0]]])
            .unwrap()
            .with_id("a");
        let b = Image::new(vec!["b".to_string()], array![[[1.0f32, 1.0]]])
            .unwrap()
            .masked_where(|_, _, x| x == 1);

        let diff = a.subtract(&b).unwrap();
        assert_eq!(diff.id.as_deref(), Some("a"));
        assert_eq!(diff.value(0, 0, 0), Some(4.0));
        assert_eq!(diff.value(0, 0, 1), None);
    }

    #[test]
    fn test_divide_by_zero_is_masked() {
        let a = Image::constant(&["b"], 2.0, (1, 1));
        let zero = Image::constant(&["b"], 0.0, (1, 1));
        assert_eq!(a.divide(&zero).unwrap().value(0, 0, 0), None);
    }

    #[test]
    fn test_fill_masked() {
        let image = Image::new(vec!["b".to_string()], array![[[7.0f32, 0.0, 0.0]]])
            .unwrap()
            .masked_where(|_, _, x| x > 0);
        let neighbors = Image::new(vec!["b".to_string()], array![[[1.0f32, 1.5, 0.0]]])
            .unwrap()
            .masked_where(|_, _, x| x == 2);

        let filled = image.clone().fill_masked(&neighbors, None).unwrap();
        assert_eq!(filled.value(0, 0, 0), Some(7.0));
        assert_eq!(filled.value(0, 0, 1), Some(1.5));
        assert_eq!(filled.value(0, 0, 2), None);

        let filled = image.fill_masked(&neighbors, Some(5.0)).unwrap();
        assert_eq!(filled.value(0, 0, 2), Some(5.0));
    }

    #[test]
    fn test_bounds_union() {
        let a = Bounds {
            x_min: 0.0,
            y_min: 0.0,
            x_max: 1.0,
            y_max: 1.0,
        };
        let b = Bounds {
            x_min: -1.0,
            y_min: 0.5,
            x_max: 0.5,
            y_max: 2.0,
        };
        let u = Bounds::union_all([&a, &b]).unwrap();
        assert_eq!(
            u,
            Bounds {
                x_min: -1.0,
                y_min: 0.0,
                x_max: 1.0,
                y_max: 2.0,
            }
        );
        assert!(Bounds::union_all(std::iter::empty()).is_none());
    }
}
