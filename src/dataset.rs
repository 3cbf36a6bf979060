//! Labeled datasets built from per-band rasters.
//!
//! Exported files are named `{id}.{dimension}.{coordinate}.{variable}.{ext}`.
//! Parsing those names gives each single-band raster a position along one
//! dimension, and [`Dataset::merge`] stacks them into variables indexed by
//! that dimension.

use chrono::NaiveDateTime;
use ndarray::{Array2, Array3, Axis};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tracing::warn;

use crate::climatology::Climatology;
use crate::error::{HadleyError, Result};
use crate::image::{Image, TIME_START};
use crate::series::TimeSeries;

/// Dimension used for images without a dimension tag
pub const TIME_DIMENSION: &str = "time";
/// Format of time coordinates embedded in file names
pub const TIME_FORMAT: &str = "%Y%m%dT%H%M%S";

/// Position of an array along its dimension
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Coordinate {
    Time(NaiveDateTime),
    Index(i64),
    /// A time coordinate that could not be parsed
    Raw(String),
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Coordinate::Time(t) => write!(f, "{}", t.format("%Y-%m-%dT%H:%M:%S")),
            Coordinate::Index(i) => write!(f, "{}", i),
            Coordinate::Raw(s) => f.write_str(s),
        }
    }
}

/// Parse a coordinate string for `dimension`.
///
/// Time coordinates that fail to parse are kept as [`Coordinate::Raw`] with a
/// warning; any other dimension must have an integer coordinate.
pub fn parse_coordinate(dimension: &str, raw: &str) -> Result<Coordinate> {
    if dimension == TIME_DIMENSION {
        return Ok(match NaiveDateTime::parse_from_str(raw, TIME_FORMAT) {
            Ok(time) => Coordinate::Time(time),
            Err(_) => {
                warn!(
                    coordinate = raw,
                    "The time coordinate could not be parsed into a valid datetime. Setting as raw value instead."
                );
                Coordinate::Raw(raw.to_string())
            }
        });
    }

    raw.parse::<i64>()
        .map(Coordinate::Index)
        .map_err(|_| HadleyError::InvalidParameter {
            param: "coordinate".to_string(),
            message: format!(
                "coordinate '{}' of dimension '{}' is not an integer",
                raw, dimension
            ),
        })
}

/// Dimension, coordinate and variable parsed from an exported file name
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedName {
    pub dimension: String,
    pub coordinate: Coordinate,
    pub variable: String,
}

/// Parse `{id}.{dimension}.{coordinate}.{variable}.{ext}` from a file path.
pub fn parse_filename(path: &Path) -> Result<ParsedName> {
    let basename = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            HadleyError::invalid_parameter("path", format!("{} has no file name", path.display()))
        })?;

    let parts: Vec<&str> = basename.split('.').collect();
    let [_, dimension, coordinate, variable, ..] = parts.as_slice() else {
        return Err(HadleyError::invalid_parameter(
            "path",
            format!(
                "'{}' does not follow the {{id}}.{{dimension}}.{{coordinate}}.{{variable}}.{{ext}} convention",
                basename
            ),
        ));
    };

    Ok(ParsedName {
        dimension: dimension.to_string(),
        coordinate: parse_coordinate(dimension, coordinate)?,
        variable: variable.to_string(),
    })
}

/// Collapse every run of characters other than ASCII letters and digits into `_`.
/// A missing id becomes `"null"`.
pub fn clean_id(id: Option<&str>) -> String {
    let id = id.unwrap_or("null");
    let mut cleaned = String::with_capacity(id.len());
    let mut in_run = false;
    for c in id.chars() {
        if c.is_ascii_alphanumeric() {
            cleaned.push(c);
            in_run = false;
        } else if !in_run {
            cleaned.push('_');
            in_run = true;
        }
    }
    cleaned
}

/// The dimension and raw coordinate string of an image.
///
/// Untagged images fall on the time dimension at their start time.
pub fn dimension_and_coordinate(image: &Image) -> Result<(String, String)> {
    let dimension = image.dimension().unwrap_or(TIME_DIMENSION).to_string();
    let coordinate = match image.coordinate() {
        Some(coordinate) => coordinate.to_string(),
        None => image
            .time_start
            .map(|t| t.format(TIME_FORMAT).to_string())
            .ok_or_else(|| {
                HadleyError::missing_property(
                    TIME_START,
                    format!(
                        "image {} has no start time, which is required to name exported files. \
                         Properties can be lost when combining images; set a time with Image::with_time",
                        image.id.as_deref().unwrap_or("null")
                    ),
                )
            })?,
    };
    Ok((dimension, coordinate))
}

/// File stem for an image: `{clean id}.{dimension}.{coordinate}`
pub fn download_id(image: &Image) -> Result<String> {
    let (dimension, coordinate) = dimension_and_coordinate(image)?;
    Ok(format!("{}.{}.{}", clean_id(image.id.as_deref()), dimension, coordinate))
}

/// Prefix the image id with `{prefix}_`
pub fn prefix_id(mut image: Image, prefix: &str) -> Image {
    let id = image.id.as_deref().unwrap_or("null");
    image.id = Some(format!("{}_{}", prefix, id));
    image
}

/// A single-band raster at one coordinate
#[derive(Debug, Clone, PartialEq)]
pub struct DataArray {
    pub name: String,
    pub dimension: String,
    pub coordinate: Coordinate,
    pub data: Array2<f32>,
    pub valid: Array2<bool>,
}

impl DataArray {
    /// One array per band of `image`, placed by its dimension and coordinate
    pub fn from_image(image: &Image) -> Result<Vec<DataArray>> {
        let (dimension, raw) = dimension_and_coordinate(image)?;
        let coordinate = parse_coordinate(&dimension, &raw)?;

        Ok(image
            .bands()
            .iter()
            .enumerate()
            .map(|(i, band)| DataArray {
                name: band.clone(),
                dimension: dimension.clone(),
                coordinate: coordinate.clone(),
                data: image.band(i).to_owned(),
                valid: image.band_mask(i).to_owned(),
            })
            .collect())
    }
}

/// A variable stacked along the dataset dimension, shaped `(coordinate, y, x)`
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub data: Array3<f32>,
    pub valid: Array3<bool>,
}

/// Variables indexed along a single dimension
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    dimension: String,
    coordinates: Vec<Coordinate>,
    variables: BTreeMap<String, Variable>,
}

impl Dataset {
    /// Merge single-band arrays into one dataset.
    ///
    /// Coordinates are the sorted union of all inputs. Where two arrays give the
    /// same pixel, a valid value is preferred over a masked one; if both are
    /// valid and differ the first value is kept and a warning is logged.
    pub fn merge(arrays: Vec<DataArray>) -> Result<Dataset> {
        let Some(first) = arrays.first() else {
            return Err(HadleyError::invalid_parameter(
                "arrays",
                "cannot merge an empty set of arrays",
            ));
        };
        let dimension = first.dimension.clone();
        let (rows, cols) = first.data.dim();

        for array in &arrays {
            if array.dimension != dimension {
                return Err(HadleyError::invalid_parameter(
                    "dimension",
                    format!(
                        "arrays span different dimensions: '{}' and '{}'",
                        dimension, array.dimension
                    ),
                ));
            }
            if array.data.dim() != (rows, cols) || array.valid.dim() != (rows, cols) {
                return Err(HadleyError::IncompatibleBands {
                    message: format!(
                        "array '{}' at {} has shape {:?}, expected {:?}",
                        array.name,
                        array.coordinate,
                        array.data.dim(),
                        (rows, cols)
                    ),
                });
            }
        }

        let mut coordinates: Vec<Coordinate> =
            arrays.iter().map(|a| a.coordinate.clone()).collect();
        coordinates.sort();
        coordinates.dedup();

        let mut variables: BTreeMap<String, Variable> = BTreeMap::new();
        let mut conflicts = 0usize;

        for array in &arrays {
            let variable = variables.entry(array.name.clone()).or_insert_with(|| Variable {
                data: Array3::zeros((coordinates.len(), rows, cols)),
                valid: Array3::from_elem((coordinates.len(), rows, cols), false),
            });
            let index = coordinates
                .binary_search(&array.coordinate)
                .map_err(|_| {
                    HadleyError::invalid_parameter("coordinate", "coordinate not indexed")
                })?;

            let mut data = variable.data.index_axis_mut(Axis(0), index);
            let mut valid = variable.valid.index_axis_mut(Axis(0), index);

            for ((pos, &value), &is_valid) in array.data.indexed_iter().zip(array.valid.iter()) {
                if !is_valid {
                    continue;
                }
                if valid[pos] {
                    if data[pos] != value {
                        conflicts += 1;
                    }
                    continue;
                }
                data[pos] = value;
                valid[pos] = true;
            }
        }

        if conflicts > 0 {
            warn!(
                conflicts,
                "Different non-null values were encountered for the same variable at the same coordinate. The first value was taken."
            );
        }

        Ok(Dataset {
            dimension,
            coordinates,
            variables,
        })
    }

    /// Build a dataset directly from images, one variable per band
    pub fn from_images(images: &[Image]) -> Result<Dataset> {
        let mut arrays = Vec::new();
        for image in images {
            arrays.extend(DataArray::from_image(image)?);
        }
        Self::merge(arrays)
    }

    pub fn from_series(series: &TimeSeries) -> Result<Dataset> {
        Self::from_images(series.images())
    }

    pub fn from_climatology(climatology: &Climatology) -> Result<Dataset> {
        Self::from_images(climatology.images())
    }

    pub fn dimension(&self) -> &str {
        &self.dimension
    }

    pub fn coordinates(&self) -> &[Coordinate] {
        &self.coordinates
    }

    pub fn variable_names(&self) -> Vec<&str> {
        self.variables.keys().map(String::as_str).collect()
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name)
    }

    /// Pixel value, `None` if masked or missing
    pub fn value(
        &self,
        variable: &str,
        coordinate: &Coordinate,
        row: usize,
        col: usize,
    ) -> Option<f32> {
        let index = self.coordinates.binary_search(coordinate).ok()?;
        let variable = self.variables.get(variable)?;
        match variable.valid.get((index, row, col)) {
            Some(true) => variable.data.get((index, row, col)).copied(),
            _ => None,
        }
    }
}
