//! NetCDF reading and writing.
//!
//! Series are stored as one `(time, y, x)` variable per band with a CF-style
//! `time` coordinate (`"<unit> since <date>"`). Climatologies use the
//! frequency name as their leading dimension with integer coordinates. Masked
//! pixels are written as the nodata value and flagged with `_FillValue`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use ndarray::{s, Array3, ArrayD, IxDyn};
use netcdf::{Attribute, AttributeValue, Variable as NetCDFVariable};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::climatology::Climatology;
use crate::dataset::{parse_filename, DataArray, TIME_DIMENSION};
use crate::error::{HadleyError, Result};
use crate::image::{Bounds, Image, PropertyValue, COORDINATE_KEY, DIMENSION_KEY, TIME_START};
use crate::series::TimeSeries;

/// Units written on the time coordinate
pub const TIME_UNITS: &str = "seconds since 1970-01-01 00:00:00";
/// Global attribute holding the image footprint as `[x_min, y_min, x_max, y_max]`
pub const BOUNDS_ATTRIBUTE: &str = "hadley:bounds";

/// A leading-dimension stack of images as stored on disk
struct Stack {
    dimension: String,
    coordinates: Vec<f64>,
    time_units: Option<String>,
    variables: Vec<(String, Array3<f32>, Array3<bool>)>,
    bounds: Option<Bounds>,
    attributes: BTreeMap<String, PropertyValue>,
}

/// Decode CF time units such as `"days since 2000-01-01"` into a step length in
/// milliseconds and an epoch.
pub fn decode_time_units(units: &str) -> Result<(f64, DateTime<Utc>)> {
    let invalid = || {
        HadleyError::invalid_parameter(
            "units",
            format!("cannot decode time units '{}'; expected '<unit> since <date>'", units),
        )
    };

    let (unit, epoch) = units.split_once(" since ").ok_or_else(invalid)?;
    let step = match unit.trim().to_lowercase().as_str() {
        "milliseconds" | "millisecond" | "ms" => 1.0,
        "seconds" | "second" | "secs" | "sec" | "s" => 1_000.0,
        "minutes" | "minute" | "mins" | "min" => 60_000.0,
        "hours" | "hour" | "hrs" | "hr" | "h" => 3_600_000.0,
        "days" | "day" | "d" => 86_400_000.0,
        _ => return Err(invalid()),
    };

    let epoch = epoch.trim().trim_end_matches('Z').trim_end_matches(" UTC");
    let naive = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(epoch, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(epoch, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(invalid)?;

    Ok((step, naive.and_utc()))
}

/// Load a NetCDF file with a `time` dimension as a time series.
///
/// Every variable shaped `(time, y, x)` becomes a band. Pixels equal to the
/// variable's `_FillValue`, to `nodata` when given, or NaN are masked.
pub fn load_series(path: &Path, nodata: Option<f32>) -> Result<TimeSeries> {
    let stack = read_stack(path, nodata)?;
    if stack.dimension != TIME_DIMENSION {
        return Err(HadleyError::missing_property(
            TIME_START,
            format!(
                "{} has leading dimension '{}', expected '{}'",
                path.display(),
                stack.dimension,
                TIME_DIMENSION
            ),
        ));
    }
    let units = stack.time_units.as_deref().ok_or_else(|| {
        HadleyError::missing_property(TIME_START, "the time variable has no units attribute")
    })?;
    let (step, epoch) = decode_time_units(units)?;

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("null")
        .to_string();
    let bands: Vec<String> = stack.variables.iter().map(|(name, _, _)| name.clone()).collect();
    let (rows, cols) = match stack.variables.first() {
        Some((_, data, _)) => (data.shape()[1], data.shape()[2]),
        None => (0, 0),
    };

    let mut images = Vec::with_capacity(stack.coordinates.len());
    for (i, value) in stack.coordinates.iter().enumerate() {
        let time = epoch + chrono::Duration::milliseconds((value * step).round() as i64);

        let mut data = Array3::<f32>::zeros((bands.len(), rows, cols));
        let mut valid = Array3::from_elem((bands.len(), rows, cols), false);
        for (b, (_, var_data, var_valid)) in stack.variables.iter().enumerate() {
            data.slice_mut(s![b, .., ..]).assign(&var_data.slice(s![i, .., ..]));
            valid.slice_mut(s![b, .., ..]).assign(&var_valid.slice(s![i, .., ..]));
        }

        let mut image = Image::with_mask(bands.clone(), data, valid)?
            .with_time(time)
            .with_id(format!("{}/{}", stem, time.format("%Y%m%dT%H%M%S")));
        image.footprint = stack.bounds;
        image.properties = stack.attributes.clone();
        images.push(image);
    }

    info!(
        path = %path.display(),
        images = images.len(),
        bands = bands.len(),
        "Loaded time series"
    );

    Ok(TimeSeries::new(images)?.with_id(stem))
}

/// Write a time series, one `(time, y, x)` variable per band.
pub fn write_series(series: &TimeSeries, path: &Path, nodata: f32) -> Result<()> {
    let images: Vec<&Image> = series.images().iter().collect();
    let mut attributes = BTreeMap::new();
    if let Some(id) = series.id() {
        attributes.insert("id".to_string(), PropertyValue::from(id));
    }
    write_stack(path, TIME_DIMENSION, &images, None, nodata, &attributes)
}

/// Write a climatology with its frequency as the leading dimension.
pub fn write_climatology(climatology: &Climatology, path: &Path, nodata: f32) -> Result<()> {
    let images: Vec<&Image> = climatology.images().iter().collect();
    let mut attributes = BTreeMap::new();
    attributes.insert(
        "statistic".to_string(),
        PropertyValue::from(climatology.statistic.as_str()),
    );
    attributes.insert(
        "reducer".to_string(),
        PropertyValue::from(climatology.reducer.name()),
    );
    if let Some(id) = climatology.id() {
        attributes.insert("id".to_string(), PropertyValue::from(id));
    }
    write_stack(
        path,
        climatology.frequency.name(),
        &images,
        None,
        nodata,
        &attributes,
    )
}

/// Write one band of an image, or all bands when `band` is `None`, as a single step.
///
/// The leading dimension and coordinate come from the image tags, falling back
/// to its start time. Image properties are stored as global attributes.
pub fn write_image(image: &Image, band: Option<usize>, path: &Path, nodata: f32) -> Result<()> {
    let dimension = image.dimension().unwrap_or(TIME_DIMENSION).to_string();
    let mut attributes = image.properties.clone();
    if let Some(id) = &image.id {
        attributes.insert("id".to_string(), PropertyValue::from(id.as_str()));
    }
    write_stack(path, &dimension, &[image], band, nodata, &attributes)
}

/// Read the single-band file written for one band of one image.
///
/// The dimension, coordinate and variable come from the file name. With
/// `masked`, pixels equal to `nodata` are masked; otherwise every pixel is kept.
pub fn read_band(path: &Path, masked: bool, nodata: f32) -> Result<DataArray> {
    let parsed = parse_filename(path)?;
    let stack = read_stack(path, masked.then_some(nodata))?;

    let (_, data, valid) = stack
        .variables
        .into_iter()
        .find(|(name, _, _)| *name == parsed.variable)
        .ok_or_else(|| {
            HadleyError::invalid_parameter(
                "path",
                format!("{} has no variable '{}'", path.display(), parsed.variable),
            )
        })?;

    let data = data.slice(s![0, .., ..]).to_owned();
    let valid = if masked {
        valid.slice(s![0, .., ..]).to_owned()
    } else {
        ndarray::Array2::from_elem(data.raw_dim(), true)
    };

    Ok(DataArray {
        name: parsed.variable,
        dimension: parsed.dimension,
        coordinate: parsed.coordinate,
        data,
        valid,
    })
}

fn coordinate_value(image: &Image, dimension: &str) -> Result<f64> {
    if dimension == TIME_DIMENSION {
        return image
            .time_start
            .map(|t| t.timestamp_millis() as f64 / 1000.0)
            .ok_or_else(|| HadleyError::missing_property(TIME_START, "image has no start time"));
    }
    let coordinate = image.coordinate().ok_or_else(|| {
        HadleyError::missing_property(
            COORDINATE_KEY,
            format!("image has no {} coordinate", dimension),
        )
    })?;
    coordinate.parse::<f64>().map_err(|_| {
        HadleyError::invalid_parameter(
            "coordinate",
            format!("coordinate '{}' of dimension '{}' is not numeric", coordinate, dimension),
        )
    })
}

fn to_attribute(value: &PropertyValue) -> AttributeValue {
    match value {
        PropertyValue::Text(s) => AttributeValue::Str(s.clone()),
        PropertyValue::Number(n) => AttributeValue::Double(*n),
        PropertyValue::NumberArray(v) => AttributeValue::Doubles(v.clone()),
    }
}

fn write_stack(
    path: &Path,
    dimension: &str,
    images: &[&Image],
    band: Option<usize>,
    nodata: f32,
    attributes: &BTreeMap<String, PropertyValue>,
) -> Result<()> {
    let first = images.first().ok_or_else(|| {
        HadleyError::Export {
            message: format!("nothing to write to {}", path.display()),
        }
    })?;
    let (rows, cols) = first.shape();
    let bands: Vec<usize> = match band {
        Some(b) if b < first.bands().len() => vec![b],
        Some(b) => {
            return Err(HadleyError::invalid_parameter(
                "band",
                format!("band index {} out of range for {} bands", b, first.bands().len()),
            ))
        }
        None => (0..first.bands().len()).collect(),
    };

    let coordinates = images
        .iter()
        .map(|img| coordinate_value(img, dimension))
        .collect::<Result<Vec<_>>>()?;

    let mut file = netcdf::create(path)?;
    file.add_dimension(dimension, images.len())?;
    file.add_dimension("y", rows)?;
    file.add_dimension("x", cols)?;

    for (key, value) in attributes {
        if key == DIMENSION_KEY || key == COORDINATE_KEY {
            continue;
        }
        file.add_attribute(key, to_attribute(value))?;
    }
    if let Some(bounds) = first.footprint {
        file.add_attribute(
            BOUNDS_ATTRIBUTE,
            vec![bounds.x_min, bounds.y_min, bounds.x_max, bounds.y_max],
        )?;
    }

    {
        let mut coord_var = file.add_variable::<f64>(dimension, &[dimension])?;
        if dimension == TIME_DIMENSION {
            coord_var.put_attribute("units", TIME_UNITS)?;
        }
        coord_var.put_values(&coordinates, ..)?;
    }

    for b in bands {
        let mut values = Vec::with_capacity(images.len() * rows * cols);
        for image in images {
            values.extend(image.band_filled(b, nodata).iter().copied());
        }

        let mut var = file.add_variable::<f32>(&first.bands()[b], &[dimension, "y", "x"])?;
        var.put_attribute("_FillValue", nodata)?;
        var.put_values(&values, ..)?;
    }

    debug!(path = %path.display(), dimension, steps = images.len(), "Wrote NetCDF file");
    Ok(())
}

fn read_stack(path: &Path, nodata: Option<f32>) -> Result<Stack> {
    if !path.exists() {
        return Err(HadleyError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("File not found: {}", path.display()),
        )));
    }
    let file = netcdf::open(path)?;

    let mut attributes = BTreeMap::new();
    let mut bounds = None;
    for attr in file.attributes() {
        let name = attr.name().to_string();
        if name == BOUNDS_ATTRIBUTE {
            if let Some(Ok([x_min, y_min, x_max, y_max])) =
                numbers(&attr)?.map(<[f64; 4]>::try_from)
            {
                bounds = Some(Bounds {
                    x_min,
                    y_min,
                    x_max,
                    y_max,
                });
            }
            continue;
        }
        if let Some(value) = convert_attribute(&attr)? {
            attributes.insert(name, value);
        }
    }

    let mut dimension = None;
    let mut grid = None;
    let mut variables = Vec::new();
    for var in file.variables() {
        let dims: Vec<String> = var.dimensions().iter().map(|d| d.name().to_string()).collect();
        if dims.len() != 3 || !is_supported_variable(&var) {
            continue;
        }
        let var_grid = (dims[1].clone(), dims[2].clone());
        match (&dimension, &grid) {
            (Some(d), _) if *d != dims[0] => {
                warn!(
                    variable = %var.name(),
                    dimension = %dims[0],
                    "Skipping variable on a different leading dimension"
                );
                continue;
            }
            (_, Some(g)) if *g != var_grid => {
                warn!(
                    variable = %var.name(),
                    y = %var_grid.0,
                    x = %var_grid.1,
                    "Skipping variable on a different grid"
                );
                continue;
            }
            (None, _) => {
                dimension = Some(dims[0].clone());
                grid = Some(var_grid);
            }
            _ => {}
        }

        let shape: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();
        let data = convert_variable_to_array(&var, &shape)?
            .into_dimensionality::<ndarray::Ix3>()?;
        let fill = fill_value(&var)?;
        let valid = data.mapv(|v| {
            !(v.is_nan() || fill.is_some_and(|f| v == f) || nodata.is_some_and(|n| v == n))
        });
        variables.push((var.name().to_string(), data, valid));
    }

    let dimension = dimension.ok_or_else(|| {
        HadleyError::invalid_parameter(
            "path",
            format!("{} has no three-dimensional variables", path.display()),
        )
    })?;

    let (coordinates, time_units) = match file.variable(&dimension) {
        Some(var) => {
            let units = match var.attribute("units") {
                Some(attr) => match attr.value()? {
                    AttributeValue::Str(s) => Some(s),
                    _ => None,
                },
                None => None,
            };
            (var.get_values::<f64, _>(..)?, units)
        }
        None => {
            let len = file.dimension(&dimension).map(|d| d.len()).unwrap_or(0);
            warn!(dimension = %dimension, "Created default coordinates for dimension");
            ((0..len).map(|i| i as f64).collect(), None)
        }
    };

    if bounds.is_none() {
        if let Some((y, x)) = &grid {
            bounds = grid_bounds(&file, y, x)?;
        }
    }

    Ok(Stack {
        dimension,
        coordinates,
        time_units,
        variables,
        bounds,
        attributes,
    })
}

/// Bounds from the coordinate variables of the `y` and `x` dimensions, if present
fn grid_bounds(file: &netcdf::File, y: &str, x: &str) -> Result<Option<Bounds>> {
    let range = |name: &str| -> Result<Option<(f64, f64)>> {
        let Some(coord) = file.variable(name) else {
            return Ok(None);
        };
        if !is_supported_variable(&coord) {
            return Ok(None);
        }
        let values = coord.get_values::<f64, _>(..)?;
        Ok(values.into_iter().fold(None, |acc: Option<(f64, f64)>, v| {
            Some(match acc {
                Some((lo, hi)) => (lo.min(v), hi.max(v)),
                None => (v, v),
            })
        }))
    };

    Ok(match (range(y)?, range(x)?) {
        (Some((y_min, y_max)), Some((x_min, x_max))) => Some(Bounds {
            x_min,
            y_min,
            x_max,
            y_max,
        }),
        _ => None,
    })
}

/// Check if a variable has a numeric type we can read
fn is_supported_variable(var: &NetCDFVariable) -> bool {
    use netcdf::types::{BasicType, VariableType};

    matches!(
        var.vartype(),
        VariableType::Basic(BasicType::Byte)
            | VariableType::Basic(BasicType::Short)
            | VariableType::Basic(BasicType::Int)
            | VariableType::Basic(BasicType::Float)
            | VariableType::Basic(BasicType::Double)
    )
}

/// Convert a NetCDF attribute into an image property, skipping unsupported types
fn convert_attribute(attr: &Attribute) -> Result<Option<PropertyValue>> {
    Ok(match attr.value()? {
        AttributeValue::Str(s) => Some(PropertyValue::Text(s)),
        AttributeValue::Schar(v) => Some(PropertyValue::Number(f64::from(v))),
        AttributeValue::Short(v) => Some(PropertyValue::Number(f64::from(v))),
        AttributeValue::Int(v) => Some(PropertyValue::Number(f64::from(v))),
        AttributeValue::Float(v) => Some(PropertyValue::Number(f64::from(v))),
        AttributeValue::Double(v) => Some(PropertyValue::Number(v)),
        AttributeValue::Doubles(v) => Some(PropertyValue::NumberArray(v)),
        AttributeValue::Floats(v) => Some(PropertyValue::NumberArray(
            v.into_iter().map(f64::from).collect(),
        )),
        AttributeValue::Ints(v) => Some(PropertyValue::NumberArray(
            v.into_iter().map(f64::from).collect(),
        )),
        other => {
            debug!(attribute = %attr.name(), value = ?other, "Skipping unsupported attribute");
            None
        }
    })
}

fn numbers(attr: &Attribute) -> Result<Option<Vec<f64>>> {
    Ok(match convert_attribute(attr)? {
        Some(PropertyValue::NumberArray(v)) => Some(v),
        _ => None,
    })
}

fn fill_value(var: &NetCDFVariable) -> Result<Option<f32>> {
    let Some(attr) = var.attribute("_FillValue") else {
        return Ok(None);
    };
    Ok(match attr.value()? {
        AttributeValue::Float(v) => Some(v),
        AttributeValue::Double(v) => Some(v as f32),
        AttributeValue::Short(v) => Some(f32::from(v)),
        AttributeValue::Int(v) => Some(v as f32),
        AttributeValue::Schar(v) => Some(f32::from(v)),
        _ => None,
    })
}

/// Convert a NetCDF variable to an f32 array of the given shape
fn convert_variable_to_array(var: &NetCDFVariable, shape: &[usize]) -> Result<ArrayD<f32>> {
    use netcdf::types::{BasicType, VariableType};

    let dim = IxDyn(shape);

    let values: Vec<f32> = match var.vartype() {
        VariableType::Basic(BasicType::Byte) => var
            .get_values::<i8, _>(..)?
            .into_iter()
            .map(f32::from)
            .collect(),
        VariableType::Basic(BasicType::Short) => var
            .get_values::<i16, _>(..)?
            .into_iter()
            .map(f32::from)
            .collect(),
        VariableType::Basic(BasicType::Int) => var
            .get_values::<i32, _>(..)?
            .into_iter()
            .map(|v| v as f32)
            .collect(),
        VariableType::Basic(BasicType::Float) => var.get_values::<f32, _>(..)?,
        VariableType::Basic(BasicType::Double) => var
            .get_values::<f64, _>(..)?
            .into_iter()
            .map(|v| v as f32)
            .collect(),
        other => {
            return Err(HadleyError::invalid_parameter(
                "variable",
                format!("Unsupported variable type for {}: {:?}", var.name(), other),
            ))
        }
    };

    Ok(ArrayD::from_shape_vec(dim, values)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    #[test]
    fn test_decode_time_units() {
        let (step, epoch) = decode_time_units("days since 2000-01-01").unwrap();
        assert_eq!(step, 86_400_000.0);
        assert_eq!(epoch, Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap());

        let (step, epoch) = decode_time_units(TIME_UNITS).unwrap();
        assert_eq!(step, 1_000.0);
        assert_eq!(epoch, Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap());

        let (step, _) = decode_time_units("hours since 1900-01-01T00:00:00Z").unwrap();
        assert_eq!(step, 3_600_000.0);

        assert!(decode_time_units("fortnights since 2000-01-01").is_err());
        assert!(decode_time_units("days").is_err());
    }

    #[test]
    fn test_file_not_found() {
        match load_series(Path::new("/nonexistent/file.nc"), None).unwrap_err() {
            HadleyError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            other => panic!("Expected IO error, got {:?}", other),
        }
    }

    #[test]
    fn test_skips_variables_on_another_grid() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("mixed.nc");
        {
            let mut file = netcdf::create(&path)?;
            file.add_dimension("time", 2)?;
            file.add_dimension("lat", 2)?;
            file.add_dimension("lon", 3)?;
            file.add_dimension("level", 4)?;

            let mut time = file.add_variable::<f64>("time", &["time"])?;
            time.put_attribute("units", "days since 2020-01-01")?;
            time.put_values(&[0.0f64, 1.0][..], ..)?;

            let mut tmax = file.add_variable::<f32>("tmax", &["time", "lat", "lon"])?;
            tmax.put_values(&[7.0f32; 12][..], ..)?;

            let mut profile = file.add_variable::<f32>("prof", &["time", "level", "lat"])?;
            profile.put_values(&[1.0f32; 16][..], ..)?;
        }

        let loaded = load_series(&path, None)?;
        assert_eq!(loaded.len(), 2);
        let image = &loaded.images()[1];
        assert_eq!(image.bands(), &["tmax".to_string()]);
        assert_eq!(image.shape(), (2, 3));
        assert_eq!(image.value(0, 1, 2), Some(7.0));
        Ok(())
    }

    #[test]
    fn test_series_round_trip() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("series.nc");
        let t = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();

        let mut first = Image::constant(&["tmin", "tmax"], 1.0, (2, 3))
            .with_time(t)
            .masked_where(|b, y, x| b == 1 && y == 0 && x == 0);
        let footprint = Bounds {
            x_min: 0.0,
            y_min: 0.0,
            x_max: 3.0,
            y_max: 2.0,
        };
        first.footprint = Some(footprint);
        let second = Image::constant(&["tmin", "tmax"], 2.0, (2, 3))
            .with_time(t + chrono::Duration::hours(6));
        let series = TimeSeries::new(vec![first, second])?.with_id("sample");

        write_series(&series, &path, -9999.0)?;
        let loaded = load_series(&path, None)?;

        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.id(), Some("series"));
        assert_eq!(loaded.times(), series.times());
        let image = &loaded.images()[0];
        assert_eq!(image.bands(), &["tmin".to_string(), "tmax".to_string()]);
        assert_eq!(image.value(1, 0, 0), None);
        assert_eq!(image.value(1, 1, 2), Some(1.0));
        assert_eq!(image.footprint, Some(footprint));
        assert_eq!(image.get("id").and_then(|v| v.as_text()), Some("sample"));
        assert_eq!(loaded.images()[1].value(0, 1, 1), Some(2.0));
        Ok(())
    }

    #[test]
    fn test_write_and_read_band() -> Result<()> {
        let dir = tempdir()?;
        let t = Utc.with_ymd_and_hms(2021, 3, 4, 5, 6, 7).unwrap();
        let image = Image::constant(&["a", "b"], 3.0, (2, 2))
            .with_time(t)
            .with_id("col/img")
            .masked_where(|b, y, _| b == 1 && y == 1);

        let path = dir.path().join("col_img.time.20210304T050607.b.nc");
        write_image(&image, Some(1), &path, -1.0)?;

        let masked = read_band(&path, true, -1.0)?;
        assert_eq!(masked.name, "b");
        assert_eq!(masked.dimension, "time");
        assert_eq!(masked.data[[0, 0]], 3.0);
        assert!(!masked.valid[[1, 0]]);

        let raw = read_band(&path, false, -1.0)?;
        assert_eq!(raw.data[[1, 0]], -1.0);
        assert!(raw.valid[[1, 0]]);
        Ok(())
    }

    #[test]
    fn test_write_image_band_out_of_range() {
        let dir = tempdir().unwrap();
        let image = Image::constant(&["a"], 0.0, (1, 1))
            .with_time(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap());
        assert!(write_image(&image, Some(3), &dir.path().join("x.nc"), 0.0).is_err());
    }
}
