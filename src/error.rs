//! Error types for hadley.
//!
//! Validation errors (frequency names, neighbor counts, climatology compatibility)
//! are raised at the call that cannot proceed. Data-quality problems such as
//! unparseable filename timestamps are not errors; they are logged and a fallback
//! value is used instead.

use thiserror::Error;

/// The main error type for hadley operations.
#[derive(Error, Debug)]
pub enum HadleyError {
    /// A frequency name outside the registry
    #[error("Frequency must be in {options:?}, not '{name}'.{hint}")]
    UnknownFrequency {
        name: String,
        options: Vec<String>,
        hint: String,
    },

    /// A frequency that the requested operation cannot aggregate to
    #[error("Invalid frequency '{name}': {message}")]
    InvalidFrequency { name: String, message: String },

    /// Mean and standard deviation climatologies that cannot be combined
    #[error("Incompatible climatologies: {message}")]
    IncompatibleClimatology { message: String },

    /// Interpolation requested outside the coverage of the series
    #[error("Insufficient neighbors: {message}")]
    InsufficientNeighbors { message: String },

    /// An image is missing a property the operation depends on
    #[error("Missing required property '{property}': {message}")]
    MissingRequiredProperty { property: String, message: String },

    /// Images whose bands or grids cannot be reduced together
    #[error("Incompatible bands: {message}")]
    IncompatibleBands { message: String },

    /// Invalid parameter errors
    #[error("Invalid parameter: {param} - {message}")]
    InvalidParameter { param: String, message: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Export worker failures
    #[error("Export error: {message}")]
    Export { message: String },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// NetCDF file operation errors
    #[cfg(feature = "netcdf")]
    #[error("NetCDF error: {0}")]
    NetCdf(#[from] netcdf::Error),

    /// Array shape errors
    #[error("Shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HadleyError {
    /// Shorthand for a missing `system:time_start` style property.
    pub fn missing_property(property: &str, message: impl Into<String>) -> Self {
        HadleyError::MissingRequiredProperty {
            property: property.to_string(),
            message: message.into(),
        }
    }

    /// Shorthand for an invalid parameter.
    pub fn invalid_parameter(param: &str, message: impl Into<String>) -> Self {
        HadleyError::InvalidParameter {
            param: param.to_string(),
            message: message.into(),
        }
    }
}

/// Convenience type alias for Results with HadleyError
pub type Result<T> = std::result::Result<T, HadleyError>;
