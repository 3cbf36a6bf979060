//! Configuration management for hadley.
//!
//! This module handles the layered configuration system with the following precedence:
//! 1. Command-line arguments (highest priority)
//! 2. Environment variables
//! 3. JSON config file
//! 4. Default values (lowest priority)

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{HadleyError, Result};
use crate::interpolation::get_interpolator;
use crate::reducer::get_reducer;

/// Command-line arguments for hadley
#[derive(Parser, Debug)]
#[command(name = "hadley")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the NetCDF file holding the input time series
    pub input: PathBuf,

    /// Path to JSON configuration file
    #[arg(short, long, env = "HADLEY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "HADLEY_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Reducer used to aggregate images (mean, median, min, max, sum, stddev, ...)
    #[arg(short, long, env = "HADLEY_REDUCER")]
    pub reducer: Option<String>,

    /// Keep the original band names instead of appending the reducer name
    #[arg(long, env = "HADLEY_KEEP_BANDNAMES")]
    pub keep_bandnames: Option<bool>,

    /// Number of concurrent export workers
    #[arg(short, long, env = "HADLEY_WORKERS")]
    pub workers: Option<usize>,

    /// Value written for masked pixels and read back as missing
    #[arg(long, env = "HADLEY_NODATA", allow_hyphen_values = true)]
    pub nodata: Option<f32>,

    #[command(subcommand)]
    pub command: Command,
}

/// Operations available from the command line
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Print a summary of the time series
    Describe {
        /// Unit used to report the mean interval between images
        #[arg(long, default_value = "day")]
        unit: String,
    },
    /// Aggregate the series to a coarser frequency
    Aggregate {
        /// Target frequency (year, month, week, day, hour, minute)
        #[arg(short, long)]
        frequency: String,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Build a month or day-of-year climatology
    Climatology {
        /// Climatology frequency (month, day)
        #[arg(short, long)]
        frequency: String,
        /// First coordinate to include
        #[arg(long)]
        start: Option<u32>,
        /// Last coordinate to include
        #[arg(long)]
        end: Option<u32>,
        /// Compute the standard deviation instead of the mean
        #[arg(long)]
        std: bool,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Compute anomalies relative to the series' own climatology
    Anomaly {
        /// Climatology frequency (month, day)
        #[arg(short, long)]
        frequency: String,
        /// Divide anomalies by the climatological standard deviation
        #[arg(long)]
        standardize: bool,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Interpolate an image at a given time
    Interpolate {
        /// Target time, RFC 3339 or YYYY-MM-DD
        #[arg(short, long)]
        time: String,
        /// Interpolation method (nearest, linear, cubic)
        #[arg(short, long)]
        method: Option<String>,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Apply a rolling reduction over a moving window
    Rolling {
        /// Window size in units
        #[arg(long)]
        window: u32,
        #[arg(long, default_value = "day")]
        unit: String,
        /// Window alignment (left, center, right)
        #[arg(long, default_value = "left")]
        align: String,
        /// Drop images whose window has fewer images than this
        #[arg(long, default_value_t = 1)]
        min_observations: usize,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Fill masked pixels from a rolling reduction
    Fill {
        /// Window size in units
        #[arg(long)]
        window: u32,
        #[arg(long, default_value = "day")]
        unit: String,
        /// Window alignment (left, center, right)
        #[arg(long, default_value = "center")]
        align: String,
        /// Constant for pixels that remain masked after filling
        #[arg(long, allow_hyphen_values = true)]
        fill_value: Option<f32>,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Write every image to its own NetCDF file
    Export {
        #[arg(long)]
        out_dir: PathBuf,
        /// Prefix added to image ids in file names
        #[arg(long)]
        prefix: Option<String>,
        /// Write one file per band
        #[arg(long)]
        file_per_band: bool,
    },
}

/// Processing configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Reducer used to aggregate images
    #[serde(default = "default_reducer")]
    pub reducer: String,

    /// Keep original band names on reduced images
    #[serde(default = "default_keep_bandnames")]
    pub keep_bandnames: bool,

    /// Default interpolation method
    #[serde(default = "default_interpolation")]
    pub interpolation_method: String,
}

/// Export configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Number of concurrent writers (None = number of CPU cores)
    #[serde(default)]
    pub workers: Option<usize>,

    /// Value written for masked pixels
    #[serde(default = "default_nodata")]
    pub nodata: f32,

    /// Treat nodata as masked when reading exported files
    #[serde(default = "default_masked")]
    pub masked: bool,
}

/// Complete configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub processing: ProcessingConfig,

    #[serde(default)]
    pub export: ExportConfig,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Config {
    /// Parse the command line and load configuration from all sources
    pub fn load() -> Result<(Self, Args)> {
        let args = Args::parse();
        let config = Self::from_args(&args)?;
        Ok((config, args))
    }

    /// Build configuration from parsed arguments with proper precedence
    pub fn from_args(args: &Args) -> Result<Self> {
        // Start with defaults
        let mut config = Config::default();

        // Load from JSON file if provided
        if let Some(config_path) = &args.config {
            let json_config = Self::load_from_file(config_path)?;
            config.merge(json_config);
        }

        // Override with command-line arguments
        if let Some(log_level) = &args.log_level {
            config.log_level = log_level.clone();
        }
        if let Some(reducer) = &args.reducer {
            config.processing.reducer = reducer.clone();
        }
        if let Some(keep) = args.keep_bandnames {
            config.processing.keep_bandnames = keep;
        }
        if args.workers.is_some() {
            config.export.workers = args.workers;
        }
        if let Some(nodata) = args.nodata {
            config.export.nodata = nodata;
        }
        if let Command::Interpolate {
            method: Some(method),
            ..
        } = &args.command
        {
            config.processing.interpolation_method = method.clone();
        }

        Ok(config)
    }

    /// Load configuration from a JSON file
    fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| HadleyError::Config {
            message: format!("Failed to read config file {}: {}", path.display(), e),
        })?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Merge another config into this one (other takes precedence)
    fn merge(&mut self, other: Config) {
        self.processing = other.processing;
        if other.export.workers.is_some() {
            self.export.workers = other.export.workers;
        }
        self.export.nodata = other.export.nodata;
        self.export.masked = other.export.masked;
        self.log_level = other.log_level;
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        // Validate log level
        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(HadleyError::Config {
                    message: format!(
                        "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                        self.log_level
                    ),
                });
            }
        }

        get_reducer(&self.processing.reducer).map_err(|e| HadleyError::Config {
            message: e.to_string(),
        })?;

        get_interpolator(&self.processing.interpolation_method).map_err(|e| {
            HadleyError::Config {
                message: e.to_string(),
            }
        })?;

        if self.export.workers == Some(0) {
            return Err(HadleyError::Config {
                message: "Export workers must be at least 1".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(feature = "netcdf")]
impl ExportConfig {
    /// Export options for this configuration
    pub fn options(
        &self,
        prefix: Option<String>,
        file_per_band: bool,
    ) -> crate::export::ExportOptions {
        crate::export::ExportOptions {
            prefix,
            file_per_band,
            masked: self.masked,
            nodata: self.nodata,
            workers: self.workers.unwrap_or_else(crate::export::default_workers),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            processing: ProcessingConfig::default(),
            export: ExportConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            reducer: default_reducer(),
            keep_bandnames: default_keep_bandnames(),
            interpolation_method: default_interpolation(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            workers: None,
            nodata: default_nodata(),
            masked: default_masked(),
        }
    }
}

// Default value functions for serde
fn default_reducer() -> String {
    "mean".to_string()
}

fn default_keep_bandnames() -> bool {
    true
}

fn default_interpolation() -> String {
    "linear".to_string()
}

fn default_nodata() -> f32 {
    -32_768.0
}

fn default_masked() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}
