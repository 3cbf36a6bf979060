//! hadley - time-series resampling, climatology and gap-filling for raster collections
//!
//! This is the main entry point for the hadley command-line tool.

use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use std::time::Instant;
use tracing::{error, info};

use hadley::config::{Args, Command};
use hadley::export::export_series;
use hadley::netcdf_io::{load_series, write_climatology, write_image, write_series};
use hadley::reducer::get_reducer;
use hadley::{
    init_tracing, log_error, log_operation_end, log_operation_start, log_series_stats, Align,
    Config, HadleyError, TimeSeries, TimeUnit,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let (config, args) = Config::load().context("Configuration error")?;
    init_tracing(&config.log_level);

    info!("Starting hadley v{}", env!("CARGO_PKG_VERSION"));

    // Validate configuration
    config.validate().map_err(|e| {
        error!("Invalid configuration: {}", e);
        e
    })?;

    let start = Instant::now();
    let operation = command_name(&args.command);
    log_operation_start(operation, Some(args.input.display().to_string().as_str()));

    match run(&config, &args).await {
        Ok(()) => {
            log_operation_end(operation, start, true);
            Ok(())
        }
        Err(e) => {
            log_error(&e, operation);
            log_operation_end(operation, start, false);
            Err(e.into())
        }
    }
}

async fn run(config: &Config, args: &Args) -> hadley::Result<()> {
    info!("Loading NetCDF file: {:?}", args.input);
    let series = load_series(&args.input, Some(config.export.nodata))?;
    log_series_stats("input", &series);

    let reducer = get_reducer(&config.processing.reducer)?;
    let keep_bandnames = config.processing.keep_bandnames;
    let nodata = config.export.nodata;

    match &args.command {
        Command::Describe { unit } => {
            let unit: TimeUnit = unit.parse()?;
            println!("{}", series.describe(unit)?);
        }
        Command::Aggregate { frequency, output } => {
            let result = series.aggregate_time(frequency, reducer.as_ref(), keep_bandnames)?;
            finish_series("aggregate", &result, output, nodata)?;
        }
        Command::Climatology {
            frequency,
            start,
            end,
            std,
            output,
        } => {
            let climatology = if *std {
                series.climatology_std(frequency, reducer, *start, *end, keep_bandnames)?
            } else {
                series.climatology_mean(frequency, reducer, *start, *end, keep_bandnames)?
            };
            info!(
                statistic = %climatology.statistic,
                coordinates = climatology.len(),
                "Climatology ready"
            );
            write_climatology(&climatology, output, nodata)?;
        }
        Command::Anomaly {
            frequency,
            standardize,
            output,
        } => {
            // Anomalies subtract band by band, so climatology bands keep their names
            let mean = series.climatology_mean(frequency, reducer.clone(), None, None, true)?;
            let std = if *standardize {
                Some(series.climatology_std(frequency, reducer, None, None, true)?)
            } else {
                None
            };
            let result = series.climatology_anomaly(&mean, std.as_ref())?;
            finish_series("anomaly", &result, output, nodata)?;
        }
        Command::Interpolate { time, output, .. } => {
            let target = parse_time(time)?;
            let image = series.interpolate_time(target, &config.processing.interpolation_method)?;
            write_image(&image, None, output, nodata)?;
            info!(path = %output.display(), "Wrote interpolated image");
        }
        Command::Rolling {
            window,
            unit,
            align,
            min_observations,
            output,
        } => {
            let align: Align = align.parse()?;
            let result = series.rolling_time(
                *window,
                unit,
                align,
                *min_observations,
                reducer.as_ref(),
                keep_bandnames,
            )?;
            finish_series("rolling", &result, output, nodata)?;
        }
        Command::Fill {
            window,
            unit,
            align,
            fill_value,
            output,
        } => {
            let align: Align = align.parse()?;
            let result = series.fill_gaps(*window, unit, align, reducer.as_ref(), *fill_value)?;
            finish_series("fill", &result, output, nodata)?;
        }
        Command::Export {
            out_dir,
            prefix,
            file_per_band,
        } => {
            let options = config.export.options(prefix.clone(), *file_per_band);
            let files = export_series(&series, out_dir, &options).await?;
            info!(files = files.len(), dir = %out_dir.display(), "Export finished");
        }
    }

    Ok(())
}

fn finish_series(
    label: &str,
    series: &TimeSeries,
    output: &std::path::Path,
    nodata: f32,
) -> hadley::Result<()> {
    log_series_stats(label, series);
    write_series(series, output, nodata)?;
    info!(path = %output.display(), "Wrote time series");
    Ok(())
}

/// Parse an RFC 3339 timestamp or a plain `YYYY-MM-DD` date
fn parse_time(raw: &str) -> hadley::Result<DateTime<Utc>> {
    if let Ok(time) = DateTime::parse_from_rfc3339(raw) {
        return Ok(time.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|time| time.and_utc())
        .ok_or_else(|| {
            HadleyError::invalid_parameter(
                "time",
                format!("'{}' is neither RFC 3339 nor YYYY-MM-DD", raw),
            )
        })
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Describe { .. } => "describe",
        Command::Aggregate { .. } => "aggregate",
        Command::Climatology { .. } => "climatology",
        Command::Anomaly { .. } => "anomaly",
        Command::Interpolate { .. } => "interpolate",
        Command::Rolling { .. } => "rolling",
        Command::Fill { .. } => "fill",
        Command::Export { .. } => "export",
    }
}
