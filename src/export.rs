//! Writing collections to per-image NetCDF files with a bounded worker pool.
//!
//! Each image is written by its own blocking task; at most `workers` tasks run
//! at once. Tasks finish in any order, so every file carries the index of its
//! source image and results are sorted by that index before returning.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::debug;

use crate::dataset::{download_id, prefix_id, Dataset};
use crate::error::{HadleyError, Result};
use crate::image::Image;
use crate::logging::{log_operation_end, log_operation_start};
use crate::netcdf_io::{read_band, write_image};
use crate::series::TimeSeries;

/// Default value written for masked pixels
pub const DEFAULT_NODATA: f32 = -32_768.0;

/// Options controlling how images are written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportOptions {
    /// Prefix added to every image id before naming files
    pub prefix: Option<String>,
    /// Write one file per band instead of one multi-band file per image
    pub file_per_band: bool,
    /// Treat the nodata value as masked when reading files back
    pub masked: bool,
    /// Value written for masked pixels
    pub nodata: f32,
    /// Maximum number of files written concurrently
    pub workers: usize,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            prefix: None,
            file_per_band: false,
            masked: true,
            nodata: DEFAULT_NODATA,
            workers: default_workers(),
        }
    }
}

/// Number of available CPU cores, falling back to 4
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// A file written for one image
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportedFile {
    /// Position of the source image in the exported collection
    pub image_index: usize,
    /// Band written, `None` for multi-band files
    pub band: Option<String>,
    pub path: PathBuf,
}

/// Write every image to `out_dir`, named `{download_id}.nc` or
/// `{download_id}.{band}.nc` per band. Any failed image aborts the export.
pub async fn export_images(
    images: Vec<Image>,
    out_dir: &Path,
    options: &ExportOptions,
) -> Result<Vec<ExportedFile>> {
    if options.workers == 0 {
        return Err(HadleyError::invalid_parameter(
            "workers",
            "at least one export worker is required",
        ));
    }
    tokio::fs::create_dir_all(out_dir).await?;

    let start = Instant::now();
    log_operation_start("export", Some(out_dir.display().to_string().as_str()));

    let semaphore = Arc::new(Semaphore::new(options.workers));
    let mut tasks = JoinSet::new();

    for (index, image) in images.into_iter().enumerate() {
        let image = match &options.prefix {
            Some(prefix) => prefix_id(image, prefix),
            None => image,
        };
        // Fail fast on images that cannot be named
        let stem = download_id(&image)?;
        if options.file_per_band {
            check_band_names(&image)?;
        }

        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| HadleyError::Export {
                message: format!("worker pool closed: {}", e),
            })?;
        let dir = out_dir.to_path_buf();
        let options = options.clone();

        tasks.spawn_blocking(move || {
            let _permit = permit;
            write_files(index, &image, &dir, &stem, &options)
        });
    }

    let mut files = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        let written = joined.map_err(|e| HadleyError::Export {
            message: format!("export task failed: {}", e),
        })?;
        match written {
            Ok(written) => files.extend(written),
            Err(e) => {
                tasks.abort_all();
                log_operation_end("export", start, false);
                return Err(e);
            }
        }
    }

    files.sort_by_key(|file| file.image_index);
    log_operation_end("export", start, true);
    Ok(files)
}

/// Band names end up between `.` separators in file names, so they cannot contain one.
fn check_band_names(image: &Image) -> Result<()> {
    match image.bands().iter().find(|band| band.contains('.')) {
        Some(band) => Err(HadleyError::invalid_parameter(
            "band",
            format!(
                "band '{}' of image {} contains '.', which is reserved in exported file names; \
                 rename the band before exporting one file per band",
                band,
                image.id.as_deref().unwrap_or("null")
            ),
        )),
        None => Ok(()),
    }
}

fn write_files(
    index: usize,
    image: &Image,
    dir: &Path,
    stem: &str,
    options: &ExportOptions,
) -> Result<Vec<ExportedFile>> {
    if !options.file_per_band {
        let path = dir.join(format!("{}.nc", stem));
        write_image(image, None, &path, options.nodata)?;
        debug!(path = %path.display(), "Exported image");
        return Ok(vec![ExportedFile {
            image_index: index,
            band: None,
            path,
        }]);
    }

    image
        .bands()
        .iter()
        .enumerate()
        .map(|(b, band)| {
            let path = dir.join(format!("{}.{}.nc", stem, band));
            write_image(image, Some(b), &path, options.nodata)?;
            debug!(path = %path.display(), "Exported band");
            Ok(ExportedFile {
                image_index: index,
                band: Some(band.clone()),
                path,
            })
        })
        .collect()
}

/// Write every image of a series; see [`export_images`].
pub async fn export_series(
    series: &TimeSeries,
    out_dir: &Path,
    options: &ExportOptions,
) -> Result<Vec<ExportedFile>> {
    export_images(series.images().to_vec(), out_dir, options).await
}

/// Export images one band per file to a temporary directory, read the files
/// back and merge them into a dataset.
pub async fn to_dataset(images: Vec<Image>, options: &ExportOptions) -> Result<Dataset> {
    let dir = tempfile::Builder::new().prefix("hadley_").tempdir()?;
    let options = ExportOptions {
        file_per_band: true,
        ..options.clone()
    };

    let files = export_images(images, dir.path(), &options).await?;
    let (masked, nodata) = (options.masked, options.nodata);

    // Read everything before the temporary directory is dropped
    let arrays = tokio::task::spawn_blocking(move || {
        files
            .iter()
            .map(|file| read_band(&file.path, masked, nodata))
            .collect::<Result<Vec<_>>>()
    })
    .await
    .map_err(|e| HadleyError::Export {
        message: format!("reading exported files failed: {}", e),
    })??;

    Dataset::merge(arrays)
}

impl TimeSeries {
    /// Convert to an in-memory dataset through exported files; see [`to_dataset`].
    pub async fn to_dataset(&self, options: &ExportOptions) -> Result<Dataset> {
        to_dataset(self.images().to_vec(), options).await
    }
}
