//! `demtiler run`: execute job descriptors on the worker pool.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use demtiler::raster::RasterEngine;
use demtiler::worker::run_jobs_with;
use demtiler::{Dispatcher, JobDescriptor};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use super::common::{http_client, load_config};
use crate::error::CliError;

/// Reads descriptors from `input` (stdin when `None`) and runs them.
pub fn run(
    config_path: Option<&Path>,
    input: Option<&Path>,
    threads: Option<usize>,
    progress: bool,
) -> Result<(), CliError> {
    let client = http_client()?;
    let config = load_config(config_path, client.clone())?;

    let descriptors = match input {
        Some(path) => {
            let file = File::open(path).map_err(|e| CliError::input(path, e))?;
            read_descriptors(BufReader::new(file), &path.display().to_string())?
        }
        None => read_descriptors(io::stdin().lock(), "<stdin>")?,
    };
    info!(jobs = descriptors.len(), "Loaded job descriptors");

    let engine = raster_engine();
    let dispatcher = Dispatcher::new(&config, engine.as_ref(), client);

    let bar = if progress {
        progress_bar(descriptors.len() as u64)
    } else {
        ProgressBar::hidden()
    };

    let summary = run_jobs_with(
        descriptors,
        &dispatcher,
        threads.or(config.threads),
        |_, _| bar.inc(1),
    )?;
    bar.finish_and_clear();

    eprintln!(
        "{} succeeded, {} failed",
        summary.succeeded,
        summary.failed.len()
    );
    for (descriptor, error) in &summary.failed {
        eprintln!("  {}: {}", descriptor, error);
    }

    if summary.is_success() {
        Ok(())
    } else {
        Err(CliError::JobsFailed {
            failed: summary.failed.len(),
            total: summary.total(),
        })
    }
}

/// Parses JSON Lines, skipping blank lines.
fn read_descriptors<R: BufRead>(reader: R, source: &str) -> Result<Vec<JobDescriptor>, CliError> {
    let mut descriptors = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| CliError::input(source, e))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let descriptor = JobDescriptor::from_json(line).map_err(|error| CliError::Descriptor {
            line: index + 1,
            error,
        })?;
        descriptors.push(descriptor);
    }
    Ok(descriptors)
}

#[cfg(feature = "gdal")]
fn raster_engine() -> Box<dyn RasterEngine> {
    Box::new(demtiler::raster::GdalEngine::new())
}

#[cfg(not(feature = "gdal"))]
fn raster_engine() -> Box<dyn RasterEngine> {
    tracing::warn!("Built without the `gdal` feature; tile jobs that need source data will fail");
    Box::new(demtiler::raster::NoEngine)
}

fn progress_bar(len: u64) -> ProgressBar {
    let bar = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::with_template(
        "{wide_bar:0.white/dim.white} {pos:>9}/{len:9} {per_sec:18} {elapsed_precise} {eta_precise}",
    ) {
        bar.set_style(style.progress_chars("██▁"));
    }
    bar
}
