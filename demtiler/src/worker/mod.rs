//! Descriptor dispatch and the worker pool.
//!
//! A [`Dispatcher`] turns any [`JobDescriptor`] back into a live job against
//! the shared configuration and runs it. [`run_jobs`] drives a stream of
//! descriptors through a rayon pool. Jobs are independent: each either
//! writes its own output file or fails on its own.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;

use parking_lot::Mutex;
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::PyramidConfig;
use crate::fetch::{FetchError, FetchOutcome, Fetcher, HttpClient};
use crate::job::{JobDescriptor, JobError};
use crate::output::{RenderContext, RenderError};
use crate::raster::RasterEngine;

/// Errors raised while running a single job.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Job(#[from] JobError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("job panicked: {0}")]
    Panicked(String),

    #[error("failed to build worker pool: {0}")]
    Pool(String),
}

/// What a finished job produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// A tile was written to this path.
    Rendered(PathBuf),
    /// A source file was made available.
    Fetched(FetchOutcome),
}

/// Rehydrates and runs descriptors.
pub struct Dispatcher<'a, C: HttpClient> {
    config: &'a PyramidConfig,
    engine: &'a dyn RasterEngine,
    fetcher: Fetcher<C>,
}

impl<'a, C: HttpClient> Dispatcher<'a, C> {
    pub fn new(config: &'a PyramidConfig, engine: &'a dyn RasterEngine, client: C) -> Self {
        Self {
            config,
            engine,
            fetcher: Fetcher::new(client),
        }
    }

    pub fn config(&self) -> &'a PyramidConfig {
        self.config
    }

    /// Runs one job to completion.
    ///
    /// Tile descriptors go to the output whose tag matches; every other
    /// descriptor goes to the source that owns its tag and is fetched.
    pub fn dispatch(&self, descriptor: &JobDescriptor) -> Result<JobOutcome, WorkerError> {
        debug!(job = %descriptor, "Dispatching job");

        if descriptor.is_tile() {
            let tag = descriptor.tag();
            let output = self
                .config
                .outputs()
                .find(|o| o.format().tag() == tag)
                .ok_or(JobError::NoHandler {
                    kind: "output",
                    tag,
                })?;
            let tile = output.rehydrate(descriptor)?;
            let ctx = RenderContext {
                engine: self.engine,
                sources: &self.config.sources,
            };
            return Ok(JobOutcome::Rendered(tile.render(&ctx)?));
        }

        let file = self.config.sources.rehydrate(descriptor)?;
        Ok(JobOutcome::Fetched(self.fetcher.fetch(&file)?))
    }
}

/// Result of a pool run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub succeeded: usize,
    /// Failed jobs with their error messages, in completion order.
    pub failed: Vec<(JobDescriptor, String)>,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed.len()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Runs every descriptor on a pool of `threads` workers.
///
/// `None` sizes the pool to the machine. A failing or panicking job is
/// logged as soon as it finishes and recorded; it never stops the others.
/// Only failures are kept, so successful jobs cost no memory.
pub fn run_jobs<I, C>(
    descriptors: I,
    dispatcher: &Dispatcher<'_, C>,
    threads: Option<usize>,
) -> Result<RunSummary, WorkerError>
where
    I: IntoIterator<Item = JobDescriptor>,
    I::IntoIter: Send,
    C: HttpClient,
{
    run_jobs_with(descriptors, dispatcher, threads, |_, _| {})
}

/// Like [`run_jobs`], calling `on_complete` after each job with whether it
/// succeeded.
pub fn run_jobs_with<I, C, F>(
    descriptors: I,
    dispatcher: &Dispatcher<'_, C>,
    threads: Option<usize>,
    on_complete: F,
) -> Result<RunSummary, WorkerError>
where
    I: IntoIterator<Item = JobDescriptor>,
    I::IntoIter: Send,
    C: HttpClient,
    F: Fn(&JobDescriptor, bool) + Send + Sync,
{
    let mut builder =
        rayon::ThreadPoolBuilder::new().thread_name(|i| format!("demtiler-worker-{}", i));
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    let pool = builder
        .build()
        .map_err(|e| WorkerError::Pool(e.to_string()))?;

    info!(threads = pool.current_num_threads(), "Starting worker pool");

    let jobs = descriptors.into_iter();
    let summary = Mutex::new(RunSummary::default());
    pool.install(|| {
        jobs.par_bridge().for_each(|descriptor| {
            let result = run_isolated(dispatcher, &descriptor);
            on_complete(&descriptor, result.is_ok());
            match result {
                Ok(_) => summary.lock().succeeded += 1,
                Err(e) => {
                    warn!(job = %descriptor, error = %e, "Job failed");
                    summary.lock().failed.push((descriptor, e.to_string()));
                }
            }
        })
    });
    let summary = summary.into_inner();

    info!(
        succeeded = summary.succeeded,
        failed = summary.failed.len(),
        "Worker pool finished"
    );
    Ok(summary)
}

/// Runs one job, turning a panic into a [`WorkerError::Panicked`] so that
/// it cannot take down the pool.
fn run_isolated<C: HttpClient>(
    dispatcher: &Dispatcher<'_, C>,
    descriptor: &JobDescriptor,
) -> Result<JobOutcome, WorkerError> {
    panic::catch_unwind(AssertUnwindSafe(|| dispatcher.dispatch(descriptor)))
        .unwrap_or_else(|payload| Err(WorkerError::Panicked(panic_message(payload.as_ref()))))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::BoundingBox;
    use crate::fetch::MockHttpClient;
    use crate::output::{OutputConfig, TileFormat};
    use crate::raster::NoEngine;
    use crate::region::{Region, ZoomRange};
    use crate::source::{Etopo1, SourceRegistry, ETOPO1_TARGET_NAME};
    use std::path::Path;
    use tempfile::TempDir;

    fn config(dir: &Path) -> PyramidConfig {
        PyramidConfig {
            regions: vec![Region::new(
                "world",
                BoundingBox::new(-180.0, -85.0, 180.0, 85.0).unwrap(),
                ZoomRange::new(0, 2).unwrap(),
            )],
            sources: SourceRegistry::new(vec![Box::new(Etopo1::new(
                "http://example.com/etopo1.zip",
                dir.join("etopo1"),
            ))]),
            outputs: vec![
                OutputConfig {
                    format: TileFormat::Terrarium,
                    output_dir: dir.join("terrarium"),
                },
                OutputConfig {
                    format: TileFormat::GeoTiff,
                    output_dir: dir.join("tiff"),
                },
            ],
            threads: Some(2),
        }
    }

    #[test]
    fn test_dispatch_renders_terrarium_without_data() {
        // With no source file on disk every pixel is nodata, which encodes
        // without touching the raster engine.
        let temp = TempDir::new().unwrap();
        let config = config(temp.path());
        let dispatcher = Dispatcher::new(&config, &NoEngine, MockHttpClient::default());

        let outcome = dispatcher
            .dispatch(&JobDescriptor::Terrarium { z: 1, x: 1, y: 0 })
            .unwrap();

        let expected = temp.path().join("terrarium").join("1").join("1").join("0.png");
        assert_eq!(outcome, JobOutcome::Rendered(expected.clone()));
        assert!(std::fs::metadata(&expected).unwrap().len() > 0);
    }

    #[test]
    fn test_dispatch_fetch_skips_present_file() {
        let temp = TempDir::new().unwrap();
        let config = config(temp.path());
        let target = temp.path().join("etopo1").join(ETOPO1_TARGET_NAME);
        std::fs::create_dir_all(target.parent().unwrap()).unwrap();
        std::fs::write(&target, b"tiff").unwrap();

        let client = std::sync::Arc::new(MockHttpClient::default());
        let dispatcher = Dispatcher::new(&config, &NoEngine, client.clone());

        let outcome = dispatcher.dispatch(&JobDescriptor::Etopo1).unwrap();
        assert_eq!(outcome, JobOutcome::Fetched(FetchOutcome::AlreadyPresent(target)));
        assert_eq!(
            client.requests.load(std::sync::atomic::Ordering::SeqCst),
            0
        );
    }

    #[test]
    fn test_dispatch_unknown_source_tag() {
        let temp = TempDir::new().unwrap();
        let config = config(temp.path());
        let dispatcher = Dispatcher::new(&config, &NoEngine, MockHttpClient::default());

        let result = dispatcher.dispatch(&JobDescriptor::Ned {
            name: "ned19_n38x00_w122x50_ca_sf_2010.zip".to_string(),
        });
        assert!(matches!(
            result,
            Err(WorkerError::Job(JobError::NoHandler { .. }))
        ));
    }

    #[test]
    fn test_dispatch_unconfigured_output() {
        let temp = TempDir::new().unwrap();
        let mut config = config(temp.path());
        config.outputs.retain(|o| o.format == TileFormat::Terrarium);
        let dispatcher = Dispatcher::new(&config, &NoEngine, MockHttpClient::default());

        let result = dispatcher.dispatch(&JobDescriptor::Tiff { z: 0, x: 0, y: 0 });
        assert!(matches!(
            result,
            Err(WorkerError::Job(JobError::NoHandler { kind: "output", .. }))
        ));
    }

    #[test]
    fn test_failures_do_not_stop_other_jobs() {
        let temp = TempDir::new().unwrap();
        let config = config(temp.path());
        let dispatcher = Dispatcher::new(&config, &NoEngine, MockHttpClient::default());

        let jobs = vec![
            JobDescriptor::Terrarium { z: 0, x: 0, y: 0 },
            // No engine to write GeoTIFFs with.
            JobDescriptor::Tiff { z: 0, x: 0, y: 0 },
            // Nothing served at the download URL.
            JobDescriptor::Etopo1,
            JobDescriptor::Terrarium { z: 1, x: 0, y: 1 },
        ];

        let summary = run_jobs(jobs, &dispatcher, Some(2)).unwrap();

        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.total(), 4);
        assert!(!summary.is_success());
        let failed: Vec<&JobDescriptor> = summary.failed.iter().map(|(d, _)| d).collect();
        assert!(failed.contains(&&JobDescriptor::Tiff { z: 0, x: 0, y: 0 }));
        assert!(failed.contains(&&JobDescriptor::Etopo1));
        assert!(!temp.path().join("tiff").join("0").join("0").join("0.tif").exists());
    }

    /// Panics when asked to write a GeoTIFF.
    struct PanickingEngine;

    impl RasterEngine for PanickingEngine {
        fn describe(&self, path: &Path) -> Result<crate::raster::RasterInfo, crate::raster::RasterError> {
            NoEngine.describe(path)
        }

        fn warp(
            &self,
            request: &crate::raster::WarpRequest<'_>,
        ) -> Result<crate::raster::ElevationRaster, crate::raster::RasterError> {
            NoEngine.warp(request)
        }

        fn write_geotiff_i16(
            &self,
            _path: &Path,
            _raster: &crate::raster::Int16Raster,
            _options: &crate::raster::GeoTiffOptions,
        ) -> Result<(), crate::raster::RasterError> {
            panic!("engine crashed");
        }
    }

    #[test]
    fn test_panicking_job_is_recorded_as_failed() {
        let temp = TempDir::new().unwrap();
        let config = config(temp.path());
        let dispatcher = Dispatcher::new(&config, &PanickingEngine, MockHttpClient::default());

        let jobs = vec![
            JobDescriptor::Terrarium { z: 0, x: 0, y: 0 },
            JobDescriptor::Tiff { z: 0, x: 0, y: 0 },
            JobDescriptor::Terrarium { z: 1, x: 1, y: 1 },
        ];
        let summary = run_jobs(jobs, &dispatcher, Some(2)).unwrap();

        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed.len(), 1);
        let (descriptor, error) = &summary.failed[0];
        assert_eq!(descriptor, &JobDescriptor::Tiff { z: 0, x: 0, y: 0 });
        assert!(error.contains("engine crashed"), "{}", error);
        assert!(!temp.path().join("tiff").join("0").join("0").join("0.tif").exists());
    }

    #[test]
    fn test_panic_message_payloads() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42_u8), "unknown panic");
    }

    #[test]
    fn test_progress_callback_sees_every_job() {
        let temp = TempDir::new().unwrap();
        let config = config(temp.path());
        let dispatcher = Dispatcher::new(&config, &NoEngine, MockHttpClient::default());
        let done = std::sync::atomic::AtomicUsize::new(0);

        let jobs: Vec<JobDescriptor> = config
            .outputs()
            .filter(|o| o.format() == TileFormat::Terrarium)
            .flat_map(|o| o.generate_tiles().map(|t| t.freeze_dry()).collect::<Vec<_>>())
            .collect();
        let count = jobs.len();

        let summary = run_jobs_with(jobs, &dispatcher, None, |_, ok| {
            assert!(ok);
            done.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        })
        .unwrap();

        assert_eq!(count, 1 + 4);
        assert_eq!(summary.succeeded, count);
        assert_eq!(done.load(std::sync::atomic::Ordering::SeqCst), count);
    }
}
