//! Elevation data sources.
//!
//! Each source knows which of its files cover an area, how to download
//! them, which projection they are in and how they should be resampled.
//! Sources are held in a [`SourceRegistry`] whose order is their priority:
//! the first source is drawn on top wherever it has data.

mod etopo1;
mod file;
mod ned;

pub use etopo1::{
    Etopo1, DEFAULT_BASE_DIR as ETOPO1_DEFAULT_BASE_DIR, TARGET_NAME as ETOPO1_TARGET_NAME,
};
pub use file::SourceFile;
pub use ned::{
    Ned, NedFile, NedVariant, DEFAULT_BASE_DIR as NED_DEFAULT_BASE_DIR,
    DEFAULT_TOPOBATHY_BASE_DIR as NED_TOPOBATHY_DEFAULT_BASE_DIR,
    NATIVE_RESOLUTION as NED_NATIVE_RESOLUTION,
};

use std::collections::HashSet;
use std::path::PathBuf;

use thiserror::Error;
use tracing::warn;

use crate::fetch::FetchError;
use crate::job::{JobDescriptor, JobError};
use crate::raster::{MosaicLayer, RasterEngine, RasterError, ResampleFilter, Srs};
use crate::region::RegionTile;
use crate::vrt::group_by_priority;

/// Errors raised by sources.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to load index for {source_name}: {reason}")]
    Index { source_name: String, reason: String },

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Raster(#[from] RasterError),
}

/// A source of elevation data.
pub trait SourceCatalog: Send + Sync {
    /// Human-readable name, used in logs.
    fn name(&self) -> &str;

    /// Tag of the job descriptors this source rehydrates.
    fn tag(&self) -> &'static str;

    /// Prepares whatever lookup structure the source needs. Idempotent.
    fn get_index(&self) -> Result<(), SourceError>;

    /// Files of this source already on disk. Re-reads the filesystem on
    /// every call.
    fn existing_files(&self) -> Box<dyn Iterator<Item = PathBuf> + '_>;

    /// Download handles for every file whose footprint intersects the tile,
    /// highest priority first.
    fn downloads_for(&self, tile: &RegionTile) -> Result<Vec<SourceFile>, SourceError>;

    /// The tile's files split into mosaic groups, drawn first to last.
    fn vrts_for(&self, tile: &RegionTile) -> Result<Vec<Vec<SourceFile>>, SourceError> {
        Ok(group_by_priority(&self.downloads_for(tile)?))
    }

    fn srs(&self) -> Srs;

    /// Resampling filter for going from `src_res` to `dst_res`, both in
    /// degrees per pixel.
    fn filter_type(&self, src_res: f64, dst_res: f64) -> ResampleFilter;

    /// Rebuilds a download handle from its descriptor.
    fn rehydrate(&self, descriptor: &JobDescriptor) -> Result<SourceFile, JobError>;
}

/// Configured sources in priority order.
#[derive(Default)]
pub struct SourceRegistry {
    sources: Vec<Box<dyn SourceCatalog>>,
}

impl SourceRegistry {
    pub fn new(sources: Vec<Box<dyn SourceCatalog>>) -> Self {
        Self { sources }
    }

    pub fn push(&mut self, source: Box<dyn SourceCatalog>) {
        self.sources.push(source);
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn SourceCatalog> {
        self.sources.iter().map(|s| s.as_ref())
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Names of all sources, in priority order.
    pub fn names(&self) -> Vec<&str> {
        self.iter().map(|s| s.name()).collect()
    }

    /// Loads every source's index.
    pub fn get_index(&self) -> Result<(), SourceError> {
        self.iter().try_for_each(|s| s.get_index())
    }

    /// Download handles needed for a tile across all sources, without
    /// duplicates.
    pub fn downloads_for(&self, tile: &RegionTile) -> Result<Vec<SourceFile>, SourceError> {
        let mut seen = HashSet::new();
        let mut files = Vec::new();
        for source in self.iter() {
            for file in source.downloads_for(tile)? {
                if seen.insert(file.output_file.clone()) {
                    files.push(file);
                }
            }
        }
        Ok(files)
    }

    /// Mosaic layers for a tile, top layer first.
    ///
    /// Files missing from disk are skipped with a warning, and the tile is
    /// rendered from whatever is present: pixels only a missing file covers
    /// come out as nodata. Running the download jobs before the tile jobs is
    /// what makes a tile complete. The resampling filter comes from comparing
    /// the first file's native resolution with the tile's.
    pub fn layers_for(
        &self,
        tile: &RegionTile,
        engine: &dyn RasterEngine,
    ) -> Result<Vec<MosaicLayer>, SourceError> {
        let mut layers = Vec::new();
        for source in self.iter() {
            for group in source.vrts_for(tile)? {
                let files: Vec<PathBuf> = group
                    .into_iter()
                    .filter_map(|f| {
                        if f.output_file.is_file() {
                            Some(f.output_file)
                        } else {
                            warn!(
                                source = source.name(),
                                file = %f.name,
                                "Source file not downloaded, skipping"
                            );
                            None
                        }
                    })
                    .collect();
                let Some(first) = files.first() else {
                    continue;
                };
                let src_res = engine.describe(first)?.resolution_degrees();
                layers.push(MosaicLayer {
                    source_name: source.name().to_string(),
                    srs: source.srs(),
                    filter: source.filter_type(src_res, tile.resolution),
                    files,
                });
            }
        }
        Ok(layers)
    }

    /// Rebuilds a download handle with whichever source owns the tag.
    pub fn rehydrate(&self, descriptor: &JobDescriptor) -> Result<SourceFile, JobError> {
        let tag = descriptor.tag();
        self.iter()
            .find(|s| s.tag() == tag)
            .ok_or(JobError::NoHandler {
                kind: "source",
                tag,
            })?
            .rehydrate(descriptor)
    }
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::BoundingBox;

    fn tile() -> RegionTile {
        RegionTile {
            bbox: BoundingBox::new(-1.0, -1.0, 1.0, 1.0).unwrap(),
            resolution: 0.01,
        }
    }

    #[test]
    fn test_downloads_are_deduplicated() {
        let registry = SourceRegistry::new(vec![
            Box::new(Etopo1::new("http://a/etopo1.zip", "etopo1")),
            Box::new(Etopo1::new("http://b/etopo1.zip", "etopo1")),
        ]);
        let files = registry.downloads_for(&tile()).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].urls, vec!["http://a/etopo1.zip".to_string()]);
    }

    #[test]
    fn test_rehydrate_routes_by_tag() {
        let registry =
            SourceRegistry::new(vec![Box::new(Etopo1::new("http://a/etopo1.zip", "etopo1"))]);
        let file = registry.rehydrate(&JobDescriptor::Etopo1).unwrap();
        assert_eq!(file.name, ETOPO1_TARGET_NAME);

        let missing = registry.rehydrate(&JobDescriptor::Ned {
            name: "x".to_string(),
        });
        assert!(matches!(missing, Err(JobError::NoHandler { .. })));
    }

    #[test]
    fn test_layers_skip_missing_files() {
        let registry = SourceRegistry::new(vec![Box::new(Etopo1::new(
            "http://a/etopo1.zip",
            "/nonexistent/etopo1",
        ))]);
        let layers = registry
            .layers_for(&tile(), &crate::raster::NoEngine)
            .unwrap();
        assert!(layers.is_empty());
    }

    #[test]
    fn test_registry_debug_lists_names() {
        let registry = SourceRegistry::new(vec![Box::new(Etopo1::new("u", "d"))]);
        assert_eq!(format!("{:?}", registry), r#"["etopo1"]"#);
    }
}
