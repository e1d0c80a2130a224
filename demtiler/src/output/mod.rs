//! Output formats and the tile pyramid generator.
//!
//! An [`Output`] enumerates the tiles of one format over the configured
//! regions and rebuilds tiles from their job descriptors. Rendering a
//! [`Tile`] needs a [`RenderContext`] carrying the raster engine and the
//! source registry.

mod terrarium;
mod tiff;
mod tile;

pub use terrarium::{
    decode_height as decode_terrarium_height, encode_height as encode_terrarium_height,
    encode_terrarium,
};
pub use tiff::{
    encode_geotiff, encode_height as encode_geotiff_height, NODATA as GEOTIFF_NODATA,
};
pub use tile::Tile;

use std::path::PathBuf;

use thiserror::Error;

use crate::coord::{BoundingBox, CoordError};
use crate::job::{JobDescriptor, JobError};
use crate::raster::{RasterEngine, RasterError};
use crate::region::{expand_tile, region_tiles, Region, RegionTile, ZoomRange};
use crate::source::{SourceError, SourceRegistry};

/// Errors raised while rendering a tile.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Raster(#[from] RasterError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode {path}: {reason}")]
    Encode { path: PathBuf, reason: String },

    #[error("tile output {path} missing or empty after write")]
    MissingOutput { path: PathBuf },
}

/// Supported tile formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileFormat {
    /// 256px RGB PNG, heights packed terrarium-style.
    Terrarium,
    /// 512px single-band int16 GeoTIFF.
    GeoTiff,
}

impl TileFormat {
    pub const ALL: [TileFormat; 2] = [TileFormat::Terrarium, TileFormat::GeoTiff];

    pub fn tile_size(&self) -> u32 {
        match self {
            TileFormat::Terrarium => terrarium::TILE_SIZE,
            TileFormat::GeoTiff => tiff::TILE_SIZE,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            TileFormat::Terrarium => "png",
            TileFormat::GeoTiff => "tif",
        }
    }

    /// Descriptor tag; also the configuration section suffix.
    pub fn tag(&self) -> &'static str {
        match self {
            TileFormat::Terrarium => "terrarium",
            TileFormat::GeoTiff => "tiff",
        }
    }

    /// Levels the region zoom ranges move down by when enumerating tiles.
    ///
    /// A 512px tile covers the same ground at `z - 1` as a 256px tile at `z`.
    pub fn zoom_shift(&self) -> u8 {
        match self {
            TileFormat::Terrarium => 0,
            TileFormat::GeoTiff => 1,
        }
    }

    pub fn default_output_dir(&self) -> &'static str {
        match self {
            TileFormat::Terrarium => "terrarium_tiles",
            TileFormat::GeoTiff => "tiff_tiles",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.tag() == tag)
    }
}

impl std::fmt::Display for TileFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// Where and in which format tiles are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputConfig {
    pub format: TileFormat,
    pub output_dir: PathBuf,
}

impl OutputConfig {
    pub fn new(format: TileFormat) -> Self {
        Self {
            format,
            output_dir: PathBuf::from(format.default_output_dir()),
        }
    }
}

/// Collaborators a tile needs to render.
#[derive(Clone, Copy)]
pub struct RenderContext<'a> {
    pub engine: &'a dyn RasterEngine,
    pub sources: &'a SourceRegistry,
}

/// Tile generator for one output format over a set of regions.
#[derive(Debug, Clone, Copy)]
pub struct Output<'a> {
    config: &'a OutputConfig,
    regions: &'a [Region],
}

impl<'a> Output<'a> {
    pub fn new(config: &'a OutputConfig, regions: &'a [Region]) -> Self {
        Self { config, regions }
    }

    pub fn config(&self) -> &'a OutputConfig {
        self.config
    }

    pub fn format(&self) -> TileFormat {
        self.config.format
    }

    /// Every tile of every region, lazily, with the format's zoom shift
    /// applied. See [`region_tiles`] for ordering and duplicates.
    pub fn generate_tiles(&self) -> impl Iterator<Item = Tile<'a>> + 'a {
        let config = self.config;
        region_tiles(self.regions, config.format.zoom_shift())
            .map(move |coord| Tile::new(coord, config))
    }

    /// Covering boxes and resolutions for `bbox` at this format's tile size.
    ///
    /// The zoom range is used as given, without the format's zoom shift.
    pub fn expand_tile(
        &self,
        bbox: &BoundingBox,
        zoom_range: ZoomRange,
    ) -> Result<Vec<RegionTile>, CoordError> {
        expand_tile(bbox, zoom_range, self.config.format.tile_size())
    }

    /// Rebuilds a tile from its descriptor.
    pub fn rehydrate(&self, descriptor: &JobDescriptor) -> Result<Tile<'a>, JobError> {
        descriptor.expect_tag(self.config.format.tag())?;
        let coord = descriptor.tile()?.ok_or(JobError::TagMismatch {
            expected: self.config.format.tag(),
            found: descriptor.tag(),
        })?;
        Ok(Tile::new(coord, self.config))
    }
}
