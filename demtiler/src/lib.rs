//! demtiler - elevation tile pyramids from public DEM datasets
//!
//! Enumerates web-mercator tiles over configured regions, works out which
//! source files (ETOPO1, NED 1/9") cover each tile, fetches them, and renders
//! terrarium PNG and int16 GeoTIFF tiles. Every unit of work can be frozen
//! into a small JSON descriptor and rehydrated on any worker sharing the
//! same configuration.

pub mod config;
pub mod coord;
pub mod fetch;
pub mod job;
pub mod logging;
pub mod output;
pub mod raster;
pub mod region;
pub mod source;
pub mod vrt;
pub mod worker;

pub use config::{ConfigError, PyramidConfig};
pub use coord::{BoundingBox, CoordError, TileCoord};
pub use job::{JobDescriptor, JobError};
pub use output::{Output, OutputConfig, RenderContext, RenderError, Tile, TileFormat};
pub use region::{Region, RegionTile, ZoomRange};
pub use worker::{run_jobs, Dispatcher, RunSummary};
