//! Raster engine interface and in-core compositing.
//!
//! Reprojection, resampling and GeoTIFF writing belong to an external raster
//! engine reached through [`RasterEngine`]. This module defines the values
//! that cross that boundary and the compositing step that layers warped
//! sources on top of each other.

#[cfg(feature = "gdal")]
mod gdal_engine;

#[cfg(feature = "gdal")]
pub use gdal_engine::GdalEngine;

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::coord::BoundingBox;

/// Errors reported by a raster engine.
#[derive(Debug, Error)]
pub enum RasterError {
    #[error("failed to open raster {path}: {reason}")]
    Open { path: PathBuf, reason: String },

    #[error("failed to warp layer from {source_name}: {reason}")]
    Warp { source_name: String, reason: String },

    #[error("failed to write raster {path}: {reason}")]
    WriteFailed { path: PathBuf, reason: String },

    #[error("raster size mismatch: expected {expected_width}x{expected_height}, got {width}x{height}")]
    SizeMismatch {
        expected_width: usize,
        expected_height: usize,
        width: usize,
        height: usize,
    },

    #[error("no raster engine available: {0}")]
    Unsupported(String),
}

/// Spatial reference systems the pipeline deals in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Srs {
    /// EPSG:4326
    Wgs84,
    /// EPSG:4269
    Nad83,
    /// EPSG:3857
    WebMercator,
    Epsg(u32),
}

impl Srs {
    pub fn epsg(&self) -> u32 {
        match self {
            Srs::Wgs84 => 4326,
            Srs::Nad83 => 4269,
            Srs::WebMercator => 3857,
            Srs::Epsg(code) => *code,
        }
    }

    /// True for latitude/longitude systems measured in degrees.
    pub fn is_geographic(&self) -> bool {
        matches!(self, Srs::Wgs84 | Srs::Nad83) || matches!(self, Srs::Epsg(4326 | 4269))
    }
}

/// Resampling kernel used when warping a source into a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResampleFilter {
    Nearest,
    Bilinear,
    Cubic,
    Lanczos,
}

/// Affine pixel-to-world transform in GDAL order:
/// `[origin_x, pixel_width, row_rotation, origin_y, column_rotation, pixel_height]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform(pub [f64; 6]);

impl GeoTransform {
    /// North-up transform mapping `width x height` pixels onto `bbox`.
    pub fn from_bbox(bbox: &BoundingBox, width: usize, height: usize) -> Self {
        GeoTransform([
            bbox.minx,
            bbox.width() / width as f64,
            0.0,
            bbox.maxy,
            0.0,
            -bbox.height() / height as f64,
        ])
    }

    /// Size of one pixel along x, in world units.
    pub fn pixel_width(&self) -> f64 {
        self.0[1].abs()
    }
}

/// What the engine can tell about a raster file without reading its pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterInfo {
    pub geotransform: GeoTransform,
    pub width: usize,
    pub height: usize,
    pub geographic: bool,
}

impl RasterInfo {
    /// Pixel size in degrees, approximating projected units at the equator.
    pub fn resolution_degrees(&self) -> f64 {
        const METERS_PER_DEGREE: f64 = 111_319.490_793;
        let res = self.geotransform.pixel_width();
        if self.geographic {
            res
        } else {
            res / METERS_PER_DEGREE
        }
    }
}

/// A set of source files mosaicked together and warped as one.
#[derive(Debug, Clone, PartialEq)]
pub struct MosaicLayer {
    /// Name of the source the files come from, for logging.
    pub source_name: String,
    pub files: Vec<PathBuf>,
    pub srs: Srs,
    pub filter: ResampleFilter,
}

/// Request to reproject one mosaic layer into a destination window.
#[derive(Debug, Clone)]
pub struct WarpRequest<'a> {
    pub layer: &'a MosaicLayer,
    pub dst_srs: Srs,
    pub geotransform: GeoTransform,
    pub width: usize,
    pub height: usize,
}

/// Single-band floating point elevation grid, row-major from the north-west.
#[derive(Debug, Clone, PartialEq)]
pub struct ElevationRaster {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f32>,
    pub nodata: Option<f32>,
}

impl ElevationRaster {
    /// Raster with every pixel set to nodata (NaN).
    pub fn empty(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![f32::NAN; width * height],
            nodata: None,
        }
    }

    pub fn filled(width: usize, height: usize, value: f32) -> Self {
        Self {
            width,
            height,
            data: vec![value; width * height],
            nodata: None,
        }
    }

    #[inline]
    pub fn is_nodata(&self, value: f32) -> bool {
        value.is_nan() || self.nodata == Some(value)
    }
}

/// Signed 16-bit raster ready to be written as a GeoTIFF.
#[derive(Debug, Clone, PartialEq)]
pub struct Int16Raster {
    pub width: usize,
    pub height: usize,
    pub data: Vec<i16>,
    pub geotransform: GeoTransform,
    pub srs: Srs,
    pub nodata: i16,
}

/// GeoTIFF creation options.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoTiffOptions {
    pub tiled: bool,
    pub block_size: u32,
    pub compress: String,
    pub predictor: u8,
}

impl Default for GeoTiffOptions {
    fn default() -> Self {
        Self {
            tiled: true,
            block_size: 256,
            compress: "LZW".to_string(),
            predictor: 2,
        }
    }
}

impl GeoTiffOptions {
    /// Options as `KEY=VALUE` pairs.
    pub fn creation_options(&self) -> Vec<(String, String)> {
        let mut opts = Vec::with_capacity(5);
        if self.tiled {
            opts.push(("TILED".to_string(), "YES".to_string()));
            opts.push(("BLOCKXSIZE".to_string(), self.block_size.to_string()));
            opts.push(("BLOCKYSIZE".to_string(), self.block_size.to_string()));
        }
        opts.push(("COMPRESS".to_string(), self.compress.clone()));
        opts.push(("PREDICTOR".to_string(), self.predictor.to_string()));
        opts
    }
}

/// External raster engine.
///
/// Implementations must be usable from many worker threads at once.
pub trait RasterEngine: Send + Sync {
    /// Reads georeferencing and size of a raster file.
    fn describe(&self, path: &Path) -> Result<RasterInfo, RasterError>;

    /// Reprojects the layer's mosaic into the requested window. Pixels no
    /// source file covers come back as nodata.
    fn warp(&self, request: &WarpRequest<'_>) -> Result<ElevationRaster, RasterError>;

    /// Writes a single-band signed 16-bit GeoTIFF.
    fn write_geotiff_i16(
        &self,
        path: &Path,
        raster: &Int16Raster,
        options: &GeoTiffOptions,
    ) -> Result<(), RasterError>;
}

/// Engine used when the crate is built without a raster backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoEngine;

impl RasterEngine for NoEngine {
    fn describe(&self, path: &Path) -> Result<RasterInfo, RasterError> {
        Err(RasterError::Unsupported(format!(
            "cannot describe {}: built without the `gdal` feature",
            path.display()
        )))
    }

    fn warp(&self, request: &WarpRequest<'_>) -> Result<ElevationRaster, RasterError> {
        Err(RasterError::Unsupported(format!(
            "cannot warp {}: built without the `gdal` feature",
            request.layer.source_name
        )))
    }

    fn write_geotiff_i16(
        &self,
        path: &Path,
        _raster: &Int16Raster,
        _options: &GeoTiffOptions,
    ) -> Result<(), RasterError> {
        Err(RasterError::Unsupported(format!(
            "cannot write {}: built without the `gdal` feature",
            path.display()
        )))
    }
}

/// Layers warped rasters, first one on top.
///
/// Each output pixel takes the value of the first layer holding data there;
/// pixels no layer covers stay NaN. With no layers at all the result is an
/// all-nodata raster of the requested size.
pub fn composite(
    width: usize,
    height: usize,
    layers: &[ElevationRaster],
) -> Result<ElevationRaster, RasterError> {
    let mut out = ElevationRaster::empty(width, height);
    for layer in layers {
        if layer.width != width || layer.height != height || layer.data.len() != width * height {
            return Err(RasterError::SizeMismatch {
                expected_width: width,
                expected_height: height,
                width: layer.width,
                height: layer.height,
            });
        }
        for (dst, &src) in out.data.iter_mut().zip(&layer.data) {
            if dst.is_nan() && !layer.is_nodata(src) {
                *dst = src;
            }
        }
    }
    Ok(out)
}
