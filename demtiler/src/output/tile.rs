//! A single output tile and its render job.

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::coord::{BoundingBox, TileCoord};
use crate::fetch::make_published;
use crate::job::JobDescriptor;
use crate::raster::{composite, ElevationRaster, GeoTiffOptions, GeoTransform, Srs, WarpRequest};
use crate::region::RegionTile;

use super::{terrarium, tiff, OutputConfig, RenderContext, RenderError, TileFormat};

/// One tile of one output format.
///
/// Borrows the output configuration it belongs to; holds no other state.
#[derive(Debug, Clone, Copy)]
pub struct Tile<'a> {
    coord: TileCoord,
    output: &'a OutputConfig,
}

impl<'a> Tile<'a> {
    pub fn new(coord: TileCoord, output: &'a OutputConfig) -> Self {
        Self { coord, output }
    }

    pub fn coord(&self) -> TileCoord {
        self.coord
    }

    pub fn format(&self) -> TileFormat {
        self.output.format
    }

    pub fn tile_size(&self) -> u32 {
        self.output.format.tile_size()
    }

    /// `z/x/y`, the tile's name within its output directory.
    pub fn tile_name(&self) -> String {
        self.coord.to_string()
    }

    /// `<output_dir>/<z>/<x>/<y>.<ext>`
    pub fn output_path(&self) -> PathBuf {
        self.output
            .output_dir
            .join(self.coord.zoom.to_string())
            .join(self.coord.x.to_string())
            .join(format!("{}.{}", self.coord.y, self.output.format.extension()))
    }

    pub fn latlon_bbox(&self) -> BoundingBox {
        self.coord.latlon_bbox()
    }

    pub fn mercator_bbox(&self) -> BoundingBox {
        self.coord.mercator_bbox()
    }

    /// The tile's footprint and the resolution it is rendered at, in degrees.
    pub fn region_tile(&self) -> RegionTile {
        let bbox = self.latlon_bbox();
        RegionTile {
            bbox,
            resolution: crate::coord::resolution(&bbox, self.tile_size()),
        }
    }

    pub fn freeze_dry(&self) -> JobDescriptor {
        let TileCoord { zoom: z, x, y } = self.coord;
        match self.output.format {
            TileFormat::Terrarium => JobDescriptor::Terrarium { z, x, y },
            TileFormat::GeoTiff => JobDescriptor::Tiff { z, x, y },
        }
    }

    fn geotransform(&self) -> GeoTransform {
        let size = self.tile_size() as usize;
        GeoTransform::from_bbox(&self.mercator_bbox(), size, size)
    }

    /// Warps every source layer into this tile and composites them.
    ///
    /// Returns the raster together with the names of the sources that
    /// contributed a layer, in priority order.
    pub fn elevation(
        &self,
        ctx: &RenderContext<'_>,
    ) -> Result<(ElevationRaster, Vec<String>), RenderError> {
        let size = self.tile_size() as usize;
        let layers = ctx.sources.layers_for(&self.region_tile(), ctx.engine)?;
        let geotransform = self.geotransform();

        let warped = layers
            .iter()
            .map(|layer| {
                ctx.engine.warp(&WarpRequest {
                    layer,
                    dst_srs: Srs::WebMercator,
                    geotransform,
                    width: size,
                    height: size,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut names: Vec<String> = Vec::new();
        for layer in &layers {
            if !names.contains(&layer.source_name) {
                names.push(layer.source_name.clone());
            }
        }

        Ok((composite(size, size, &warped)?, names))
    }

    /// Renders the tile and atomically writes it to [`Tile::output_path`].
    ///
    /// On any failure the final path is left untouched.
    pub fn render(&self, ctx: &RenderContext<'_>) -> Result<PathBuf, RenderError> {
        let name = self.tile_name();
        debug!(tile = %name, format = self.format().tag(), "Generating tile");

        let (raster, sources) = self.elevation(ctx)?;
        let path = self.output_path();

        match self.output.format {
            TileFormat::Terrarium => write_atomic(&path, |tmp| {
                let mut writer = BufWriter::new(tmp.as_file_mut());
                terrarium::write_png(&mut writer, &raster).map_err(|e| {
                    RenderError::Encode {
                        path: path.clone(),
                        reason: e.to_string(),
                    }
                })?;
                writer.flush().map_err(|e| RenderError::Io {
                    path: path.clone(),
                    source: e,
                })
            })?,
            TileFormat::GeoTiff => write_atomic(&path, |tmp| {
                let encoded = tiff::encode_geotiff(&raster, self.geotransform());
                ctx.engine
                    .write_geotiff_i16(tmp.path(), &encoded, &GeoTiffOptions::default())?;
                Ok(())
            })?,
        }

        ensure_written(&path)?;
        info!(tile = %name, sources = %sources.join(", "), "Done generating tile");
        Ok(path)
    }
}

/// Writes through a temporary file beside `path`, then renames it into place.
fn write_atomic<F>(path: &Path, write: F) -> Result<(), RenderError>
where
    F: FnOnce(&mut NamedTempFile) -> Result<(), RenderError>,
{
    let io_err = |p: &Path, e: std::io::Error| RenderError::Io {
        path: p.to_path_buf(),
        source: e,
    };
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".tile-")
        .tempfile_in(dir)
        .map_err(|e| io_err(dir, e))?;
    write(&mut tmp)?;
    make_published(tmp.path()).map_err(|e| io_err(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| io_err(path, e.error))?;
    Ok(())
}

fn ensure_written(path: &Path) -> Result<(), RenderError> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(()),
        _ => Err(RenderError::MissingOutput {
            path: path.to_path_buf(),
        }),
    }
}
