//! Web-mercator tile grid.
//!
//! Converts between geographic coordinates (longitude/latitude, degrees),
//! spherical-mercator meters and `(zoom, x, y)` tile indices. Everything here
//! is pure arithmetic; there is no I/O.

mod types;

pub use types::{
    tiles_at_zoom, BoundingBox, CoordError, TileCoord, MAX_LAT, MAX_LON, MAX_ZOOM, MIN_LAT,
    MIN_LON, MIN_ZOOM, ORIGIN_SHIFT,
};

use std::f64::consts::PI;

/// Finds the tile containing a geographic point.
///
/// Latitude is clamped to the mercator limits (±85.0511287798°) and
/// longitude to [-180, 180], so any finite input maps to a tile. The
/// resulting indices are clamped into `[0, 2^zoom)`, which puts the point
/// at exactly `lon = 180` into the last column.
///
/// # Arguments
///
/// * `zoom` - Zoom level (0 to `MAX_ZOOM`)
/// * `lon` - Longitude in degrees
/// * `lat` - Latitude in degrees
///
/// # Returns
///
/// The `(x, y)` tile indices, or an error for non-finite input or an
/// unsupported zoom.
pub fn lonlat_to_xy(zoom: u8, lon: f64, lat: f64) -> Result<(u32, u32), CoordError> {
    if zoom > MAX_ZOOM {
        return Err(CoordError::InvalidZoom(zoom));
    }
    if !lon.is_finite() || !lat.is_finite() {
        return Err(CoordError::NonFinite { lon, lat });
    }

    let n = tiles_at_zoom(zoom) as f64;
    let lon = lon.clamp(MIN_LON, MAX_LON);
    let lat = lat.clamp(MIN_LAT, MAX_LAT);

    let fx = ((lon + 180.0) / 360.0 * n).floor();
    let lat_rad = lat.to_radians();
    let fy = ((1.0 - lat_rad.tan().asinh() / PI) / 2.0 * n).floor();

    Ok((clamp_index(fx, zoom), clamp_index(fy, zoom)))
}

fn clamp_index(value: f64, zoom: u8) -> u32 {
    let max = (tiles_at_zoom(zoom) - 1) as f64;
    value.clamp(0.0, max) as u32
}

/// Latitude (degrees) of the northern edge of tile row `y`.
#[inline]
fn row_to_lat(y: f64, n: f64) -> f64 {
    (PI * (1.0 - 2.0 * y / n)).sinh().atan().to_degrees()
}

/// Longitude (degrees) of the western edge of tile column `x`.
#[inline]
fn col_to_lon(x: f64, n: f64) -> f64 {
    x / n * 360.0 - 180.0
}

/// Geographic extent of a tile in degrees.
pub fn latlon_bbox(zoom: u8, x: u32, y: u32) -> Result<BoundingBox, CoordError> {
    TileCoord::new(zoom, x, y).map(|t| t.latlon_bbox())
}

/// Spherical-mercator extent of a tile in meters.
pub fn mercator_bbox(zoom: u8, x: u32, y: u32) -> Result<BoundingBox, CoordError> {
    TileCoord::new(zoom, x, y).map(|t| t.mercator_bbox())
}

/// Ground resolution of a box rendered at `tile_size` pixels across, in the
/// box's own units per pixel.
#[inline]
pub fn resolution(bbox: &BoundingBox, tile_size: u32) -> f64 {
    bbox.width() / tile_size as f64
}

impl TileCoord {
    /// Geographic extent of this tile in degrees.
    pub fn latlon_bbox(&self) -> BoundingBox {
        let n = tiles_at_zoom(self.zoom) as f64;
        let (x, y) = (self.x as f64, self.y as f64);
        BoundingBox {
            minx: col_to_lon(x, n),
            miny: row_to_lat(y + 1.0, n),
            maxx: col_to_lon(x + 1.0, n),
            maxy: row_to_lat(y, n),
        }
    }

    /// Spherical-mercator extent of this tile in meters.
    pub fn mercator_bbox(&self) -> BoundingBox {
        let n = tiles_at_zoom(self.zoom) as f64;
        let span = 2.0 * ORIGIN_SHIFT / n;
        let (x, y) = (self.x as f64, self.y as f64);
        BoundingBox {
            minx: x * span - ORIGIN_SHIFT,
            miny: ORIGIN_SHIFT - (y + 1.0) * span,
            maxx: (x + 1.0) * span - ORIGIN_SHIFT,
            maxy: ORIGIN_SHIFT - y * span,
        }
    }
}
