//! Core coordinate types for the web-mercator tile grid.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum latitude representable in Web Mercator (degrees).
pub const MAX_LAT: f64 = 85.0511287798;

/// Minimum latitude representable in Web Mercator (degrees).
pub const MIN_LAT: f64 = -MAX_LAT;

/// Minimum longitude (degrees).
pub const MIN_LON: f64 = -180.0;

/// Maximum longitude (degrees).
pub const MAX_LON: f64 = 180.0;

/// Minimum supported zoom level.
pub const MIN_ZOOM: u8 = 0;

/// Maximum supported zoom level.
///
/// Tile indices at this zoom still fit comfortably in a `u32`.
pub const MAX_ZOOM: u8 = 24;

/// Half the circumference of the WGS84 ellipsoid at the equator, in meters.
pub const ORIGIN_SHIFT: f64 = std::f64::consts::PI * 6_378_137.0;

/// Errors raised by coordinate conversions.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordError {
    #[error("invalid zoom level {0} (expected {MIN_ZOOM}..={MAX_ZOOM})")]
    InvalidZoom(u8),

    #[error("invalid zoom range [{start}, {end})")]
    InvalidZoomRange { start: u8, end: u8 },

    #[error("coordinate is not finite: lon={lon}, lat={lat}")]
    NonFinite { lon: f64, lat: f64 },

    #[error("tile index ({x}, {y}) out of range for zoom {zoom}")]
    TileOutOfRange { zoom: u8, x: u32, y: u32 },

    #[error("invalid bounding box ({minx}, {miny}, {maxx}, {maxy})")]
    InvalidBoundingBox {
        minx: f64,
        miny: f64,
        maxx: f64,
        maxy: f64,
    },
}

/// An axis-aligned rectangle `(minx, miny, maxx, maxy)`.
///
/// Used both for lon/lat degrees and for mercator meters; the unit is
/// implied by where the box came from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub minx: f64,
    pub miny: f64,
    pub maxx: f64,
    pub maxy: f64,
}

impl BoundingBox {
    /// Creates a validated bounding box.
    ///
    /// Rejects non-finite corners and boxes with `min > max` on either axis.
    /// Degenerate boxes (zero width or height) are allowed.
    pub fn new(minx: f64, miny: f64, maxx: f64, maxy: f64) -> Result<Self, CoordError> {
        let finite = [minx, miny, maxx, maxy].iter().all(|v| v.is_finite());
        if !finite || minx > maxx || miny > maxy {
            return Err(CoordError::InvalidBoundingBox {
                minx,
                miny,
                maxx,
                maxy,
            });
        }
        Ok(Self {
            minx,
            miny,
            maxx,
            maxy,
        })
    }

    /// Corner tuple in `(minx, miny, maxx, maxy)` order.
    #[inline]
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        (self.minx, self.miny, self.maxx, self.maxy)
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.maxx - self.minx
    }

    #[inline]
    pub fn height(&self) -> f64 {
        self.maxy - self.miny
    }

    /// True when the interiors of the two boxes overlap.
    ///
    /// Boxes sharing only an edge or a corner do not intersect.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.minx < other.maxx
            && other.minx < self.maxx
            && self.miny < other.maxy
            && other.miny < self.maxy
    }

    /// Smallest box containing both.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            minx: self.minx.min(other.minx),
            miny: self.miny.min(other.miny),
            maxx: self.maxx.max(other.maxx),
            maxy: self.maxy.max(other.maxy),
        }
    }

    pub fn centroid(&self) -> (f64, f64) {
        (
            (self.minx + self.maxx) / 2.0,
            (self.miny + self.maxy) / 2.0,
        )
    }
}

/// A tile in the web-mercator grid.
///
/// `x` grows eastward from the antimeridian, `y` grows southward from the
/// northern clamp latitude. Both are in `[0, 2^zoom)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileCoord {
    pub zoom: u8,
    pub x: u32,
    pub y: u32,
}

impl TileCoord {
    /// Creates a tile coordinate, validating the zoom and index ranges.
    pub fn new(zoom: u8, x: u32, y: u32) -> Result<Self, CoordError> {
        if zoom > MAX_ZOOM {
            return Err(CoordError::InvalidZoom(zoom));
        }
        let n = tiles_at_zoom(zoom);
        if x >= n || y >= n {
            return Err(CoordError::TileOutOfRange { zoom, x, y });
        }
        Ok(Self { zoom, x, y })
    }
}

impl std::fmt::Display for TileCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}

/// Number of tiles along one axis at `zoom`.
#[inline]
pub fn tiles_at_zoom(zoom: u8) -> u32 {
    1u32 << zoom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounding_box_rejects_inverted() {
        let result = BoundingBox::new(10.0, 0.0, 5.0, 1.0);
        assert!(matches!(
            result,
            Err(CoordError::InvalidBoundingBox { .. })
        ));
    }

    #[test]
    fn test_bounding_box_rejects_nan() {
        assert!(BoundingBox::new(f64::NAN, 0.0, 1.0, 1.0).is_err());
    }

    #[test]
    fn test_touching_boxes_do_not_intersect() {
        let a = BoundingBox::new(0.0, 0.0, 1.0, 1.0).unwrap();
        let b = BoundingBox::new(1.0, 0.0, 2.0, 1.0).unwrap();
        assert!(!a.intersects(&b));
        assert!(!b.intersects(&a));
    }

    #[test]
    fn test_overlapping_boxes_intersect() {
        let a = BoundingBox::new(0.0, 0.0, 1.0, 1.0).unwrap();
        let b = BoundingBox::new(0.5, 0.5, 2.0, 2.0).unwrap();
        assert!(a.intersects(&b));
        assert_eq!(a.union(&b), BoundingBox::new(0.0, 0.0, 2.0, 2.0).unwrap());
    }

    #[test]
    fn test_tile_coord_validates_range() {
        assert!(TileCoord::new(0, 0, 0).is_ok());
        assert_eq!(
            TileCoord::new(1, 2, 0),
            Err(CoordError::TileOutOfRange { zoom: 1, x: 2, y: 0 })
        );
        assert_eq!(TileCoord::new(30, 0, 0), Err(CoordError::InvalidZoom(30)));
    }

    #[test]
    fn test_tile_coord_display() {
        let tile = TileCoord::new(3, 1, 2).unwrap();
        assert_eq!(tile.to_string(), "3/1/2");
    }
}
