//! Regions of interest and the tiles that cover them.
//!
//! A [`Region`] pairs a geographic bounding box with a half-open zoom range.
//! [`region_tiles`] walks every covering tile lazily; [`expand_tile`] answers
//! "what area and resolution does this box need at each zoom".

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::coord::{lonlat_to_xy, BoundingBox, CoordError, TileCoord, MAX_ZOOM};

/// Half-open zoom range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoomRange {
    start: u8,
    end: u8,
}

impl ZoomRange {
    /// Creates a zoom range. `end` may be at most `MAX_ZOOM + 1`.
    pub fn new(start: u8, end: u8) -> Result<Self, CoordError> {
        if start > end || end > MAX_ZOOM + 1 {
            return Err(CoordError::InvalidZoomRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> u8 {
        self.start
    }

    pub fn end(&self) -> u8 {
        self.end
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, zoom: u8) -> bool {
        (self.start..self.end).contains(&zoom)
    }

    /// Zoom levels in ascending order.
    pub fn iter(&self) -> std::ops::Range<u8> {
        self.start..self.end
    }

    /// Range moved `by` levels coarser, saturating at zoom 0.
    ///
    /// A 512px tile at zoom `z - 1` has the same ground resolution as a 256px
    /// tile at zoom `z`, so large-tile formats use `shifted_down(1)`.
    pub fn shifted_down(&self, by: u8) -> ZoomRange {
        ZoomRange {
            start: self.start.saturating_sub(by),
            end: self.end.saturating_sub(by),
        }
    }
}

/// A named area to render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub name: String,
    pub bbox: BoundingBox,
    pub zoom_range: ZoomRange,
}

impl Region {
    pub fn new(name: impl Into<String>, bbox: BoundingBox, zoom_range: ZoomRange) -> Self {
        Self {
            name: name.into(),
            bbox,
            zoom_range,
        }
    }
}

/// A bounding box with the resolution it is rendered at.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionTile {
    pub bbox: BoundingBox,
    /// Degrees per pixel. For expanded areas this is the larger (coarser)
    /// value of the two corner tiles.
    pub resolution: f64,
}

/// Inclusive rectangle of tile indices at a single zoom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRange {
    pub zoom: u8,
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

impl TileRange {
    /// Tiles covering `bbox` at `zoom`.
    ///
    /// The top-left tile comes from `(minx, maxy)` and the bottom-right from
    /// `(maxx, miny)`, since tile rows grow southward.
    ///
    /// Edges are inclusive: a box edge lying exactly on a tile boundary also
    /// pulls in the tile beyond it (the south and east edges floor into the
    /// next row or column).
    pub fn covering(bbox: &BoundingBox, zoom: u8) -> Result<Self, CoordError> {
        let (min_x, min_y) = lonlat_to_xy(zoom, bbox.minx, bbox.maxy)?;
        let (max_x, max_y) = lonlat_to_xy(zoom, bbox.maxx, bbox.miny)?;
        Ok(Self {
            zoom,
            min_x,
            min_y,
            max_x,
            max_y,
        })
    }

    /// Number of tiles in the range.
    pub fn len(&self) -> u64 {
        (self.max_x - self.min_x + 1) as u64 * (self.max_y - self.min_y + 1) as u64
    }

    /// A covering range always holds at least one tile.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Tiles in column-major order: x ascending, then y ascending.
    pub fn iter(&self) -> impl Iterator<Item = TileCoord> {
        let Self {
            zoom,
            min_y,
            max_y,
            ..
        } = *self;
        (self.min_x..=self.max_x)
            .flat_map(move |x| (min_y..=max_y).map(move |y| TileCoord { zoom, x, y }))
    }
}

/// Lazily enumerates every tile of every region.
///
/// Order: regions in the given order, then zoom ascending, then x, then y.
/// Each region's zoom range is first moved `zoom_shift` levels coarser.
/// Overlapping regions yield the same tile more than once; callers that need
/// uniqueness must deduplicate. Calling this again restarts the walk.
pub fn region_tiles(regions: &[Region], zoom_shift: u8) -> impl Iterator<Item = TileCoord> + '_ {
    regions.iter().flat_map(move |region| {
        region
            .zoom_range
            .shifted_down(zoom_shift)
            .iter()
            .filter_map(move |zoom| match TileRange::covering(&region.bbox, zoom) {
                Ok(range) => {
                    info!(
                        region = %region.name,
                        zoom,
                        count = range.len(),
                        "Generating tiles for region"
                    );
                    Some(range)
                }
                Err(e) => {
                    warn!(region = %region.name, zoom, error = %e, "Skipping zoom level");
                    None
                }
            })
            .flat_map(|range| range.iter())
    })
}

/// For each zoom in `zoom_range`, the tile-aligned box covering `bbox` and the
/// coarser resolution (larger degrees per pixel) of its two corner tiles at
/// `tile_size` pixels.
///
/// The lower-left corner tile is found from `(minx, miny)` and the
/// upper-right one from `(maxx, maxy)`; the result box spans from the
/// lower-left tile's south-west corner to the upper-right tile's north-east
/// corner.
pub fn expand_tile(
    bbox: &BoundingBox,
    zoom_range: ZoomRange,
    tile_size: u32,
) -> Result<Vec<RegionTile>, CoordError> {
    let ts = tile_size as f64;
    zoom_range
        .iter()
        .map(|z| {
            let (lx, ly) = lonlat_to_xy(z, bbox.minx, bbox.miny)?;
            let (ux, uy) = lonlat_to_xy(z, bbox.maxx, bbox.maxy)?;
            let ll = TileCoord { zoom: z, x: lx, y: ly }.latlon_bbox();
            let ur = TileCoord { zoom: z, x: ux, y: uy }.latlon_bbox();
            let resolution = (ll.width() / ts).max(ur.width() / ts);
            Ok(RegionTile {
                bbox: BoundingBox {
                    minx: ll.minx,
                    miny: ll.miny,
                    maxx: ur.maxx,
                    maxy: ur.maxy,
                },
                resolution,
            })
        })
        .collect()
}
