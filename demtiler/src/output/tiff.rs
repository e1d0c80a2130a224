//! Signed 16-bit GeoTIFF tiles.

use crate::raster::{ElevationRaster, GeoTransform, Int16Raster, Srs};

/// Side length of a GeoTIFF tile, in pixels.
pub const TILE_SIZE: u32 = 512;

/// Nodata marker written into every GeoTIFF tile.
///
/// Heights at or below -32768 m clamp onto this value and read back as
/// nodata.
pub const NODATA: i16 = i16::MIN;

/// Clamps a height to the int16 range and truncates toward zero.
pub fn encode_height(height: f32) -> i16 {
    if height.is_nan() {
        return NODATA;
    }
    height.clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Converts a composited raster into the int16 raster handed to the engine.
pub fn encode_geotiff(raster: &ElevationRaster, geotransform: GeoTransform) -> Int16Raster {
    let data = raster
        .data
        .iter()
        .map(|&h| {
            if raster.is_nodata(h) {
                NODATA
            } else {
                encode_height(h)
            }
        })
        .collect();
    Int16Raster {
        width: raster.width,
        height: raster.height,
        data,
        geotransform,
        srs: Srs::WebMercator,
        nodata: NODATA,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncates_toward_zero() {
        assert_eq!(encode_height(100.7), 100);
        assert_eq!(encode_height(-100.7), -100);
    }

    #[test]
    fn test_clamps_to_int16() {
        assert_eq!(encode_height(40000.0), 32767);
        assert_eq!(encode_height(-40000.0), -32768);
    }

    #[test]
    fn test_extreme_depth_collides_with_nodata() {
        // Known limitation: clamped depths are indistinguishable from nodata.
        assert_eq!(encode_height(-40000.0), NODATA);
    }

    #[test]
    fn test_nodata_pixels() {
        let raster = ElevationRaster {
            width: 3,
            height: 1,
            data: vec![f32::NAN, -9999.0, 12.9],
            nodata: Some(-9999.0),
        };
        let gt = GeoTransform([0.0, 1.0, 0.0, 0.0, 0.0, -1.0]);
        let encoded = encode_geotiff(&raster, gt);
        assert_eq!(encoded.data, vec![NODATA, NODATA, 12]);
        assert_eq!(encoded.srs, Srs::WebMercator);
        assert_eq!(encoded.nodata, -32768);
    }
}
