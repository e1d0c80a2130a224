//! Terrarium encoding: heights packed into 8-bit RGB.
//!
//! `u = clamp(h + 32768, 0, 65535)`; red holds `u / 256`, green `u % 256`
//! and blue the fractional metre in 1/256 steps. Red = 0 marks nodata: it
//! stands for heights below -32512 m, which no real surface reaches.

use std::io::Write;

use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, ImageError};

use crate::raster::ElevationRaster;

/// Side length of a terrarium tile, in pixels.
pub const TILE_SIZE: u32 = 256;

const OFFSET: f64 = 32768.0;

/// Encodes one height in metres as `[R, G, B]`. Nodata becomes black.
pub fn encode_height(height: f32) -> [u8; 3] {
    if height.is_nan() {
        return [0, 0, 0];
    }
    let u = (height as f64 + OFFSET).clamp(0.0, 65535.0);
    let r = (u / 256.0) as u8;
    let g = (u % 256.0) as u8;
    let b = ((u * 256.0) % 256.0) as u8;
    [r, g, b]
}

/// Inverse of [`encode_height`], up to the 1/256 m quantisation.
pub fn decode_height(rgb: [u8; 3]) -> f32 {
    let [r, g, b] = rgb;
    (r as f64 * 256.0 + g as f64 + b as f64 / 256.0 - OFFSET) as f32
}

/// Packs a raster into interleaved RGB bytes, row-major.
pub fn encode_terrarium(raster: &ElevationRaster) -> Vec<u8> {
    raster
        .data
        .iter()
        .flat_map(|&h| {
            if raster.is_nodata(h) {
                [0, 0, 0]
            } else {
                encode_height(h)
            }
        })
        .collect()
}

/// Writes the raster as an RGB PNG.
pub(crate) fn write_png<W: Write>(writer: W, raster: &ElevationRaster) -> Result<(), ImageError> {
    let rgb = encode_terrarium(raster);
    PngEncoder::new(writer).write_image(
        &rgb,
        raster.width as u32,
        raster.height as u32,
        ExtendedColorType::Rgb8,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sea_level() {
        assert_eq!(encode_height(0.0), [128, 0, 0]);
    }

    #[test]
    fn test_everest_range() {
        // 9000 + 32768 = 41768 = 163 * 256 + 40
        assert_eq!(encode_height(9000.0), [163, 40, 0]);
    }

    #[test]
    fn test_clamps_high() {
        assert_eq!(encode_height(40000.0), [255, 255, 0]);
    }

    #[test]
    fn test_clamps_low_to_nodata_sentinel() {
        assert_eq!(encode_height(-40000.0), [0, 0, 0]);
    }

    #[test]
    fn test_fractional_metres_in_blue() {
        assert_eq!(encode_height(0.5), [128, 0, 128]);
        assert_eq!(encode_height(-0.25), [127, 255, 192]);
    }

    #[test]
    fn test_nan_is_nodata() {
        assert_eq!(encode_height(f32::NAN), [0, 0, 0]);
    }

    #[test]
    fn test_raster_nodata_value_is_black() {
        let raster = ElevationRaster {
            width: 2,
            height: 1,
            data: vec![-9999.0, 0.0],
            nodata: Some(-9999.0),
        };
        assert_eq!(encode_terrarium(&raster), vec![0, 0, 0, 128, 0, 0]);
    }

    #[test]
    fn test_png_dimensions() {
        let raster = ElevationRaster::filled(4, 3, 100.0);
        let mut png = Vec::new();
        write_png(&mut png, &raster).unwrap();

        let decoded = image::load_from_memory_with_format(&png, image::ImageFormat::Png)
            .unwrap()
            .to_rgb8();
        assert_eq!(decoded.dimensions(), (4, 3));
        assert_eq!(decoded.get_pixel(0, 0).0, encode_height(100.0));
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn test_decode_within_quantisation(h in -11000.0..9000.0_f32) {
                let decoded = decode_height(encode_height(h));
                prop_assert!((decoded - h).abs() <= 1.0 / 256.0 + 1e-3,
                    "{} decoded as {}", h, decoded);
            }

            #[test]
            fn test_red_never_zero_for_real_terrain(h in -11000.0..9000.0_f32) {
                prop_assert!(encode_height(h)[0] > 0);
            }
        }
    }
}
