//! Receipt image processing
//!
//! Images arrive as base64 (optionally a `data:image/...;base64,` URL) and
//! leave as GS v 0 raster data. Two steps:
//! - [`normalize`] decodes and scales to the printer's dot width, with both
//!   dimensions rounded down to a multiple of 8
//! - [`NormalizedImage::to_raster`] converts to 1-bit rows, MSB first

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, Luma};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::{EncodeError, EncodeResult};

/// Printable width of an 80mm print head in dots
pub const PRINTER_WIDTH: u32 = 576;

/// Tallest image accepted after scaling, in dots (about one metre of paper)
///
/// Stays well inside the 16-bit GS v 0 height field.
pub const MAX_RASTER_HEIGHT: u32 = 8192;

/// Bayer 4x4 ordered dither matrix
const BAYER_4X4: [[u8; 4]; 4] = [[0, 8, 2, 10], [12, 4, 14, 6], [3, 11, 1, 9], [15, 7, 13, 5]];

/// Monochrome conversion method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DitherAlgorithm {
    #[default]
    Threshold,
    Bayer,
    #[serde(alias = "floydsteinberg")]
    FloydSteinberg,
    Atkinson,
}

/// Image scaled to printer dimensions, flattened onto white
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    /// Grayscale pixels, `width * height`
    pub pixels: GrayImage,
    pub width: u32,
    pub height: u32,
}

/// Packed 1-bit raster, ready for GS v 0
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterImage {
    /// Width in dots (multiple of 8)
    pub width: u32,
    pub height: u32,
    /// `width / 8 * height` bytes, 1 = black
    pub data: Vec<u8>,
}

impl RasterImage {
    pub fn width_bytes(&self) -> u32 {
        self.width.div_ceil(8)
    }
}

fn round_down_to_8(v: u32) -> u32 {
    (v / 8 * 8).max(8)
}

/// Target size for an image of the given original size
///
/// Width is always the printer width; height keeps the aspect ratio. Both
/// are rounded down to a multiple of 8, never below 8.
pub fn normalized_dimensions(original_width: u32, original_height: u32) -> (u32, u32) {
    if original_width == 0 {
        return (round_down_to_8(PRINTER_WIDTH), 8);
    }
    let height = u64::from(original_height) * u64::from(PRINTER_WIDTH) / u64::from(original_width);
    let height = u32::try_from(height).unwrap_or(u32::MAX);
    (round_down_to_8(PRINTER_WIDTH), round_down_to_8(height))
}

/// Decode base64 image data, accepting an optional data URL prefix
pub fn decode_image_data(image_data: &str) -> EncodeResult<DynamicImage> {
    let payload = match image_data.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => image_data,
    };
    let bytes = STANDARD.decode(payload.trim())?;
    Ok(image::load_from_memory(&bytes)?)
}

/// Decode and normalize receipt image data
#[instrument(skip(image_data), fields(len = image_data.len()))]
pub fn normalize(image_data: &str) -> EncodeResult<NormalizedImage> {
    let img = decode_image_data(image_data)?;
    normalize_image(&img)
}

/// Scale an already decoded image to printer dimensions
///
/// Fails before allocating anything when the scaled height would exceed
/// [`MAX_RASTER_HEIGHT`].
pub fn normalize_image(img: &DynamicImage) -> EncodeResult<NormalizedImage> {
    let (original_width, original_height) = (img.width(), img.height());
    let (width, height) = normalized_dimensions(original_width, original_height);

    debug!(
        original_width,
        original_height, width, height, "normalizing image"
    );

    if height > MAX_RASTER_HEIGHT {
        return Err(EncodeError::ImageTooLarge {
            width,
            height,
            max: MAX_RASTER_HEIGHT,
        });
    }

    let resized = img.resize_exact(width, height, FilterType::Triangle).to_rgba8();

    // Flatten onto white paper: transparent pixels never print
    let mut pixels = GrayImage::new(width, height);
    for (x, y, p) in resized.enumerate_pixels() {
        let luma = 0.299 * f32::from(p[0]) + 0.587 * f32::from(p[1]) + 0.114 * f32::from(p[2]);
        let alpha = f32::from(p[3]) / 255.0;
        let value = luma * alpha + 255.0 * (1.0 - alpha);
        pixels.put_pixel(x, y, Luma([value.round().clamp(0.0, 255.0) as u8]));
    }

    Ok(NormalizedImage {
        pixels,
        width,
        height,
    })
}

impl NormalizedImage {
    /// Convert to a packed 1-bit raster
    ///
    /// `threshold` is the gray level below which a pixel prints black; it
    /// applies to threshold mode and is the midpoint for error diffusion.
    pub fn to_raster(&self, algorithm: DitherAlgorithm, threshold: u8) -> RasterImage {
        let w = self.width as usize;
        let h = self.height as usize;
        let black = match algorithm {
            DitherAlgorithm::Threshold => self.threshold(threshold),
            DitherAlgorithm::Bayer => self.bayer(),
            DitherAlgorithm::FloydSteinberg => self.diffuse(
                threshold,
                &[(1, 0, 7.0 / 16.0), (-1, 1, 3.0 / 16.0), (0, 1, 5.0 / 16.0), (1, 1, 1.0 / 16.0)],
            ),
            DitherAlgorithm::Atkinson => self.diffuse(
                threshold,
                &[
                    (1, 0, 1.0 / 8.0),
                    (2, 0, 1.0 / 8.0),
                    (-1, 1, 1.0 / 8.0),
                    (0, 1, 1.0 / 8.0),
                    (1, 1, 1.0 / 8.0),
                    (0, 2, 1.0 / 8.0),
                ],
            ),
        };

        let width_bytes = w.div_ceil(8);
        let mut data = vec![0u8; width_bytes * h];
        for y in 0..h {
            for x in 0..w {
                if black[y * w + x] {
                    data[y * width_bytes + x / 8] |= 1 << (7 - (x % 8));
                }
            }
        }

        RasterImage {
            width: self.width,
            height: self.height,
            data,
        }
    }

    fn threshold(&self, threshold: u8) -> Vec<bool> {
        self.pixels.pixels().map(|p| p[0] < threshold).collect()
    }

    fn bayer(&self) -> Vec<bool> {
        self.pixels
            .enumerate_pixels()
            .map(|(x, y, p)| {
                let m = BAYER_4X4[(y % 4) as usize][(x % 4) as usize];
                // Map matrix cell to a threshold in (0, 256)
                let t = (u16::from(m) * 16 + 8) as u8;
                p[0] < t
            })
            .collect()
    }

    fn diffuse(&self, threshold: u8, kernel: &[(isize, isize, f32)]) -> Vec<bool> {
        let w = self.width as usize;
        let h = self.height as usize;
        let mut values: Vec<f32> = self.pixels.pixels().map(|p| f32::from(p[0])).collect();
        let mut black = vec![false; w * h];
        let cut = f32::from(threshold);

        for y in 0..h {
            for x in 0..w {
                let i = y * w + x;
                let old = values[i];
                let new = if old < cut { 0.0 } else { 255.0 };
                black[i] = new == 0.0;
                let err = old - new;

                for &(dx, dy, weight) in kernel {
                    let nx = x as isize + dx;
                    let ny = y as isize + dy;
                    if nx < 0 || nx >= w as isize || ny >= h as isize {
                        continue;
                    }
                    values[ny as usize * w + nx as usize] += err * weight;
                }
            }
        }
        black
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    fn png_base64(img: &RgbaImage) -> String {
        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(img.clone())
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        STANDARD.encode(bytes)
    }

    #[test]
    fn test_dimensions_scale_to_printer_width() {
        // 500 * 0.576 = 288
        assert_eq!(normalized_dimensions(1000, 500), (576, 288));
        // 333 * 0.576 = 191.8 -> 191 -> 184
        assert_eq!(normalized_dimensions(1000, 333), (576, 184));
    }

    #[test]
    fn test_dimensions_never_below_eight() {
        assert_eq!(normalized_dimensions(5000, 10), (576, 8));
        assert_eq!(normalized_dimensions(0, 0), (576, 8));
        assert_eq!(normalized_dimensions(1, 0), (576, 8));
    }

    #[test]
    fn test_dimensions_are_multiples_of_eight() {
        for (w, h) in [(1, 1), (7, 13), (576, 577), (640, 480), (1234, 4321), (3, 1000)] {
            let (nw, nh) = normalized_dimensions(w, h);
            assert!(nw > 0 && nw % 8 == 0 && nw <= PRINTER_WIDTH);
            assert!(nh > 0 && nh % 8 == 0);
        }
    }

    #[test]
    fn test_normalize_data_url() {
        let img = RgbaImage::from_pixel(100, 50, Rgba([0, 0, 0, 255]));
        let data = format!("data:image/png;base64,{}", png_base64(&img));

        let normalized = normalize(&data).unwrap();
        assert_eq!((normalized.width, normalized.height), (576, 288));
        assert_eq!(normalized.pixels.dimensions(), (576, 288));
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        assert!(normalize("not base64 at all!").is_err());
        // Valid base64, not an image
        assert!(normalize(&STANDARD.encode(b"hello")).is_err());
    }

    #[test]
    fn test_tall_image_is_rejected_before_scaling() {
        // 2x250 scales to 576x72000
        let img = RgbaImage::from_pixel(2, 250, Rgba([0, 0, 0, 255]));
        let err = normalize(&png_base64(&img)).unwrap_err();
        assert!(matches!(
            err,
            EncodeError::ImageTooLarge {
                width: 576,
                height: 72000,
                ..
            }
        ));

        // Exactly at the limit still works
        let img = RgbaImage::from_pixel(9, 128, Rgba([255, 255, 255, 255]));
        let normalized = normalize_image(&DynamicImage::ImageRgba8(img)).unwrap();
        assert_eq!(normalized.height, MAX_RASTER_HEIGHT);
    }

    #[test]
    fn test_transparent_prints_white() {
        let img = RgbaImage::from_pixel(64, 64, Rgba([0, 0, 0, 0]));
        let normalized = normalize_image(&DynamicImage::ImageRgba8(img)).unwrap();
        let raster = normalized.to_raster(DitherAlgorithm::Threshold, 128);
        assert!(raster.data.iter().all(|b| *b == 0));
    }

    #[test]
    fn test_raster_packing() {
        let img = RgbaImage::from_pixel(64, 64, Rgba([0, 0, 0, 255]));
        let normalized = normalize_image(&DynamicImage::ImageRgba8(img)).unwrap();
        for algorithm in [
            DitherAlgorithm::Threshold,
            DitherAlgorithm::Bayer,
            DitherAlgorithm::FloydSteinberg,
            DitherAlgorithm::Atkinson,
        ] {
            let raster = normalized.to_raster(algorithm, 128);
            assert_eq!(raster.width_bytes(), 72);
            assert_eq!(raster.data.len(), 72 * 576);
            assert!(raster.data.iter().all(|b| *b == 0xFF), "{:?}", algorithm);
        }
    }

    #[test]
    fn test_algorithm_names() {
        let a: DitherAlgorithm = serde_json::from_str("\"floydsteinberg\"").unwrap();
        assert_eq!(a, DitherAlgorithm::FloydSteinberg);
        let b: DitherAlgorithm = serde_json::from_str("\"atkinson\"").unwrap();
        assert_eq!(b, DitherAlgorithm::Atkinson);
    }
}
