use std::io::Write;
use std::path::Path;

use crate::error::{Error, Result};

/// 8-bit grayscale raster.
#[derive(Debug, Clone, PartialEq)]
pub struct GrayImage {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<u8>,
}

impl GrayImage {
    /// Writes a binary PGM (P5) file.
    pub fn save_pgm(&self, path: &Path) -> Result<()> {
        let mut file = std::fs::File::create(path).map_err(|e| Error::io(path, e))?;
        write!(file, "P5\n{} {}\n255\n", self.width, self.height)
            .and_then(|_| file.write_all(&self.pixels))
            .map_err(|e| Error::io(path, e))
    }
}

/// Lays out flattened images (one per row of `rows`) on a grid.
///
/// Each image is rescaled to `[0, 255]` on its own, images are separated by
/// `spacing` black pixels, and grid cells past the last image stay black.
pub fn tile_raster_images(
    rows: &[f32],
    img_shape: (usize, usize),
    tile_shape: (usize, usize),
    spacing: (usize, usize),
) -> GrayImage {
    let (img_h, img_w) = img_shape;
    let (tile_rows, tile_cols) = tile_shape;
    let pixels_per_image = img_h * img_w;

    let height = ((img_h + spacing.0) * tile_rows).saturating_sub(spacing.0);
    let width = ((img_w + spacing.1) * tile_cols).saturating_sub(spacing.1);
    let mut pixels = vec![0u8; width * height];

    if pixels_per_image == 0 {
        return GrayImage { width, height, pixels };
    }

    for (index, image) in rows.chunks_exact(pixels_per_image).enumerate() {
        if index >= tile_rows * tile_cols {
            break;
        }
        let (tile_r, tile_c) = (index / tile_cols, index % tile_cols);
        let min = image.iter().copied().fold(f32::INFINITY, f32::min);
        let max = image.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let range = max - min + 1e-8;

        for r in 0..img_h {
            for c in 0..img_w {
                let value = (image[r * img_w + c] - min) / range;
                let y = tile_r * (img_h + spacing.0) + r;
                let x = tile_c * (img_w + spacing.1) + c;
                pixels[y * width + x] = (value * 255.0).round().clamp(0.0, 255.0) as u8;
            }
        }
    }

    GrayImage { width, height, pixels }
}
