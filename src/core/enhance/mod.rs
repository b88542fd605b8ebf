//! # Enhance Module
//!
//! Contrast enhancement applied to photos before feature extraction.
//!
//! ## How It Works
//! Contrast-limited adaptive histogram equalization (CLAHE) runs on each
//! colour channel independently:
//! 1. Split the channel into a grid of tiles (8x8 by default)
//! 2. Build a histogram per tile and clip it at `clip_limit` times the mean bin height
//! 3. Redistribute the clipped excess evenly and turn each histogram into a lookup table
//! 4. Map every pixel by bilinearly blending the lookup tables of its four nearest tiles
//!
//! Enhancement is best-effort: if anything goes wrong the original image
//! is returned unchanged.

use image::{DynamicImage, RgbImage};
use tracing::warn;

/// Preprocessing step applied to every photo before embedding
pub trait ImageEnhancer: Send + Sync {
    /// Return an enhanced copy of the image, or the original on failure
    fn enhance(&self, image: &DynamicImage) -> DynamicImage;
}

/// Per-channel CLAHE enhancer
#[derive(Debug, Clone)]
pub struct ClaheEnhancer {
    clip_limit: f32,
    grid_size: u32,
}

impl ClaheEnhancer {
    /// Create an enhancer with a custom clip limit and tile grid
    pub fn new(clip_limit: f32, grid_size: u32) -> Self {
        Self {
            clip_limit,
            grid_size,
        }
    }

    fn try_enhance(&self, image: &DynamicImage) -> Result<RgbImage, String> {
        let (width, height) = (image.width(), image.height());
        if width == 0 || height == 0 {
            return Err(format!("invalid dimensions {}x{}", width, height));
        }
        if self.grid_size == 0 {
            return Err("tile grid must be at least 1x1".to_string());
        }
        if !self.clip_limit.is_finite() || self.clip_limit <= 0.0 {
            return Err(format!("invalid clip limit {}", self.clip_limit));
        }

        let rgb = image.to_rgb8();
        let pixel_count = (width * height) as usize;
        let mut output = rgb.clone();

        for channel in 0..3 {
            let plane: Vec<u8> = rgb.pixels().map(|p| p[channel]).collect();
            debug_assert_eq!(plane.len(), pixel_count);

            let equalized = self.equalize_plane(&plane, width, height);
            for (pixel, value) in output.pixels_mut().zip(equalized) {
                pixel[channel] = value;
            }
        }

        Ok(output)
    }

    /// Apply CLAHE to one channel stored row-major
    fn equalize_plane(&self, plane: &[u8], width: u32, height: u32) -> Vec<u8> {
        let grid = TileGrid::new(width, height, self.grid_size);
        let luts: Vec<[u8; 256]> = (0..grid.rows)
            .flat_map(|ty| (0..grid.cols).map(move |tx| (tx, ty)))
            .map(|(tx, ty)| self.tile_lut(plane, width, &grid, tx, ty))
            .collect();

        let mut out = Vec::with_capacity(plane.len());
        for y in 0..height {
            let (ty0, ty1, wy) = grid.neighbours(y, grid.tile_height, grid.rows);
            for x in 0..width {
                let (tx0, tx1, wx) = grid.neighbours(x, grid.tile_width, grid.cols);
                let value = plane[(y * width + x) as usize] as usize;

                let top_left = luts[(ty0 * grid.cols + tx0) as usize][value] as f32;
                let top_right = luts[(ty0 * grid.cols + tx1) as usize][value] as f32;
                let bottom_left = luts[(ty1 * grid.cols + tx0) as usize][value] as f32;
                let bottom_right = luts[(ty1 * grid.cols + tx1) as usize][value] as f32;

                let top = top_left * (1.0 - wx) + top_right * wx;
                let bottom = bottom_left * (1.0 - wx) + bottom_right * wx;
                let blended = top * (1.0 - wy) + bottom * wy;

                out.push(blended.round().clamp(0.0, 255.0) as u8);
            }
        }

        out
    }

    /// Build the clipped-histogram lookup table for one tile
    ///
    /// Tiles that hang over the right or bottom edge replicate the last
    /// column or row, so every tile covers the same area.
    fn tile_lut(&self, plane: &[u8], width: u32, grid: &TileGrid, tx: u32, ty: u32) -> [u8; 256] {
        let x_start = tx * grid.tile_width;
        let y_start = ty * grid.tile_height;

        let mut histogram = [0u32; 256];
        for y in y_start..y_start + grid.tile_height {
            let row = (y.min(grid.height - 1) * width) as usize;
            for x in x_start..x_start + grid.tile_width {
                histogram[plane[row + x.min(width - 1) as usize] as usize] += 1;
            }
        }

        let area = grid.tile_width * grid.tile_height;
        let limit = ((self.clip_limit * area as f32 / 256.0) as u32).max(1);

        let mut excess = 0u32;
        for bin in histogram.iter_mut() {
            if *bin > limit {
                excess += *bin - limit;
                *bin = limit;
            }
        }

        // Spread the clipped mass evenly, then hand out the remainder
        // at a fixed stride across the range.
        let bonus = excess / 256;
        let remainder = excess % 256;
        for bin in histogram.iter_mut() {
            *bin += bonus;
        }
        if remainder > 0 {
            let step = (256 / remainder).max(1) as usize;
            for bin in histogram.iter_mut().step_by(step).take(remainder as usize) {
                *bin += 1;
            }
        }

        let scale = 255.0 / area as f32;
        let mut lut = [0u8; 256];
        let mut cumulative = 0u32;
        for (value, count) in histogram.iter().enumerate() {
            cumulative += count;
            lut[value] = (cumulative as f32 * scale).round().min(255.0) as u8;
        }
        lut
    }
}

impl Default for ClaheEnhancer {
    fn default() -> Self {
        Self::new(2.0, 8)
    }
}

impl ImageEnhancer for ClaheEnhancer {
    fn enhance(&self, image: &DynamicImage) -> DynamicImage {
        match self.try_enhance(image) {
            Ok(enhanced) => DynamicImage::ImageRgb8(enhanced),
            Err(reason) => {
                warn!(%reason, "Enhancement failed, using original image");
                image.clone()
            }
        }
    }
}

/// Enhancer that returns its input unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughEnhancer;

impl ImageEnhancer for PassthroughEnhancer {
    fn enhance(&self, image: &DynamicImage) -> DynamicImage {
        image.clone()
    }
}

/// True when every sample of the image is zero
pub fn is_blank(image: &DynamicImage) -> bool {
    image.as_bytes().iter().all(|&b| b == 0)
}

/// Tile layout for one image
struct TileGrid {
    cols: u32,
    rows: u32,
    tile_width: u32,
    tile_height: u32,
    height: u32,
}

impl TileGrid {
    fn new(width: u32, height: u32, grid_size: u32) -> Self {
        // Images smaller than the grid get one tile per pixel
        let tile_width = width.div_ceil(grid_size.min(width));
        let tile_height = height.div_ceil(grid_size.min(height));
        // Rounding the tile size up can leave fewer tiles than requested
        Self {
            cols: width.div_ceil(tile_width),
            rows: height.div_ceil(tile_height),
            tile_width,
            tile_height,
            height,
        }
    }

    /// Two nearest tile indices along one axis and the blend weight of the second
    fn neighbours(&self, position: u32, tile_size: u32, tiles: u32) -> (u32, u32, f32) {
        let centre = (position as f32 + 0.5) / tile_size as f32 - 0.5;
        if centre <= 0.0 {
            return (0, 0, 0.0);
        }
        let first = (centre.floor() as u32).min(tiles - 1);
        let second = (first + 1).min(tiles - 1);
        let weight = if first == second {
            0.0
        } else {
            centre - first as f32
        };
        (first, second, weight)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb, Rgba};

    fn low_contrast_image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(ImageBuffer::from_fn(width, height, |x, y| {
            let v = 100 + ((x + y) % 10) as u8;
            Rgb([v, v, v])
        }))
    }

    fn channel_range(image: &DynamicImage, channel: usize) -> u8 {
        let rgb = image.to_rgb8();
        let values: Vec<u8> = rgb.pixels().map(|p| p[channel]).collect();
        values.iter().max().unwrap() - values.iter().min().unwrap()
    }

    #[test]
    fn enhancement_preserves_dimensions() {
        let image = low_contrast_image(64, 48);
        let enhanced = ClaheEnhancer::default().enhance(&image);

        assert_eq!(enhanced.width(), 64);
        assert_eq!(enhanced.height(), 48);
    }

    #[test]
    fn enhancement_stretches_low_contrast() {
        let image = low_contrast_image(64, 64);
        let enhanced = ClaheEnhancer::default().enhance(&image);

        assert!(channel_range(&enhanced, 0) > channel_range(&image, 0));
    }

    #[test]
    fn channels_are_equalized_independently() {
        let image = DynamicImage::ImageRgb8(ImageBuffer::from_fn(32, 32, |x, _| {
            Rgb([(x * 8) as u8, 50, 0])
        }));
        let enhanced = ClaheEnhancer::default().enhance(&image).to_rgb8();

        // A constant channel stays constant after per-channel equalization
        let greens: Vec<u8> = enhanced.pixels().map(|p| p[1]).collect();
        assert!(greens.iter().all(|&g| g == greens[0]));
    }

    #[test]
    fn images_smaller_than_grid_are_handled() {
        let image = low_contrast_image(3, 2);
        let enhanced = ClaheEnhancer::default().enhance(&image);

        assert_eq!(enhanced.width(), 3);
        assert_eq!(enhanced.height(), 2);
    }

    fn flat_image(width: u32, height: u32, value: u8) -> DynamicImage {
        let pixel = Rgb([value, value, value]);
        DynamicImage::ImageRgb8(ImageBuffer::from_pixel(width, height, pixel))
    }

    #[test]
    fn sizes_that_do_not_divide_the_grid_are_handled() {
        for (width, height) in [(10, 10), (41, 8), (9, 13), (17, 33), (27, 41)] {
            let image = low_contrast_image(width, height);
            let enhanced = ClaheEnhancer::default().enhance(&image);

            assert_eq!(enhanced.width(), width);
            assert_eq!(enhanced.height(), height);
        }
    }

    #[test]
    fn flat_plane_stays_flat_on_uneven_tiles() {
        for (width, height) in [(10, 10), (41, 8)] {
            let image = flat_image(width, height, 128);
            let enhanced = ClaheEnhancer::default().enhance(&image).to_rgb8();

            let first = enhanced.get_pixel(0, 0)[0];
            assert!(
                enhanced.pixels().all(|p| p[0] == first),
                "{}x{} is not uniform",
                width,
                height
            );
        }

        let plane = ClaheEnhancer::default().equalize_plane(&[128; 100], 10, 10);
        assert!(plane.iter().all(|&v| v == plane[0]));
    }

    #[test]
    fn tile_grid_covers_the_image_without_empty_tiles() {
        for size in 1..=64 {
            let grid = TileGrid::new(size, size, 8);

            assert!(grid.cols * grid.tile_width >= size);
            assert!((grid.cols - 1) * grid.tile_width < size, "empty tile at {}", size);
            assert_eq!(grid.cols, grid.rows);
        }
    }

    #[test]
    fn empty_image_is_returned_unchanged() {
        let image = DynamicImage::new_rgb8(0, 0);
        let enhanced = ClaheEnhancer::default().enhance(&image);

        assert_eq!(enhanced.width(), 0);
        assert_eq!(enhanced.as_bytes(), image.as_bytes());
    }

    #[test]
    fn invalid_clip_limit_falls_back_to_original() {
        let image = low_contrast_image(16, 16);
        let enhanced = ClaheEnhancer::new(f32::NAN, 8).enhance(&image);

        assert_eq!(enhanced.as_bytes(), image.as_bytes());
    }

    #[test]
    fn alpha_channel_is_dropped() {
        let image = DynamicImage::ImageRgba8(ImageBuffer::from_fn(16, 16, |x, y| {
            Rgba([x as u8 * 10, y as u8 * 10, 90, 128])
        }));
        let enhanced = ClaheEnhancer::default().enhance(&image);

        assert!(matches!(enhanced, DynamicImage::ImageRgb8(_)));
    }

    #[test]
    fn blank_detection() {
        assert!(is_blank(&DynamicImage::new_rgb8(4, 4)));
        assert!(!is_blank(&low_contrast_image(4, 4)));
    }

    #[test]
    fn passthrough_returns_same_pixels() {
        let image = low_contrast_image(8, 8);
        let out = PassthroughEnhancer.enhance(&image);
        assert_eq!(out.as_bytes(), image.as_bytes());
    }
}
