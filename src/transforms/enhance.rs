//! Contrast and noise enhancement
//!
//! Contrast limited adaptive histogram equalisation (CLAHE) runs on the
//! lightness channel of CIE L\*a\*b\* so colours keep their hue, then an
//! edge preserving bilateral filter smooths the result in RGB.

use crate::config::{BilateralConfig, ClaheConfig, EnhancementConfig};
use image::{DynamicImage, Rgb, RgbImage};
use palette::{FromColor, IntoColor, Lab, LinSrgb, Srgb};
use thiserror::Error;
use tracing::{debug, instrument, warn};

const HISTOGRAM_BINS: usize = 256;

/// Failure inside the enhancement filters
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EnhanceError {
    #[error("image has no pixels ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },

    #[error("plane of {len} values does not match {width}x{height}")]
    PlaneSize { len: usize, width: usize, height: usize },

    #[error("CLAHE tile grid must be at least 1x1, got {0}x{1}")]
    InvalidTileGrid(u32, u32),

    #[error("CLAHE clip limit must be positive, got {0}")]
    InvalidClipLimit(f32),

    #[error("bilateral diameter must be at least 1")]
    InvalidDiameter,

    #[error("bilateral sigma must be positive, got colour {color} space {space}")]
    InvalidSigma { color: f32, space: f32 },
}

/// Runs CLAHE followed by the bilateral filter
#[derive(Debug, Clone)]
pub struct Enhancer {
    config: EnhancementConfig,
}

impl Enhancer {
    #[must_use]
    pub fn new(config: EnhancementConfig) -> Self {
        Self { config }
    }

    /// Enhance `image`, surfacing filter failures to the caller
    ///
    /// # Errors
    /// - Empty image or invalid filter parameters
    #[instrument(skip(self, image), fields(width = image.width(), height = image.height()))]
    pub fn enhance(&self, image: &DynamicImage) -> Result<RgbImage, EnhanceError> {
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();
        if width == 0 || height == 0 {
            return Err(EnhanceError::EmptyImage { width, height });
        }

        let equalized = equalize_lightness(&rgb, &self.config.clahe)?;
        let filtered = bilateral_filter(&equalized, &self.config.bilateral)?;
        debug!("enhancement filters applied");
        Ok(filtered)
    }

    /// Enhance `image`, returning the input unchanged when the filters fail
    #[must_use]
    pub fn enhance_or_original(&self, image: &DynamicImage) -> DynamicImage {
        match self.enhance(image) {
            Ok(enhanced) => DynamicImage::ImageRgb8(enhanced),
            Err(error) => {
                warn!(%error, "enhancement failed, returning original image");
                image.clone()
            },
        }
    }
}

/// Apply CLAHE to the L\* channel, leaving a\* and b\* untouched
///
/// # Errors
/// - Invalid clip limit or tile grid
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn equalize_lightness(image: &RgbImage, config: &ClaheConfig) -> Result<RgbImage, EnhanceError> {
    let (width, height) = image.dimensions();
    let mut lightness = Vec::with_capacity(image.len() / 3);
    let mut chroma = Vec::with_capacity(image.len() / 3);

    for pixel in image.pixels() {
        let lab = to_lab(*pixel);
        lightness.push((lab.l * 255.0 / 100.0).round().clamp(0.0, 255.0) as u8);
        chroma.push((lab.a, lab.b));
    }

    let equalized = clahe(&lightness, width as usize, height as usize, config)?;

    let mut output = RgbImage::new(width, height);
    for ((pixel, l), (a, b)) in output.pixels_mut().zip(equalized).zip(chroma) {
        *pixel = from_lab(Lab::new(f32::from(l) * 100.0 / 255.0, a, b));
    }
    Ok(output)
}

fn to_lab(pixel: Rgb<u8>) -> Lab {
    let [r, g, b] = pixel.0;
    let srgb = Srgb::new(f32::from(r) / 255.0, f32::from(g) / 255.0, f32::from(b) / 255.0);
    let linear: LinSrgb<f32> = srgb.into_linear();
    Lab::from_color(linear)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn from_lab(lab: Lab) -> Rgb<u8> {
    let linear: LinSrgb<f32> = lab.into_color();
    let srgb: Srgb<f32> = Srgb::from_linear(linear);
    let channel = |value: f32| (value.clamp(0.0, 1.0) * 255.0).round() as u8;
    Rgb([channel(srgb.red), channel(srgb.green), channel(srgb.blue)])
}

/// Contrast limited adaptive histogram equalisation of an 8-bit plane
///
/// The plane is split into at most `tile_grid` tiles. Each tile gets a
/// clipped, equalised lookup table and every pixel is mapped through a
/// bilinear blend of the four nearest tile tables.
///
/// # Errors
/// - Invalid clip limit or tile grid
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    clippy::indexing_slicing
)]
// Safe: plane length is checked against width * height before any indexing
pub fn clahe(
    plane: &[u8],
    width: usize,
    height: usize,
    config: &ClaheConfig,
) -> Result<Vec<u8>, EnhanceError> {
    let (grid_x, grid_y) = config.tile_grid;
    if grid_x == 0 || grid_y == 0 {
        return Err(EnhanceError::InvalidTileGrid(grid_x, grid_y));
    }
    if !(config.clip_limit.is_finite() && config.clip_limit > 0.0) {
        return Err(EnhanceError::InvalidClipLimit(config.clip_limit));
    }
    if plane.len() != width * height {
        return Err(EnhanceError::PlaneSize {
            len: plane.len(),
            width,
            height,
        });
    }
    if width == 0 || height == 0 {
        return Ok(Vec::new());
    }

    let tile_width = width.div_ceil((grid_x as usize).min(width));
    let tile_height = height.div_ceil((grid_y as usize).min(height));
    let tiles_x = width.div_ceil(tile_width);
    let tiles_y = height.div_ceil(tile_height);

    let mut luts = Vec::with_capacity(tiles_x * tiles_y);
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let x_range = tx * tile_width..((tx + 1) * tile_width).min(width);
            let y_range = ty * tile_height..((ty + 1) * tile_height).min(height);

            let mut histogram = [0.0f32; HISTOGRAM_BINS];
            let mut count = 0usize;
            for y in y_range {
                let row = &plane[y * width..(y + 1) * width];
                for &value in &row[x_range.clone()] {
                    histogram[usize::from(value)] += 1.0;
                    count += 1;
                }
            }
            luts.push(tile_lut(&mut histogram, count, config.clip_limit));
        }
    }

    let lut_at = |tx: usize, ty: usize, value: u8| -> f32 {
        luts.get(ty * tiles_x + tx)
            .map_or(f32::from(value), |lut| f32::from(lut[usize::from(value)]))
    };

    let mut output = Vec::with_capacity(plane.len());
    for y in 0..height {
        let (ty1, ty2, ya) = neighbours(y, tile_height, tiles_y);
        for x in 0..width {
            let (tx1, tx2, xa) = neighbours(x, tile_width, tiles_x);
            let value = plane[y * width + x];

            let top = lut_at(tx1, ty1, value) * (1.0 - xa) + lut_at(tx2, ty1, value) * xa;
            let bottom = lut_at(tx1, ty2, value) * (1.0 - xa) + lut_at(tx2, ty2, value) * xa;
            let blended = top * (1.0 - ya) + bottom * ya;
            output.push(blended.round().clamp(0.0, 255.0) as u8);
        }
    }

    Ok(output)
}

/// Clip a tile histogram, spread the excess evenly and build its lookup table
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn tile_lut(histogram: &mut [f32; HISTOGRAM_BINS], count: usize, clip_limit: f32) -> [u8; HISTOGRAM_BINS] {
    let mut lut = [0u8; HISTOGRAM_BINS];
    if count == 0 {
        for (value, entry) in lut.iter_mut().enumerate() {
            *entry = value as u8;
        }
        return lut;
    }

    let pixels = count as f32;
    let limit = (clip_limit * pixels / HISTOGRAM_BINS as f32).max(1.0);
    let mut excess = 0.0;
    for bin in histogram.iter_mut() {
        if *bin > limit {
            excess += *bin - limit;
            *bin = limit;
        }
    }

    let bonus = excess / HISTOGRAM_BINS as f32;
    let scale = 255.0 / pixels;
    let mut cumulative = 0.0;
    for (bin, entry) in histogram.iter().zip(lut.iter_mut()) {
        cumulative += bin + bonus;
        *entry = (cumulative * scale).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

/// Tiles to blend for a coordinate and the weight of the second one
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    clippy::cast_possible_wrap
)]
fn neighbours(position: usize, tile_size: usize, tiles: usize) -> (usize, usize, f32) {
    let scaled = position as f32 / tile_size as f32 - 0.5;
    let first = scaled.floor();
    let weight = scaled - first;
    let last = tiles as isize - 1;
    let first = first as isize;
    let lo = first.clamp(0, last) as usize;
    let hi = (first + 1).clamp(0, last) as usize;
    (lo, hi, weight)
}

/// Edge preserving smoothing over a circular window
///
/// Neighbour weights combine a spatial Gaussian on the pixel distance with a
/// Gaussian on the summed absolute RGB difference. Neighbours outside the
/// image are skipped.
///
/// # Errors
/// - Zero diameter or non-positive sigmas
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    clippy::cast_possible_wrap,
    clippy::indexing_slicing
)]
// Safe: summed channel differences never exceed 3 * 255
pub fn bilateral_filter(image: &RgbImage, config: &BilateralConfig) -> Result<RgbImage, EnhanceError> {
    if config.diameter == 0 {
        return Err(EnhanceError::InvalidDiameter);
    }
    let valid_sigma = |sigma: f32| sigma.is_finite() && sigma > 0.0;
    if !valid_sigma(config.sigma_color) || !valid_sigma(config.sigma_space) {
        return Err(EnhanceError::InvalidSigma {
            color: config.sigma_color,
            space: config.sigma_space,
        });
    }

    let radius = (config.diameter / 2) as i64;
    let space_coeff = -0.5 / (config.sigma_space * config.sigma_space);
    let color_coeff = -0.5 / (config.sigma_color * config.sigma_color);

    let mut window = Vec::new();
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let distance = ((dx * dx + dy * dy) as f32).sqrt();
            if distance <= radius as f32 {
                window.push((dx, dy, (distance * distance * space_coeff).exp()));
            }
        }
    }

    let color_weights: Vec<f32> = (0..HISTOGRAM_BINS * 3)
        .map(|diff| ((diff * diff) as f32 * color_coeff).exp())
        .collect();

    let (width, height) = image.dimensions();
    let (w, h) = (i64::from(width), i64::from(height));
    let output = RgbImage::from_fn(width, height, |x, y| {
        let centre = image.get_pixel(x, y);
        let mut sum = [0.0f32; 3];
        let mut weight_sum = 0.0f32;

        for &(dx, dy, space_weight) in &window {
            let nx = i64::from(x) + dx;
            let ny = i64::from(y) + dy;
            if nx < 0 || ny < 0 || nx >= w || ny >= h {
                continue;
            }
            let neighbour = image.get_pixel(nx as u32, ny as u32);
            let diff: usize = centre
                .0
                .iter()
                .zip(neighbour.0.iter())
                .map(|(&a, &b)| usize::from(a.abs_diff(b)))
                .sum();
            let weight = space_weight * color_weights[diff];

            for (acc, &channel) in sum.iter_mut().zip(neighbour.0.iter()) {
                *acc += f32::from(channel) * weight;
            }
            weight_sum += weight;
        }

        if weight_sum > 0.0 {
            Rgb(sum.map(|acc| (acc / weight_sum).round().clamp(0.0, 255.0) as u8))
        } else {
            *centre
        }
    });

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::ImageBuffer;

    fn mean_colour(image: &RgbImage) -> [f32; 3] {
        let mut sum = [0.0f32; 3];
        for pixel in image.pixels() {
            for (acc, &channel) in sum.iter_mut().zip(pixel.0.iter()) {
                *acc += f32::from(channel);
            }
        }
        let count = image.pixels().len() as f32;
        sum.map(|acc| acc / count)
    }

    #[test]
    fn test_enhance_keeps_flat_colour() {
        let red = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(100, 100, Rgb([255, 0, 0])));
        let enhanced = Enhancer::new(EnhancementConfig::default())
            .enhance(&red)
            .unwrap();

        assert_eq!(enhanced.dimensions(), (100, 100));
        let [r, g, b] = mean_colour(&enhanced);
        assert!(r > 239.0, "red channel drifted to {r}");
        assert!(g < 16.0, "green channel drifted to {g}");
        assert!(b < 16.0, "blue channel drifted to {b}");
    }

    #[test]
    fn test_lab_round_trip_is_close() {
        for colour in [[0, 0, 0], [255, 255, 255], [12, 200, 99], [255, 0, 0]] {
            let back = from_lab(to_lab(Rgb(colour)));
            for (a, b) in colour.iter().zip(back.0.iter()) {
                assert!(a.abs_diff(*b) <= 1, "{colour:?} became {:?}", back.0);
            }
        }
    }

    #[test]
    fn test_clahe_stretches_low_contrast_gradient() {
        let width = 64;
        let height = 64;
        let plane: Vec<u8> = (0..width * height)
            .map(|i| 100 + ((i % width) * 20 / width) as u8)
            .collect();
        let config = ClaheConfig {
            clip_limit: 40.0,
            tile_grid: (1, 1),
        };

        let output = clahe(&plane, width, height, &config).unwrap();

        let min = output.iter().copied().min().unwrap();
        let max = output.iter().copied().max().unwrap();
        assert!(max - min > 100, "range only {min}..{max}");
    }

    #[test]
    fn test_clahe_rejects_empty_grid() {
        let config = ClaheConfig {
            clip_limit: 2.0,
            tile_grid: (0, 0),
        };
        assert_eq!(
            clahe(&[1, 2, 3, 4], 2, 2, &config),
            Err(EnhanceError::InvalidTileGrid(0, 0))
        );
    }

    #[test]
    fn test_clahe_handles_grid_larger_than_image() {
        let config = ClaheConfig::default();
        let output = clahe(&[10, 20, 30], 3, 1, &config).unwrap();
        assert_eq!(output.len(), 3);
    }

    #[test]
    fn test_bilateral_preserves_edges() {
        let image = RgbImage::from_fn(20, 20, |x, _| {
            if x < 10 {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        });
        let filtered = bilateral_filter(&image, &BilateralConfig::default()).unwrap();

        assert_eq!(filtered.get_pixel(9, 10).0, [0, 0, 0]);
        assert_eq!(filtered.get_pixel(10, 10).0, [255, 255, 255]);
    }

    #[test]
    fn test_bilateral_smooths_small_noise() {
        let mut image = RgbImage::from_pixel(9, 9, Rgb([100, 100, 100]));
        image.put_pixel(4, 4, Rgb([110, 110, 110]));
        let filtered = bilateral_filter(&image, &BilateralConfig::default()).unwrap();

        let centre = filtered.get_pixel(4, 4)[0];
        assert!(centre < 110 && centre >= 100, "centre is {centre}");
    }

    #[test]
    fn test_bilateral_rejects_bad_sigma() {
        let config = BilateralConfig {
            sigma_color: 0.0,
            ..BilateralConfig::default()
        };
        let image = RgbImage::new(2, 2);
        assert!(matches!(
            bilateral_filter(&image, &config),
            Err(EnhanceError::InvalidSigma { .. })
        ));
    }

    #[test]
    fn test_enhance_or_original_falls_back() {
        let config = EnhancementConfig {
            clahe: ClaheConfig {
                clip_limit: 2.0,
                tile_grid: (0, 0),
            },
            ..EnhancementConfig::default()
        };
        let original = DynamicImage::ImageRgb8(RgbImage::from_fn(5, 5, |x, y| {
            Rgb([(x * 40) as u8, (y * 40) as u8, 7])
        }));

        let result = Enhancer::new(config).enhance_or_original(&original);
        assert_eq!(result.to_rgb8(), original.to_rgb8());
    }
}
