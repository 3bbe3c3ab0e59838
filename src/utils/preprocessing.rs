//! Shared image preprocessing utilities
//!
//! Images are letterboxed into the square model input: resized with their
//! aspect ratio preserved, centred on a padded canvas and normalised into
//! an NCHW tensor. [`Letterbox`] records the geometry so the predicted mask
//! can be mapped back onto the original pixels.

use crate::{
    error::{PhotoError, Result},
    models::PreprocessingConfig,
};
use image::{DynamicImage, ImageBuffer, RgbImage};
use ndarray::Array4;

/// Geometry of an image placed on the square model canvas
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    /// Side of the square canvas
    pub target_size: u32,
    /// Factor applied to the original dimensions
    pub scale: f32,
    /// Resized image width on the canvas
    pub scaled_width: u32,
    /// Resized image height on the canvas
    pub scaled_height: u32,
    /// Left padding
    pub offset_x: u32,
    /// Top padding
    pub offset_y: u32,
}

impl Letterbox {
    /// Compute the letterbox for an image of `original` dimensions
    ///
    /// # Errors
    /// - Zero-sized image or canvas
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn compute(original: (u32, u32), target_size: u32) -> Result<Self> {
        let (orig_width, orig_height) = original;
        if orig_width == 0 || orig_height == 0 {
            return Err(PhotoError::capability("Cannot preprocess an empty image"));
        }
        if target_size == 0 {
            return Err(PhotoError::invalid_config("Model input size must be positive"));
        }

        let target_size_f32 = target_size as f32;
        let scale = (target_size_f32 / orig_width as f32).min(target_size_f32 / orig_height as f32);

        let scaled_width = ((orig_width as f32 * scale).round() as u32).clamp(1, target_size);
        let scaled_height = ((orig_height as f32 * scale).round() as u32).clamp(1, target_size);

        Ok(Self {
            target_size,
            scale,
            scaled_width,
            scaled_height,
            offset_x: (target_size - scaled_width) / 2,
            offset_y: (target_size - scaled_height) / 2,
        })
    }

    /// Canvas coordinate for an original pixel, `None` when it falls outside the canvas
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    #[must_use]
    pub fn to_canvas(&self, x: u32, y: u32) -> Option<(usize, usize)> {
        let canvas_x = (x as f32 * self.scale) as u32 + self.offset_x;
        let canvas_y = (y as f32 * self.scale) as u32 + self.offset_y;
        (canvas_x < self.target_size && canvas_y < self.target_size)
            .then_some((canvas_x as usize, canvas_y as usize))
    }
}

/// Shared image preprocessing utilities
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Preprocess an image for model inference
    ///
    /// Handles RGB conversion, aspect preserving resize, centre padding and
    /// normalisation to an NCHW tensor.
    ///
    /// # Errors
    /// - Empty image or zero model input size
    pub fn preprocess_image(
        image: &DynamicImage,
        preprocessing_config: &PreprocessingConfig,
    ) -> Result<(Letterbox, Array4<f32>)> {
        let rgb_image = image.to_rgb8();
        let letterbox = Letterbox::compute(rgb_image.dimensions(), preprocessing_config.target_size)?;

        let resized = image::imageops::resize(
            &rgb_image,
            letterbox.scaled_width,
            letterbox.scaled_height,
            image::imageops::FilterType::Triangle,
        );

        let padding = preprocessing_config.padding_color;
        let mut canvas = ImageBuffer::from_pixel(
            letterbox.target_size,
            letterbox.target_size,
            image::Rgb(padding),
        );
        image::imageops::replace(
            &mut canvas,
            &resized,
            i64::from(letterbox.offset_x),
            i64::from(letterbox.offset_y),
        );

        let tensor = Self::canvas_to_tensor(&canvas, preprocessing_config);
        Ok((letterbox, tensor))
    }

    /// Convert canvas to normalized tensor
    fn canvas_to_tensor(canvas: &RgbImage, preprocessing_config: &PreprocessingConfig) -> Array4<f32> {
        let (width, height) = canvas.dimensions();
        let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));
        let mean = preprocessing_config.normalization_mean;
        let std = preprocessing_config.normalization_std;

        for (x, y, pixel) in canvas.enumerate_pixels() {
            for channel in 0..3 {
                let value = (f32::from(pixel[channel]) / 255.0 - mean[channel]) / std[channel];
                if let Some(slot) = tensor.get_mut([0, channel, y as usize, x as usize]) {
                    *slot = value;
                }
            }
        }

        tensor
    }
}
