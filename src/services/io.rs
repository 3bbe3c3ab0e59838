//! Image I/O operations service
//!
//! Decoding and encoding live here so the transforms stay pure image
//! functions and the orchestrator never touches codec details.

use crate::{
    error::{PhotoError, Result},
    services::format::OutputFormatHandler,
};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::codecs::webp::WebPEncoder;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;

/// Encoder tuning for a single write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EncodeOptions {
    /// Quality for lossy containers (1-100), `None` for the encoder default
    pub quality: Option<u8>,
    /// Spend extra CPU time to shrink lossless output
    pub optimize: bool,
}

impl EncodeOptions {
    /// Options used by the compression transform
    #[must_use]
    pub fn compressed(quality: u8) -> Self {
        Self {
            quality: Some(quality.clamp(1, 100)),
            optimize: true,
        }
    }
}

/// Service for handling image decoding and encoding
pub struct ImageIOService;

impl ImageIOService {
    /// Decode an image from memory, detecting the container from its content
    ///
    /// # Errors
    /// - Unknown or corrupt image data
    pub fn load_from_bytes(bytes: &[u8]) -> Result<DynamicImage> {
        Ok(image::load_from_memory(bytes)?)
    }

    /// Encode `image` into `format`
    ///
    /// JPEG and WebP honour the quality setting; WebP without a quality is
    /// written lossless. PNG switches to best compression with adaptive
    /// filtering when optimising.
    ///
    /// # Errors
    /// - `UnsupportedFormat` for containers this build cannot write
    /// - Encoder failures
    pub fn encode(
        image: &DynamicImage,
        format: ImageFormat,
        options: EncodeOptions,
    ) -> Result<Vec<u8>> {
        if !OutputFormatHandler::can_write(format) {
            return Err(PhotoError::unsupported_format(format!(
                "{format:?} output is not supported"
            )));
        }

        let prepared = OutputFormatHandler::convert_for(image, format);
        let mut buffer = Vec::new();
        let mut cursor = Cursor::new(&mut buffer);

        match format {
            ImageFormat::Jpeg => {
                let encoder = match options.quality {
                    Some(quality) => JpegEncoder::new_with_quality(&mut cursor, quality),
                    None => JpegEncoder::new(&mut cursor),
                };
                prepared.write_with_encoder(encoder)?;
            },
            ImageFormat::Png if options.optimize => {
                let encoder =
                    PngEncoder::new_with_quality(&mut cursor, CompressionType::Best, FilterType::Adaptive);
                prepared.write_with_encoder(encoder)?;
            },
            ImageFormat::WebP => match options.quality {
                Some(quality) => return Ok(encode_lossy_webp(&prepared, quality)),
                None => prepared.write_with_encoder(WebPEncoder::new_lossless(&mut cursor))?,
            },
            other => prepared.write_to(&mut cursor, other)?,
        }

        Ok(buffer)
    }
}

fn encode_lossy_webp(image: &DynamicImage, quality: u8) -> Vec<u8> {
    let encoded = match image {
        DynamicImage::ImageRgba8(rgba) => {
            webp::Encoder::from_rgba(rgba, rgba.width(), rgba.height()).encode(f32::from(quality))
        },
        other => {
            let rgb = other.to_rgb8();
            webp::Encoder::from_rgb(&rgb, rgb.width(), rgb.height()).encode(f32::from(quality))
        },
    };
    encoded.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgb, RgbImage, Rgba, RgbaImage};

    fn noisy_photo(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            let v = (x * 7 + y * 13) % 256;
            Rgb([v as u8, (255 - v) as u8, ((x ^ y) % 256) as u8])
        }))
    }

    #[test]
    fn test_encode_decode_each_writable_format() {
        let image = noisy_photo(16, 12);
        for format in [
            ImageFormat::Png,
            ImageFormat::Jpeg,
            ImageFormat::WebP,
            ImageFormat::Tiff,
            ImageFormat::Bmp,
            ImageFormat::Gif,
        ] {
            let bytes = ImageIOService::encode(&image, format, EncodeOptions::compressed(80))
                .unwrap_or_else(|e| panic!("{format:?}: {e}"));
            assert_eq!(image::guess_format(&bytes).unwrap(), format);
            let decoded = ImageIOService::load_from_bytes(&bytes).unwrap();
            assert_eq!(decoded.dimensions(), (16, 12));
        }
    }

    #[test]
    fn test_png_keeps_alpha() {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(3, 3, Rgba([9, 8, 7, 0])));
        let bytes = ImageIOService::encode(&image, ImageFormat::Png, EncodeOptions::default()).unwrap();
        let decoded = ImageIOService::load_from_bytes(&bytes).unwrap();
        assert_eq!(decoded.to_rgba8().get_pixel(1, 1).0, [9, 8, 7, 0]);
    }

    #[test]
    fn test_lower_jpeg_quality_is_smaller() {
        let image = noisy_photo(64, 64);
        let high = ImageIOService::encode(&image, ImageFormat::Jpeg, EncodeOptions::compressed(100)).unwrap();
        let low = ImageIOService::encode(&image, ImageFormat::Jpeg, EncodeOptions::compressed(20)).unwrap();
        assert!(low.len() < high.len());
    }

    #[test]
    fn test_load_from_bytes_rejects_garbage() {
        assert!(matches!(
            ImageIOService::load_from_bytes(b"not an image"),
            Err(PhotoError::Image(_))
        ));
    }

    #[test]
    fn test_webp_quality_is_lossy() {
        let image = noisy_photo(64, 64);
        let high = ImageIOService::encode(&image, ImageFormat::WebP, EncodeOptions::compressed(100)).unwrap();
        let low = ImageIOService::encode(&image, ImageFormat::WebP, EncodeOptions::compressed(80)).unwrap();

        assert_ne!(high, low);
        assert_eq!(&low[12..16], b"VP8 ");
        assert_eq!(image::guess_format(&low).unwrap(), ImageFormat::WebP);
    }

    #[test]
    fn test_webp_without_quality_is_lossless() {
        let image = noisy_photo(8, 8);
        let bytes = ImageIOService::encode(&image, ImageFormat::WebP, EncodeOptions::default()).unwrap();
        assert_eq!(&bytes[12..16], b"VP8L");
        let decoded = ImageIOService::load_from_bytes(&bytes).unwrap();
        assert_eq!(decoded.to_rgb8(), image.to_rgb8());
    }
}
