//! Output format handling service
//!
//! Maps file names to the container they imply and adapts pixel layouts to
//! what each encoder accepts.

use crate::error::{PhotoError, Result};
use image::{DynamicImage, ImageFormat};
use std::path::Path;

/// MIME type declared on every transform response
///
/// Compressed and enhanced outputs keep their original container, but the
/// response header stays `image/png` for compatibility with existing clients.
pub const RESPONSE_MIME: &str = "image/png";

/// Containers this build can encode
const WRITABLE_FORMATS: [ImageFormat; 6] = [
    ImageFormat::Png,
    ImageFormat::Jpeg,
    ImageFormat::WebP,
    ImageFormat::Tiff,
    ImageFormat::Bmp,
    ImageFormat::Gif,
];

/// Service for output container selection and pixel layout conversion
pub struct OutputFormatHandler;

impl OutputFormatHandler {
    /// Container implied by the extension of `name`
    ///
    /// # Errors
    /// - `UnsupportedFormat` for a missing, unknown or read-only extension
    pub fn format_for_name<P: AsRef<Path>>(name: P) -> Result<ImageFormat> {
        let path = name.as_ref();
        let format = ImageFormat::from_path(path).map_err(|_| {
            PhotoError::unsupported_format(format!(
                "cannot infer an image format from '{}'",
                path.display()
            ))
        })?;

        if !Self::can_write(format) {
            return Err(PhotoError::unsupported_format(format!(
                "{format:?} output is not supported"
            )));
        }
        Ok(format)
    }

    /// Whether this build can encode `format`
    #[must_use]
    pub fn can_write(format: ImageFormat) -> bool {
        WRITABLE_FORMATS.contains(&format)
    }

    /// Check if a format supports transparency (alpha channel)
    #[must_use]
    pub fn supports_transparency(format: ImageFormat) -> bool {
        matches!(
            format,
            ImageFormat::Png
                | ImageFormat::WebP
                | ImageFormat::Tiff
                | ImageFormat::Bmp
                | ImageFormat::Gif
        )
    }

    /// Convert `image` to an 8-bit layout the encoder for `format` accepts
    ///
    /// Alpha is kept where the container can store it and dropped otherwise.
    #[must_use]
    pub fn convert_for(image: &DynamicImage, format: ImageFormat) -> DynamicImage {
        if image.color().has_alpha() && Self::supports_transparency(format) {
            match image {
                DynamicImage::ImageRgba8(_) => image.clone(),
                _ => DynamicImage::ImageRgba8(image.to_rgba8()),
            }
        } else {
            match image {
                DynamicImage::ImageRgb8(_) => image.clone(),
                _ => DynamicImage::ImageRgb8(image.to_rgb8()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn test_format_for_name() {
        assert_eq!(
            OutputFormatHandler::format_for_name("a.JPG").unwrap(),
            ImageFormat::Jpeg
        );
        assert_eq!(
            OutputFormatHandler::format_for_name("compressed_a.webp").unwrap(),
            ImageFormat::WebP
        );
        assert!(matches!(
            OutputFormatHandler::format_for_name("a.txt"),
            Err(PhotoError::UnsupportedFormat(_))
        ));
        assert!(OutputFormatHandler::format_for_name("no_extension").is_err());
    }

    #[test]
    fn test_read_only_formats_are_rejected() {
        assert!(!OutputFormatHandler::can_write(ImageFormat::Hdr));
        assert!(OutputFormatHandler::format_for_name("a.hdr").is_err());
    }

    #[test]
    fn test_convert_for_jpeg_drops_alpha() {
        let rgba = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([1, 2, 3, 4])));

        let jpeg = OutputFormatHandler::convert_for(&rgba, ImageFormat::Jpeg);
        assert!(!jpeg.color().has_alpha());

        let png = OutputFormatHandler::convert_for(&rgba, ImageFormat::Png);
        assert_eq!(png.to_rgba8().get_pixel(0, 0).0, [1, 2, 3, 4]);
    }
}
