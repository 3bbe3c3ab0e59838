//! Lossy re-encoding in the original container

use crate::{
    config::CompressionConfig,
    error::Result,
    services::{EncodeOptions, ImageIOService},
};
use image::{DynamicImage, ImageFormat};
use tracing::{debug, instrument};

/// Re-encodes images at the configured quality
#[derive(Debug, Clone, Copy)]
pub struct Compressor {
    config: CompressionConfig,
}

impl Compressor {
    #[must_use]
    pub fn new(config: CompressionConfig) -> Self {
        Self { config }
    }

    /// Encoder options derived from the configuration
    #[must_use]
    pub fn options(&self) -> EncodeOptions {
        EncodeOptions {
            quality: Some(self.config.quality.clamp(1, 100)),
            optimize: self.config.optimize,
        }
    }

    /// Encode `image` into `format` with the configured quality
    ///
    /// # Errors
    /// - Container not writable by this build
    /// - Encoder failures
    #[instrument(skip(self, image), fields(quality = self.config.quality))]
    pub fn compress(&self, image: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>> {
        let bytes = ImageIOService::encode(image, format, self.options())?;
        debug!(size = bytes.len(), "compressed image");
        Ok(bytes)
    }
}
