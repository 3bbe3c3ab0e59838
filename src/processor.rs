//! Request pipeline orchestration
//!
//! Every transform follows the same path: validate the upload, store it,
//! decode, transform, encode, store the output and hand its bytes back.
//! The orchestrator is synchronous and shared across requests; the HTTP
//! layer runs it on the blocking thread pool.

use crate::{
    config::ServiceConfig,
    error::{PhotoError, Result},
    inference::{BackendFactory, DefaultBackendFactory},
    services::{EncodeOptions, ImageIOService, OutputFormatHandler, RESPONSE_MIME},
    storage::{StoredFile, UploadStore},
    transforms::{BackgroundRemover, Compressor, Enhancer, Operation},
};
use image::{DynamicImage, ImageFormat};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument};

/// Response body when the request has no `file` part
pub const NO_FILE_MESSAGE: &str = "Tidak ada file yang diunggah";

/// Response body when the `file` part has an empty filename
pub const EMPTY_FILENAME_MESSAGE: &str = "Tidak ada file yang dipilih";

/// Prefix of the response body when enhancement fails
pub const ENHANCE_FAILURE_PREFIX: &str = "Gagal meningkatkan kualitas gambar";

/// An uploaded file as received from the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedAsset {
    /// Raw file content
    pub bytes: Vec<u8>,
    /// Filename declared by the client, `None` when the part carried none
    pub filename: Option<String>,
}

impl UploadedAsset {
    pub fn new<B: Into<Vec<u8>>>(bytes: B, filename: Option<String>) -> Self {
        Self {
            bytes: bytes.into(),
            filename,
        }
    }

    /// Declared filename, if it is present and non-empty
    ///
    /// # Errors
    /// - `MissingUpload` when no filename was declared or it is empty
    pub fn declared_filename(&self) -> Result<&str> {
        match self.filename.as_deref() {
            None => Err(PhotoError::missing_upload(NO_FILE_MESSAGE)),
            Some("") => Err(PhotoError::missing_upload(EMPTY_FILENAME_MESSAGE)),
            Some(name) => Ok(name),
        }
    }
}

/// Outcome of a successful transform
#[derive(Debug, Clone)]
pub struct TransformResult {
    /// Where the output was written
    pub stored: StoredFile,
    /// Transform that produced it
    pub operation: Operation,
    /// Exact bytes written to `stored`
    pub bytes: Vec<u8>,
    /// MIME type to declare on the response
    pub content_type: &'static str,
}

/// Shared pipeline for the three transforms
#[derive(Debug)]
pub struct PhotoProcessor {
    config: ServiceConfig,
    store: UploadStore,
    remover: BackgroundRemover,
    enhancer: Enhancer,
    compressor: Compressor,
}

impl PhotoProcessor {
    /// Create a processor with the backends compiled into this build
    ///
    /// The configuration is used as given. Validate it first with
    /// [`ServiceConfig::validate`] or build it through the builder.
    #[must_use]
    pub fn new(config: ServiceConfig) -> Self {
        Self::with_factory(config, Arc::new(DefaultBackendFactory))
    }

    /// Create a processor with a custom inference backend factory
    #[must_use]
    pub fn with_factory(config: ServiceConfig, factory: Arc<dyn BackendFactory>) -> Self {
        Self {
            store: UploadStore::new(config.upload_dir.clone(), config.unique_names),
            remover: BackgroundRemover::with_factory(config.segmentation.clone(), factory),
            enhancer: Enhancer::new(config.enhancement),
            compressor: Compressor::new(config.compression),
            config,
        }
    }

    /// Get the current configuration
    #[must_use]
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Storage adapter used for uploads and outputs
    #[must_use]
    pub fn store(&self) -> &UploadStore {
        &self.store
    }

    /// Background remover, for eager model loading
    #[must_use]
    pub fn remover(&self) -> &BackgroundRemover {
        &self.remover
    }

    /// Run `operation` on `asset`
    ///
    /// # Errors
    /// See the individual transform methods.
    pub fn process(&self, operation: Operation, asset: &UploadedAsset) -> Result<TransformResult> {
        match operation {
            Operation::RemoveBackground => self.remove_background(asset),
            Operation::Enhance => self.enhance(asset),
            Operation::Compress => self.compress(asset),
        }
    }

    /// Cut the foreground out and return it as a transparent PNG
    ///
    /// # Errors
    /// - `MissingUpload` or `InvalidFilename` for a bad upload
    /// - Decode, model or write failures
    #[instrument(skip_all, fields(operation = %Operation::RemoveBackground))]
    pub fn remove_background(&self, asset: &UploadedAsset) -> Result<TransformResult> {
        let start = Instant::now();
        let stored = self.store_upload(asset)?;
        let image = ImageIOService::load_from_bytes(&asset.bytes)?;

        let cutout = DynamicImage::ImageRgba8(self.remover.remove(&image)?);
        let bytes = ImageIOService::encode(&cutout, ImageFormat::Png, EncodeOptions::default())?;

        self.finish(Operation::RemoveBackground, &stored, bytes, start)
    }

    /// Improve contrast and reduce noise, keeping the input container
    ///
    /// Filter failures fall back to the decoded input. Any other failure is
    /// reported as an `Enhance` error carrying a client facing message.
    ///
    /// # Errors
    /// - `MissingUpload` or `InvalidFilename` for a bad upload
    /// - `Enhance` for decode, encode or write failures
    #[instrument(skip_all, fields(operation = %Operation::Enhance))]
    pub fn enhance(&self, asset: &UploadedAsset) -> Result<TransformResult> {
        let start = Instant::now();
        let stored = self.store_upload(asset)?;

        self.enhance_stored(&stored, &asset.bytes)
            .and_then(|bytes| self.finish(Operation::Enhance, &stored, bytes, start))
            .map_err(|e| PhotoError::Enhance(format!("{ENHANCE_FAILURE_PREFIX}: {e}")))
    }

    fn enhance_stored(&self, stored: &StoredFile, bytes: &[u8]) -> Result<Vec<u8>> {
        let output_name = Operation::Enhance.output_name(stored.file_name());
        let format = OutputFormatHandler::format_for_name(&output_name)?;
        let image = ImageIOService::load_from_bytes(bytes)?;
        let enhanced = self.enhancer.enhance_or_original(&image);
        ImageIOService::encode(&enhanced, format, EncodeOptions::default())
    }

    /// Re-encode at the configured quality, keeping the input container
    ///
    /// # Errors
    /// - `MissingUpload` or `InvalidFilename` for a bad upload
    /// - Unsupported extension, decode or write failures
    #[instrument(skip_all, fields(operation = %Operation::Compress))]
    pub fn compress(&self, asset: &UploadedAsset) -> Result<TransformResult> {
        let start = Instant::now();
        let stored = self.store_upload(asset)?;

        let output_name = Operation::Compress.output_name(stored.file_name());
        let format = OutputFormatHandler::format_for_name(&output_name)?;
        let image = ImageIOService::load_from_bytes(&asset.bytes)?;
        let bytes = self.compressor.compress(&image, format)?;

        self.finish(Operation::Compress, &stored, bytes, start)
    }

    fn store_upload(&self, asset: &UploadedAsset) -> Result<StoredFile> {
        let filename = asset.declared_filename()?;
        self.store.store(&asset.bytes, filename)
    }

    fn finish(
        &self,
        operation: Operation,
        input: &StoredFile,
        bytes: Vec<u8>,
        start: Instant,
    ) -> Result<TransformResult> {
        let stored = self
            .store
            .write_derived(&operation.output_name(input.file_name()), &bytes)?;

        info!(
            input = input.file_name(),
            output = stored.file_name(),
            size = bytes.len(),
            elapsed_ms = start.elapsed().as_millis(),
            "transform completed"
        );

        Ok(TransformResult {
            stored,
            operation,
            bytes,
            content_type: RESPONSE_MIME,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{MockBackend, MockBackendFactory};
    use image::{GenericImageView, Rgb, RgbImage};
    use std::sync::atomic::Ordering;

    fn png_bytes(image: &DynamicImage) -> Vec<u8> {
        ImageIOService::encode(image, ImageFormat::Png, EncodeOptions::default()).unwrap()
    }

    fn processor(dir: &std::path::Path) -> PhotoProcessor {
        let config = ServiceConfig::builder().upload_dir(dir).build().unwrap();
        PhotoProcessor::with_factory(config, Arc::new(MockBackendFactory::default()))
    }

    fn gradient() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(32, 24, |x, y| {
            Rgb([(x * 8) as u8, (y * 10) as u8, 128])
        }))
    }

    #[test]
    fn test_missing_filename_is_rejected_before_storage() {
        let dir = tempfile::tempdir().unwrap();
        let processor = processor(dir.path());

        for (filename, message) in [(None, NO_FILE_MESSAGE), (Some(String::new()), EMPTY_FILENAME_MESSAGE)] {
            let asset = UploadedAsset::new(png_bytes(&gradient()), filename);
            for operation in Operation::ALL {
                let err = processor.process(operation, &asset).unwrap_err();
                assert!(err.is_client_error());
                assert_eq!(err.to_string(), message);
            }
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_remove_background_writes_png() {
        let dir = tempfile::tempdir().unwrap();
        let processor = processor(dir.path());
        let asset = UploadedAsset::new(png_bytes(&gradient()), Some("shot.jpeg.png".into()));

        let result = processor.remove_background(&asset).unwrap();

        assert_eq!(result.stored.file_name(), "nobg_shot.jpeg.png");
        assert_eq!(result.content_type, "image/png");
        assert_eq!(std::fs::read(&result.stored.path).unwrap(), result.bytes);
        let decoded = image::load_from_memory(&result.bytes).unwrap();
        assert!(decoded.color().has_alpha());
        assert_eq!(decoded.to_rgba8().get_pixel(0, 0)[3], 0);
    }

    #[test]
    fn test_enhance_keeps_container() {
        let dir = tempfile::tempdir().unwrap();
        let processor = processor(dir.path());
        let jpeg = ImageIOService::encode(&gradient(), ImageFormat::Jpeg, EncodeOptions::default()).unwrap();

        let result = processor
            .enhance(&UploadedAsset::new(jpeg, Some("g.jpg".into())))
            .unwrap();

        assert_eq!(result.stored.file_name(), "enhanced_g.jpg");
        assert_eq!(image::guess_format(&result.bytes).unwrap(), ImageFormat::Jpeg);
        assert_eq!(result.content_type, "image/png");
    }

    #[test]
    fn test_enhance_reports_undecodable_upload() {
        let dir = tempfile::tempdir().unwrap();
        let processor = processor(dir.path());

        let err = processor
            .enhance(&UploadedAsset::new(b"garbage".to_vec(), Some("x.png".into())))
            .unwrap_err();

        assert!(matches!(err, PhotoError::Enhance(_)));
        assert!(err.to_string().starts_with("Gagal meningkatkan kualitas gambar: "));
    }

    #[test]
    fn test_compress_keeps_dimensions_and_name() {
        let dir = tempfile::tempdir().unwrap();
        let processor = processor(dir.path());

        let result = processor
            .compress(&UploadedAsset::new(png_bytes(&gradient()), Some("My Photo.png".into())))
            .unwrap();

        assert_eq!(result.stored.file_name(), "compressed_My_Photo.png");
        let decoded = image::load_from_memory(&result.bytes).unwrap();
        assert_eq!(decoded.dimensions(), (32, 24));
    }

    #[test]
    fn test_compress_unknown_extension_fails() {
        let dir = tempfile::tempdir().unwrap();
        let processor = processor(dir.path());

        let err = processor
            .compress(&UploadedAsset::new(png_bytes(&gradient()), Some("photo.xyz".into())))
            .unwrap_err();
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_model_loaded_lazily_once() {
        let dir = tempfile::tempdir().unwrap();
        let template = MockBackend::new();
        let calls = template.call_counter();
        let config = ServiceConfig::builder().upload_dir(dir.path()).build().unwrap();
        let processor = PhotoProcessor::with_factory(config, Arc::new(MockBackendFactory::new(template)));

        assert!(!processor.remover().is_loaded());
        let asset = UploadedAsset::new(png_bytes(&gradient()), Some("a.png".into()));
        processor.remove_background(&asset).unwrap();
        processor.remove_background(&asset).unwrap();

        assert!(processor.remover().is_loaded());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
