//! Background removal via a segmentation model
//!
//! The model runs behind [`InferenceBackend`]. It is created and loaded on
//! the first request and then shared by every request through a mutex, so
//! at most one inference runs at a time.

use crate::{
    config::SegmentationConfig,
    error::{PhotoError, Result},
    inference::{BackendFactory, DefaultBackendFactory, InferenceBackend},
    models::ModelManager,
    utils::{ImagePreprocessor, Letterbox},
};
use image::{DynamicImage, GenericImageView, GrayImage, Luma, RgbaImage};
use ndarray::Array4;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info, instrument};

/// Predicts a foreground mask and applies it as the alpha channel
pub struct BackgroundRemover {
    config: SegmentationConfig,
    factory: Arc<dyn BackendFactory>,
    backend: Mutex<Option<Box<dyn InferenceBackend>>>,
}

impl std::fmt::Debug for BackgroundRemover {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundRemover")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl BackgroundRemover {
    /// Create a remover using the backends compiled into this build
    #[must_use]
    pub fn new(config: SegmentationConfig) -> Self {
        Self::with_factory(config, Arc::new(DefaultBackendFactory))
    }

    /// Create a remover with a custom backend factory
    #[must_use]
    pub fn with_factory(config: SegmentationConfig, factory: Arc<dyn BackendFactory>) -> Self {
        Self {
            config,
            factory,
            backend: Mutex::new(None),
        }
    }

    /// Whether the model has been loaded
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.backend
            .lock()
            .map(|backend| backend.is_some())
            .unwrap_or(false)
    }

    /// Load the model now instead of on the first request
    ///
    /// # Errors
    /// - Backend creation or model loading failures
    pub fn warm_up(&self) -> Result<()> {
        let mut guard = self.lock_backend()?;
        Self::ensure_backend(&mut guard, &self.config, self.factory.as_ref())?;
        Ok(())
    }

    /// Remove the background from `image`
    ///
    /// Returns an RGBA image of the original size whose alpha channel is the
    /// predicted foreground mask.
    ///
    /// # Errors
    /// - Model loading or inference failures
    /// - Unexpected output tensor shape
    #[instrument(skip(self, image), fields(width = image.width(), height = image.height()))]
    pub fn remove(&self, image: &DynamicImage) -> Result<RgbaImage> {
        let mask = self.segment(image)?;
        Ok(apply_mask(image, &mask))
    }

    /// Predict the foreground mask of `image` at its original size
    ///
    /// # Errors
    /// - Model loading or inference failures
    pub fn segment(&self, image: &DynamicImage) -> Result<GrayImage> {
        let mut guard = self.lock_backend()?;
        let backend = Self::ensure_backend(&mut guard, &self.config, self.factory.as_ref())?;

        let preprocessing = backend.get_preprocessing_config()?;
        let preprocess_start = Instant::now();
        let (letterbox, input) = ImagePreprocessor::preprocess_image(image, &preprocessing)?;
        debug!(
            elapsed_ms = preprocess_start.elapsed().as_millis(),
            "preprocessed image"
        );

        let inference_start = Instant::now();
        let output = backend.infer(&input)?;
        drop(guard);
        debug!(
            elapsed_ms = inference_start.elapsed().as_millis(),
            "inference completed"
        );

        tensor_to_mask(
            &output,
            &letterbox,
            image.dimensions(),
            self.config.normalize_output,
        )
    }

    fn lock_backend(&self) -> Result<std::sync::MutexGuard<'_, Option<Box<dyn InferenceBackend>>>> {
        self.backend
            .lock()
            .map_err(|_| PhotoError::internal("Inference backend lock poisoned"))
    }

    fn ensure_backend<'a>(
        slot: &'a mut Option<Box<dyn InferenceBackend>>,
        config: &SegmentationConfig,
        factory: &dyn BackendFactory,
    ) -> Result<&'a mut Box<dyn InferenceBackend>> {
        if slot.is_none() {
            info!(
                backend = %config.backend,
                model = %config.model_path.display(),
                "loading segmentation model"
            );
            let mut backend =
                factory.create_backend(config.backend, ModelManager::from_config(config))?;
            if let Some(load_time) = backend.initialize(config)? {
                info!(elapsed_ms = load_time.as_millis(), "segmentation model loaded");
            }
            *slot = Some(backend);
        }

        slot.as_mut()
            .ok_or_else(|| PhotoError::internal("Inference backend missing after initialization"))
    }
}

/// Map the model output back onto the original image as an 8-bit mask
///
/// # Errors
/// - Output tensor is not `[1, 1, S, S]` for the letterboxed input size
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn tensor_to_mask(
    tensor: &Array4<f32>,
    letterbox: &Letterbox,
    original_dimensions: (u32, u32),
    normalize: bool,
) -> Result<GrayImage> {
    let (n, c, height, width) = tensor.dim();
    let side = letterbox.target_size as usize;
    if n != 1 || c != 1 || height != side || width != side {
        return Err(PhotoError::inference(format!(
            "Unexpected output tensor shape {:?}, expected [1, 1, {side}, {side}]",
            tensor.shape()
        )));
    }

    let (min, max) = tensor
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let range = max - min;
    let rescale = |value: f32| {
        if normalize && range > f32::EPSILON {
            (value - min) / range
        } else {
            value
        }
    };

    let (orig_width, orig_height) = original_dimensions;
    let mask = GrayImage::from_fn(orig_width, orig_height, |x, y| {
        let value = letterbox
            .to_canvas(x, y)
            .and_then(|(cx, cy)| tensor.get([0, 0, cy, cx]).copied())
            .map_or(0.0, rescale);
        Luma([(value.clamp(0.0, 1.0) * 255.0).round() as u8])
    });

    Ok(mask)
}

/// Use `mask` as the alpha channel of `image`
///
/// Fully transparent pixels are zeroed so the cut-out carries no stray colour.
#[must_use]
pub fn apply_mask(image: &DynamicImage, mask: &GrayImage) -> RgbaImage {
    let mut rgba = image.to_rgba8();
    for (x, y, pixel) in rgba.enumerate_pixels_mut() {
        let alpha = mask.get_pixel_checked(x, y).map_or(0, |luma| luma[0]);
        if alpha == 0 {
            *pixel = image::Rgba([0, 0, 0, 0]);
        } else {
            pixel[3] = alpha;
        }
    }
    rgba
}
