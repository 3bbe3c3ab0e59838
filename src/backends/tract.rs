//! Tract backend implementation for segmentation models
//!
//! Tract is a pure Rust neural network inference library: no C++ runtime,
//! no FFI boundary, and it builds everywhere the rest of the crate does.

use crate::config::SegmentationConfig;
use crate::error::{PhotoError, Result};
use crate::inference::InferenceBackend;
use crate::models::{ModelInfo, ModelManager, PreprocessingConfig};
use ndarray::Array4;
use std::time::{Duration, Instant};
use tract_onnx::prelude::*;

/// Type alias for the complex Tract model type to reduce complexity warnings
type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Tract backend for running segmentation models using pure Rust inference
#[derive(Debug)]
pub struct TractBackend {
    model: Option<TractModel>,
    model_manager: Option<ModelManager>,
    initialized: bool,
}

impl TractBackend {
    /// Create a new uninitialized Tract backend
    #[must_use]
    pub fn new() -> Self {
        Self {
            model: None,
            model_manager: None,
            initialized: false,
        }
    }

    /// Create a Tract backend with a pre-configured model manager
    #[must_use]
    pub fn with_model_manager(model_manager: ModelManager) -> Self {
        Self {
            model: None,
            model_manager: Some(model_manager),
            initialized: false,
        }
    }

    /// Load and initialize the model using Tract
    fn load_model(&mut self) -> Result<Duration> {
        let model_load_start = Instant::now();

        let Some(ref model_manager) = self.model_manager else {
            return Err(PhotoError::model(
                "No model manager available for Tract backend",
            ));
        };

        let model_data = model_manager.load_model()?;
        let model_info = model_manager.get_info()?;
        let (n, c, h, w) = model_info.input_shape;

        log::info!(
            "Initializing Tract backend: model {} ({:.2} MB), input {n}x{c}x{h}x{w}",
            model_info.name,
            model_info.size_bytes as f64 / (1024.0 * 1024.0)
        );

        let model = onnx()
            .model_for_read(&mut std::io::Cursor::new(model_data))
            .map_err(|e| PhotoError::model(format!("Failed to load ONNX model: {e}")))?
            .with_input_fact(0, f32::fact([n, c, h, w]).into())
            .map_err(|e| PhotoError::model(format!("Failed to fix model input shape: {e}")))?
            .into_optimized()
            .map_err(|e| PhotoError::model(format!("Failed to optimize model: {e}")))?
            .into_runnable()
            .map_err(|e| PhotoError::model(format!("Failed to create runnable model: {e}")))?;

        self.model = Some(model);
        self.initialized = true;

        let model_load_time = model_load_start.elapsed();
        log::info!(
            "Tract backend initialized in {}ms",
            model_load_time.as_millis()
        );

        Ok(model_load_time)
    }
}

impl Default for TractBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceBackend for TractBackend {
    fn initialize(&mut self, _config: &SegmentationConfig) -> Result<Option<Duration>> {
        if self.initialized {
            return Ok(None);
        }

        let model_load_time = self.load_model()?;
        Ok(Some(model_load_time))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| PhotoError::inference("Tract model not initialized"))?;

        log::debug!("Running Tract inference, input tensor {:?}", input.shape());
        let inference_start = Instant::now();

        let input_tensor = Tensor::from(input.clone());

        let outputs = model
            .run(tvec![input_tensor.into()])
            .map_err(|e| PhotoError::inference(format!("Tract inference failed: {e}")))?;

        // u2net-style models emit several side outputs; the fused map comes first
        let output_tensor = outputs
            .into_iter()
            .next()
            .ok_or_else(|| PhotoError::inference("No output tensor found"))?
            .into_arc_tensor();

        let output_data = output_tensor
            .to_array_view::<f32>()
            .map_err(|e| PhotoError::inference(format!("Failed to convert output tensor: {e}")))?;

        let output_shape = output_data.shape().to_vec();
        let output_array = match output_shape.as_slice() {
            [n, c, h, w] => Array4::from_shape_vec(
                (*n, *c, *h, *w),
                output_data.iter().copied().collect(),
            ),
            // Some exports drop the channel axis
            [n, h, w] => Array4::from_shape_vec(
                (*n, 1, *h, *w),
                output_data.iter().copied().collect(),
            ),
            _ => {
                return Err(PhotoError::inference(format!(
                    "Expected 3D or 4D output tensor, got {}D",
                    output_shape.len()
                )))
            },
        }
        .map_err(|e| PhotoError::inference(format!("Failed to reshape output tensor: {e}")))?;

        log::debug!(
            "Tract inference completed in {}ms, output tensor {:?}",
            inference_start.elapsed().as_millis(),
            output_array.shape()
        );

        Ok(output_array)
    }

    fn get_preprocessing_config(&self) -> Result<PreprocessingConfig> {
        let model_manager = self
            .model_manager
            .as_ref()
            .ok_or_else(|| PhotoError::internal("Model manager not initialized"))?;
        Ok(model_manager.preprocessing_config().clone())
    }

    fn get_model_info(&self) -> Result<ModelInfo> {
        let model_manager = self
            .model_manager
            .as_ref()
            .ok_or_else(|| PhotoError::internal("Model manager not initialized"))?;
        model_manager.get_info()
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tract_backend_creation() {
        let backend = TractBackend::new();
        assert!(!backend.is_initialized());
        assert!(backend.get_model_info().is_err());
        assert!(backend.get_preprocessing_config().is_err());
    }

    #[test]
    fn test_tract_backend_infer_before_initialize() {
        let mut backend = TractBackend::new();
        let input = Array4::<f32>::zeros((1, 3, 8, 8));
        let err = backend.infer(&input).unwrap_err();
        assert!(matches!(err, PhotoError::Inference(_)));
    }

    #[test]
    fn test_tract_backend_missing_model_fails_gracefully() {
        let manager = ModelManager::new("/no/such/model.onnx", PreprocessingConfig::default());
        let mut backend = TractBackend::with_model_manager(manager);

        let result = backend.initialize(&SegmentationConfig::default());
        assert!(result.is_err());
        assert!(!backend.is_initialized());
    }

    #[test]
    fn test_tract_backend_rejects_garbage_model() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.onnx");
        std::fs::write(&path, b"this is not a protobuf").unwrap();

        let manager = ModelManager::new(&path, PreprocessingConfig::default());
        let mut backend = TractBackend::with_model_manager(manager);

        let err = backend.initialize(&SegmentationConfig::default()).unwrap_err();
        assert!(matches!(err, PhotoError::Model(_)));
        assert!(!backend.is_initialized());
    }
}
