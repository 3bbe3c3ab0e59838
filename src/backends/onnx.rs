//! ONNX Runtime backend implementation for segmentation models
//!
//! Supports CPU, CUDA and `CoreML` execution providers. Hardware providers
//! are only registered when ONNX Runtime reports them available, otherwise
//! the session silently runs on CPU.

use crate::config::{ExecutionProvider, SegmentationConfig};
use crate::error::{PhotoError, Result};
use crate::inference::InferenceBackend;
use crate::models::{ModelInfo, ModelManager, PreprocessingConfig};
use ndarray::Array4;
use ort::execution_providers::{
    CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider as OrtExecutionProvider,
    ExecutionProviderDispatch,
};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;
use std::time::{Duration, Instant};

/// ONNX Runtime backend for running segmentation models
#[derive(Debug)]
pub struct OnnxBackend {
    session: Option<Session>,
    model_manager: Option<ModelManager>,
    initialized: bool,
}

impl OnnxBackend {
    /// List all ONNX Runtime execution providers with availability status
    ///
    /// Returns `(name, available, description)` tuples.
    #[must_use]
    pub fn list_providers() -> Vec<(String, bool, String)> {
        let cuda_available =
            OrtExecutionProvider::is_available(&CUDAExecutionProvider::default()).unwrap_or(false);
        let coreml_available =
            OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default())
                .unwrap_or(false);

        vec![
            (
                "CPU".to_string(),
                true,
                "Always available, uses CPU for inference".to_string(),
            ),
            (
                "CUDA".to_string(),
                cuda_available,
                "NVIDIA GPU acceleration (requires CUDA toolkit and compatible GPU)".to_string(),
            ),
            (
                "CoreML".to_string(),
                coreml_available,
                "Apple Silicon acceleration via CoreML".to_string(),
            ),
        ]
    }

    /// Create a new ONNX backend without a model
    #[must_use]
    pub fn new() -> Self {
        Self {
            session: None,
            model_manager: None,
            initialized: false,
        }
    }

    /// Create an ONNX backend with a pre-configured model manager
    #[must_use]
    pub fn with_model_manager(model_manager: ModelManager) -> Self {
        Self {
            session: None,
            model_manager: Some(model_manager),
            initialized: false,
        }
    }

    /// Execution providers to register for the requested provider, most preferred first
    fn providers_for(requested: ExecutionProvider) -> Vec<ExecutionProviderDispatch> {
        let cuda = CUDAExecutionProvider::default();
        let cuda_available = OrtExecutionProvider::is_available(&cuda).unwrap_or(false);
        let coreml = CoreMLExecutionProvider::default().with_subgraphs(true);
        let coreml_available = OrtExecutionProvider::is_available(&coreml).unwrap_or(false);

        let mut providers = Vec::new();
        match requested {
            ExecutionProvider::Auto => {
                if cuda_available {
                    providers.push(cuda.build());
                }
                if coreml_available {
                    providers.push(coreml.build());
                }
                if providers.is_empty() {
                    log::warn!("No hardware acceleration available, falling back to CPU");
                }
            },
            ExecutionProvider::Cuda => {
                if cuda_available {
                    providers.push(cuda.build());
                } else {
                    log::warn!("CUDA execution provider requested but not available, falling back to CPU");
                }
            },
            ExecutionProvider::CoreMl => {
                if coreml_available {
                    providers.push(coreml.build());
                } else {
                    log::warn!("CoreML execution provider requested but not available, falling back to CPU");
                }
            },
            ExecutionProvider::Cpu => {},
        }
        providers
    }

    /// Load and initialize the ONNX model
    fn load_model(&mut self, config: &SegmentationConfig) -> Result<Duration> {
        let model_load_start = Instant::now();

        let model_manager = self
            .model_manager
            .as_ref()
            .ok_or_else(|| PhotoError::model("No model manager available for ONNX backend"))?;

        let model_data = model_manager.load_model()?;
        let model_info = model_manager.get_info()?;

        let mut session_builder = Session::builder()
            .map_err(|e| PhotoError::inference(format!("Failed to create session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| PhotoError::inference(format!("Failed to set optimization level: {e}")))?;

        let providers = Self::providers_for(config.execution_provider);
        if !providers.is_empty() {
            log::info!(
                "Hardware acceleration enabled with {} provider(s)",
                providers.len()
            );
            session_builder = session_builder
                .with_execution_providers(providers)
                .map_err(|e| {
                    PhotoError::inference(format!("Failed to set execution providers: {e}"))
                })?;
        }

        let intra_threads = if config.intra_threads > 0 {
            config.intra_threads
        } else {
            std::thread::available_parallelism()
                .map(std::num::NonZero::get)
                .unwrap_or(4)
        };

        let session = session_builder
            .with_intra_threads(intra_threads)
            .map_err(|e| PhotoError::inference(format!("Failed to set intra threads: {e}")))?
            .commit_from_memory(&model_data)
            .map_err(|e| {
                PhotoError::model(format!("Failed to create session from model data: {e}"))
            })?;

        log::info!(
            "ONNX Runtime session ready: model {} ({:.2} MB), provider {}, {intra_threads} intra-op threads",
            model_info.name,
            model_info.size_bytes as f64 / (1024.0 * 1024.0),
            config.execution_provider
        );

        self.session = Some(session);
        self.initialized = true;

        Ok(model_load_start.elapsed())
    }
}

impl Default for OnnxBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceBackend for OnnxBackend {
    fn initialize(&mut self, config: &SegmentationConfig) -> Result<Option<Duration>> {
        if self.initialized {
            return Ok(None);
        }

        let model_load_time = self.load_model(config)?;
        Ok(Some(model_load_time))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| PhotoError::inference("ONNX session not initialized"))?;

        let inference_start = Instant::now();
        log::debug!("Running ONNX inference, input shape {:?}", input.dim());

        let input_value = Value::from_array(input.clone())
            .map_err(|e| PhotoError::inference(format!("Failed to convert input tensor: {e}")))?;

        // Positional inputs avoid depending on exported tensor names
        let outputs = session
            .run(ort::inputs![input_value])
            .map_err(|e| PhotoError::inference(format!("ONNX inference failed: {e}")))?;

        let output_tensor = {
            let keys: Vec<_> = outputs.keys().collect();
            let first_key = keys
                .first()
                .ok_or_else(|| PhotoError::inference("No output tensors found"))?;
            outputs
                .get(first_key)
                .ok_or_else(|| PhotoError::inference("First output tensor not found"))?
                .try_extract_array::<f32>()
                .map_err(|e| {
                    PhotoError::inference(format!("Failed to extract output tensor: {e}"))
                })?
        };

        let output_shape = output_tensor.shape().to_vec();
        let output_data: Vec<f32> = output_tensor.iter().copied().collect();
        let output_array = match output_shape.as_slice() {
            [n, c, h, w] => Array4::from_shape_vec((*n, *c, *h, *w), output_data),
            [n, h, w] => Array4::from_shape_vec((*n, 1, *h, *w), output_data),
            _ => {
                return Err(PhotoError::inference(format!(
                    "Expected 3D or 4D output tensor, got {}D",
                    output_shape.len()
                )))
            },
        }
        .map_err(|e| PhotoError::inference(format!("Failed to reshape output tensor: {e}")))?;

        log::debug!(
            "ONNX inference completed in {}ms",
            inference_start.elapsed().as_millis()
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
    fn test_onnx_backend_creation() {
        let backend = OnnxBackend::new();
        assert!(!backend.is_initialized());
        assert!(backend.get_model_info().is_err());
    }

    #[test]
    fn test_list_providers_always_has_cpu() {
        let providers = OnnxBackend::list_providers();
        assert!(providers
            .iter()
            .any(|(name, available, _)| name == "CPU" && *available));
    }

    #[test]
    fn test_onnx_backend_missing_model_fails_gracefully() {
        let manager = ModelManager::new("/no/such/model.onnx", PreprocessingConfig::default());
        let mut backend = OnnxBackend::with_model_manager(manager);
        assert!(backend.initialize(&SegmentationConfig::default()).is_err());
        assert!(!backend.is_initialized());
    }
}
