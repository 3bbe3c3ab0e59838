//! Inference backend abstraction and factory

use crate::{
    config::{BackendType, SegmentationConfig},
    error::{PhotoError, Result},
    models::{ModelInfo, ModelManager, PreprocessingConfig},
};
use ndarray::Array4;
use std::time::Duration;

/// Trait for inference backends
pub trait InferenceBackend: Send {
    /// Initialize the backend with the given configuration
    ///
    /// # Errors
    /// - Backend initialization failures
    /// - Model loading or validation errors
    fn initialize(&mut self, config: &SegmentationConfig) -> Result<Option<Duration>>;

    /// Run inference on the input tensor
    ///
    /// # Errors
    /// - Backend not initialized
    /// - Model inference failures
    /// - Tensor conversion or processing errors
    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>>;

    /// Get preprocessing configuration for this backend
    ///
    /// # Errors
    /// - Model manager not initialized
    fn get_preprocessing_config(&self) -> Result<PreprocessingConfig>;

    /// Get model information for this backend
    ///
    /// # Errors
    /// - Model manager not initialized
    /// - Model metadata unavailable
    fn get_model_info(&self) -> Result<ModelInfo>;

    /// Check if backend is initialized
    fn is_initialized(&self) -> bool;
}

/// Factory trait for creating inference backends
pub trait BackendFactory: Send + Sync {
    /// Create a backend instance of the specified type with the given model manager
    ///
    /// # Errors
    /// - Backend type not compiled into this build
    fn create_backend(
        &self,
        backend_type: BackendType,
        model_manager: ModelManager,
    ) -> Result<Box<dyn InferenceBackend>>;

    /// List available backend types
    fn available_backends(&self) -> Vec<BackendType>;
}

/// Backend factory for the engines enabled at compile time
#[derive(Debug, Default)]
pub struct DefaultBackendFactory;

impl BackendFactory for DefaultBackendFactory {
    fn create_backend(
        &self,
        backend_type: BackendType,
        model_manager: ModelManager,
    ) -> Result<Box<dyn InferenceBackend>> {
        match backend_type {
            #[cfg(feature = "tract")]
            BackendType::Tract => Ok(Box::new(
                crate::backends::TractBackend::with_model_manager(model_manager),
            )),
            #[cfg(feature = "onnx")]
            BackendType::Onnx => Ok(Box::new(
                crate::backends::OnnxBackend::with_model_manager(model_manager),
            )),
            #[allow(unreachable_patterns)]
            other => {
                let _ = model_manager;
                Err(PhotoError::invalid_config(format!(
                    "{other} backend not compiled in. Rebuild with --features {other}"
                )))
            },
        }
    }

    fn available_backends(&self) -> Vec<BackendType> {
        let mut backends = Vec::new();
        #[cfg(feature = "tract")]
        backends.push(BackendType::Tract);
        #[cfg(feature = "onnx")]
        backends.push(BackendType::Onnx);
        backends
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_lists_compiled_backends() {
        let backends = DefaultBackendFactory.available_backends();
        assert_eq!(backends.contains(&BackendType::Tract), cfg!(feature = "tract"));
        assert_eq!(backends.contains(&BackendType::Onnx), cfg!(feature = "onnx"));
    }

    #[test]
    fn test_factory_creates_uninitialized_backend() {
        let config = SegmentationConfig::default();
        for backend_type in DefaultBackendFactory.available_backends() {
            let backend = DefaultBackendFactory
                .create_backend(backend_type, ModelManager::from_config(&config))
                .unwrap();
            assert!(!backend.is_initialized());
        }
    }

    #[cfg(not(feature = "onnx"))]
    #[test]
    fn test_factory_rejects_missing_backend() {
        let config = SegmentationConfig::default();
        let result =
            DefaultBackendFactory.create_backend(BackendType::Onnx, ModelManager::from_config(&config));
        assert!(matches!(result, Err(PhotoError::InvalidConfig(_))));
    }
}
