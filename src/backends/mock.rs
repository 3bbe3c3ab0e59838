//! Mock backend for tests and model-free runs
//!
//! Predicts a centred foreground rectangle covering the middle half of the
//! model input, so callers get a deterministic mask without a model file.

use crate::config::{BackendType, SegmentationConfig};
use crate::error::{PhotoError, Result};
use crate::inference::{BackendFactory, InferenceBackend};
use crate::models::{ModelInfo, ModelManager, PreprocessingConfig};
use ndarray::Array4;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Mock segmentation backend
#[derive(Debug, Clone)]
pub struct MockBackend {
    preprocessing: PreprocessingConfig,
    initialized: bool,
    fail_inference: bool,
    calls: Arc<AtomicUsize>,
}

impl MockBackend {
    /// Create a new mock backend with a small model input
    #[must_use]
    pub fn new() -> Self {
        Self {
            preprocessing: PreprocessingConfig {
                target_size: 64,
                ..PreprocessingConfig::default()
            },
            initialized: false,
            fail_inference: false,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Create a mock backend whose inference always fails
    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail_inference: true,
            ..Self::new()
        }
    }

    /// Shared counter of `infer` calls, readable after the backend is boxed
    #[must_use]
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Factory handing out clones of a single mock backend
///
/// Clones share the call counter, so a test can keep the factory's
/// template and observe how often the service ran inference.
#[derive(Debug, Clone, Default)]
pub struct MockBackendFactory {
    template: MockBackend,
}

impl MockBackendFactory {
    #[must_use]
    pub fn new(template: MockBackend) -> Self {
        Self { template }
    }
}

impl BackendFactory for MockBackendFactory {
    fn create_backend(
        &self,
        _backend_type: BackendType,
        _model_manager: ModelManager,
    ) -> Result<Box<dyn InferenceBackend>> {
        Ok(Box::new(self.template.clone()))
    }

    fn available_backends(&self) -> Vec<BackendType> {
        vec![BackendType::Tract, BackendType::Onnx]
    }
}

impl InferenceBackend for MockBackend {
    fn initialize(&mut self, _config: &SegmentationConfig) -> Result<Option<Duration>> {
        self.initialized = true;
        Ok(None)
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_inference {
            return Err(PhotoError::inference("mock inference failure"));
        }

        let (n, _c, h, w) = input.dim();
        let mut output = Array4::<f32>::zeros((n, 1, h, w));
        let (y0, y1) = (h / 4, h - h / 4);
        let (x0, x1) = (w / 4, w - w / 4);
        for batch in 0..n {
            for y in y0..y1 {
                for x in x0..x1 {
                    if let Some(value) = output.get_mut([batch, 0, y, x]) {
                        *value = 1.0;
                    }
                }
            }
        }

        Ok(output)
    }

    fn get_preprocessing_config(&self) -> Result<PreprocessingConfig> {
        Ok(self.preprocessing.clone())
    }

    fn get_model_info(&self) -> Result<ModelInfo> {
        let side = self.preprocessing.target_size as usize;
        Ok(ModelInfo {
            name: "mock".to_string(),
            size_bytes: 0,
            input_shape: (1, 3, side, side),
            output_shape: (1, 1, side, side),
        })
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_predicts_centred_square() {
        let mut backend = MockBackend::new();
        let output = backend.infer(&Array4::zeros((1, 3, 8, 8))).unwrap();
        assert_eq!(output.dim(), (1, 1, 8, 8));
        assert!((output[[0, 0, 4, 4]] - 1.0).abs() < f32::EPSILON);
        assert!(output[[0, 0, 0, 0]].abs() < f32::EPSILON);
        assert!(output[[0, 0, 7, 7]].abs() < f32::EPSILON);
    }

    #[test]
    fn test_call_counter_is_shared() {
        let backend = MockBackend::failing();
        let counter = backend.call_counter();
        let mut boxed: Box<dyn InferenceBackend> = Box::new(backend);
        assert!(boxed.infer(&Array4::zeros((1, 3, 4, 4))).is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
