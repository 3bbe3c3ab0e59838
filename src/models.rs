//! Segmentation model description and loading
//!
//! A model is a single ONNX file on disk plus the preprocessing parameters
//! it was trained with. The manager owns both and hands them to whichever
//! inference backend is configured.

use crate::config::SegmentationConfig;
use crate::error::{PhotoError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Preprocessing parameters for the model input tensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessingConfig {
    /// Side of the square model input, in pixels
    pub target_size: u32,
    /// Per-channel mean, applied to values in 0..1
    pub normalization_mean: [f32; 3],
    /// Per-channel standard deviation, applied to values in 0..1
    pub normalization_std: [f32; 3],
    /// Letterbox padding colour (RGB)
    pub padding_color: [u8; 3],
}

impl Default for PreprocessingConfig {
    /// u2net defaults (ImageNet statistics, 320x320)
    fn default() -> Self {
        Self {
            target_size: 320,
            normalization_mean: [0.485, 0.456, 0.406],
            normalization_std: [0.229, 0.224, 0.225],
            padding_color: [255, 255, 255],
        }
    }
}

/// Model information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    pub name: String,
    pub size_bytes: usize,
    pub input_shape: (usize, usize, usize, usize), // NCHW format
    pub output_shape: (usize, usize, usize, usize),
}

/// Locates, validates and loads the segmentation model
#[derive(Debug, Clone)]
pub struct ModelManager {
    model_path: PathBuf,
    preprocessing: PreprocessingConfig,
}

impl ModelManager {
    /// Create a manager for the model described by the segmentation config
    #[must_use]
    pub fn from_config(config: &SegmentationConfig) -> Self {
        Self {
            model_path: config.model_path.clone(),
            preprocessing: config.preprocessing.clone(),
        }
    }

    /// Create a manager for an explicit model path
    #[must_use]
    pub fn new<P: Into<PathBuf>>(model_path: P, preprocessing: PreprocessingConfig) -> Self {
        Self {
            model_path: model_path.into(),
            preprocessing,
        }
    }

    /// Path of the ONNX file
    #[must_use]
    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    /// Load model data as bytes
    ///
    /// # Errors
    /// - Model file not found or inaccessible
    /// - Model file is empty
    pub fn load_model(&self) -> Result<Vec<u8>> {
        if !self.model_path.is_file() {
            return Err(PhotoError::model(format!(
                "Model file not found at '{}'. Download it or point --model at an ONNX segmentation model",
                self.model_path.display()
            )));
        }

        let data = std::fs::read(&self.model_path)
            .map_err(|e| PhotoError::file_io_error("read model file", &self.model_path, &e))?;

        if data.is_empty() {
            return Err(PhotoError::model(format!(
                "Model file '{}' is empty",
                self.model_path.display()
            )));
        }

        log::debug!(
            "Loaded model {} ({} bytes)",
            self.model_path.display(),
            data.len()
        );
        Ok(data)
    }

    /// Get model information
    ///
    /// # Errors
    /// - Model file metadata cannot be read
    pub fn get_info(&self) -> Result<ModelInfo> {
        let metadata = std::fs::metadata(&self.model_path)
            .map_err(|e| PhotoError::file_io_error("inspect model file", &self.model_path, &e))?;

        let side = self.preprocessing.target_size as usize;
        Ok(ModelInfo {
            name: self
                .model_path
                .file_stem()
                .map_or_else(|| "model".to_string(), |s| s.to_string_lossy().into_owned()),
            size_bytes: metadata.len() as usize,
            input_shape: (1, 3, side, side),
            output_shape: (1, 1, side, side),
        })
    }

    /// Get preprocessing configuration
    #[must_use]
    pub fn preprocessing_config(&self) -> &PreprocessingConfig {
        &self.preprocessing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_preprocessing_is_u2net() {
        let config = PreprocessingConfig::default();
        assert_eq!(config.target_size, 320);
        assert_eq!(config.normalization_mean, [0.485, 0.456, 0.406]);
        assert_eq!(config.normalization_std, [0.229, 0.224, 0.225]);
    }

    #[test]
    fn test_missing_model_is_model_error() {
        let manager = ModelManager::new("/definitely/not/here.onnx", PreprocessingConfig::default());
        let err = manager.load_model().unwrap_err();
        assert!(matches!(err, PhotoError::Model(_)));
        assert!(err.to_string().contains("/definitely/not/here.onnx"));
    }

    #[test]
    fn test_empty_model_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.onnx");
        std::fs::write(&path, b"").unwrap();

        let manager = ModelManager::new(&path, PreprocessingConfig::default());
        assert!(manager.load_model().is_err());
    }

    #[test]
    fn test_model_info_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("u2netp.onnx");
        std::fs::write(&path, vec![0u8; 2048]).unwrap();

        let manager = ModelManager::new(
            &path,
            PreprocessingConfig {
                target_size: 512,
                ..PreprocessingConfig::default()
            },
        );
        let info = manager.get_info().unwrap();
        assert_eq!(info.name, "u2netp");
        assert_eq!(info.size_bytes, 2048);
        assert_eq!(info.input_shape, (1, 3, 512, 512));
        assert_eq!(info.output_shape, (1, 1, 512, 512));
        assert_eq!(manager.load_model().unwrap().len(), 2048);
    }
}
