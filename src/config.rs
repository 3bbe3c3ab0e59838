//! Configuration types for the image service
//!
//! Every externally meaningful tunable of the service lives here so the
//! orchestrator receives it explicitly at construction instead of reading
//! process-wide state.

use crate::error::{PhotoError, Result};
use crate::models::PreprocessingConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// 16 MiB, the request body ceiling
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

/// Default model location, the u2net export used by rembg
pub const DEFAULT_MODEL_PATH: &str = "models/u2net.onnx";

/// Release asset the default model is fetched from when missing
pub const DEFAULT_MODEL_URL: &str =
    "https://github.com/danielgatis/rembg/releases/download/v0.0.0/u2net.onnx";

/// Execution provider options for ONNX Runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    #[default]
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Silicon acceleration
    CoreMl,
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

/// Inference engine used for background segmentation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// Tract backend (pure Rust, no external dependencies)
    #[default]
    Tract,
    /// ONNX Runtime backend (supports GPU acceleration)
    Onnx,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tract => write!(f, "tract"),
            Self::Onnx => write!(f, "onnx"),
        }
    }
}

/// Contrast-limited adaptive histogram equalization parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaheConfig {
    /// Histogram clip limit, relative to a uniform distribution
    pub clip_limit: f32,
    /// Tile grid as (columns, rows)
    pub tile_grid: (u32, u32),
}

impl Default for ClaheConfig {
    fn default() -> Self {
        Self {
            clip_limit: 2.0,
            tile_grid: (8, 8),
        }
    }
}

/// Edge-preserving smoothing parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BilateralConfig {
    /// Neighbourhood diameter in pixels
    pub diameter: u32,
    /// Filter sigma in colour space
    pub sigma_color: f32,
    /// Filter sigma in coordinate space
    pub sigma_space: f32,
}

impl Default for BilateralConfig {
    fn default() -> Self {
        Self {
            diameter: 9,
            sigma_color: 75.0,
            sigma_space: 75.0,
        }
    }
}

/// Enhancement pipeline configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EnhancementConfig {
    pub clahe: ClaheConfig,
    pub bilateral: BilateralConfig,
}

/// Lossy re-encoding configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// Encoder quality (1-100), used by quality-aware containers
    pub quality: u8,
    /// Spend extra encoder effort on a smaller output
    pub optimize: bool,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            quality: 80,
            optimize: true,
        }
    }
}

/// Segmentation model configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Inference engine
    pub backend: BackendType,
    /// Execution provider (ONNX Runtime only)
    pub execution_provider: ExecutionProvider,
    /// Path of the ONNX model file
    pub model_path: PathBuf,
    /// Where to fetch the model from when `model_path` does not exist
    pub model_url: Option<String>,
    /// Expected SHA256 of the model file, hex encoded
    pub model_sha256: Option<String>,
    /// Model input preprocessing
    pub preprocessing: PreprocessingConfig,
    /// Stretch the raw prediction to the full 0..1 range before use
    pub normalize_output: bool,
    /// Number of intra-op threads for inference (0 = auto)
    pub intra_threads: usize,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            backend: BackendType::default(),
            execution_provider: ExecutionProvider::default(),
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            model_url: Some(DEFAULT_MODEL_URL.to_string()),
            model_sha256: None,
            preprocessing: PreprocessingConfig::default(),
            normalize_output: true,
            intra_threads: 0,
        }
    }
}

/// Configuration for the whole service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Address the HTTP server binds to
    pub bind_address: SocketAddr,
    /// Transient directory for uploads and results
    pub upload_dir: PathBuf,
    /// Request body ceiling in bytes
    pub max_upload_bytes: usize,
    /// Prefix stored names with a random token so equal names cannot collide
    pub unique_names: bool,
    pub compression: CompressionConfig,
    pub enhancement: EnhancementConfig,
    pub segmentation: SegmentationConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 5000)),
            upload_dir: PathBuf::from("uploads"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            unique_names: false,
            compression: CompressionConfig::default(),
            enhancement: EnhancementConfig::default(),
            segmentation: SegmentationConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Create a new configuration builder
    #[must_use]
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder::new()
    }

    /// Load a configuration from a JSON file; missing keys take their defaults
    ///
    /// # Errors
    /// - File cannot be read
    /// - File is not valid JSON for this schema
    /// - Resulting configuration fails validation
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| PhotoError::file_io_error("read config file", path, &e))?;
        let config: Self = serde_json::from_str(&content).map_err(|e| {
            PhotoError::invalid_config(format!("{}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    ///
    /// # Errors
    /// - Quality outside 1-100
    /// - Non-positive filter parameters
    /// - Empty tile grid or zero-sized model input
    pub fn validate(&self) -> Result<()> {
        if self.max_upload_bytes == 0 {
            return Err(PhotoError::config_value_error(
                "max_upload_bytes",
                self.max_upload_bytes,
                "> 0",
            ));
        }
        if !(1..=100).contains(&self.compression.quality) {
            return Err(PhotoError::config_value_error(
                "compression quality",
                self.compression.quality,
                "1-100",
            ));
        }

        let clahe = &self.enhancement.clahe;
        if !(clahe.clip_limit > 0.0) {
            return Err(PhotoError::config_value_error(
                "CLAHE clip limit",
                clahe.clip_limit,
                "> 0",
            ));
        }
        if clahe.tile_grid.0 == 0 || clahe.tile_grid.1 == 0 {
            return Err(PhotoError::config_value_error(
                "CLAHE tile grid",
                format!("{}x{}", clahe.tile_grid.0, clahe.tile_grid.1),
                ">= 1x1",
            ));
        }

        let bilateral = &self.enhancement.bilateral;
        if bilateral.diameter == 0 {
            return Err(PhotoError::config_value_error(
                "bilateral diameter",
                bilateral.diameter,
                ">= 1",
            ));
        }
        if !(bilateral.sigma_color > 0.0) || !(bilateral.sigma_space > 0.0) {
            return Err(PhotoError::invalid_config(
                "bilateral sigmas must be positive",
            ));
        }

        if self.segmentation.preprocessing.target_size == 0 {
            return Err(PhotoError::config_value_error(
                "model input size",
                self.segmentation.preprocessing.target_size,
                ">= 1",
            ));
        }
        if self.segmentation.preprocessing.normalization_std.iter().any(|s| *s <= 0.0) {
            return Err(PhotoError::invalid_config(
                "normalization std values must be positive",
            ));
        }

        Ok(())
    }
}

/// Builder for `ServiceConfig`
#[derive(Debug, Default)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: ServiceConfig::default(),
        }
    }

    #[must_use]
    pub fn bind_address(mut self, address: SocketAddr) -> Self {
        self.config.bind_address = address;
        self
    }

    #[must_use]
    pub fn upload_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.upload_dir = dir.into();
        self
    }

    #[must_use]
    pub fn max_upload_bytes(mut self, bytes: usize) -> Self {
        self.config.max_upload_bytes = bytes;
        self
    }

    #[must_use]
    pub fn unique_names(mut self, unique: bool) -> Self {
        self.config.unique_names = unique;
        self
    }

    #[must_use]
    pub fn compression_quality(mut self, quality: u8) -> Self {
        self.config.compression.quality = quality.clamp(1, 100);
        self
    }

    #[must_use]
    pub fn clahe(mut self, clip_limit: f32, tile_grid: (u32, u32)) -> Self {
        self.config.enhancement.clahe = ClaheConfig {
            clip_limit,
            tile_grid,
        };
        self
    }

    #[must_use]
    pub fn bilateral(mut self, diameter: u32, sigma_color: f32, sigma_space: f32) -> Self {
        self.config.enhancement.bilateral = BilateralConfig {
            diameter,
            sigma_color,
            sigma_space,
        };
        self
    }

    #[must_use]
    pub fn backend(mut self, backend: BackendType) -> Self {
        self.config.segmentation.backend = backend;
        self
    }

    #[must_use]
    pub fn execution_provider(mut self, provider: ExecutionProvider) -> Self {
        self.config.segmentation.execution_provider = provider;
        self
    }

    #[must_use]
    pub fn model_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.segmentation.model_path = path.into();
        self
    }

    #[must_use]
    pub fn model_url(mut self, url: Option<String>) -> Self {
        self.config.segmentation.model_url = url;
        self
    }

    #[must_use]
    pub fn model_sha256(mut self, sha256: Option<String>) -> Self {
        self.config.segmentation.model_sha256 = sha256;
        self
    }

    #[must_use]
    pub fn model_input_size(mut self, size: u32) -> Self {
        self.config.segmentation.preprocessing.target_size = size;
        self
    }

    #[must_use]
    pub fn intra_threads(mut self, threads: usize) -> Self {
        self.config.segmentation.intra_threads = threads;
        self
    }

    /// Build the service configuration
    ///
    /// # Errors
    /// - Any check in [`ServiceConfig::validate`] fails
    pub fn build(self) -> Result<ServiceConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
