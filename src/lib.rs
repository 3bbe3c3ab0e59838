#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # fotokit
//!
//! An image web service with three transforms, each taking one uploaded
//! image and returning one transformed image:
//!
//! - **Background removal**: a U²-Net style segmentation model predicts a
//!   foreground mask which becomes the alpha channel of a PNG.
//! - **Enhancement**: CLAHE on the lightness channel of Lab space followed
//!   by an edge-preserving bilateral filter. Filter failures fall back to
//!   the unmodified image.
//! - **Compression**: re-encoding in the input's own container at a fixed
//!   quality.
//!
//! Uploads and results are written to a transient directory under
//! sanitised names. The HTTP surface is an axum router; a command-line
//! binary is available with the `cli` feature.
//!
//! ## Library usage
//!
//! ```rust,no_run
//! use fotokit::{Operation, PhotoProcessor, ServiceConfig, UploadedAsset};
//!
//! # fn example() -> fotokit::Result<()> {
//! let config = ServiceConfig::builder()
//!     .upload_dir("uploads")
//!     .compression_quality(80)
//!     .build()?;
//! let processor = PhotoProcessor::new(config);
//!
//! let bytes = std::fs::read("photo.jpg")?;
//! let asset = UploadedAsset::new(bytes, Some("photo.jpg".to_string()));
//! let result = processor.process(Operation::Compress, &asset)?;
//! println!("{}", result.stored.path.display());
//! # Ok(())
//! # }
//! ```
//!
//! ## Serving
//!
//! ```rust,no_run
//! use fotokit::{PhotoProcessor, ServiceConfig};
//! use std::sync::Arc;
//!
//! # async fn example() -> fotokit::Result<()> {
//! let processor = Arc::new(PhotoProcessor::new(ServiceConfig::default()));
//! fotokit::server::serve(processor, async {
//!     let _ = tokio::signal::ctrl_c().await;
//! })
//! .await
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `tract` (default): pure Rust inference backend
//! - `onnx`: ONNX Runtime backend with CUDA and `CoreML` execution providers
//! - `cli` (default): the `fotokit` binary and its tracing subscriber
//! - `tracing-json`: JSON log output for the binary

pub mod backends;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod inference;
pub mod models;
pub mod processor;
pub mod server;
pub mod services;
pub mod storage;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod transforms;
pub mod utils;

// Public API exports
pub use config::{
    BackendType, BilateralConfig, ClaheConfig, CompressionConfig, EnhancementConfig,
    ExecutionProvider, SegmentationConfig, ServiceConfig, ServiceConfigBuilder,
};
pub use download::{validate_model_url, verify_file_integrity, ModelDownloader};
pub use error::{PhotoError, Result};
pub use inference::{BackendFactory, DefaultBackendFactory, InferenceBackend};
pub use models::{ModelInfo, ModelManager, PreprocessingConfig};
pub use processor::{PhotoProcessor, TransformResult, UploadedAsset};
pub use server::{router, AppState};
pub use services::{EncodeOptions, ImageIOService, OutputFormatHandler};
pub use storage::{sanitize_filename, StoredFile, UploadStore};
pub use transforms::{BackgroundRemover, Compressor, EnhanceError, Enhancer, Operation};
pub use utils::{ImagePreprocessor, Letterbox};

#[cfg(feature = "cli")]
pub use tracing_config::{TracingConfig, TracingFormat};
