//! Backend implementations for different inference engines
//!
//! - Tract backend (pure Rust, default)
//! - ONNX Runtime backend (GPU acceleration, `onnx` feature)
//! - Mock backend (deterministic mask, no model file)

pub mod mock;

#[cfg(feature = "onnx")]
pub mod onnx;

#[cfg(feature = "tract")]
pub mod tract;

pub use self::mock::{MockBackend, MockBackendFactory};

#[cfg(feature = "onnx")]
pub use self::onnx::OnnxBackend;

#[cfg(feature = "tract")]
pub use self::tract::TractBackend;
