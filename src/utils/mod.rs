//! Utility modules shared by the transforms

pub mod preprocessing;

pub use preprocessing::{ImagePreprocessor, Letterbox};
