//! Error types for image transformation requests

use thiserror::Error;

/// Result type alias for fotokit operations
pub type Result<T> = std::result::Result<T, PhotoError>;

/// Error taxonomy shared by the storage adapter, the transforms and the HTTP surface
#[derive(Error, Debug)]
pub enum PhotoError {
    /// No `file` part in the upload, or the part carried an empty filename
    #[error("{0}")]
    MissingUpload(String),

    /// Filename sanitisation produced an empty name
    #[error("Invalid filename: {0:?}")]
    InvalidFilename(String),

    /// Request body exceeded the configured upload limit
    #[error("Upload exceeds the maximum allowed size of {limit} bytes")]
    PayloadTooLarge { limit: usize },

    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image bytes could not be decoded or encoded
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// The enhancement pipeline failed outside its internal fallback
    #[error("{0}")]
    Enhance(String),

    /// A decoded image the transforms cannot work on, such as one with no pixels
    #[error("Capability error: {0}")]
    Capability(String),

    /// Backend inference errors
    #[error("Inference error: {0}")]
    Inference(String),

    /// Model loading or initialization errors
    #[error("Model error: {0}")]
    Model(String),

    /// Model download errors
    #[error("Network error: {0}")]
    Network(String),

    /// Container format the encoder cannot produce
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PhotoError {
    /// Create a new missing upload error
    pub fn missing_upload<S: Into<String>>(msg: S) -> Self {
        Self::MissingUpload(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new unsupported format error
    pub fn unsupported_format<S: Into<String>>(format: S) -> Self {
        Self::UnsupportedFormat(format.into())
    }

    /// Create a new model error
    pub fn model<S: Into<String>>(msg: S) -> Self {
        Self::Model(msg.into())
    }

    /// Create a new capability error for an image the transforms cannot use
    pub fn capability<S: Into<String>>(msg: S) -> Self {
        Self::Capability(msg.into())
    }

    /// Create a new inference error
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {operation} '{path_display}': {error}"),
        ))
    }

    /// Create network error with context
    pub fn network_error<S: Into<String>, E: std::fmt::Display>(context: S, error: E) -> Self {
        Self::Network(format!("{}: {error}", context.into()))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
    ) -> Self {
        Self::InvalidConfig(format!(
            "Invalid {parameter}: {value} (valid range: {valid_range})"
        ))
    }

    /// Whether this error is the caller's fault rather than the service's
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::MissingUpload(_) | Self::InvalidFilename(_) | Self::PayloadTooLarge { .. }
        )
    }
}
