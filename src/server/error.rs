//! HTTP mapping for [`PhotoError`]

use crate::error::PhotoError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

impl PhotoError {
    /// HTTP status for this error
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingUpload(_) | Self::InvalidFilename(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Plain text body that is safe to show to the client
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::MissingUpload(message) | Self::Enhance(message) => message.clone(),
            Self::InvalidFilename(_) | Self::PayloadTooLarge { .. } => self.to_string(),
            _ => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for PhotoError {
    fn into_response(self) -> Response {
        if self.is_client_error() {
            tracing::debug!("Client error: {}", self);
        } else {
            tracing::error!("Request failed: {:#}", self);
        }

        (self.status_code(), self.user_message()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            PhotoError::missing_upload("x").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            PhotoError::InvalidFilename("..".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            PhotoError::PayloadTooLarge { limit: 1 }.status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            PhotoError::Enhance("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_internal_details_are_hidden() {
        let err = PhotoError::model("/secret/path/u2net.onnx missing");
        assert_eq!(err.user_message(), "Internal server error");

        let err = PhotoError::Enhance("Gagal meningkatkan kualitas gambar: boom".into());
        assert_eq!(err.user_message(), "Gagal meningkatkan kualitas gambar: boom");
    }
}
