//! API error handling module
//!
//! Provides a unified error type for all API endpoints with structured error variants.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use imageauth_core::{ErrorKind, ImageAuthError};
use thiserror::Error;

/// API error type with structured variants for different error categories
#[derive(Debug, Error)]
pub enum ApiError {
    /// Bad request - client provided invalid input
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Error raised by the detection and registration core
    #[error("Core error: {0}")]
    Core(#[from] ImageAuthError),
}

impl ApiError {
    /// Create a bad request error
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Core(e) => match e.kind() {
                ErrorKind::Input => StatusCode::BAD_REQUEST,
                ErrorKind::Duplicate => StatusCode::CONFLICT,
                // Upstream ledger failure → 502
                ErrorKind::Ledger => StatusCode::BAD_GATEWAY,
                ErrorKind::Storage => StatusCode::SERVICE_UNAVAILABLE,
                ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Get the error code for programmatic error handling
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "INVALID_INPUT",
            Self::Core(e) => match e.kind() {
                ErrorKind::Input => "INVALID_INPUT",
                ErrorKind::Duplicate => "DUPLICATE",
                ErrorKind::Ledger => "LEDGER_UNAVAILABLE",
                ErrorKind::Storage => "CORPUS_UNAVAILABLE",
                ErrorKind::Internal => "INTERNAL_ERROR",
            },
        }
    }

    /// Get sanitized error message for client response
    fn client_message(&self) -> String {
        match self {
            Self::Core(e) => match e {
                // Input problems are the client's own data; safe to echo
                ImageAuthError::InvalidInput(msg) => msg.clone(),
                ImageAuthError::Duplicate { .. } => "Image already registered".to_string(),
                _ => match e.kind() {
                    ErrorKind::Ledger => "Ledger service unavailable".to_string(),
                    ErrorKind::Storage => "Image corpus unavailable".to_string(),
                    _ => "Internal processing error".to_string(),
                },
            },
            Self::BadRequest(_) => self.to_string(),
        }
    }

    /// Get the error category for logging
    fn error_category(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::Core(_) => "core",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let category = self.error_category();
        let code = self.error_code();
        let internal_message = self.to_string();
        let client_message = self.client_message();

        // Log based on severity, always including internal details
        if status.is_server_error() {
            tracing::error!(
                status = %status,
                category = category,
                code = code,
                error = %internal_message,
                client_message = %client_message,
                "Server error"
            );
        } else {
            tracing::warn!(
                status = %status,
                category = category,
                code = code,
                error = %internal_message,
                "Client error"
            );
        }

        // All error responses include a `code` field for programmatic error handling
        let body = serde_json::json!({
            "error": client_message,
            "code": code,
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imageauth_core::ContentHash;

    #[test]
    fn test_core_errors_map_to_status() {
        let cases = [
            (
                ImageAuthError::InvalidInput("empty".into()),
                StatusCode::BAD_REQUEST,
                "INVALID_INPUT",
            ),
            (
                ImageAuthError::Duplicate {
                    content_hash: ContentHash::from_bytes(b"x"),
                },
                StatusCode::CONFLICT,
                "DUPLICATE",
            ),
            (
                ImageAuthError::Ledger("down".into()),
                StatusCode::BAD_GATEWAY,
                "LEDGER_UNAVAILABLE",
            ),
            (
                ImageAuthError::Corpus("locked".into()),
                StatusCode::SERVICE_UNAVAILABLE,
                "CORPUS_UNAVAILABLE",
            ),
            (
                ImageAuthError::Classifier("boom".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
            ),
        ];

        for (core, status, code) in cases {
            let err = ApiError::from(core);
            assert_eq!(err.status_code(), status);
            assert_eq!(err.error_code(), code);
        }
    }

    #[test]
    fn test_upstream_details_are_not_leaked() {
        let err = ApiError::from(ImageAuthError::Ledger(
            "connection refused at 10.0.0.3:8545".into(),
        ));
        assert_eq!(err.client_message(), "Ledger service unavailable");

        let err = ApiError::from(ImageAuthError::Classifier(
            "onnxruntime: session poisoned".into(),
        ));
        assert_eq!(err.client_message(), "Internal processing error");

        let err = ApiError::bad_request("No image provided");
        assert_eq!(err.client_message(), "Bad request: No image provided");
    }
}
