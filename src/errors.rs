use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::mode::ProcessingMode;

/// Unique error codes for client identification
#[derive(Debug, Clone, Copy)]
pub enum ErrorCode {
    // Validation errors (2xxx)
    ValidationFailed = 2001,
    MissingField = 2002,
    UnsafeFilename = 2003,
    UnsupportedType = 2004,
    ModeMismatch = 2005,

    // Retrieval errors (4xxx)
    EmptyKnowledgeBase = 4001,
    NoChunksFound = 4002,
    ExtractionFailed = 4003,
    NotFound = 4004,

    // Persistence errors (7xxx)
    PersistenceFailure = 7001,

    // External service errors (8xxx)
    UpstreamFailure = 8001,

    // Internal errors (9xxx)
    InternalError = 9001,
    ConfigurationError = 9002,
}

impl ErrorCode {
    pub fn as_u16(&self) -> u16 {
        *self as u16
    }
}

/// Application error taxonomy.
///
/// Validation failures are reported immediately at the boundary as 400s;
/// storage and upstream failures map to 500s whose response bodies carry a
/// generic message only, with the full error chain logged server-side.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid or unsafe file name: {0}")]
    UnsafeFilename(String),

    #[error("Unsupported file type: only .pdf uploads are accepted")]
    UnsupportedType,

    #[error(
        "This document was processed with {stored} processing. \
         Use the {stored} answering method for it"
    )]
    ModeMismatch {
        stored: ProcessingMode,
        requested: ProcessingMode,
    },

    #[error(
        "The knowledge base is empty for the {0} processing mode. \
         Please upload and process a document first"
    )]
    EmptyKnowledgeBase(ProcessingMode),

    #[error("No chunks found for the selected document")]
    NoChunksFound,

    #[error("Could not extract text from PDF: {0}")]
    ExtractionFailed(String),

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Persistence failure: {0}")]
    Persistence(String),

    #[error("Upstream service error: {0}")]
    Upstream(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Get the error code for this error type
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Validation(_) => ErrorCode::ValidationFailed,
            Self::MissingField(_) => ErrorCode::MissingField,
            Self::UnsafeFilename(_) => ErrorCode::UnsafeFilename,
            Self::UnsupportedType => ErrorCode::UnsupportedType,
            Self::ModeMismatch { .. } => ErrorCode::ModeMismatch,
            Self::EmptyKnowledgeBase(_) => ErrorCode::EmptyKnowledgeBase,
            Self::NoChunksFound => ErrorCode::NoChunksFound,
            Self::ExtractionFailed(_) => ErrorCode::ExtractionFailed,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::Persistence(_) => ErrorCode::PersistenceFailure,
            Self::Upstream(_) => ErrorCode::UpstreamFailure,
            Self::Config(_) => ErrorCode::ConfigurationError,
            Self::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_)
            | Self::MissingField(_)
            | Self::UnsafeFilename(_)
            | Self::UnsupportedType
            | Self::ModeMismatch { .. }
            | Self::EmptyKnowledgeBase(_)
            | Self::NoChunksFound
            | Self::ExtractionFailed(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Persistence(_) | Self::Upstream(_) | Self::Config(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message exposed in the response body.
    ///
    /// Server errors get a generic message; the raw error text stays in the
    /// server log only.
    fn client_message(&self) -> String {
        match self {
            Self::Persistence(_) => "Internal storage error".to_string(),
            Self::Upstream(_) => "Upstream service error".to_string(),
            Self::Config(_) | Self::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();
        let message = self.to_string();

        // Log based on severity
        if status.is_server_error() {
            tracing::error!(
                error_code = error_code.as_u16(),
                %message,
                error = ?self,
                "Server error"
            );
        } else {
            tracing::debug!(error_code = error_code.as_u16(), %message, "Client error");
        }

        let body = Json(json!({
            "error": {
                "code": error_code.as_u16(),
                "status": status.as_u16(),
                "message": self.client_message(),
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_are_bad_requests() {
        let err = AppError::Validation("question required".into());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.error_code().as_u16(), 2001);
    }

    #[test]
    fn mode_mismatch_is_bad_request() {
        let err = AppError::ModeMismatch {
            stored: ProcessingMode::Advanced,
            requested: ProcessingMode::Simple,
        };
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(err.to_string().contains("advanced"));
    }

    #[test]
    fn server_errors_hide_details_from_clients() {
        let err = AppError::Persistence("write failed: /data/vector_index.bin".into());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.client_message().contains("vector_index"));
    }

    #[test]
    fn not_found_maps_to_404() {
        let err = AppError::NotFound("doc-1".into());
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }
}
