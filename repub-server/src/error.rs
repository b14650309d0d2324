//! # Error Handling and Response Types
//!
//! This module provides the error taxonomy of the registry server and its
//! mapping onto the hosted-repository wire format. Every failure of the publish
//! workflow, the read path and the HTTP layer ends up as an [`AppError`].
//!
//! ## Key Types
//!
//! - [`AppError`]: Main error enum covering all possible application errors
//! - [`ApiErrorResponse`]: The `{"error": {"code", "message"}}` response body
//! - [`ErrorCode`]: Machine-readable error classification and HTTP status
//! - [`AppResult<T>`]: Convenience type alias for Results using `AppError`
//!
//! ## Error Response Format
//!
//! All API errors are returned with content type `application/vnd.pub.v2+json`:
//!
//! ```json
//! {
//!   "error": {
//!     "code": "VersionAlreadyExists",
//!     "message": "Version 1.0.0 of package pkgA already exists"
//!   }
//! }
//! ```
//!
//! ## Error Classifications
//!
//! - **Bad input** (400): archive, manifest, multipart and finalize-token failures
//! - **Too large** (413): upload body over the configured limit
//! - **Authentication** (401): missing or unknown bearer token
//! - **Authorization** (403): read-only token on a write route, unauthorized uploader
//! - **Not Found** (404): missing packages, versions or archives
//! - **Internal** (500): blob storage, persistence and data-integrity failures

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::storage::BlobError;
use crate::store::StoreError;

/// Content type of every JSON response on the package API
pub const PUB_CONTENT_TYPE: &str = "application/vnd.pub.v2+json";

/// Standardized error response structure, as expected by pub clients
#[derive(Serialize, Debug)]
pub struct ApiErrorResponse {
    pub error: ApiErrorBody,
}

#[derive(Serialize, Debug)]
pub struct ApiErrorBody {
    pub code: String,    // Machine-readable error code
    pub message: String, // Human-readable error message
}

/// Error code classification for machine-readable error types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ArchiveFormat,
    ManifestNotFound,
    ManifestParse,
    ManifestValidation,
    UnauthorizedUploader,
    VersionAlreadyExists,
    UploadNotFound,
    MalformedRequest,
    PayloadTooLarge,
    MissingCredentials,
    InsufficientScope,
    NotFound,
    StorageError,
    PersistenceError,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ArchiveFormat => "ArchiveFormatError",
            ErrorCode::ManifestNotFound => "ManifestNotFound",
            ErrorCode::ManifestParse => "ManifestParseError",
            ErrorCode::ManifestValidation => "ManifestValidationError",
            ErrorCode::UnauthorizedUploader => "UnauthorizedUploader",
            ErrorCode::VersionAlreadyExists => "VersionAlreadyExists",
            ErrorCode::UploadNotFound => "UPLOAD_NOT_FOUND",
            ErrorCode::MalformedRequest => "MalformedRequest",
            ErrorCode::PayloadTooLarge => "PayloadTooLarge",
            ErrorCode::MissingCredentials => "MissingAuthentication",
            ErrorCode::InsufficientScope => "InsufficientScope",
            ErrorCode::NotFound => "NotFound",
            ErrorCode::StorageError => "StorageError",
            ErrorCode::PersistenceError => "PersistenceError",
            ErrorCode::InternalError => "InternalError",
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            ErrorCode::ArchiveFormat
            | ErrorCode::ManifestNotFound
            | ErrorCode::ManifestParse
            | ErrorCode::ManifestValidation
            | ErrorCode::VersionAlreadyExists
            | ErrorCode::UploadNotFound
            | ErrorCode::MalformedRequest => StatusCode::BAD_REQUEST,
            ErrorCode::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorCode::MissingCredentials => StatusCode::UNAUTHORIZED,
            ErrorCode::UnauthorizedUploader | ErrorCode::InsufficientScope => {
                StatusCode::FORBIDDEN
            }
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::StorageError | ErrorCode::PersistenceError | ErrorCode::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Application-specific error types with error codes
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid package archive: {0}")]
    ArchiveFormat(String),

    #[error("pubspec.yaml not found in archive root")]
    ManifestNotFound,

    #[error("Failed to parse pubspec.yaml: {0}")]
    ManifestParse(String),

    #[error("pubspec validation failed: {0}")]
    ManifestValidation(String),

    #[error("{uploader} is unauthorized to upload to package {package}")]
    UnauthorizedUploader { package: String, uploader: String },

    #[error("Version {version} of package {package} already exists")]
    VersionAlreadyExists { package: String, version: String },

    #[error("Upload not found or already processed")]
    UploadNotFound,

    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Multipart form parsing error: {0}")]
    Multipart(#[from] axum::extract::multipart::MultipartError),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Package {0} has no versions")]
    NoVersions(String),

    #[error("Storage error: {0}")]
    Storage(#[from] BlobError),

    #[error("Persistence error: {0}")]
    Persistence(StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateVersion { package, version } => {
                AppError::VersionAlreadyExists { package, version }
            }
            other => AppError::Persistence(other),
        }
    }
}

impl AppError {
    /// Get the appropriate error code for this error type
    pub fn error_code(&self) -> ErrorCode {
        match self {
            AppError::ArchiveFormat(_) => ErrorCode::ArchiveFormat,
            AppError::ManifestNotFound => ErrorCode::ManifestNotFound,
            AppError::ManifestParse(_) => ErrorCode::ManifestParse,
            AppError::ManifestValidation(_) => ErrorCode::ManifestValidation,
            AppError::UnauthorizedUploader { .. } => ErrorCode::UnauthorizedUploader,
            AppError::VersionAlreadyExists { .. } => ErrorCode::VersionAlreadyExists,
            AppError::UploadNotFound => ErrorCode::UploadNotFound,
            AppError::Multipart(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                ErrorCode::PayloadTooLarge
            }
            AppError::MalformedRequest(_) | AppError::Multipart(_) => ErrorCode::MalformedRequest,
            AppError::Unauthorized(_) => ErrorCode::MissingCredentials,
            AppError::Forbidden(_) => ErrorCode::InsufficientScope,
            AppError::NotFound(_) => ErrorCode::NotFound,
            AppError::Storage(BlobError::NotFound(_)) => ErrorCode::NotFound,
            AppError::Storage(_) => ErrorCode::StorageError,
            AppError::Persistence(_) => ErrorCode::PersistenceError,
            AppError::NoVersions(_)
            | AppError::Io(_)
            | AppError::Json(_)
            | AppError::InternalError(_) => ErrorCode::InternalError,
        }
    }

    /// Create a standardized error response
    pub fn to_error_response(&self) -> ApiErrorResponse {
        ApiErrorResponse {
            error: ApiErrorBody {
                code: self.error_code().as_str().to_string(),
                message: self.to_string(),
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.error_code();
        let status = code.http_status();

        if status.is_server_error() {
            tracing::error!(error = %self, code = code.as_str(), "Request failed");
        } else {
            tracing::warn!(error = %self, code = code.as_str(), "Request rejected");
        }

        let body = match serde_json::to_vec(&self.to_error_response()) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode error response");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        };

        tracing::debug!(status = %status, "Returning standardized error response");

        (status, [(header::CONTENT_TYPE, PUB_CONTENT_TYPE)], body).into_response()
    }
}

/// Convenient result type for application operations.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_version_message_is_stable() {
        let err = AppError::VersionAlreadyExists {
            package: "pkgA".to_string(),
            version: "1.0.0".to_string(),
        };
        assert!(err.to_string().contains("already exists"));
        assert_eq!(err.error_code().http_status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_unauthorized_uploader_message_is_stable() {
        let err = AppError::UnauthorizedUploader {
            package: "pkgA".to_string(),
            uploader: "bob".to_string(),
        };
        assert!(err.to_string().contains("unauthorized"));
        assert_eq!(err.error_code().http_status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_store_duplicate_maps_to_version_already_exists() {
        let err: AppError = StoreError::DuplicateVersion {
            package: "pkgA".to_string(),
            version: "1.0.0".to_string(),
        }
        .into();
        assert!(matches!(err, AppError::VersionAlreadyExists { .. }));

        let err: AppError = StoreError::Backend("disk full".to_string()).into();
        assert_eq!(err.error_code(), ErrorCode::PersistenceError);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AppError::UploadNotFound.error_code().http_status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::NotFound("x".into()).error_code().http_status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Unauthorized("x".into()).error_code().http_status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::NoVersions("pkgA".into()).error_code().http_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::Storage(BlobError::Io("boom".into()))
                .error_code()
                .http_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::Storage(BlobError::NotFound("k".into()))
                .error_code()
                .http_status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_error_response_shape() {
        let response = AppError::UploadNotFound.to_error_response();
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["error"]["code"], "UPLOAD_NOT_FOUND");
        assert_eq!(
            value["error"]["message"],
            "Upload not found or already processed"
        );
    }
}
