//! Universal error handling for the API

use aide::OperationOutput;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use profile_storage::profile::ProfileStorageError;
use schemars::JsonSchema;
use serde::Serialize;

use crate::media_storage::BucketError;
use crate::photo_session::PhotoSessionError;

/// API error response envelope
#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorResponse {
    /// Whether the client should retry the request
    pub allow_retry: bool,
    /// Error details
    error: ErrorBody,
}

/// Error body containing code and message
#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    /// Machine-readable error code
    pub code: &'static str,
    /// Human-readable error message
    pub message: &'static str,
}

/// Application error type that wraps the API error response
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    inner: ApiErrorResponse,
}

impl AppError {
    /// Create a new application error
    #[must_use]
    pub const fn new(
        status: StatusCode,
        code: &'static str,
        msg: &'static str,
        retry: bool,
    ) -> Self {
        Self {
            status,
            inner: ApiErrorResponse {
                allow_retry: retry,
                error: ErrorBody { code, message: msg },
            },
        }
    }

    /// HTTP status of the error
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable error code
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.inner.error.code
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self.status.as_u16() {
            400..=499 => tracing::warn!(
                "Client error: {} - {}",
                self.inner.error.code,
                self.inner.error.message
            ),
            500..=599 => tracing::error!(
                "Server error: {} - {}",
                self.inner.error.code,
                self.inner.error.message
            ),
            _ => {}
        }

        (self.status, Json(self.inner)).into_response()
    }
}

/// Convert bucket errors to application errors
impl From<BucketError> for AppError {
    fn from(err: BucketError) -> Self {
        use BucketError::{AwsError, ConfigError, InvalidInput, S3Error, UpstreamError};

        match &err {
            UpstreamError(msg) => {
                tracing::error!("S3 upstream error: {msg}");
                Self::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "upstream_error",
                    "Photo storage temporarily unavailable",
                    true,
                )
            }
            S3Error(msg) | AwsError(msg) => {
                tracing::error!("S3/AWS error: {msg}");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error",
                    true,
                )
            }
            ConfigError(msg) => {
                tracing::error!("Configuration error: {msg}");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error",
                    false,
                )
            }
            InvalidInput(msg) => {
                tracing::warn!("Invalid input: {msg}");
                Self::new(
                    StatusCode::BAD_REQUEST,
                    "invalid_photo",
                    "Photo must be a JPEG, PNG, WebP or GIF within the size limit",
                    false,
                )
            }
        }
    }
}

/// Convert profile storage errors to application errors
impl From<ProfileStorageError> for AppError {
    fn from(err: ProfileStorageError) -> Self {
        match &err {
            ProfileStorageError::ProfileNotFound(id) => {
                tracing::debug!("Profile not found: {id}");
                Self::new(
                    StatusCode::NOT_FOUND,
                    "profile_not_found",
                    "Profile not found",
                    false,
                )
            }
            ProfileStorageError::SerializationError(msg) => {
                tracing::error!("Profile serialization error: {msg}");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error",
                    false,
                )
            }
            _ => {
                tracing::error!("Profile storage error: {err}");
                Self::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "database_error",
                    "Profile storage temporarily unavailable",
                    true,
                )
            }
        }
    }
}

/// Convert photo edit session errors to application errors
impl From<PhotoSessionError> for AppError {
    fn from(err: PhotoSessionError) -> Self {
        match err {
            PhotoSessionError::NoActiveSession => Self::new(
                StatusCode::NOT_FOUND,
                "no_edit_session",
                "No edit session is open for this profile",
                false,
            ),
            PhotoSessionError::UploadInProgress => Self::new(
                StatusCode::CONFLICT,
                "upload_in_progress",
                "Another photo upload is still in progress",
                true,
            ),
            PhotoSessionError::SaveInProgress => Self::new(
                StatusCode::CONFLICT,
                "save_in_progress",
                "The edit session is being saved",
                true,
            ),
            PhotoSessionError::ProfileNotFound(id) => {
                ProfileStorageError::ProfileNotFound(id).into()
            }
            PhotoSessionError::Upload(err) => err.into(),
            PhotoSessionError::Persistence(err) => err.into(),
        }
    }
}

impl OperationOutput for AppError {
    type Inner = ApiErrorResponse;

    fn operation_response(
        ctx: &mut aide::generate::GenContext,
        operation: &mut aide::openapi::Operation,
    ) -> Option<aide::openapi::Response> {
        Json::<ApiErrorResponse>::operation_response(ctx, operation)
    }
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_session_errors_map_to_statuses() {
        let cases = [
            (PhotoSessionError::NoActiveSession, StatusCode::NOT_FOUND),
            (PhotoSessionError::UploadInProgress, StatusCode::CONFLICT),
            (PhotoSessionError::SaveInProgress, StatusCode::CONFLICT),
            (
                PhotoSessionError::ProfileNotFound("p1".to_string()),
                StatusCode::NOT_FOUND,
            ),
            (
                PhotoSessionError::Upload(BucketError::InvalidInput("too big".to_string())),
                StatusCode::BAD_REQUEST,
            ),
            (
                PhotoSessionError::Upload(BucketError::UpstreamError("503".to_string())),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                PhotoSessionError::Persistence(ProfileStorageError::SerializationError(
                    "bad item".to_string(),
                )),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(AppError::from(err).status(), status);
        }
    }

    #[tokio::test]
    async fn test_error_envelope_shape() {
        let response = AppError::from(PhotoSessionError::UploadInProgress).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "allowRetry": true,
                "error": {
                    "code": "upload_in_progress",
                    "message": "Another photo upload is still in progress"
                }
            })
        );
    }
}
