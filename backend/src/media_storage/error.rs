//! Error types for bucket operations

use aws_sdk_s3::{
    error::SdkError,
    operation::{delete_object::DeleteObjectError, put_object::PutObjectError},
};
use thiserror::Error;

/// Result type for bucket operations
pub type BucketResult<T> = Result<T, BucketError>;

/// Errors that can occur during bucket operations
#[derive(Error, Debug)]
pub enum BucketError {
    /// S3 service error
    #[error("S3 service error: {0}")]
    S3Error(String),

    /// AWS SDK error
    #[error("AWS SDK error: {0}")]
    AwsError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Upstream service error (5xx from S3)
    #[error("Upstream service error: {0}")]
    UpstreamError(String),

    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<SdkError<PutObjectError>> for BucketError {
    fn from(error: SdkError<PutObjectError>) -> Self {
        match error {
            SdkError::ServiceError(ref service_err) if service_err.raw().status().as_u16() >= 500 => {
                Self::UpstreamError(error.to_string())
            }
            SdkError::ServiceError(_) => Self::S3Error(error.to_string()),
            _ => Self::AwsError(error.to_string()),
        }
    }
}

impl From<SdkError<DeleteObjectError>> for BucketError {
    fn from(error: SdkError<DeleteObjectError>) -> Self {
        match error {
            SdkError::ServiceError(ref service_err) if service_err.raw().status().as_u16() >= 500 => {
                Self::UpstreamError(error.to_string())
            }
            SdkError::ServiceError(_) => Self::S3Error(error.to_string()),
            _ => Self::AwsError(error.to_string()),
        }
    }
}
