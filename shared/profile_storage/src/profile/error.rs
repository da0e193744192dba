//! Error types for profile storage operations

use aws_sdk_dynamodb::error::SdkError;
use aws_sdk_dynamodb::operation::{
    get_item::GetItemError, put_item::PutItemError, update_item::UpdateItemError,
};
use thiserror::Error;

/// Result type alias for profile storage operations
pub type ProfileStorageResult<T> = Result<T, ProfileStorageError>;

/// Storage error types for profile operations
#[derive(Debug, Error)]
pub enum ProfileStorageError {
    /// Failed to insert profile into `DynamoDB`
    #[error("Failed to insert profile into DynamoDB: {0:?}")]
    DynamoDbPutError(#[from] SdkError<PutItemError>),

    /// Failed to get profile from `DynamoDB`
    #[error("Failed to get profile from DynamoDB: {0:?}")]
    DynamoDbGetError(#[from] SdkError<GetItemError>),

    /// Failed to update profile in `DynamoDB`
    #[error("Failed to update profile in DynamoDB: {0:?}")]
    DynamoDbUpdateError(#[from] SdkError<UpdateItemError>),

    /// The profile does not exist
    #[error("Profile not found: {0}")]
    ProfileNotFound(String),

    /// Failed to parse profile from `DynamoDB` item
    #[error("Failed to parse profile: {0}")]
    SerializationError(String),
}

impl From<serde_dynamo::Error> for ProfileStorageError {
    fn from(err: serde_dynamo::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}
