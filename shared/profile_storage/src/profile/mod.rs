//! Profile storage module for `DynamoDB` operations

mod error;

use std::sync::Arc;

use aws_sdk_dynamodb::error::SdkError;
use aws_sdk_dynamodb::types::{AttributeValue, ReturnValue};
use aws_sdk_dynamodb::Client as DynamoDbClient;
pub use error::{ProfileStorageError, ProfileStorageResult};
use serde::{Deserialize, Serialize};
use serde_dynamo::{from_item, to_item};
use strum::Display;

/// `DynamoDB` row for a directory profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Primary key - unique profile ID (UUID v4)
    pub id: String,
    /// Given name
    pub first_name: String,
    /// Family name
    pub last_name: String,
    /// Year of birth, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birth_year: Option<i32>,
    /// Village, town or region the person emigrated from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub place_of_origin: Option<String>,
    /// Year of arrival, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arrival_year: Option<i32>,
    /// Public reference of the profile photo
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    /// Timestamp of profile creation
    pub created_at: i64,
    /// Timestamp of the last update
    pub updated_at: i64,
}

/// Request to create a new profile
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileCreateRequest {
    /// Given name
    pub first_name: String,
    /// Family name
    pub last_name: String,
    /// Year of birth
    pub birth_year: Option<i32>,
    /// Place of origin
    pub place_of_origin: Option<String>,
    /// Year of arrival
    pub arrival_year: Option<i32>,
    /// Initial photo reference
    pub photo_url: Option<String>,
}

/// `DynamoDB` attribute names for the profiles table
#[derive(Debug, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ProfileAttribute {
    /// Primary key - unique profile ID
    Id,
    /// Given name
    FirstName,
    /// Family name
    LastName,
    /// Year of birth
    BirthYear,
    /// Place of origin
    PlaceOfOrigin,
    /// Year of arrival
    ArrivalYear,
    /// Photo reference
    PhotoUrl,
    /// Creation timestamp
    CreatedAt,
    /// Last update timestamp
    UpdatedAt,
}

/// Storage client for profile operations
pub struct ProfileStorage {
    dynamodb_client: Arc<DynamoDbClient>,
    table_name: String,
}

impl ProfileStorage {
    /// Creates a new storage instance
    ///
    /// # Arguments
    ///
    /// * `dynamodb_client` - Pre-configured `DynamoDB` client
    /// * `table_name` - `DynamoDB` table name for profiles
    #[must_use]
    pub const fn new(dynamodb_client: Arc<DynamoDbClient>, table_name: String) -> Self {
        Self {
            dynamodb_client,
            table_name,
        }
    }

    /// Get a single profile by ID
    ///
    /// # Errors
    ///
    /// Returns `ProfileStorageError` if the `DynamoDB` get operation fails
    pub async fn get_one(&self, id: &str) -> ProfileStorageResult<Option<Profile>> {
        let response = self
            .dynamodb_client
            .get_item()
            .table_name(&self.table_name)
            .key(
                ProfileAttribute::Id.to_string(),
                AttributeValue::S(id.to_string()),
            )
            .send()
            .await?;

        response
            .item()
            .map(|item| from_item(item.clone()).map_err(ProfileStorageError::from))
            .transpose()
    }

    /// Create a new profile with generated UUID
    ///
    /// # Errors
    ///
    /// Returns `ProfileStorageError` if the `DynamoDB` put operation fails
    pub async fn create(&self, request: ProfileCreateRequest) -> ProfileStorageResult<Profile> {
        let now = chrono::Utc::now().timestamp();

        let profile = Profile {
            id: uuid::Uuid::new_v4().to_string(),
            first_name: request.first_name,
            last_name: request.last_name,
            birth_year: request.birth_year,
            place_of_origin: request.place_of_origin,
            arrival_year: request.arrival_year,
            photo_url: request.photo_url,
            created_at: now,
            updated_at: now,
        };

        let item = to_item(&profile)?;

        self.dynamodb_client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .send()
            .await?;

        Ok(profile)
    }

    /// Replaces the photo reference of an existing profile
    ///
    /// Passing `None` removes the photo attribute. The update is conditional
    /// on the profile existing, so a missing profile is never created here.
    ///
    /// # Errors
    ///
    /// Returns `ProfileStorageError::ProfileNotFound` if no profile has this ID
    /// Returns `ProfileStorageError` if the `DynamoDB` update operation fails
    pub async fn update_photo_url(
        &self,
        id: &str,
        photo_url: Option<&str>,
    ) -> ProfileStorageResult<Profile> {
        let mut request = self
            .dynamodb_client
            .update_item()
            .table_name(&self.table_name)
            .key(
                ProfileAttribute::Id.to_string(),
                AttributeValue::S(id.to_string()),
            )
            .condition_expression("attribute_exists(#id)")
            .expression_attribute_names("#id", ProfileAttribute::Id.to_string())
            .expression_attribute_names("#photo_url", ProfileAttribute::PhotoUrl.to_string())
            .expression_attribute_names("#updated_at", ProfileAttribute::UpdatedAt.to_string())
            .expression_attribute_values(
                ":updated_at",
                AttributeValue::N(chrono::Utc::now().timestamp().to_string()),
            )
            .return_values(ReturnValue::AllNew);

        request = match photo_url {
            Some(photo_url) => request
                .update_expression("SET #photo_url = :photo_url, #updated_at = :updated_at")
                .expression_attribute_values(":photo_url", AttributeValue::S(photo_url.to_string())),
            None => request.update_expression("SET #updated_at = :updated_at REMOVE #photo_url"),
        };

        let response = request.send().await.map_err(|err| {
            if matches!(
                err,
                SdkError::ServiceError(ref svc) if svc.err().is_conditional_check_failed_exception()
            ) {
                ProfileStorageError::ProfileNotFound(id.to_string())
            } else {
                err.into()
            }
        })?;

        let attributes = response.attributes.ok_or_else(|| {
            ProfileStorageError::SerializationError("update returned no attributes".to_string())
        })?;

        Ok(from_item(attributes)?)
    }
}
