use std::sync::Arc;

use axum::{extract::Path, http::StatusCode, Extension, Json};
use profile_storage::profile::{Profile, ProfileStorageError};
use schemars::JsonSchema;
use serde::Serialize;
use tracing::instrument;

use crate::{profile_repository::ProfileRepository, signed_urls::SignedUrlCache, types::AppError};

/// Public view of a directory profile
#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    /// Unique ID of the profile
    pub id: String,
    /// Given name
    pub first_name: String,
    /// Family name
    pub last_name: String,
    /// Year of birth
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birth_year: Option<i32>,
    /// Village, town or region of origin
    #[serde(skip_serializing_if = "Option::is_none")]
    pub place_of_origin: Option<String>,
    /// Year of arrival
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arrival_year: Option<i32>,
    /// Public reference of the profile photo
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    /// Unix timestamp of the last update
    pub updated_at: i64,
}

impl From<Profile> for ProfileResponse {
    fn from(profile: Profile) -> Self {
        Self {
            id: profile.id,
            first_name: profile.first_name,
            last_name: profile.last_name,
            birth_year: profile.birth_year,
            place_of_origin: profile.place_of_origin,
            arrival_year: profile.arrival_year,
            photo_url: profile.photo_url,
            updated_at: profile.updated_at,
        }
    }
}

/// Time-limited URL to view a profile photo
#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PhotoUrlResponse {
    /// Presigned GET URL
    pub url: String,
    /// ISO-8601 UTC timestamp when the URL expires
    pub expires_at: String,
}

/// Get a profile
///
/// # Errors
///
/// - `404 NOT_FOUND` - Profile does not exist
/// - `503 SERVICE_UNAVAILABLE` - Profile storage is unreachable
#[instrument(skip(profiles))]
pub async fn get_profile(
    Extension(profiles): Extension<Arc<dyn ProfileRepository>>,
    Path(id): Path<String>,
) -> Result<Json<ProfileResponse>, AppError> {
    let profile = profiles
        .get_profile(&id)
        .await?
        .ok_or(ProfileStorageError::ProfileNotFound(id))?;

    Ok(Json(profile.into()))
}

/// Get a viewable URL for a profile's photo
///
/// URLs are cached and reused until they come close to expiring.
///
/// # Errors
///
/// - `404 NOT_FOUND` - Profile does not exist or has no photo
/// - `400 BAD_REQUEST` - The stored photo reference is not in the photo bucket
/// - `503 SERVICE_UNAVAILABLE` - Profile or photo storage is unreachable
#[instrument(skip(profiles, signed_urls))]
pub async fn get_photo_url(
    Extension(profiles): Extension<Arc<dyn ProfileRepository>>,
    Extension(signed_urls): Extension<Arc<SignedUrlCache>>,
    Path(id): Path<String>,
) -> Result<Json<PhotoUrlResponse>, AppError> {
    let profile = profiles
        .get_profile(&id)
        .await?
        .ok_or(ProfileStorageError::ProfileNotFound(id))?;

    let Some(reference) = profile.photo_url else {
        return Err(AppError::new(
            StatusCode::NOT_FOUND,
            "no_photo",
            "Profile has no photo",
            false,
        ));
    };

    let signed = signed_urls.resolve_reference(&reference).await?;

    Ok(Json(PhotoUrlResponse {
        url: signed.url,
        expires_at: signed.expires_at.to_rfc3339(),
    }))
}
