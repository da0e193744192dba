use std::sync::Arc;

use axum::{extract::Path, http::StatusCode, Extension, Json};
use axum_valid::Valid;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use validator::Validate;

use super::profiles::ProfileResponse;
use crate::{
    media_storage::PhotoFile,
    photo_session::{EditSessionRegistry, SessionSnapshot, UploadOutcome},
    signed_urls::SignedUrlCache,
    types::AppError,
};

/// State of a profile's photo edit session
#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EditSessionResponse {
    /// Session generation, bumped on every start, cancel and save
    pub generation: u64,
    /// Whether the session is open
    pub is_open: bool,
    /// Photo persisted when the session started
    pub original_photo: Option<String>,
    /// Photo the profile will be saved with
    pub current_photo: Option<String>,
    /// Photos uploaded during the session
    pub uploaded: Vec<String>,
    /// Whether an upload is still in flight
    pub is_uploading: bool,
    /// Whether a save is waiting on the profile update
    pub is_saving: bool,
}

impl From<SessionSnapshot> for EditSessionResponse {
    fn from(snapshot: SessionSnapshot) -> Self {
        Self {
            generation: snapshot.generation,
            is_open: snapshot.is_open,
            original_photo: snapshot.original_photo,
            current_photo: snapshot.current_photo,
            uploaded: snapshot.uploaded,
            is_uploading: snapshot.is_uploading,
            is_saving: snapshot.is_saving,
        }
    }
}

/// Photo to upload into an edit session
#[derive(Debug, Deserialize, JsonSchema, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UploadPhotoRequest {
    /// Original file name
    #[validate(length(min = 1, max = 255))]
    pub file_name: String,
    /// MIME type, one of `image/jpeg`, `image/png`, `image/webp` or `image/gif`
    #[validate(length(min = 1))]
    pub content_type: String,
    /// File content, standard base64
    #[validate(length(min = 1))]
    pub content_base64: String,
}

/// Result of a photo upload
#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadPhotoResponse {
    /// Whether the photo became the session's current photo.
    /// `false` means the session ended while the upload was in flight and the photo was discarded.
    pub attached: bool,
    /// Public reference of the attached photo
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    /// Display name of the attached photo
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Session state after the upload
    pub session: EditSessionResponse,
}

/// Open a photo edit session
///
/// Captures the profile's persisted photo as the session's original. Opening
/// a session while one is already open cancels the old one: its uploads are
/// deleted, and uploads still in flight for it are discarded.
///
/// # Errors
///
/// - `404 NOT_FOUND` - Profile does not exist
/// - `409 CONFLICT` - The open session is being saved
/// - `503 SERVICE_UNAVAILABLE` - Profile storage is unreachable
#[instrument(skip(sessions))]
pub async fn start_session(
    Extension(sessions): Extension<Arc<EditSessionRegistry>>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<EditSessionResponse>), AppError> {
    let snapshot = sessions.start(&id).await?;
    Ok((StatusCode::CREATED, Json(snapshot.into())))
}

/// Get the open edit session of a profile
///
/// # Errors
///
/// - `404 NOT_FOUND` - No edit session is open
#[instrument(skip(sessions))]
pub async fn get_session(
    Extension(sessions): Extension<Arc<EditSessionRegistry>>,
    Path(id): Path<String>,
) -> Result<Json<EditSessionResponse>, AppError> {
    let session = sessions.get(&id)?;
    Ok(Json(session.snapshot().into()))
}

/// Cancel the edit session of a profile
///
/// Every photo uploaded during the session is deleted from storage. The
/// persisted profile is left untouched. Cancelling without an open session
/// is a no-op.
///
/// # Errors
///
/// - `409 CONFLICT` - The session is being saved
#[instrument(skip(sessions))]
pub async fn cancel_session(
    Extension(sessions): Extension<Arc<EditSessionRegistry>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    sessions.cancel(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Upload a photo into the edit session
///
/// The uploaded photo replaces the session's current photo. The profile
/// itself only changes on save.
///
/// # Errors
///
/// - `400 BAD_REQUEST` - Content is not valid base64, or not a supported image within the size limit
/// - `404 NOT_FOUND` - No edit session is open
/// - `409 CONFLICT` - Another upload for this session is still in flight, or the session is being saved
/// - `503 SERVICE_UNAVAILABLE` - Photo storage is unreachable
#[instrument(skip(sessions, payload))]
pub async fn upload_photo(
    Extension(sessions): Extension<Arc<EditSessionRegistry>>,
    Path(id): Path<String>,
    Valid(Json(payload)): Valid<Json<UploadPhotoRequest>>,
) -> Result<Json<UploadPhotoResponse>, AppError> {
    let session = sessions.get(&id)?;

    let bytes = STANDARD.decode(payload.content_base64.as_bytes()).map_err(|err| {
        tracing::debug!("Rejected photo content: {err}");
        AppError::new(
            StatusCode::BAD_REQUEST,
            "invalid_photo_encoding",
            "Photo content must be standard base64",
            false,
        )
    })?;

    let outcome = session
        .upload_photo(PhotoFile {
            file_name: payload.file_name,
            content_type: payload.content_type,
            bytes,
        })
        .await?;

    let (photo_url, display_name) = match outcome {
        UploadOutcome::Attached(photo) => (Some(photo.reference), Some(photo.display_name)),
        UploadOutcome::Discarded => (None, None),
    };

    Ok(Json(UploadPhotoResponse {
        attached: photo_url.is_some(),
        photo_url,
        display_name,
        session: session.snapshot().into(),
    }))
}

/// Remove the photo from the edit session
///
/// Clears the session's current photo. Nothing is deleted from storage until
/// the session is saved.
///
/// # Errors
///
/// - `404 NOT_FOUND` - No edit session is open
/// - `409 CONFLICT` - The session is being saved
#[instrument(skip(sessions))]
pub async fn delete_photo(
    Extension(sessions): Extension<Arc<EditSessionRegistry>>,
    Path(id): Path<String>,
) -> Result<Json<EditSessionResponse>, AppError> {
    let session = sessions.get(&id)?;
    session.delete_local_photo()?;
    Ok(Json(session.snapshot().into()))
}

/// Save the edit session
///
/// Persists the session's current photo on the profile and closes the
/// session. Photos no longer referenced are deleted, including the previous
/// photo when it was replaced. When persisting fails, the photos uploaded in
/// the session are deleted, the session reverts to the original photo and
/// stays open.
///
/// # Errors
///
/// - `404 NOT_FOUND` - No edit session is open, or the profile no longer exists
/// - `409 CONFLICT` - The session is already being saved
/// - `503 SERVICE_UNAVAILABLE` - Profile storage is unreachable
#[instrument(skip(sessions, signed_urls))]
pub async fn save_session(
    Extension(sessions): Extension<Arc<EditSessionRegistry>>,
    Extension(signed_urls): Extension<Arc<SignedUrlCache>>,
    Path(id): Path<String>,
) -> Result<Json<ProfileResponse>, AppError> {
    let original = sessions.get(&id)?.snapshot().original_photo;

    let profile = sessions.save(&id).await?;

    if let Some(retired) = original.filter(|reference| profile.photo_url.as_ref() != Some(reference))
    {
        signed_urls.invalidate_reference(&retired);
    }

    Ok(Json(profile.into()))
}
