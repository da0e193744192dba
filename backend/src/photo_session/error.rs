//! Error types for photo edit sessions

use profile_storage::profile::ProfileStorageError;
use thiserror::Error;

use crate::media_storage::BucketError;

/// Result type for photo edit session operations
pub type PhotoSessionResult<T> = Result<T, PhotoSessionError>;

/// Errors surfaced by photo edit sessions
#[derive(Error, Debug)]
pub enum PhotoSessionError {
    /// No edit session is open for the profile
    #[error("No edit session is open")]
    NoActiveSession,

    /// Another upload for this session has not finished yet
    #[error("An upload is already in progress for this session")]
    UploadInProgress,

    /// A save is waiting on the profile update; the session is frozen until it settles
    #[error("A save is in progress for this session")]
    SaveInProgress,

    /// The profile being edited does not exist
    #[error("Profile not found: {0}")]
    ProfileNotFound(String),

    /// Uploading the photo failed; session state is unchanged
    #[error("Photo upload failed: {0}")]
    Upload(#[from] BucketError),

    /// Reading or updating the profile failed
    #[error("Profile storage failed: {0}")]
    Persistence(#[from] ProfileStorageError),
}
