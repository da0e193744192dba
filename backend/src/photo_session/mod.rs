//! Photo lifecycle of a profile edit session
//!
//! Uploads cannot be aborted once issued, so every session carries a
//! generation number. An upload remembers the generation it started in and
//! only attaches its photo if that generation is still current; otherwise the
//! freshly stored object is deleted on the spot.
//!
//! While a save's profile update is in flight the session is frozen: every
//! other operation, including restart and cancel, is refused until the update
//! settles.
//!
//! Storage cleanup is best-effort: a failed delete leaves an orphaned object
//! behind and is logged, never returned to the caller.

mod error;
mod registry;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use profile_storage::profile::Profile;
use tracing::{debug, info, warn};

pub use error::{PhotoSessionError, PhotoSessionResult};
pub use registry::EditSessionRegistry;

use crate::media_storage::{PhotoFile, PhotoStore, UploadedPhoto};
use crate::profile_repository::ProfileRepository;

#[derive(Debug, Clone, PartialEq, Eq)]
struct EditSession {
    /// Photo persisted when the session started
    original_photo: Option<String>,
    /// Photo the profile will be saved with
    current_photo: Option<String>,
    /// Every photo uploaded in this session, superseded ones included
    uploaded: Vec<String>,
}

#[derive(Debug)]
struct SessionState {
    generation: u64,
    session: Option<EditSession>,
    /// Generation of the upload currently in flight
    uploading: Option<u64>,
    /// Generation of the save whose profile update is in flight
    saving: Option<u64>,
    /// Saves whose profile update succeeded
    completed_saves: u64,
    touched_at: DateTime<Utc>,
}

impl SessionState {
    fn open_session(&mut self) -> PhotoSessionResult<&mut EditSession> {
        if self.saving.is_some() {
            return Err(PhotoSessionError::SaveInProgress);
        }
        self.session
            .as_mut()
            .ok_or(PhotoSessionError::NoActiveSession)
    }
}

#[derive(Debug, Clone, Copy)]
enum InFlight {
    Upload,
    Save,
}

/// Clears an in-flight marker when the operation ends, even if its future is dropped
struct InFlightGuard<'a> {
    state: &'a Mutex<SessionState>,
    kind: InFlight,
    generation: u64,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = match self.kind {
            InFlight::Upload => &mut state.uploading,
            InFlight::Save => &mut state.saving,
        };
        if *slot == Some(self.generation) {
            *slot = None;
        }
    }
}

/// Point-in-time view of an edit session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Current generation
    pub generation: u64,
    /// Whether a session is open
    pub is_open: bool,
    /// Photo persisted when the session started
    pub original_photo: Option<String>,
    /// Photo the profile will be saved with
    pub current_photo: Option<String>,
    /// Photos uploaded during the session
    pub uploaded: Vec<String>,
    /// Whether an upload for the current generation is in flight
    pub is_uploading: bool,
    /// Whether a save is waiting on the profile update
    pub is_saving: bool,
}

/// Result of an upload that reached storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// The photo is now the session's current photo
    Attached(UploadedPhoto),
    /// The session ended while the upload was in flight; the object was deleted
    Discarded,
}

/// Coordinates the photo of one profile across an edit session
pub struct PhotoEditSession {
    photo_store: Arc<dyn PhotoStore>,
    profiles: Arc<dyn ProfileRepository>,
    max_photo_bytes: usize,
    state: Mutex<SessionState>,
}

impl PhotoEditSession {
    /// Creates a coordinator with no open session
    #[must_use]
    pub fn new(
        photo_store: Arc<dyn PhotoStore>,
        profiles: Arc<dyn ProfileRepository>,
        max_photo_bytes: usize,
    ) -> Self {
        Self {
            photo_store,
            profiles,
            max_photo_bytes,
            state: Mutex::new(SessionState {
                generation: 0,
                session: None,
                uploading: None,
                saving: None,
                completed_saves: 0,
                touched_at: Utc::now(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn in_flight(&self, kind: InFlight, generation: u64) -> InFlightGuard<'_> {
        InFlightGuard {
            state: &self.state,
            kind,
            generation,
        }
    }

    /// Opens a session for a profile whose persisted photo is `persisted_photo`
    ///
    /// Any session already open is abandoned without cleanup, and uploads
    /// still in flight for it will be discarded when they finish.
    ///
    /// # Errors
    ///
    /// Returns `PhotoSessionError::SaveInProgress` while a save is waiting on the profile update
    pub fn start_edit(&self, persisted_photo: Option<String>) -> PhotoSessionResult<u64> {
        let mut state = self.state();
        Self::open(&mut state, persisted_photo)
    }

    /// Like `start_edit`, but only if no save has completed since `completed_saves` was read
    ///
    /// Returns `Ok(None)` when a save landed in between, in which case
    /// `persisted_photo` may already be stale.
    ///
    /// # Errors
    ///
    /// Returns `PhotoSessionError::SaveInProgress` while a save is waiting on the profile update
    pub fn start_edit_as_of(
        &self,
        completed_saves: u64,
        persisted_photo: Option<String>,
    ) -> PhotoSessionResult<Option<u64>> {
        let mut state = self.state();
        if state.completed_saves != completed_saves {
            return Ok(None);
        }
        Self::open(&mut state, persisted_photo).map(Some)
    }

    fn open(state: &mut SessionState, persisted_photo: Option<String>) -> PhotoSessionResult<u64> {
        if state.saving.is_some() {
            return Err(PhotoSessionError::SaveInProgress);
        }
        state.generation += 1;
        state.session = Some(EditSession {
            original_photo: persisted_photo.clone(),
            current_photo: persisted_photo,
            uploaded: Vec::new(),
        });
        state.touched_at = Utc::now();

        debug!("Edit session started at generation {}", state.generation);
        Ok(state.generation)
    }

    /// Uploads a photo and makes it the session's current photo
    ///
    /// # Errors
    ///
    /// Returns `PhotoSessionError::NoActiveSession` if no session is open
    /// Returns `PhotoSessionError::SaveInProgress` while a save is waiting on the profile update
    /// Returns `PhotoSessionError::UploadInProgress` if another upload for this session is in flight
    /// Returns `PhotoSessionError::Upload` if the file is rejected or storage fails
    pub async fn upload_photo(&self, file: PhotoFile) -> PhotoSessionResult<UploadOutcome> {
        let started_in = {
            let mut state = self.state();
            state.open_session()?;
            if state.uploading == Some(state.generation) {
                return Err(PhotoSessionError::UploadInProgress);
            }
            file.validate(self.max_photo_bytes)?;
            state.uploading = Some(state.generation);
            state.generation
        };

        let guard = self.in_flight(InFlight::Upload, started_in);
        let result = self.photo_store.upload(file).await;
        drop(guard);
        let photo = result?;

        if self.attach(started_in, &photo) {
            info!("Attached uploaded photo {}", photo.reference);
            return Ok(UploadOutcome::Attached(photo));
        }

        info!(
            "Upload from generation {} finished after its session ended, deleting {}",
            started_in, photo.reference
        );
        self.delete_best_effort(vec![photo.reference]).await;
        Ok(UploadOutcome::Discarded)
    }

    fn attach(&self, started_in: u64, photo: &UploadedPhoto) -> bool {
        let mut state = self.state();
        if state.generation != started_in {
            return false;
        }
        let Some(session) = state.session.as_mut() else {
            return false;
        };

        if !session.uploaded.contains(&photo.reference) {
            session.uploaded.push(photo.reference.clone());
        }
        session.current_photo = Some(photo.reference.clone());
        state.touched_at = Utc::now();
        true
    }

    /// Clears the session's current photo without touching storage
    ///
    /// # Errors
    ///
    /// Returns `PhotoSessionError::NoActiveSession` if no session is open
    /// Returns `PhotoSessionError::SaveInProgress` while a save is waiting on the profile update
    pub fn delete_local_photo(&self) -> PhotoSessionResult<()> {
        let mut state = self.state();
        state.open_session()?.current_photo = None;
        state.touched_at = Utc::now();
        Ok(())
    }

    /// Abandons the session and deletes every photo uploaded during it
    ///
    /// # Errors
    ///
    /// Returns `PhotoSessionError::SaveInProgress` while a save is waiting on the profile update
    pub async fn cancel(&self) -> PhotoSessionResult<()> {
        let abandoned = {
            let mut state = self.state();
            if state.saving.is_some() {
                return Err(PhotoSessionError::SaveInProgress);
            }
            state.generation += 1;
            state.touched_at = Utc::now();
            state
                .session
                .take()
                .map(|session| session.uploaded)
                .unwrap_or_default()
        };

        debug!("Edit session cancelled, discarding {} uploads", abandoned.len());
        self.delete_best_effort(abandoned).await;
        Ok(())
    }

    /// Persists the session's current photo on the profile
    ///
    /// On success the session closes and every photo that is no longer
    /// referenced is deleted, including the original if it was replaced. On
    /// failure the photos introduced by this session are deleted, the current
    /// photo reverts to the original and the session stays open.
    ///
    /// # Errors
    ///
    /// Returns `PhotoSessionError::NoActiveSession` if no session is open
    /// Returns `PhotoSessionError::SaveInProgress` if another save is waiting on the profile update
    /// Returns `PhotoSessionError::Persistence` if the profile update fails
    pub async fn save(&self, profile_id: &str) -> PhotoSessionResult<Profile> {
        let (saved_in, snapshot) = {
            let mut state = self.state();
            let session = state.open_session()?.clone();
            state.saving = Some(state.generation);
            (state.generation, session)
        };
        let guard = self.in_flight(InFlight::Save, saved_in);

        let EditSession {
            original_photo,
            current_photo,
            uploaded,
        } = snapshot;

        let orphans: Vec<String> = uploaded
            .iter()
            .filter(|reference| current_photo.as_ref() != Some(*reference))
            .cloned()
            .collect();

        let result = self
            .profiles
            .update_photo(profile_id, current_photo.as_deref())
            .await;

        match result {
            Ok(profile) => {
                let mut doomed = orphans;
                if original_photo != current_photo {
                    doomed.extend(original_photo);
                }

                {
                    let mut state = self.state();
                    state.completed_saves += 1;
                    state.touched_at = Utc::now();
                    if state.generation == saved_in {
                        state.generation += 1;
                        // Uploads that landed while the update was in flight are orphans too
                        if let Some(session) = state.session.take() {
                            doomed.extend(session.uploaded.into_iter().filter(|reference| {
                                !uploaded.contains(reference)
                                    && current_photo.as_ref() != Some(reference)
                            }));
                        }
                    }
                }
                drop(guard);

                info!("Saved photo for profile {}", profile_id);
                self.delete_best_effort(doomed).await;
                Ok(profile)
            }
            Err(err) => {
                warn!("Saving photo for profile {} failed: {}", profile_id, err);

                let mut doomed = orphans;
                if current_photo != original_photo {
                    doomed.extend(current_photo);
                }

                {
                    let mut state = self.state();
                    state.touched_at = Utc::now();
                    if state.generation == saved_in {
                        if let Some(session) = state.session.as_mut() {
                            session.current_photo.clone_from(&original_photo);
                            session
                                .uploaded
                                .retain(|reference| !uploaded.contains(reference));
                        }
                    }
                }
                drop(guard);

                self.delete_best_effort(doomed).await;
                Err(err.into())
            }
        }
    }

    /// Whether a session is open
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state().session.is_some()
    }

    /// Number of saves whose profile update succeeded
    #[must_use]
    pub fn completed_saves(&self) -> u64 {
        self.state().completed_saves
    }

    /// Whether nothing happened since `cutoff` and no upload or save is in flight
    #[must_use]
    pub fn is_idle_since(&self, cutoff: DateTime<Utc>) -> bool {
        let state = self.state();
        state.touched_at < cutoff && state.uploading.is_none() && state.saving.is_none()
    }

    /// Current state of the session
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.state();
        let session = state.session.as_ref();
        SessionSnapshot {
            generation: state.generation,
            is_open: session.is_some(),
            original_photo: session.and_then(|s| s.original_photo.clone()),
            current_photo: session.and_then(|s| s.current_photo.clone()),
            uploaded: session.map(|s| s.uploaded.clone()).unwrap_or_default(),
            is_uploading: state.uploading == Some(state.generation),
            is_saving: state.saving.is_some(),
        }
    }

    async fn delete_best_effort(&self, references: Vec<String>) {
        let deletions = references.iter().map(|reference| async move {
            match self.photo_store.delete(reference).await {
                Ok(()) => debug!("Deleted photo {}", reference),
                Err(err) => warn!("Failed to delete photo {}, leaving it orphaned: {}", reference, err),
            }
        });
        join_all(deletions).await;
    }
}
