use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use profile_storage::profile::Profile;
use tracing::{info, warn};

use super::{PhotoEditSession, PhotoSessionError, PhotoSessionResult, SessionSnapshot};
use crate::media_storage::PhotoStore;
use crate::profile_repository::ProfileRepository;

/// Open photo edit sessions, one per profile
pub struct EditSessionRegistry {
    photo_store: Arc<dyn PhotoStore>,
    profiles: Arc<dyn ProfileRepository>,
    max_photo_bytes: usize,
    sessions: Mutex<HashMap<String, Arc<PhotoEditSession>>>,
}

impl EditSessionRegistry {
    /// Creates an empty registry
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
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<String, Arc<PhotoEditSession>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn session_for(&self, profile_id: &str) -> Arc<PhotoEditSession> {
        self.sessions()
            .entry(profile_id.to_string())
            .or_insert_with(|| {
                Arc::new(PhotoEditSession::new(
                    self.photo_store.clone(),
                    self.profiles.clone(),
                    self.max_photo_bytes,
                ))
            })
            .clone()
    }

    /// Opens (or reopens) the edit session for a profile
    ///
    /// A session that is already open is cancelled first, so the photos it
    /// uploaded are deleted.
    ///
    /// # Errors
    ///
    /// Returns `PhotoSessionError::ProfileNotFound` if the profile does not exist
    /// Returns `PhotoSessionError::SaveInProgress` while the current session is being saved
    /// Returns `PhotoSessionError::Persistence` if the profile cannot be read
    pub async fn start(&self, profile_id: &str) -> PhotoSessionResult<SessionSnapshot> {
        loop {
            let session = self.session_for(profile_id);
            let completed_saves = session.completed_saves();

            let profile = match self.profiles.get_profile(profile_id).await {
                Ok(Some(profile)) => profile,
                Ok(None) => {
                    self.forget_if_closed(profile_id, &session);
                    return Err(PhotoSessionError::ProfileNotFound(profile_id.to_string()));
                }
                Err(err) => {
                    self.forget_if_closed(profile_id, &session);
                    return Err(err.into());
                }
            };

            if session.is_open() {
                session.cancel().await?;
                info!("Replaced open photo edit session for profile {}", profile_id);
            }

            // A save that landed during the read makes the persisted photo stale
            let Some(generation) = session.start_edit_as_of(completed_saves, profile.photo_url)?
            else {
                continue;
            };

            info!(
                "Started photo edit session for profile {} at generation {}",
                profile_id, generation
            );
            return Ok(session.snapshot());
        }
    }

    /// Returns the open session of a profile
    ///
    /// # Errors
    ///
    /// Returns `PhotoSessionError::NoActiveSession` if the profile has no open session
    pub fn get(&self, profile_id: &str) -> PhotoSessionResult<Arc<PhotoEditSession>> {
        self.sessions()
            .get(profile_id)
            .filter(|session| session.is_open())
            .cloned()
            .ok_or(PhotoSessionError::NoActiveSession)
    }

    /// Cancels the session of a profile, if any
    ///
    /// # Errors
    ///
    /// Returns `PhotoSessionError::SaveInProgress` while the session is being saved
    pub async fn cancel(&self, profile_id: &str) -> PhotoSessionResult<()> {
        let session = self.sessions().get(profile_id).cloned();
        let Some(session) = session else {
            return Ok(());
        };

        session.cancel().await?;
        self.forget_if_closed(profile_id, &session);
        info!("Cancelled photo edit session for profile {}", profile_id);
        Ok(())
    }

    /// Saves the session of a profile
    ///
    /// # Errors
    ///
    /// Returns `PhotoSessionError::NoActiveSession` if the profile has no open session
    /// Returns `PhotoSessionError::SaveInProgress` if the session is already being saved
    /// Returns `PhotoSessionError::Persistence` if the profile update fails
    pub async fn save(&self, profile_id: &str) -> PhotoSessionResult<Profile> {
        let session = self.get(profile_id)?;
        let profile = session.save(profile_id).await?;
        self.forget_if_closed(profile_id, &session);
        Ok(profile)
    }

    fn forget_if_closed(&self, profile_id: &str, session: &Arc<PhotoEditSession>) {
        let mut sessions = self.sessions();
        if sessions
            .get(profile_id)
            .is_some_and(|current| Arc::ptr_eq(current, session) && !current.is_open())
        {
            sessions.remove(profile_id);
        }
    }

    /// Cancels every session untouched for longer than `max_idle`
    ///
    /// Returns the number of sessions cancelled.
    pub async fn cancel_idle(&self, now: DateTime<Utc>, max_idle: Duration) -> usize {
        let cutoff = now - max_idle;
        let idle: Vec<(String, Arc<PhotoEditSession>)> = {
            let mut sessions = self.sessions();
            let expired: Vec<String> = sessions
                .iter()
                .filter(|(_, session)| session.is_idle_since(cutoff))
                .map(|(profile_id, _)| profile_id.clone())
                .collect();
            expired
                .into_iter()
                .filter_map(|profile_id| {
                    sessions
                        .remove(&profile_id)
                        .map(|session| (profile_id, session))
                })
                .collect()
        };

        let mut cancelled = 0;
        for (profile_id, session) in idle {
            match session.cancel().await {
                Ok(()) => {
                    info!("Cancelled idle photo edit session for profile {}", profile_id);
                    cancelled += 1;
                }
                Err(err) => {
                    warn!("Keeping photo edit session for profile {}: {}", profile_id, err);
                    self.sessions().entry(profile_id).or_insert(session);
                }
            }
        }
        cancelled
    }

    /// Number of profiles with a tracked session
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions().len()
    }

    /// Whether no session is tracked
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions().is_empty()
    }
}
