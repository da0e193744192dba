//! Profile persistence used by photo edit sessions

use async_trait::async_trait;
use profile_storage::profile::{Profile, ProfileStorage, ProfileStorageResult};

/// Reads profiles and persists their photo reference
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    /// Fetches a profile by ID
    async fn get_profile(&self, id: &str) -> ProfileStorageResult<Option<Profile>>;

    /// Replaces the profile's photo reference and returns the updated record
    async fn update_photo(&self, id: &str, photo_url: Option<&str>)
        -> ProfileStorageResult<Profile>;
}

#[async_trait]
impl ProfileRepository for ProfileStorage {
    async fn get_profile(&self, id: &str) -> ProfileStorageResult<Option<Profile>> {
        self.get_one(id).await
    }

    async fn update_photo(
        &self,
        id: &str,
        photo_url: Option<&str>,
    ) -> ProfileStorageResult<Profile> {
        self.update_photo_url(id, photo_url).await
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use aws_sdk_dynamodb::error::SdkError;
    use profile_storage::profile::{Profile, ProfileStorageError, ProfileStorageResult};
    use tokio::sync::{Notify, Semaphore};

    use super::ProfileRepository;

    /// Profile repository backed by a `HashMap`
    #[derive(Default)]
    pub struct InMemoryProfileRepository {
        profiles: Mutex<HashMap<String, Profile>>,
        updates: Mutex<Vec<(String, Option<String>)>>,
        fail_updates: AtomicBool,
        gate: Option<Arc<Semaphore>>,
        update_started: Arc<Notify>,
    }

    impl InMemoryProfileRepository {
        /// Creates an empty repository
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Creates a repository whose updates wait until `release_update` is called
        #[must_use]
        pub fn gated() -> Self {
            Self {
                gate: Some(Arc::new(Semaphore::new(0))),
                ..Self::default()
            }
        }

        /// Lets one waiting update complete
        ///
        /// # Panics
        ///
        /// Panics if the repository was not created with `gated`
        pub fn release_update(&self) {
            self.gate
                .as_ref()
                .expect("repository is not gated")
                .add_permits(1);
        }

        /// Resolves once an update has been issued
        pub async fn wait_for_update_start(&self) {
            self.update_started.notified().await;
        }

        /// Inserts a profile with the given photo
        pub fn insert(&self, id: &str, photo_url: Option<&str>) -> Profile {
            let profile = Profile {
                id: id.to_string(),
                first_name: "Marija".to_string(),
                last_name: "Novak".to_string(),
                birth_year: Some(1894),
                place_of_origin: Some("Dalmatia".to_string()),
                arrival_year: Some(1912),
                photo_url: photo_url.map(ToString::to_string),
                created_at: 1_700_000_000,
                updated_at: 1_700_000_000,
            };
            self.profiles
                .lock()
                .unwrap()
                .insert(id.to_string(), profile.clone());
            profile
        }

        /// Makes subsequent updates fail like an unreachable database
        pub fn fail_updates(&self, fail: bool) {
            self.fail_updates.store(fail, Ordering::SeqCst);
        }

        /// Every update call, in order, including failed ones
        #[must_use]
        pub fn updates(&self) -> Vec<(String, Option<String>)> {
            self.updates.lock().unwrap().clone()
        }

        /// Currently persisted photo of a profile
        #[must_use]
        pub fn photo_of(&self, id: &str) -> Option<String> {
            self.profiles
                .lock()
                .unwrap()
                .get(id)
                .and_then(|profile| profile.photo_url.clone())
        }
    }

    #[async_trait]
    impl ProfileRepository for InMemoryProfileRepository {
        async fn get_profile(&self, id: &str) -> ProfileStorageResult<Option<Profile>> {
            Ok(self.profiles.lock().unwrap().get(id).cloned())
        }

        async fn update_photo(
            &self,
            id: &str,
            photo_url: Option<&str>,
        ) -> ProfileStorageResult<Profile> {
            self.update_started.notify_one();
            if let Some(gate) = &self.gate {
                gate.acquire()
                    .await
                    .map_err(|e| ProfileStorageError::SerializationError(e.to_string()))?
                    .forget();
            }

            self.updates
                .lock()
                .unwrap()
                .push((id.to_string(), photo_url.map(ToString::to_string)));

            if self.fail_updates.load(Ordering::SeqCst) {
                return Err(ProfileStorageError::DynamoDbUpdateError(
                    SdkError::timeout_error("database unreachable"),
                ));
            }

            let mut profiles = self.profiles.lock().unwrap();
            let profile = profiles
                .get_mut(id)
                .ok_or_else(|| ProfileStorageError::ProfileNotFound(id.to_string()))?;
            profile.photo_url = photo_url.map(ToString::to_string);
            profile.updated_at += 1;
            Ok(profile.clone())
        }
    }
}
