//! Cache of presigned photo URLs
//!
//! Entries are keyed by storage path and remember when their URL expires. A
//! URL is handed out again only while it has more than the refresh margin
//! left; after that it is re-signed. The cache holds at most `capacity`
//! entries and evicts expired ones first, then the one expiring soonest.
//!
//! Invalidation bumps an epoch, and a URL signed across an epoch change is
//! returned to its caller but never cached.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::media_storage::{BucketError, BucketResult, PhotoUrlSigner, PresignedUrl};

/// Bounded presigned URL cache
pub struct SignedUrlCache {
    signer: Arc<dyn PhotoUrlSigner>,
    capacity: usize,
    refresh_margin: Duration,
    state: Mutex<CacheState>,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, PresignedUrl>,
    /// Bumped on every invalidation
    epoch: u64,
}

impl SignedUrlCache {
    /// Creates an empty cache
    ///
    /// # Arguments
    ///
    /// * `signer` - Issues fresh URLs on a miss
    /// * `capacity` - Maximum number of cached paths
    /// * `refresh_margin` - Remaining lifetime below which a URL is re-signed
    #[must_use]
    pub fn new(signer: Arc<dyn PhotoUrlSigner>, capacity: usize, refresh_margin: Duration) -> Self {
        Self {
            signer,
            capacity: capacity.max(1),
            refresh_margin,
            state: Mutex::new(CacheState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolves a signed URL for a stored photo reference
    ///
    /// # Errors
    ///
    /// Returns `BucketError::InvalidInput` if the reference is not a stored photo
    /// Returns `BucketError` if signing fails
    pub async fn resolve_reference(&self, reference: &str) -> BucketResult<PresignedUrl> {
        let path = self.signer.storage_path(reference).ok_or_else(|| {
            BucketError::InvalidInput(format!("not a stored photo reference: {reference}"))
        })?;
        self.resolve(&path).await
    }

    /// Resolves a signed URL for a storage path
    ///
    /// # Errors
    ///
    /// Returns `BucketError` if signing fails
    pub async fn resolve(&self, path: &str) -> BucketResult<PresignedUrl> {
        self.resolve_at(path, Utc::now()).await
    }

    /// Resolves a signed URL for a storage path as of `now`
    ///
    /// # Errors
    ///
    /// Returns `BucketError` if signing fails
    pub async fn resolve_at(&self, path: &str, now: DateTime<Utc>) -> BucketResult<PresignedUrl> {
        let epoch = {
            let state = self.state();
            let cached = state
                .entries
                .get(path)
                .filter(|entry| entry.expires_at - self.refresh_margin > now);
            if let Some(hit) = cached {
                return Ok(hit.clone());
            }
            state.epoch
        };

        let fresh = self.signer.presign_get(path).await?;
        debug!("Signed URL for {} until {}", path, fresh.expires_at);

        let mut state = self.state();
        if state.epoch != epoch {
            debug!("Cache invalidated while signing {}, not caching", path);
            return Ok(fresh);
        }
        let entries = &mut state.entries;
        if !entries.contains_key(path) && entries.len() >= self.capacity {
            entries.retain(|_, entry| entry.expires_at > now);
            if entries.len() >= self.capacity {
                let soonest = entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.expires_at)
                    .map(|(key, _)| key.clone());
                if let Some(key) = soonest {
                    entries.remove(&key);
                }
            }
        }
        entries.insert(path.to_string(), fresh.clone());

        Ok(fresh)
    }

    /// Drops the cached URL of a path
    pub fn invalidate(&self, path: &str) {
        let mut state = self.state();
        state.epoch += 1;
        state.entries.remove(path);
    }

    /// Drops the cached URL of a stored photo reference
    pub fn invalidate_reference(&self, reference: &str) {
        if let Some(path) = self.signer.storage_path(reference) {
            self.invalidate(&path);
        }
    }

    /// Number of cached paths
    #[must_use]
    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    /// Whether the cache is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state().entries.is_empty()
    }
}
