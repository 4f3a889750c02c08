//! Signed URL issuance
//!
//! The bucket is private, so every asset must be exchanged for a time-limited
//! URL before it can be shown. [`SignedUrlIssuer::issue`] normalizes the
//! reference, asks the backend to sign it, and never panics: failures come
//! back as `Err` with the backend's message so callers can fall back to a
//! placeholder.
//!
//! Issued URLs are remembered in a [`SignedUrlCache`] that tracks each
//! token's expiry. A token is handed out again only while more than the
//! refresh margin of its lifetime remains, so a page can never receive a URL
//! that is about to lapse. The cache holds at most one URL per path: signing
//! the same path with another lifetime replaces the entry. [`spawn_sweeper`]
//! drops expired entries.

use super::{ObjectStore, PathNormalizer, StorageError};
use crate::utils::Clock;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignedUrl {
    pub url: String,
    /// Canonical path the URL grants access to
    pub path: String,
    pub expires_at: DateTime<Utc>,
}

struct CachedUrl {
    signed: SignedUrl,
    ttl_secs: u64,
}

pub struct SignedUrlCache {
    entries: RwLock<HashMap<String, CachedUrl>>,
    refresh_margin: Duration,
    clock: Arc<dyn Clock>,
}

impl SignedUrlCache {
    pub fn new(refresh_margin: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            refresh_margin,
            clock,
        }
    }

    pub fn refresh_margin(&self) -> Duration {
        self.refresh_margin
    }

    /// A URL cached for `path` with the same lifetime and more than the
    /// refresh margin of validity left.
    pub async fn get(&self, path: &str, ttl: Duration) -> Option<SignedUrl> {
        let guard = self.entries.read().await;
        let entry = guard.get(path)?;
        (entry.ttl_secs == ttl.as_secs() && self.is_fresh(&entry.signed)).then(|| entry.signed.clone())
    }

    pub async fn put(&self, signed: SignedUrl, ttl: Duration) {
        let mut guard = self.entries.write().await;
        guard.insert(
            signed.path.clone(),
            CachedUrl {
                signed,
                ttl_secs: ttl.as_secs(),
            },
        );
    }

    pub async fn invalidate(&self, path: &str) {
        self.entries.write().await.remove(path);
    }

    /// Remove entries that are no longer servable. Returns how many were dropped.
    pub async fn purge_expired(&self) -> usize {
        let mut guard = self.entries.write().await;
        let before = guard.len();
        let now = self.clock.now();
        let margin = chrono_margin(self.refresh_margin);
        guard.retain(|_, entry| entry.signed.expires_at - now > margin);
        before - guard.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    fn is_fresh(&self, entry: &SignedUrl) -> bool {
        entry.expires_at - self.clock.now() > chrono_margin(self.refresh_margin)
    }
}

fn chrono_margin(margin: Duration) -> chrono::Duration {
    chrono::Duration::from_std(margin).unwrap_or(chrono::Duration::MAX)
}

#[derive(Clone)]
pub struct SignedUrlIssuer {
    store: Arc<dyn ObjectStore>,
    normalizer: PathNormalizer,
    cache: Arc<SignedUrlCache>,
    clock: Arc<dyn Clock>,
}

impl SignedUrlIssuer {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        normalizer: PathNormalizer,
        cache: Arc<SignedUrlCache>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            normalizer,
            cache,
            clock,
        }
    }

    pub fn cache(&self) -> &Arc<SignedUrlCache> {
        &self.cache
    }

    pub fn normalizer(&self) -> &PathNormalizer {
        &self.normalizer
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Exchange an asset reference for a signed URL valid for `ttl`.
    pub async fn issue(&self, reference: &str, ttl: Duration) -> Result<SignedUrl, StorageError> {
        let path = self.normalizer.normalize(reference)?;
        if path != reference {
            debug!(original = reference, %path, "Normalized asset reference");
        }

        if let Some(cached) = self.cache.get(&path, ttl).await {
            debug!(%path, expires_at = %cached.expires_at, "Reusing signed URL");
            return Ok(cached);
        }

        let issued_at = self.clock.now();
        let expires_at = chrono::Duration::try_seconds(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX))
            .and_then(|lifetime| issued_at.checked_add_signed(lifetime))
            .ok_or(StorageError::InvalidTtl(ttl.as_secs()))?;

        let url = self
            .store
            .create_signed_url(self.normalizer.bucket(), &path, ttl)
            .await
            .map_err(|e| {
                warn!(%path, error = %e, "Signed URL generation failed");
                e
            })?;

        let signed = SignedUrl { url, path, expires_at };
        self.cache.put(signed.clone(), ttl).await;

        debug!(path = %signed.path, expires_at = %signed.expires_at, "Signed URL issued");
        Ok(signed)
    }
}

/// Periodically drop expired cache entries until the runtime shuts down.
pub fn spawn_sweeper(cache: Arc<SignedUrlCache>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let dropped = cache.purge_expired().await;
            if dropped > 0 {
                let remaining = cache.len().await;
                info!(dropped, remaining, "Swept expired signed URLs");
            }
        }
    })
}
