use crate::config::{Config, StorageProvider};
use crate::db::{self, MemoryRecordStore, PgRecordStore, RecordStore};
use crate::notify::{EmailNotifier, NoopNotifier, Notifier};
use crate::portfolio::{AdminService, ContactService};
use crate::storage::{
    AssetSaga, BatchResolver, MemoryStorage, ObjectNamer, ObjectStore, PathNormalizer, SignedUrl,
    SignedUrlCache, SignedUrlIssuer, StorageError, SupabaseStorage, UploadCoordinator,
};
use crate::utils::{Clock, SystemClock};
use anyhow::{Context, Result};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub records: Arc<dyn RecordStore>,
    pub issuer: SignedUrlIssuer,
    pub uploader: UploadCoordinator,
    pub resolver: BatchResolver,
    pub admin: Arc<AdminService>,
    pub contact: Arc<ContactService>,
    pub contact_limiter: Arc<DefaultDirectRateLimiter>,
}

impl AppState {
    /// Connect the configured backends.
    pub async fn connect(config: Config) -> Result<Self> {
        let records: Arc<dyn RecordStore> = match &config.database.url {
            Some(url) => {
                let pool = db::create_pool(&config.database, url).await?;
                info!("Connected to PostgreSQL");
                Arc::new(PgRecordStore::new(pool))
            }
            None => {
                warn!("DATABASE_URL not set, keeping records in memory");
                Arc::new(MemoryRecordStore::new())
            }
        };

        let objects: Arc<dyn ObjectStore> = match config.storage.provider {
            StorageProvider::Supabase => {
                let (Some(url), Some(key)) = (&config.storage.supabase_url, &config.storage.supabase_key) else {
                    anyhow::bail!("SUPABASE_URL and SUPABASE_KEY must be set");
                };
                Arc::new(SupabaseStorage::new(url, key).context("Failed to create storage client")?)
            }
            StorageProvider::Memory => {
                warn!("Using in-memory object storage");
                Arc::new(MemoryStorage::serving())
            }
        };

        let notifier: Arc<dyn Notifier> = match EmailNotifier::from_config(&config.email)? {
            Some(email) => Arc::new(email),
            None => {
                info!("SMTP not configured, contact notifications disabled");
                Arc::new(NoopNotifier)
            }
        };

        Ok(Self::from_parts(config, records, objects, notifier, Arc::new(SystemClock)))
    }

    /// Wire the services around already constructed backends.
    pub fn from_parts(
        config: Config,
        records: Arc<dyn RecordStore>,
        objects: Arc<dyn ObjectStore>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let normalizer = PathNormalizer::new(config.storage.bucket.clone());
        let cache = Arc::new(SignedUrlCache::new(config.storage.refresh_margin(), clock.clone()));
        let issuer = SignedUrlIssuer::new(objects.clone(), normalizer.clone(), cache.clone(), clock.clone());
        let uploader = UploadCoordinator::new(objects, normalizer, ObjectNamer::new(clock));
        let resolver = BatchResolver::new(issuer.clone(), config.storage.signed_url_ttl());
        let saga = Arc::new(AssetSaga::new(uploader.clone(), records.clone(), cache));

        let per_minute = NonZeroU32::new(config.contact.rate_per_minute).unwrap_or(NonZeroU32::MIN);
        let contact_limiter = Arc::new(RateLimiter::direct(Quota::per_minute(per_minute)));

        Self {
            admin: Arc::new(AdminService::new(records.clone(), saga)),
            contact: Arc::new(ContactService::new(records.clone(), notifier)),
            config,
            records,
            issuer,
            uploader,
            resolver,
            contact_limiter,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub database: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignRequest {
    pub path: String,
    /// Seconds; the configured TTL when absent
    pub expires_in: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeleteRequest {
    #[serde(default)]
    pub path: Option<String>,
}

/// Result body of the storage endpoints: `success` plus either the payload or `error`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StorageOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StorageOutcome {
    pub fn signed(signed: SignedUrl) -> Self {
        Self {
            success: true,
            url: Some(signed.url),
            path: Some(signed.path),
            expires_at: Some(signed.expires_at),
            ..Self::default()
        }
    }

    /// Uploads report the canonical path as `url` too; readers sign it later.
    pub fn uploaded(path: String) -> Self {
        Self {
            success: true,
            url: Some(path.clone()),
            path: Some(path),
            ..Self::default()
        }
    }

    pub fn deleted() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn failed(error: &StorageError) -> (StatusCode, Self) {
        let status = match error {
            StorageError::Path(_) | StorageError::EmptyFile | StorageError::InvalidTtl(_) => {
                StatusCode::BAD_REQUEST
            }
            StorageError::Backend { status: 404, .. } => StatusCode::NOT_FOUND,
            _ => StatusCode::BAD_GATEWAY,
        };
        (
            status,
            Self {
                success: false,
                error: Some(error.to_string()),
                ..Self::default()
            },
        )
    }
}
