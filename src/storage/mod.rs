//! Private-bucket asset storage
//!
//! Every file the portfolio serves (profile image, resume, project images,
//! certificates) lives in a private bucket and is referenced from database
//! records by a bucket-relative path. This module owns the lifecycle of those
//! references:
//!
//! - [`path`] - reduce legacy URL shapes to canonical paths
//! - [`signer`] - exchange a path for a short-lived signed URL (with a TTL-aware cache)
//! - [`upload`] - collision-resistant naming and upload
//! - [`lifecycle`] - upload -> commit -> best-effort delete of the previous asset
//! - [`resolver`] - concurrent signed-URL resolution for whole record lists
//!
//! Backends implement [`ObjectStore`]: [`SupabaseStorage`] talks to the hosted
//! storage API, [`MemoryStorage`] keeps objects in process for local runs and tests.

pub mod lifecycle;
pub mod memory;
pub mod path;
pub mod resolver;
pub mod signer;
pub mod supabase;
pub mod upload;

pub use lifecycle::{AssetSaga, SaveReport, SlotFile};
pub use memory::{MemoryStorage, StorageCall};
pub use path::{is_external, PathError, PathNormalizer};
pub use resolver::BatchResolver;
pub use signer::{SignedUrl, SignedUrlCache, SignedUrlIssuer};
pub use supabase::SupabaseStorage;
pub use upload::{FileUpload, ObjectNamer, UploadCoordinator};

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    Path(#[from] PathError),

    #[error("No file provided")]
    EmptyFile,

    #[error("{message}")]
    Backend { status: u16, message: String },

    #[error("Storage request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid storage response: {0}")]
    InvalidResponse(String),

    #[error("Signed URL lifetime of {0}s is out of range")]
    InvalidTtl(u64),

        #[error("Storage backend not configured: {0}")]
    NotConfigured(String),
}

/// Options passed with every upload.
#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub content_type: String,
    /// Seconds, sent as `cache-control: max-age=<n>`
    pub cache_control: u32,
    /// When false an existing object under the same key is an error, never overwritten.
    pub upsert: bool,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            content_type: mime::APPLICATION_OCTET_STREAM.to_string(),
            cache_control: 3600,
            upsert: false,
        }
    }
}

/// Bucket-scoped object storage backend.
///
/// All paths are canonical (already normalized) bucket-relative keys.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        data: Bytes,
        options: &UploadOptions,
    ) -> Result<(), StorageError>;

    /// Absolute URL granting read access to `path` for `expires_in`.
    async fn create_signed_url(
        &self,
        bucket: &str,
        path: &str,
        expires_in: Duration,
    ) -> Result<String, StorageError>;

    async fn remove(&self, bucket: &str, paths: &[String]) -> Result<(), StorageError>;
}
