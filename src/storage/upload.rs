//! Upload coordination
//!
//! Object keys are `{folder}/{unix_millis}_{token}.{ext}`. The timestamp plus
//! a random token makes collisions practically impossible without any
//! coordination; if one does happen the upload fails (uploads never upsert)
//! instead of silently replacing someone else's file.
//!
//! The coordinator returns the canonical path only. The bucket is private,
//! so readers always go through the signed URL issuer.

use super::{ObjectStore, PathNormalizer, StorageError, UploadOptions};
use crate::utils::Clock;
use bytes::Bytes;
use rand::{distributions::Alphanumeric, Rng};
use std::sync::Arc;
use tracing::{info, warn};

const DEFAULT_FOLDER: &str = "uploads";
const FALLBACK_EXTENSION: &str = "bin";
const TOKEN_LEN: usize = 6;

/// A file received from a form, ready to be stored.
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl FileUpload {
    pub fn new(file_name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: None,
            data: data.into(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Lowercased extension of the original file name, if it has one.
    pub fn extension(&self) -> Option<String> {
        let name = self.file_name.rsplit(['/', '\\']).next().unwrap_or_default();
        let (stem, ext) = name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }

    fn resolved_content_type(&self) -> String {
        self.content_type
            .clone()
            .filter(|ct| !ct.trim().is_empty())
            .unwrap_or_else(|| {
                mime_guess::from_path(&self.file_name)
                    .first_or_octet_stream()
                    .to_string()
            })
    }
}

/// Generates collision-resistant object keys.
#[derive(Clone)]
pub struct ObjectNamer {
    clock: Arc<dyn Clock>,
}

impl ObjectNamer {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    pub fn object_key(&self, folder: &str, file: &FileUpload) -> String {
        let folder = folder.trim_matches('/');
        let folder = if folder.is_empty() { DEFAULT_FOLDER } else { folder };
        let millis = self.clock.now().timestamp_millis();
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LEN)
            .map(|b| char::from(b).to_ascii_lowercase())
            .collect();
        let ext = file.extension().unwrap_or_else(|| FALLBACK_EXTENSION.to_string());

        format!("{folder}/{millis}_{token}.{ext}")
    }
}

#[derive(Clone)]
pub struct UploadCoordinator {
    store: Arc<dyn ObjectStore>,
    normalizer: PathNormalizer,
    namer: ObjectNamer,
}

impl UploadCoordinator {
    pub fn new(store: Arc<dyn ObjectStore>, normalizer: PathNormalizer, namer: ObjectNamer) -> Self {
        Self {
            store,
            normalizer,
            namer,
        }
    }

    pub fn normalizer(&self) -> &PathNormalizer {
        &self.normalizer
    }

    /// Store `file` under `folder` and return its canonical path.
    pub async fn upload(&self, file: &FileUpload, folder: &str) -> Result<String, StorageError> {
        if file.data.is_empty() {
            return Err(StorageError::EmptyFile);
        }

        let key = self.namer.object_key(folder, file);
        // Keys are generated canonical already; this guards against odd folder input.
        let path = self.normalizer.normalize(&key)?;
        let options = UploadOptions {
            content_type: file.resolved_content_type(),
            ..UploadOptions::default()
        };

        info!(%path, original = %file.file_name, bytes = file.data.len(), "Uploading file");
        match self
            .store
            .upload(self.normalizer.bucket(), &path, file.data.clone(), &options)
            .await
        {
            Ok(()) => {
                info!(%path, "File uploaded");
                Ok(path)
            }
            Err(e) => {
                warn!(%path, error = %e, "Upload failed");
                Err(e)
            }
        }
    }

    /// Best-effort removal of a stored object by any reference shape.
    pub async fn delete(&self, reference: &str) -> Result<String, StorageError> {
        let path = self.normalizer.normalize(reference)?;
        info!(%path, "Deleting file");
        self.store
            .remove(self.normalizer.bucket(), std::slice::from_ref(&path))
            .await?;
        Ok(path)
    }
}
