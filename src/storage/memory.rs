//! In-process object store
//!
//! [`MemoryStorage::serving`] backs `STORAGE_PROVIDER=memory`: it behaves
//! like the hosted bucket and refuses to sign paths it does not hold.
//! [`MemoryStorage::new`] is the fake used in tests. It records every call in
//! order so callers can assert on the exact sequence of uploads, signings and
//! removals, signs any path, and lets individual operations fail or stall.

use super::{ObjectStore, StorageError, UploadOptions};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageCall {
    Upload { path: String },
    Sign { path: String, expires_in: u64 },
    Remove { paths: Vec<String> },
}

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Bytes,
    pub content_type: String,
}

#[derive(Default)]
struct Inner {
    objects: HashMap<String, StoredObject>,
    calls: Vec<StorageCall>,
    record_calls: bool,
    require_existing: bool,
    failing_signs: HashSet<String>,
    fail_uploads: bool,
    fail_removes: bool,
    sign_delay: Option<Duration>,
    sign_counter: u64,
}

#[derive(Clone)]
pub struct MemoryStorage {
    inner: Arc<RwLock<Inner>>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::with(Inner {
            record_calls: true,
            ..Inner::default()
        })
    }

    /// Backend for local runs: no call log, unknown paths are not found.
    pub fn serving() -> Self {
        Self::with(Inner {
            require_existing: true,
            ..Inner::default()
        })
    }

    fn with(inner: Inner) -> Self {
        Self {
            inner: Arc::new(RwLock::new(inner)),
        }
    }

    /// Seed an object directly, bypassing the call log.
    pub async fn insert(&self, path: &str, data: impl Into<Bytes>) {
        let mut guard = self.inner.write().await;
        guard.objects.insert(
            path.to_string(),
            StoredObject {
                data: data.into(),
                content_type: mime::APPLICATION_OCTET_STREAM.to_string(),
            },
        );
    }

    pub async fn get(&self, path: &str) -> Option<StoredObject> {
        self.inner.read().await.objects.get(path).cloned()
    }

    pub async fn contains(&self, path: &str) -> bool {
        self.inner.read().await.objects.contains_key(path)
    }

    pub async fn calls(&self) -> Vec<StorageCall> {
        self.inner.read().await.calls.clone()
    }

    pub async fn fail_sign_for(&self, path: &str) {
        self.inner.write().await.failing_signs.insert(path.to_string());
    }

    pub async fn set_fail_uploads(&self, fail: bool) {
        self.inner.write().await.fail_uploads = fail;
    }

    pub async fn set_fail_removes(&self, fail: bool) {
        self.inner.write().await.fail_removes = fail;
    }

    pub async fn set_sign_delay(&self, delay: Duration) {
        self.inner.write().await.sign_delay = Some(delay);
    }
}

impl Inner {
    fn record(&mut self, call: StorageCall) {
        if self.record_calls {
            self.calls.push(call);
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryStorage {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        data: Bytes,
        options: &UploadOptions,
    ) -> Result<(), StorageError> {
        let mut guard = self.inner.write().await;
        guard.record(StorageCall::Upload {
            path: path.to_string(),
        });

        if guard.fail_uploads {
            return Err(StorageError::Backend {
                status: 500,
                message: format!("upload to {bucket} rejected"),
            });
        }
        if !options.upsert && guard.objects.contains_key(path) {
            return Err(StorageError::Backend {
                status: 409,
                message: "The resource already exists".to_string(),
            });
        }

        guard.objects.insert(
            path.to_string(),
            StoredObject {
                data,
                content_type: options.content_type.clone(),
            },
        );
        Ok(())
    }

    async fn create_signed_url(
        &self,
        bucket: &str,
        path: &str,
        expires_in: Duration,
    ) -> Result<String, StorageError> {
        let (delay, token) = {
            let mut guard = self.inner.write().await;
            guard.record(StorageCall::Sign {
                path: path.to_string(),
                expires_in: expires_in.as_secs(),
            });

            if guard.require_existing && !guard.objects.contains_key(path) {
                return Err(StorageError::Backend {
                    status: 404,
                    message: "Object not found".to_string(),
                });
            }
            if guard.failing_signs.contains(path) {
                return Err(StorageError::Backend {
                    status: 400,
                    message: "Object not found".to_string(),
                });
            }
            guard.sign_counter += 1;
            (guard.sign_delay, guard.sign_counter)
        };

        // Lock released so concurrent signings overlap.
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        Ok(format!(
            "memory://{bucket}/{path}?token={token}&expires_in={}",
            expires_in.as_secs()
        ))
    }

    async fn remove(&self, _bucket: &str, paths: &[String]) -> Result<(), StorageError> {
        let mut guard = self.inner.write().await;
        guard.record(StorageCall::Remove {
            paths: paths.to_vec(),
        });

        if guard.fail_removes {
            return Err(StorageError::Backend {
                status: 500,
                message: "remove rejected".to_string(),
            });
        }
        for path in paths {
            guard.objects.remove(path);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_without_upsert_refuses_overwrite() {
        let storage = MemoryStorage::new();
        let options = UploadOptions::default();

        storage
            .upload("b", "a/x.png", Bytes::from_static(b"1"), &options)
            .await
            .unwrap();
        let err = storage
            .upload("b", "a/x.png", Bytes::from_static(b"2"), &options)
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::Backend { status: 409, .. }));
        assert_eq!(storage.get("a/x.png").await.unwrap().data, Bytes::from_static(b"1"));
    }

    #[tokio::test]
    async fn test_calls_are_recorded_in_order() {
        let storage = MemoryStorage::new();
        storage
            .upload("b", "p.png", Bytes::from_static(b"1"), &UploadOptions::default())
            .await
            .unwrap();
        storage
            .create_signed_url("b", "p.png", Duration::from_secs(60))
            .await
            .unwrap();
        storage.remove("b", &["p.png".to_string()]).await.unwrap();

        assert_eq!(
            storage.calls().await,
            vec![
                StorageCall::Upload { path: "p.png".into() },
                StorageCall::Sign { path: "p.png".into(), expires_in: 60 },
                StorageCall::Remove { paths: vec!["p.png".into()] },
            ]
        );
        assert!(!storage.contains("p.png").await);
    }

    #[tokio::test]
    async fn test_serving_backend_keeps_no_log_and_signs_only_stored_objects() {
        let storage = MemoryStorage::serving();

        let err = storage
            .create_signed_url("b", "profiles/never.png", Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Backend { status: 404, .. }));

        storage
            .upload("b", "profiles/a.png", Bytes::from_static(b"1"), &UploadOptions::default())
            .await
            .unwrap();
        storage
            .create_signed_url("b", "profiles/a.png", Duration::from_secs(60))
            .await
            .unwrap();
        storage.remove("b", &["profiles/a.png".to_string()]).await.unwrap();

        assert!(storage.calls().await.is_empty());
    }
}
