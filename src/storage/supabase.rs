// Supabase Storage adapter
// REST reference: https://supabase.com/docs/reference/api (storage/v1)
//
// Endpoints used:
//   POST   /storage/v1/object/{bucket}/{path}        upload (x-upsert controls overwrite)
//   POST   /storage/v1/object/sign/{bucket}/{path}   create signed URL
//   DELETE /storage/v1/object/{bucket}               remove {"prefixes": [...]}

use super::{ObjectStore, StorageError, UploadOptions};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub struct SupabaseStorage {
    client: Client,
    base_url: Url,
    api_key: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignRequest {
    expires_in: u64,
}

#[derive(Deserialize)]
struct SignResponse {
    #[serde(rename = "signedURL", alias = "signedUrl")]
    signed_url: String,
}

#[derive(Serialize)]
struct RemoveRequest<'a> {
    prefixes: &'a [String],
}

#[derive(Deserialize)]
struct StorageErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl SupabaseStorage {
    pub fn new(project_url: &str, api_key: &str) -> Result<Self, StorageError> {
        let base_url = Url::parse(project_url.trim_end_matches('/'))
            .map_err(|e| StorageError::NotConfigured(format!("invalid SUPABASE_URL {project_url:?}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(StorageError::NotConfigured(format!(
                "SUPABASE_URL {project_url:?} cannot be used as a base URL"
            )));
        }

        Ok(Self {
            client: Client::new(),
            base_url,
            api_key: api_key.to_string(),
        })
    }

    /// `{base}/storage/v1/{prefix..}/{bucket}/{path..}` with every segment percent-encoded.
    fn endpoint(&self, prefix: &[&str], bucket: &str, path: Option<&str>) -> Result<Url, StorageError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| StorageError::NotConfigured("SUPABASE_URL cannot be a base".to_string()))?;
            segments.pop_if_empty().extend(["storage", "v1"]).extend(prefix).push(bucket);
            if let Some(path) = path {
                segments.extend(path.split('/'));
            }
        }
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
    }

    /// The sign endpoint answers with a path relative to `/storage/v1`.
    fn absolute_signed_url(&self, signed: &str) -> String {
        if signed.starts_with("http://") || signed.starts_with("https://") {
            return signed.to_string();
        }
        let base = self.base_url.as_str().trim_end_matches('/');
        if signed.starts_with('/') {
            format!("{base}/storage/v1{signed}")
        } else {
            format!("{base}/storage/v1/{signed}")
        }
    }

    async fn check(response: Response) -> Result<Response, StorageError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<StorageErrorBody>(&text)
            .ok()
            .and_then(|body| body.message.or(body.error))
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| {
                if text.is_empty() {
                    status.canonical_reason().unwrap_or("storage error").to_string()
                } else {
                    text
                }
            });

        Err(StorageError::Backend {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl ObjectStore for SupabaseStorage {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        data: Bytes,
        options: &UploadOptions,
    ) -> Result<(), StorageError> {
        let url = self.endpoint(&["object"], bucket, Some(path))?;
        debug!(%url, bytes = data.len(), "Uploading object");

        let response = self
            .authorized(self.client.post(url))
            .header("Content-Type", &options.content_type)
            .header("cache-control", format!("max-age={}", options.cache_control))
            .header("x-upsert", options.upsert.to_string())
            .body(data)
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }

    async fn create_signed_url(
        &self,
        bucket: &str,
        path: &str,
        expires_in: Duration,
    ) -> Result<String, StorageError> {
        let url = self.endpoint(&["object", "sign"], bucket, Some(path))?;

        let response = self
            .authorized(self.client.post(url))
            .json(&SignRequest {
                expires_in: expires_in.as_secs(),
            })
            .send()
            .await?;

        let body: SignResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| StorageError::InvalidResponse(format!("sign response: {e}")))?;

        Ok(self.absolute_signed_url(&body.signed_url))
    }

    async fn remove(&self, bucket: &str, paths: &[String]) -> Result<(), StorageError> {
        let url = self.endpoint(&["object"], bucket, None)?;

        let response = self
            .authorized(self.client.delete(url))
            .json(&RemoveRequest { prefixes: paths })
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }
}
