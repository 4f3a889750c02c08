//! Replace and delete choreography for files attached to records
//!
//! A save runs three strictly sequential steps:
//!
//! 1. upload every new file for the table's asset slots
//! 2. commit the record with the new paths
//! 3. delete the objects the commit replaced
//!
//! A failure in step 1 returns before the database is touched. A failure in
//! step 2 leaves the fresh uploads orphaned and never touches the previous
//! assets. A failure in step 3 is logged and the save still succeeds, so a
//! record never points at a deleted object.

use super::{is_external, FileUpload, PathNormalizer, SignedUrlCache, UploadCoordinator};
use crate::db::{AssetSlot, Record, RecordId, RecordStore, SelectQuery, Table};
use crate::types::{AppError, AppResult};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// A file submitted for one asset slot of a record.
#[derive(Debug, Clone)]
pub struct SlotFile {
    pub field: String,
    pub file: FileUpload,
}

impl SlotFile {
    pub fn new(field: impl Into<String>, file: FileUpload) -> Self {
        Self {
            field: field.into(),
            file,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SaveReport {
    pub record: Record,
    /// Paths written to the bucket by this save
    pub uploaded: Vec<String>,
    /// Previous objects removed after the commit
    pub deleted: Vec<String>,
    /// Objects left in the bucket without a record pointing at them
    pub orphaned: Vec<String>,
}

pub struct AssetSaga {
    uploader: UploadCoordinator,
    records: Arc<dyn RecordStore>,
    cache: Arc<SignedUrlCache>,
}

impl AssetSaga {
    pub fn new(uploader: UploadCoordinator, records: Arc<dyn RecordStore>, cache: Arc<SignedUrlCache>) -> Self {
        Self {
            uploader,
            records,
            cache,
        }
    }

    fn normalizer(&self) -> &PathNormalizer {
        self.uploader.normalizer()
    }

    /// Create (`id == None`) or update a record, uploading `files` into their slots.
    ///
    /// Singleton tables update their existing row when no id is given.
    pub async fn save(
        &self,
        table: Table,
        id: Option<&RecordId>,
        mut fields: Record,
        files: Vec<SlotFile>,
    ) -> AppResult<SaveReport> {
        let slots = files
            .iter()
            .map(|f| {
                table.asset_slot(&f.field).ok_or_else(|| {
                    AppError::InvalidRequest(format!("{table} has no file field {:?}", f.field))
                })
            })
            .collect::<AppResult<Vec<&AssetSlot>>>()?;
        let mut fields_seen = HashSet::new();
        if let Some(duplicate) = slots.iter().find(|slot| !fields_seen.insert(slot.field)) {
            return Err(AppError::InvalidRequest(format!(
                "{table} file field {:?} submitted more than once",
                duplicate.field
            )));
        }

        let mut target = self.target_id(table, id).await?;
        if let Some(id) = &target {
            if self.records.get(table, id).await?.is_none() {
                return Err(AppError::NotFound(format!("{table} {id}")));
            }
        }

        // Signed URLs are view annotations, never stored.
        fields.0.retain(|key, _| !key.starts_with("signed_"));

        // Step 1: uploads
        let mut report = SaveReport::default();
        for (slot, slot_file) in slots.iter().zip(&files) {
            match self.uploader.upload(&slot_file.file, slot.folder).await {
                Ok(path) => {
                    fields.set(slot.field, path.clone());
                    report.uploaded.push(path);
                }
                Err(source) => {
                    if !report.uploaded.is_empty() {
                        warn!(%table, orphaned = ?report.uploaded, "Save aborted after partial upload");
                    }
                    return Err(AppError::Upload {
                        field: slot.field.to_string(),
                        source,
                    });
                }
            }
        }

        // The previous references are read right before the commit.
        if target.is_none() {
            target = self.target_id(table, None).await?;
        }
        let previous = match &target {
            Some(id) => self
                .records
                .get(table, id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("{table} {id}")))?,
            None => Record::new(),
        };
        for slot in &slots {
            if let Some(legacy) = slot.legacy_field {
                if previous.str_field(legacy).is_some() {
                    fields.set(legacy, Value::Null);
                }
            }
        }
        let touched: Vec<&AssetSlot> = table
            .asset_slots()
            .iter()
            .filter(|slot| {
                fields.contains(slot.field) || slot.legacy_field.is_some_and(|legacy| fields.contains(legacy))
            })
            .collect();

        // Step 2: commit
        let committed = match &target {
            Some(id) => self.records.update(table, id, fields).await,
            None => self.records.insert(table, fields).await,
        };
        let committed = match committed {
            Ok(record) => record,
            Err(e) => {
                error!(%table, error = %e, orphaned = ?report.uploaded, "Record commit failed");
                report.orphaned = report.uploaded.clone();
                return Err(e);
            }
        };
        info!(%table, id = ?committed.id(), uploaded = report.uploaded.len(), "Record saved");

        // Step 3: cleanup
        let stale = self.stale_references(table.asset_slots(), &touched, &previous, &committed);
        report.record = committed;
        self.cleanup(stale, &mut report).await;
        Ok(report)
    }

    /// Delete a record, then its own assets.
    pub async fn remove(&self, table: Table, id: &RecordId) -> AppResult<SaveReport> {
        let previous = self
            .records
            .get(table, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{table} {id}")))?;

        self.records.delete(table, id).await?;
        info!(%table, %id, "Record deleted");

        let all: Vec<&AssetSlot> = table.asset_slots().iter().collect();
        let stale = self.stale_references(table.asset_slots(), &all, &previous, &Record::new());
        let mut report = SaveReport {
            record: previous,
            ..SaveReport::default()
        };
        self.cleanup(stale, &mut report).await;
        Ok(report)
    }

    async fn target_id(&self, table: Table, id: Option<&RecordId>) -> AppResult<Option<RecordId>> {
        if let Some(id) = id {
            return Ok(Some(id.clone()));
        }
        if !table.is_singleton() {
            return Ok(None);
        }
        let existing = self.records.select(table, &SelectQuery::for_table(table)).await?;
        Ok(existing.first().and_then(Record::id))
    }

    /// Our previous references in `touched` slots that `current` no longer uses.
    ///
    /// Both the current and the legacy column of a slot count, so a legacy
    /// object nulled by this save is cleaned up too.
    fn stale_references(
        &self,
        all: &[AssetSlot],
        touched: &[&AssetSlot],
        previous: &Record,
        current: &Record,
    ) -> Vec<String> {
        let normalizer = self.normalizer();
        let in_use: HashSet<String> = all
            .iter()
            .flat_map(|slot| slot.references(current))
            .filter_map(|r| normalizer.normalize(r).ok())
            .collect();

        let mut seen = HashSet::new();
        touched
            .iter()
            .flat_map(|slot| slot.references(previous))
            .filter_map(|old| normalizer.normalize(old).ok())
            .filter(|path| {
                if is_external(path) {
                    debug!(reference = %path, "Skipping external asset");
                    return false;
                }
                !in_use.contains(path) && seen.insert(path.clone())
            })
            .collect()
    }

    async fn cleanup(&self, stale: Vec<String>, report: &mut SaveReport) {
        for path in stale {
            match self.uploader.delete(&path).await {
                Ok(path) => {
                    self.cache.invalidate(&path).await;
                    info!(%path, "Deleted replaced asset");
                    report.deleted.push(path);
                }
                Err(e) => {
                    warn!(%path, error = %e, "Could not delete replaced asset, leaving it orphaned");
                    report.orphaned.push(path);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryRecordStore;
    use crate::storage::{MemoryStorage, ObjectNamer, SignedUrlIssuer, StorageCall};
    use crate::utils::SystemClock;
    use serde_json::json;
    use std::time::Duration;

    struct Harness {
        storage: MemoryStorage,
        records: MemoryRecordStore,
        issuer: SignedUrlIssuer,
        saga: AssetSaga,
    }

    fn harness() -> Harness {
        let storage = MemoryStorage::new();
        let records = MemoryRecordStore::new();
        let normalizer = PathNormalizer::new("Portfolio");
        let clock = Arc::new(SystemClock);
        let cache = Arc::new(SignedUrlCache::new(Duration::from_secs(600), clock.clone()));
        let issuer = SignedUrlIssuer::new(Arc::new(storage.clone()), normalizer.clone(), cache.clone(), clock.clone());
        let uploader = UploadCoordinator::new(Arc::new(storage.clone()), normalizer, ObjectNamer::new(clock));
        let saga = AssetSaga::new(uploader, Arc::new(records.clone()), cache);
        Harness {
            storage,
            records,
            issuer,
            saga,
        }
    }

    fn record(value: Value) -> Record {
        Record::try_from(value).unwrap()
    }

    fn image() -> Vec<SlotFile> {
        vec![SlotFile::new("image_url", FileUpload::new("new.png", "png-bytes"))]
    }

    async fn seed_project(h: &Harness, image_url: &str) -> RecordId {
        h.storage.insert("projects/old_123.png", "old").await;
        h.records
            .insert(Table::Projects, record(json!({"title": "Vault", "image_url": image_url})))
            .await
            .unwrap()
            .id()
            .unwrap()
    }

    #[tokio::test]
    async fn test_replace_project_image() {
        let h = harness();
        let id = seed_project(&h, "projects/old_123.png").await;

        let report = h
            .saga
            .save(Table::Projects, Some(&id), record(json!({"title": "Vault"})), image())
            .await
            .unwrap();

        let new_path = report.uploaded[0].clone();
        assert!(new_path.starts_with("projects/") && new_path.ends_with(".png"));
        assert_eq!(report.record.str_field("image_url"), Some(new_path.as_str()));
        assert_eq!(report.deleted, vec!["projects/old_123.png".to_string()]);
        assert_eq!(
            h.storage.calls().await,
            vec![
                StorageCall::Upload { path: new_path.clone() },
                StorageCall::Remove { paths: vec!["projects/old_123.png".into()] },
            ]
        );
        assert!(!h.storage.contains("projects/old_123.png").await);
    }

    #[tokio::test]
    async fn test_failed_upload_leaves_record_untouched() {
        let h = harness();
        let id = seed_project(&h, "projects/old_123.png").await;
        h.storage.set_fail_uploads(true).await;

        let err = h
            .saga
            .save(Table::Projects, Some(&id), record(json!({"title": "Renamed"})), image())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Upload { ref field, .. } if field == "image_url"));
        let stored = h.records.get(Table::Projects, &id).await.unwrap().unwrap();
        assert_eq!(stored.str_field("title"), Some("Vault"));
        assert_eq!(stored.str_field("image_url"), Some("projects/old_123.png"));
        assert!(h.storage.contains("projects/old_123.png").await);
        assert!(!h
            .storage
            .calls()
            .await
            .iter()
            .any(|c| matches!(c, StorageCall::Remove { .. })));
    }

    #[tokio::test]
    async fn test_failed_commit_never_deletes_old_asset() {
        let h = harness();
        let id = seed_project(&h, "projects/old_123.png").await;
        h.records.set_fail_writes(true).await;

        let result = h.saga.save(Table::Projects, Some(&id), Record::new(), image()).await;

        assert!(result.is_err());
        assert!(h.storage.contains("projects/old_123.png").await);
        let calls = h.storage.calls().await;
        assert_eq!(calls.len(), 1);
        assert!(matches!(calls[0], StorageCall::Upload { .. }));
    }

    #[tokio::test]
    async fn test_failed_cleanup_still_saves() {
        let h = harness();
        let id = seed_project(&h, "projects/old_123.png").await;
        h.storage.set_fail_removes(true).await;

        let report = h.saga.save(Table::Projects, Some(&id), Record::new(), image()).await.unwrap();

        assert!(report.deleted.is_empty());
        assert_eq!(report.orphaned, vec!["projects/old_123.png".to_string()]);
        let stored = h.records.get(Table::Projects, &id).await.unwrap().unwrap();
        assert_eq!(stored.str_field("image_url"), Some(report.uploaded[0].as_str()));
    }

    #[tokio::test]
    async fn test_external_reference_is_never_deleted() {
        let h = harness();
        let id = seed_project(&h, "https://images.example.com/shot.png").await;

        let report = h.saga.save(Table::Projects, Some(&id), Record::new(), image()).await.unwrap();

        assert!(report.deleted.is_empty());
        assert!(report.orphaned.is_empty());
        assert_eq!(h.storage.calls().await.len(), 1);
    }

    #[tokio::test]
    async fn test_slots_without_files_are_untouched() {
        let h = harness();
        h.storage.insert("certificates/cert.pdf", "pdf").await;
        let id = h
            .records
            .insert(
                Table::Certificates,
                record(json!({"certificate_url": "certificates/cert.pdf", "image_url": "certificates/old.png"})),
            )
            .await
            .unwrap()
            .id()
            .unwrap();

        let report = h.saga.save(Table::Certificates, Some(&id), Record::new(), image()).await.unwrap();

        assert_eq!(report.record.str_field("certificate_url"), Some("certificates/cert.pdf"));
        assert_eq!(report.deleted, vec!["certificates/old.png".to_string()]);
        assert!(h.storage.contains("certificates/cert.pdf").await);
    }

    #[tokio::test]
    async fn test_legacy_profile_image_is_replaced() {
        let h = harness();
        h.records
            .insert(
                Table::Profile,
                record(json!({
                    "name": "Ada",
                    "profile_image": "https://x.supabase.co/storage/v1/object/public/Portfolio/profiles/old.png"
                })),
            )
            .await
            .unwrap();
        let files = vec![SlotFile::new("profile_image_url", FileUpload::new("me.jpg", "jpg"))];

        let report = h.saga.save(Table::Profile, None, Record::new(), files).await.unwrap();

        assert_eq!(report.deleted, vec!["profiles/old.png".to_string()]);
        assert_eq!(report.record.get("profile_image"), Some(&Value::Null));
        assert_eq!(h.records.rows(Table::Profile).await.len(), 1);
    }

    #[tokio::test]
    async fn test_replacing_profile_image_also_removes_legacy_object() {
        let h = harness();
        h.records
            .insert(
                Table::Profile,
                record(json!({
                    "name": "Ada",
                    "profile_image_url": "profiles/current.png",
                    "profile_image": "profiles/legacy.png"
                })),
            )
            .await
            .unwrap();
        let files = vec![SlotFile::new("profile_image_url", FileUpload::new("me.jpg", "jpg"))];

        let report = h.saga.save(Table::Profile, None, Record::new(), files).await.unwrap();

        assert_eq!(
            report.deleted,
            vec!["profiles/current.png".to_string(), "profiles/legacy.png".to_string()]
        );
        assert!(report.orphaned.is_empty());
        assert_eq!(report.record.get("profile_image"), Some(&Value::Null));
    }

    #[tokio::test]
    async fn test_rejects_duplicate_file_field() {
        let h = harness();
        let id = seed_project(&h, "projects/old_123.png").await;
        let files = vec![
            SlotFile::new("image_url", FileUpload::new("a.png", "a")),
            SlotFile::new("image_url", FileUpload::new("b.png", "b")),
        ];

        let err = h.saga.save(Table::Projects, Some(&id), Record::new(), files).await.unwrap_err();

        assert!(matches!(err, AppError::InvalidRequest(_)));
        assert!(h.storage.calls().await.is_empty());
        let stored = h.records.get(Table::Projects, &id).await.unwrap().unwrap();
        assert_eq!(stored.str_field("image_url"), Some("projects/old_123.png"));
    }

    #[tokio::test]
    async fn test_resubmitted_reference_is_not_deleted() {
        let h = harness();
        let id = seed_project(&h, "projects/old_123.png").await;
        let fields = record(json!({
            "image_url": "Portfolio/projects/old_123.png",
            "signed_image_url": "memory://Portfolio/projects/old_123.png?token=1"
        }));

        let report = h.saga.save(Table::Projects, Some(&id), fields, Vec::new()).await.unwrap();

        assert!(report.deleted.is_empty());
        assert!(!report.record.contains("signed_image_url"));
        assert!(h.storage.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_deleted_path_leaves_signed_url_cache() {
        let h = harness();
        let id = seed_project(&h, "projects/old_123.png").await;
        h.issuer.issue("projects/old_123.png", Duration::from_secs(3600)).await.unwrap();
        assert_eq!(h.issuer.cache().len().await, 1);

        h.saga.save(Table::Projects, Some(&id), Record::new(), image()).await.unwrap();

        assert!(h.issuer.cache().is_empty().await);
    }

    #[tokio::test]
    async fn test_remove_record_cleans_up_assets() {
        let h = harness();
        let id = seed_project(&h, "projects/old_123.png").await;

        let report = h.saga.remove(Table::Projects, &id).await.unwrap();

        assert_eq!(report.deleted, vec!["projects/old_123.png".to_string()]);
        assert!(h.records.get(Table::Projects, &id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejects_unknown_file_field() {
        let h = harness();
        let files = vec![SlotFile::new("logo", FileUpload::new("a.png", "x"))];

        let err = h.saga.save(Table::Skills, None, Record::new(), files).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));
        assert!(h.storage.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_update_of_missing_record_uploads_nothing() {
        let h = harness();
        let err = h
            .saga
            .save(Table::Projects, Some(&RecordId::from("404")), Record::new(), image())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::NotFound(_)));
        assert!(h.storage.calls().await.is_empty());
    }
}
