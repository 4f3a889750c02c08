// Admin panel operations

use crate::db::{Record, RecordId, RecordStore, SelectQuery, Table};
use crate::storage::{AssetSaga, SaveReport, SlotFile};
use crate::types::AppResult;
use std::sync::Arc;
use tracing::info;

pub struct AdminService {
    records: Arc<dyn RecordStore>,
    saga: Arc<AssetSaga>,
}

impl AdminService {
    pub fn new(records: Arc<dyn RecordStore>, saga: Arc<AssetSaga>) -> Self {
        Self { records, saga }
    }

    /// Raw rows, newest or display order first depending on the table.
    pub async fn list(&self, table: Table) -> AppResult<Vec<Record>> {
        let mut query = SelectQuery::for_table(table);
        query.limit = None;
        self.records.select(table, &query).await
    }

    pub async fn create(&self, table: Table, fields: Record, files: Vec<SlotFile>) -> AppResult<SaveReport> {
        self.saga.save(table, None, fields, files).await
    }

    pub async fn update(
        &self,
        table: Table,
        id: &RecordId,
        fields: Record,
        files: Vec<SlotFile>,
    ) -> AppResult<SaveReport> {
        self.saga.save(table, Some(id), fields, files).await
    }

    pub async fn delete(&self, table: Table, id: &RecordId) -> AppResult<SaveReport> {
        self.saga.remove(table, id).await
    }

    pub async fn mark_read(&self, id: &RecordId) -> AppResult<Record> {
        let mut fields = Record::new();
        fields.set("read", true);
        let record = self.records.update(Table::ContactMessages, id, fields).await?;
        info!(%id, "Message marked as read");
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryRecordStore;
    use crate::storage::{
        FileUpload, MemoryStorage, ObjectNamer, PathNormalizer, SignedUrlCache, UploadCoordinator,
    };
    use crate::types::AppError;
    use crate::utils::SystemClock;
    use serde_json::json;
    use std::time::Duration;

    fn service(records: &MemoryRecordStore, storage: &MemoryStorage) -> AdminService {
        let clock = Arc::new(SystemClock);
        let uploader = UploadCoordinator::new(
            Arc::new(storage.clone()),
            PathNormalizer::new("Portfolio"),
            ObjectNamer::new(clock.clone()),
        );
        let cache = Arc::new(SignedUrlCache::new(Duration::from_secs(600), clock));
        let saga = Arc::new(AssetSaga::new(uploader, Arc::new(records.clone()), cache));
        AdminService::new(Arc::new(records.clone()), saga)
    }

    #[tokio::test]
    async fn test_create_project_with_image() {
        let records = MemoryRecordStore::new();
        let storage = MemoryStorage::new();
        let admin = service(&records, &storage);

        let fields = Record::try_from(json!({"title": "Vault", "display_order": 1})).unwrap();
        let files = vec![SlotFile::new("image_url", FileUpload::new("shot.webp", "img"))];
        let report = admin.create(Table::Projects, fields, files).await.unwrap();

        let image = report.record.str_field("image_url").unwrap();
        assert!(image.starts_with("projects/") && image.ends_with(".webp"));
        assert!(storage.contains(image).await);
        assert_eq!(admin.list(Table::Projects).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_mark_read() {
        let records = MemoryRecordStore::new();
        let admin = service(&records, &MemoryStorage::new());
        let message = records
            .insert(Table::ContactMessages, Record::try_from(json!({"subject": "Hi", "read": false})).unwrap())
            .await
            .unwrap();

        let updated = admin.mark_read(&message.id().unwrap()).await.unwrap();
        assert_eq!(updated.get("read"), Some(&json!(true)));

        let missing = admin.mark_read(&RecordId::from("77")).await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_list_is_not_limited_for_singletons() {
        let records = MemoryRecordStore::new();
        let admin = service(&records, &MemoryStorage::new());
        for name in ["a", "b"] {
            records
                .insert(Table::About, Record::try_from(json!({"title": name})).unwrap())
                .await
                .unwrap();
        }
        assert_eq!(admin.list(Table::About).await.unwrap().len(), 2);
    }
}
