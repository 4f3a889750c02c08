//! In-process record store
//!
//! Backs the service when no `DATABASE_URL` is configured and stands in for
//! PostgreSQL in tests. Ids are generated sequentially and filters compare
//! the textual form of values, matching how the SQL adapter compares `id`.

use super::{Record, RecordId, RecordStore, SelectQuery, SortOrder, Table};
use crate::types::{AppError, AppResult};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Inner {
    tables: HashMap<Table, Vec<Record>>,
    next_id: u64,
    failing_reads: HashSet<Table>,
    fail_writes: bool,
}

#[derive(Clone, Default)]
pub struct MemoryRecordStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every read of `table` fail.
    pub async fn fail_reads_for(&self, table: Table) {
        self.inner.write().await.failing_reads.insert(table);
    }

    /// Make inserts, updates and deletes fail.
    pub async fn set_fail_writes(&self, fail: bool) {
        self.inner.write().await.fail_writes = fail;
    }

    pub async fn rows(&self, table: Table) -> Vec<Record> {
        self.inner
            .read()
            .await
            .tables
            .get(&table)
            .cloned()
            .unwrap_or_default()
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn matches(record: &Record, filters: &[(String, Value)]) -> bool {
    filters.iter().all(|(column, expected)| {
        let actual = record.get(column).and_then(as_text);
        actual == as_text(expected)
    })
}

/// Nulls sort last in both directions, like `NULLS LAST`.
fn compare(a: Option<&Value>, b: Option<&Value>, order: SortOrder) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    let ordering = match (a, b) {
        (None, None) => return Ordering::Equal,
        (None, Some(_)) => return Ordering::Greater,
        (Some(_), None) => return Ordering::Less,
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or_default(), y.as_f64().unwrap_or_default());
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(x), Some(y)) => as_text(x).cmp(&as_text(y)),
    };
    match order {
        SortOrder::Asc => ordering,
        SortOrder::Desc => ordering.reverse(),
    }
}

fn write_rejected(table: Table) -> AppError {
    AppError::Internal(format!("write to {table} rejected"))
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn select(&self, table: Table, query: &SelectQuery) -> AppResult<Vec<Record>> {
        let guard = self.inner.read().await;
        if guard.failing_reads.contains(&table) {
            return Err(AppError::Internal(format!("read of {table} rejected")));
        }

        let mut rows: Vec<Record> = guard
            .tables
            .get(&table)
            .map(|rows| rows.iter().filter(|r| matches(r, &query.filters)).cloned().collect())
            .unwrap_or_default();

        if let Some((column, order)) = &query.order {
            rows.sort_by(|a, b| compare(a.get(column), b.get(column), *order));
        }
        if let Some(limit) = query.limit {
            rows.truncate(usize::try_from(limit).unwrap_or(0));
        }
        Ok(rows)
    }

    async fn get(&self, table: Table, id: &RecordId) -> AppResult<Option<Record>> {
        let query = SelectQuery::all().eq("id", id.0.clone()).limit(1);
        Ok(self.select(table, &query).await?.into_iter().next())
    }

    async fn insert(&self, table: Table, mut fields: Record) -> AppResult<Record> {
        let mut guard = self.inner.write().await;
        if guard.fail_writes {
            return Err(write_rejected(table));
        }

        if fields.id().is_none() {
            guard.next_id += 1;
            fields.set("id", guard.next_id);
        }
        if !fields.contains("created_at") {
            fields.set("created_at", Utc::now().to_rfc3339());
        }

        guard.tables.entry(table).or_default().push(fields.clone());
        Ok(fields)
    }

    async fn update(&self, table: Table, id: &RecordId, mut fields: Record) -> AppResult<Record> {
        let mut guard = self.inner.write().await;
        if guard.fail_writes {
            return Err(write_rejected(table));
        }

        fields.remove("id");
        let row = guard
            .tables
            .get_mut(&table)
            .and_then(|rows| rows.iter_mut().find(|r| r.id().as_ref() == Some(id)))
            .ok_or_else(|| AppError::NotFound(format!("{table} {id}")))?;
        row.merge(fields);
        Ok(row.clone())
    }

    async fn delete(&self, table: Table, id: &RecordId) -> AppResult<()> {
        let mut guard = self.inner.write().await;
        if guard.fail_writes {
            return Err(write_rejected(table));
        }

        let rows = guard.tables.entry(table).or_default();
        let before = rows.len();
        rows.retain(|r| r.id().as_ref() != Some(id));
        if rows.len() == before {
            return Err(AppError::NotFound(format!("{table} {id}")));
        }
        Ok(())
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    fn record(value: Value) -> Record {
        Record::try_from(value).unwrap()
    }

    #[tokio::test]
    async fn test_insert_assigns_ids() {
        let store = MemoryRecordStore::new();
        let a = store.insert(Table::Skills, record(json!({"name": "Rust"}))).await.unwrap();
        let b = store.insert(Table::Skills, record(json!({"name": "SQL"}))).await.unwrap();

        assert_eq!(a.id(), Some(RecordId::from("1")));
        assert_eq!(b.id(), Some(RecordId::from("2")));
        assert!(a.contains("created_at"));
    }

    #[tokio::test]
    async fn test_select_filters_orders_and_limits() {
        let store = MemoryRecordStore::new();
        for (title, order, featured) in [("b", 2, true), ("a", 1, false), ("c", 3, true), ("d", 0, true)] {
            store
                .insert(
                    Table::Projects,
                    record(json!({"title": title, "display_order": order, "featured": featured})),
                )
                .await
                .unwrap();
        }

        let query = SelectQuery::for_table(Table::Projects).eq("featured", true).limit(2);
        let rows = store.select(Table::Projects, &query).await.unwrap();
        let titles: Vec<_> = rows.iter().filter_map(|r| r.str_field("title")).collect();
        assert_eq!(titles, vec!["d", "b"]);
    }

    #[tokio::test]
    async fn test_nulls_sort_last() {
        let store = MemoryRecordStore::new();
        store.insert(Table::Education, record(json!({"start_year": null}))).await.unwrap();
        store.insert(Table::Education, record(json!({"start_year": 2015}))).await.unwrap();
        store.insert(Table::Education, record(json!({"start_year": 2019}))).await.unwrap();

        let rows = store
            .select(Table::Education, &SelectQuery::for_table(Table::Education))
            .await
            .unwrap();
        let years: Vec<_> = rows.iter().map(|r| r.get("start_year").cloned()).collect();
        assert_eq!(years, vec![Some(json!(2019)), Some(json!(2015)), Some(Value::Null)]);
    }

    #[tokio::test]
    async fn test_update_merges_fields() {
        let store = MemoryRecordStore::new();
        let row = store
            .insert(Table::Projects, record(json!({"title": "x", "image_url": "projects/a.png"})))
            .await
            .unwrap();
        let id = row.id().unwrap();

        let updated = store
            .update(Table::Projects, &id, record(json!({"id": 99, "image_url": "projects/b.png"})))
            .await
            .unwrap();

        assert_eq!(updated.id(), Some(id));
        assert_eq!(updated.str_field("title"), Some("x"));
        assert_eq!(updated.str_field("image_url"), Some("projects/b.png"));
    }

    #[tokio::test]
    async fn test_missing_rows() {
        let store = MemoryRecordStore::new();
        let id = RecordId::from("42");

        assert!(store.get(Table::Skills, &id).await.unwrap().is_none());
        assert!(matches!(
            store.update(Table::Skills, &id, Record::new()).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(store.delete(Table::Skills, &id).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let store = MemoryRecordStore::new();
        store.fail_reads_for(Table::Skills).await;
        assert_err!(store.select(Table::Skills, &SelectQuery::all()).await);
        assert_ok!(store.select(Table::Projects, &SelectQuery::all()).await);

        store.set_fail_writes(true).await;
        assert_err!(store.insert(Table::Projects, Record::new()).await);
    }
}
