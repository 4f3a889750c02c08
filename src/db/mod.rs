//! Record storage
//!
//! The portfolio's tables are plain field/value rows. [`RecordStore`] is the
//! table-oriented interface the rest of the crate talks to; [`PgRecordStore`]
//! implements it against the hosted PostgreSQL database and
//! [`MemoryRecordStore`] keeps rows in process.

pub mod memory;
pub mod operations;
pub mod pool;
pub mod record;

pub use memory::MemoryRecordStore;
pub use operations::PgRecordStore;
pub use pool::*;
pub use record::{AssetSlot, Record, RecordId, SelectQuery, SortOrder, Table};

use crate::types::AppResult;
use async_trait::async_trait;

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn select(&self, table: Table, query: &SelectQuery) -> AppResult<Vec<Record>>;

    async fn get(&self, table: Table, id: &RecordId) -> AppResult<Option<Record>>;

    /// Insert and return the stored row (with generated columns filled in).
    async fn insert(&self, table: Table, fields: Record) -> AppResult<Record>;

    /// Update only the given fields of row `id` and return the stored row.
    async fn update(&self, table: Table, id: &RecordId, fields: Record) -> AppResult<Record>;

    async fn delete(&self, table: Table, id: &RecordId) -> AppResult<()>;

    async fn ping(&self) -> AppResult<()>;
}
