use sqlx::postgres::{PgPool, Postgres};
use sqlx::types::Json;
use sqlx::QueryBuilder;
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::record::is_valid_identifier;
use super::{Record, RecordId, RecordStore, SelectQuery, SortOrder, Table};
use crate::types::{AppError, AppResult};

/// Rows are read back as `to_jsonb(row)` and written through
/// `jsonb_populate_record`, so payloads stay plain field/value maps and the
/// database does the type coercion for each column.
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn quote(ident: &str) -> AppResult<String> {
    if !is_valid_identifier(ident) {
        return Err(AppError::InvalidRequest(format!("invalid column name: {ident:?}")));
    }
    Ok(format!("\"{ident}\""))
}

fn columns(fields: &Record) -> AppResult<Vec<String>> {
    fields
        .fields()
        .filter(|name| name.as_str() != "id")
        .map(|name| quote(name))
        .collect()
}

fn to_records(rows: Vec<Value>) -> AppResult<Vec<Record>> {
    rows.into_iter()
        .map(|row| Record::try_from(row).map_err(|e| AppError::Internal(format!("row decode: {e}"))))
        .collect()
}

pub(crate) fn select_sql(table: Table, query: &SelectQuery) -> AppResult<QueryBuilder<'static, Postgres>> {
    let mut qb = QueryBuilder::new(format!("SELECT to_jsonb(t) FROM {} AS t", quote(table.name())?));

    for (i, (column, value)) in query.filters.iter().enumerate() {
        qb.push(if i == 0 { " WHERE " } else { " AND " });
        qb.push(format!("t.{}", quote(column)?));
        match value {
            Value::Null => {
                qb.push(" IS NULL");
            }
            Value::String(s) => {
                qb.push("::text = ").push_bind(s.clone());
            }
            other => {
                qb.push("::text = ").push_bind(other.to_string());
            }
        }
    }

    if let Some((column, order)) = &query.order {
        let direction = match order {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };
        qb.push(format!(" ORDER BY t.{} {direction} NULLS LAST", quote(column)?));
    }

    if let Some(limit) = query.limit {
        qb.push(" LIMIT ").push_bind(limit);
    }

    Ok(qb)
}

pub(crate) fn insert_sql(table: Table, fields: &Record) -> AppResult<QueryBuilder<'static, Postgres>> {
    let name = quote(table.name())?;
    let columns = columns(fields)?;

    if columns.is_empty() {
        return Ok(QueryBuilder::new(format!(
            "INSERT INTO {name} AS t DEFAULT VALUES RETURNING to_jsonb(t)"
        )));
    }

    let source: Vec<String> = columns.iter().map(|c| format!("r.{c}")).collect();
    let mut qb = QueryBuilder::new(format!(
        "INSERT INTO {name} AS t ({}) SELECT {} FROM jsonb_populate_record(NULL::{name}, ",
        columns.join(", "),
        source.join(", "),
    ));
    qb.push_bind(Json(Value::from(fields.clone())));
    qb.push(") AS r RETURNING to_jsonb(t)");
    Ok(qb)
}

pub(crate) fn update_sql(
    table: Table,
    id: &RecordId,
    fields: &Record,
) -> AppResult<Option<QueryBuilder<'static, Postgres>>> {
    let name = quote(table.name())?;
    let columns = columns(fields)?;
    if columns.is_empty() {
        return Ok(None);
    }

    let assignments: Vec<String> = columns.iter().map(|c| format!("{c} = r.{c}")).collect();
    let mut qb = QueryBuilder::new(format!(
        "UPDATE {name} AS t SET {} FROM jsonb_populate_record(NULL::{name}, ",
        assignments.join(", "),
    ));
    qb.push_bind(Json(Value::from(fields.clone())));
    qb.push(") AS r WHERE t.\"id\"::text = ");
    qb.push_bind(id.0.clone());
    qb.push(" RETURNING to_jsonb(t)");
    Ok(Some(qb))
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn select(&self, table: Table, query: &SelectQuery) -> AppResult<Vec<Record>> {
        let mut qb = select_sql(table, query)?;
        debug!(%table, sql = qb.sql(), "select");
        let rows: Vec<Value> = qb.build_query_scalar().fetch_all(&self.pool).await?;
        to_records(rows)
    }

    async fn get(&self, table: Table, id: &RecordId) -> AppResult<Option<Record>> {
        let query = SelectQuery::all().eq("id", id.0.clone()).limit(1);
        Ok(self.select(table, &query).await?.into_iter().next())
    }

    async fn insert(&self, table: Table, fields: Record) -> AppResult<Record> {
        let mut qb = insert_sql(table, &fields)?;
        let row: Value = qb.build_query_scalar().fetch_one(&self.pool).await?;
        to_records(vec![row])?
            .pop()
            .ok_or_else(|| AppError::Internal("insert returned no row".to_string()))
    }

    async fn update(&self, table: Table, id: &RecordId, fields: Record) -> AppResult<Record> {
        let Some(mut qb) = update_sql(table, id, &fields)? else {
            return self
                .get(table, id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("{table} {id}")));
        };

        let row: Option<Value> = qb.build_query_scalar().fetch_optional(&self.pool).await?;
        let row = row.ok_or_else(|| AppError::NotFound(format!("{table} {id}")))?;
        to_records(vec![row])?
            .pop()
            .ok_or_else(|| AppError::Internal("update returned no row".to_string()))
    }

    async fn delete(&self, table: Table, id: &RecordId) -> AppResult<()> {
        let sql = format!("DELETE FROM {} WHERE \"id\"::text = $1", quote(table.name())?);
        let result = sqlx::query(&sql).bind(id.0.clone()).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("{table} {id}")));
        }
        Ok(())
    }

    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        Record::try_from(value).unwrap()
    }

    #[test]
    fn test_select_sql() {
        let query = SelectQuery::for_table(Table::Projects).eq("featured", true).limit(3);
        let qb = select_sql(Table::Projects, &query).unwrap();
        assert_eq!(
            qb.sql(),
            "SELECT to_jsonb(t) FROM \"projects\" AS t WHERE t.\"featured\"::text = $1 \
             ORDER BY t.\"display_order\" ASC NULLS LAST LIMIT $2"
        );
    }

    #[test]
    fn test_select_sql_null_filter() {
        let query = SelectQuery::all().eq("end_year", Value::Null);
        let qb = select_sql(Table::Education, &query).unwrap();
        assert_eq!(
            qb.sql(),
            "SELECT to_jsonb(t) FROM \"education\" AS t WHERE t.\"end_year\" IS NULL"
        );
    }

    #[test]
    fn test_insert_sql_skips_id() {
        let fields = record(json!({"id": 5, "name": "Rust", "proficiency_level": 90}));
        let qb = insert_sql(Table::Skills, &fields).unwrap();
        assert_eq!(
            qb.sql(),
            "INSERT INTO \"skills\" AS t (\"name\", \"proficiency_level\") \
             SELECT r.\"name\", r.\"proficiency_level\" \
             FROM jsonb_populate_record(NULL::\"skills\", $1) AS r RETURNING to_jsonb(t)"
        );
    }

    #[test]
    fn test_update_sql() {
        let fields = record(json!({"read": true}));
        let qb = update_sql(Table::ContactMessages, &RecordId::from("9"), &fields)
            .unwrap()
            .unwrap();
        assert_eq!(
            qb.sql(),
            "UPDATE \"contact_messages\" AS t SET \"read\" = r.\"read\" \
             FROM jsonb_populate_record(NULL::\"contact_messages\", $1) AS r \
             WHERE t.\"id\"::text = $2 RETURNING to_jsonb(t)"
        );
        assert!(update_sql(Table::Skills, &RecordId::from("1"), &record(json!({"id": 1})))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_invalid_column_is_rejected() {
        let fields = record(json!({"name\" = 'x'; --": 1}));
        assert!(matches!(
            insert_sql(Table::Skills, &fields),
            Err(AppError::InvalidRequest(_))
        ));
    }
}
