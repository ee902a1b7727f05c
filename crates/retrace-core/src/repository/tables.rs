//! Generic table repository (users, logs, metrics)
//!
//! All three tables share the same layout: a jsonb `data` column for the
//! record fields, a 16-dim `embedding` column, and the base columns. The
//! query-builder compiles `field__op` filters; soft-deleted rows are
//! invisible to every read.

use sqlx::postgres::PgRow;
use sqlx::Row;

use crate::embedding::{cosine_distance, embed, embed_record};
use crate::models::{GenericRecord, PaginationInfo, PaginationParams};
use crate::repository::query_builder::{BindValue, QueryBuilder};
use crate::repository::Database;
use crate::{Error, Result};

/// Tables served by the generic surface
const ALLOWED_TABLES: &[&str] = &["users", "logs", "metrics"];

/// Candidate pool bound for in-process embedding ranking
const SEARCH_CANDIDATE_LIMIT: i64 = 500;

/// Apply compiled bind values to any sqlx query builder
macro_rules! bind_all {
    ($query:expr, $binds:expr) => {{
        let mut query = $query;
        for bind in $binds {
            query = match bind {
                BindValue::Text(v) => query.bind(v.clone()),
                BindValue::Number(v) => query.bind(*v),
                BindValue::TextArray(v) => query.bind(v.clone()),
                BindValue::Json(v) => query.bind(v.clone()),
            };
        }
        query
    }};
}

#[derive(Clone)]
pub struct TableRepository {
    db: Database,
    table: &'static str,
}

impl TableRepository {
    /// Resolve a table name against the allow-list
    pub fn new(db: Database, table: &str) -> Result<Self> {
        let table = ALLOWED_TABLES
            .iter()
            .find(|t| **t == table)
            .copied()
            .ok_or_else(|| Error::not_found(format!("Unknown table: {}", table)))?;
        Ok(Self { db, table })
    }

    pub fn table(&self) -> &'static str {
        self.table
    }

    /// List visible rows matching the compiled filters
    pub async fn list(
        &self,
        builder: QueryBuilder,
        pagination: PaginationParams,
        sort: Option<&str>,
        descending: bool,
        search: Option<&str>,
    ) -> Result<(Vec<GenericRecord>, PaginationInfo)> {
        if let Some(term) = search {
            return self.search(builder, pagination, term).await;
        }

        let where_sql = builder.where_clause();
        let order_sql = order_clause(sort, descending)?;

        let count_sql = format!(
            "SELECT COUNT(*) FROM {} WHERE deleted_at IS NULL{}",
            self.table, where_sql
        );
        let total: i64 = bind_all!(sqlx::query_scalar(&count_sql), builder.binds())
            .fetch_one(self.db.pool())
            .await?;

        let limit_ph = builder.next_placeholder();
        let list_sql = format!(
            "SELECT id, data, created_at, updated_at, deleted_at FROM {} \
             WHERE deleted_at IS NULL{} {} LIMIT ${} OFFSET ${}",
            self.table,
            where_sql,
            order_sql,
            limit_ph,
            limit_ph + 1
        );
        let rows = bind_all!(
            sqlx::query_as::<_, GenericRecord>(&list_sql),
            builder.binds()
        )
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(self.db.pool())
        .await?;

        Ok((rows, PaginationInfo::new(total, pagination)))
    }

    /// Rank a bounded candidate set by cosine distance to the search term
    async fn search(
        &self,
        builder: QueryBuilder,
        pagination: PaginationParams,
        term: &str,
    ) -> Result<(Vec<GenericRecord>, PaginationInfo)> {
        let where_sql = builder.where_clause();
        let limit_ph = builder.next_placeholder();
        let sql = format!(
            "SELECT id, data, embedding, created_at, updated_at, deleted_at FROM {} \
             WHERE deleted_at IS NULL{} ORDER BY id DESC LIMIT ${}",
            self.table, where_sql, limit_ph
        );

        let rows = bind_all!(sqlx::query(&sql), builder.binds())
            .bind(SEARCH_CANDIDATE_LIMIT)
            .fetch_all(self.db.pool())
            .await?;

        let query_vector = embed(term);
        let mut scored: Vec<(f32, GenericRecord)> = rows
            .into_iter()
            .map(|row| scored_record(row, &query_vector))
            .collect::<Result<_>>()?;
        scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        let total = scored.len() as i64;
        let page: Vec<GenericRecord> = scored
            .into_iter()
            .skip(pagination.offset() as usize)
            .take(pagination.limit() as usize)
            .map(|(_, record)| record)
            .collect();

        Ok((page, PaginationInfo::new(total, pagination)))
    }

    /// Fetch one visible row
    pub async fn get(&self, id: i64) -> Result<Option<GenericRecord>> {
        let sql = format!(
            "SELECT id, data, created_at, updated_at, deleted_at FROM {} \
             WHERE id = $1 AND deleted_at IS NULL",
            self.table
        );
        let row = sqlx::query_as::<_, GenericRecord>(&sql)
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(row)
    }

    /// Insert a new row, computing its embedding from the field values
    pub async fn create(&self, data: serde_json::Value) -> Result<GenericRecord> {
        validate_data(&data)?;
        let vector = embed_record(&data).to_vec();

        let sql = format!(
            "INSERT INTO {} (data, embedding) VALUES ($1, $2) \
             RETURNING id, data, created_at, updated_at, deleted_at",
            self.table
        );
        let row = sqlx::query_as::<_, GenericRecord>(&sql)
            .bind(data)
            .bind(vector)
            .fetch_one(self.db.pool())
            .await?;
        Ok(row)
    }

    /// Shallow-merge the patch into `data` and refresh the embedding
    pub async fn update(&self, id: i64, patch: serde_json::Value) -> Result<GenericRecord> {
        validate_data(&patch)?;

        let current = self
            .get(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Record {} not found", id)))?;

        let mut merged = match current.data {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        if let serde_json::Value::Object(fields) = patch {
            for (key, value) in fields {
                merged.insert(key, value);
            }
        }
        let merged = serde_json::Value::Object(merged);
        let vector = embed_record(&merged).to_vec();

        let sql = format!(
            "UPDATE {} SET data = $1, embedding = $2, updated_at = NOW() \
             WHERE id = $3 AND deleted_at IS NULL \
             RETURNING id, data, created_at, updated_at, deleted_at",
            self.table
        );
        let row = sqlx::query_as::<_, GenericRecord>(&sql)
            .bind(merged)
            .bind(vector)
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?
            .ok_or_else(|| Error::not_found(format!("Record {} not found", id)))?;
        Ok(row)
    }

    /// Soft delete by default; `hard` removes the row entirely
    pub async fn delete(&self, id: i64, hard: bool) -> Result<()> {
        let sql = if hard {
            format!("DELETE FROM {} WHERE id = $1", self.table)
        } else {
            format!(
                "UPDATE {} SET deleted_at = NOW(), updated_at = NOW() \
                 WHERE id = $1 AND deleted_at IS NULL",
                self.table
            )
        };
        let result = sqlx::query(&sql).bind(id).execute(self.db.pool()).await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found(format!("Record {} not found", id)));
        }
        Ok(())
    }
}

fn scored_record(row: PgRow, query_vector: &[f32]) -> Result<(f32, GenericRecord)> {
    let embedding: Option<Vec<f32>> = row.try_get("embedding")?;
    let record = GenericRecord {
        id: row.try_get("id")?,
        data: row.try_get("data")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        deleted_at: row.try_get("deleted_at")?,
    };
    let distance = embedding
        .map(|v| cosine_distance(&v, query_vector))
        .unwrap_or(1.0);
    Ok((distance, record))
}

fn order_clause(sort: Option<&str>, descending: bool) -> Result<String> {
    let direction = if descending { "DESC" } else { "ASC" };
    match sort {
        None => Ok("ORDER BY id DESC".to_string()),
        Some(field) if field == "id" || field == "created_at" || field == "updated_at" => {
            Ok(format!("ORDER BY {} {}", field, direction))
        }
        Some(field)
            if !field.is_empty()
                && field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') =>
        {
            Ok(format!("ORDER BY data->>'{}' {}", field, direction))
        }
        Some(field) => Err(Error::validation(
            "sort",
            "invalid_field",
            format!("Invalid sort field: {}", field),
        )),
    }
}

fn validate_data(data: &serde_json::Value) -> Result<()> {
    let object = match data.as_object() {
        Some(object) => object,
        None => {
            return Err(Error::validation(
                "body",
                "invalid_type",
                "Request body must be a JSON object",
            ))
        }
    };

    let mut issues = crate::error::IssueList::new();
    for key in object.keys() {
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            issues.push(key.clone(), "invalid_field", "Invalid field name");
        }
    }
    for reserved in ["id", "created_at", "updated_at", "deleted_at", "embedding"] {
        if object.contains_key(reserved) {
            issues.push(reserved, "reserved_field", "Field is managed by the server");
        }
    }
    issues.into_result()
}
