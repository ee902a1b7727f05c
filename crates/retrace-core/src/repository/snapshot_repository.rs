//! Persistence for request snapshots

use chrono::{DateTime, Utc};

use crate::models::{NewSnapshot, PaginationInfo, PaginationParams, RequestSnapshot};
use crate::repository::Database;
use crate::Result;

/// Typed list filters for the replay surface
#[derive(Debug, Clone, Default)]
pub struct SnapshotFilter {
    pub method: Option<String>,
    pub path: Option<String>,
    pub status_code: Option<i32>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct SnapshotRepository {
    db: Database,
}

impl SnapshotRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a snapshot produced by the capture middleware
    pub async fn insert(&self, snapshot: NewSnapshot) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO request_snapshots (
                method, path, query, body, headers, user_id, version, stage,
                status_code, response_body, response_headers, duration_ms,
                geo_country, geo_region, geo_city, geo_lat, geo_lon, geo_source
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            RETURNING id
            "#,
        )
        .bind(&snapshot.method)
        .bind(&snapshot.path)
        .bind(&snapshot.query)
        .bind(&snapshot.body)
        .bind(&snapshot.headers)
        .bind(snapshot.user_id)
        .bind(&snapshot.version)
        .bind(&snapshot.stage)
        .bind(snapshot.status_code)
        .bind(&snapshot.response_body)
        .bind(&snapshot.response_headers)
        .bind(snapshot.duration_ms)
        .bind(&snapshot.geo.country)
        .bind(&snapshot.geo.region)
        .bind(&snapshot.geo.city)
        .bind(snapshot.geo.lat)
        .bind(snapshot.geo.lon)
        .bind(snapshot.geo.source)
        .fetch_one(self.db.pool())
        .await?;

        Ok(id)
    }

    /// Fetch one visible snapshot
    pub async fn get(&self, id: i64) -> Result<Option<RequestSnapshot>> {
        let snapshot = sqlx::query_as::<_, RequestSnapshot>(
            "SELECT * FROM request_snapshots WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .fetch_optional(self.db.pool())
        .await?;
        Ok(snapshot)
    }

    /// List visible snapshots, newest first
    pub async fn list(
        &self,
        filter: &SnapshotFilter,
        pagination: PaginationParams,
    ) -> Result<(Vec<RequestSnapshot>, PaginationInfo)> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM request_snapshots
            WHERE deleted_at IS NULL
              AND ($1::text IS NULL OR method = $1)
              AND ($2::text IS NULL OR path LIKE $2 || '%')
              AND ($3::int IS NULL OR status_code = $3)
              AND ($4::timestamptz IS NULL OR created_at >= $4)
              AND ($5::timestamptz IS NULL OR created_at <= $5)
            "#,
        )
        .bind(&filter.method)
        .bind(&filter.path)
        .bind(filter.status_code)
        .bind(filter.start_date)
        .bind(filter.end_date)
        .fetch_one(self.db.pool())
        .await?;

        let rows = sqlx::query_as::<_, RequestSnapshot>(
            r#"
            SELECT * FROM request_snapshots
            WHERE deleted_at IS NULL
              AND ($1::text IS NULL OR method = $1)
              AND ($2::text IS NULL OR path LIKE $2 || '%')
              AND ($3::int IS NULL OR status_code = $3)
              AND ($4::timestamptz IS NULL OR created_at >= $4)
              AND ($5::timestamptz IS NULL OR created_at <= $5)
            ORDER BY created_at DESC, id DESC
            LIMIT $6 OFFSET $7
            "#,
        )
        .bind(&filter.method)
        .bind(&filter.path)
        .bind(filter.status_code)
        .bind(filter.start_date)
        .bind(filter.end_date)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(self.db.pool())
        .await?;

        Ok((rows, PaginationInfo::new(total, pagination)))
    }

    /// Soft-delete a snapshot
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE request_snapshots SET deleted_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(self.db.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Soft-delete snapshots older than the cutoff; returns the count
    pub async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE request_snapshots SET deleted_at = NOW(), updated_at = NOW() \
             WHERE created_at < $1 AND deleted_at IS NULL",
        )
        .bind(cutoff)
        .execute(self.db.pool())
        .await?;
        Ok(result.rows_affected())
    }
}
