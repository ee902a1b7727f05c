//! Shared data model types

pub mod snapshot;
pub mod worker;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use snapshot::{GeoContext, GeoSource, NewSnapshot, RequestSnapshot};
pub use worker::{WorkerStatsReport, WorkerStatsRow};

/// Pagination parameters for list endpoints
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PaginationParams {
    #[serde(default = "default_page")]
    pub page: u32,

    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            page: default_page(),
            per_page: default_per_page(),
        }
    }
}

impl PaginationParams {
    pub fn offset(&self) -> i64 {
        (self.page.max(1) as i64 - 1) * self.limit()
    }

    pub fn limit(&self) -> i64 {
        self.per_page.clamp(1, 200) as i64
    }
}

/// Pagination metadata returned in the response envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationInfo {
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: i64,
}

impl PaginationInfo {
    pub fn new(total: i64, params: PaginationParams) -> Self {
        let per_page = params.limit();
        Self {
            total,
            page: params.page.max(1),
            per_page: per_page as u32,
            total_pages: (total + per_page - 1) / per_page,
        }
    }
}

/// A row from one of the generic tables (users, logs, metrics)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct GenericRecord {
    pub id: i64,

    /// Free-form fields
    pub data: serde_json::Value,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl GenericRecord {
    /// Flatten into the API shape: field map plus base columns
    pub fn into_json(self) -> serde_json::Value {
        let mut obj = match self.data {
            serde_json::Value::Object(map) => map,
            other => {
                let mut map = serde_json::Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        obj.insert("id".to_string(), serde_json::json!(self.id));
        obj.insert(
            "createdAt".to_string(),
            serde_json::json!(self.created_at),
        );
        obj.insert(
            "updatedAt".to_string(),
            serde_json::json!(self.updated_at),
        );
        serde_json::Value::Object(obj)
    }
}

fn default_page() -> u32 {
    1
}

fn default_per_page() -> u32 {
    20
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_defaults() {
        let params = PaginationParams::default();
        assert_eq!(params.page, 1);
        assert_eq!(params.per_page, 20);
        assert_eq!(params.offset(), 0);
        assert_eq!(params.limit(), 20);
    }

    #[test]
    fn test_pagination_offset_and_clamp() {
        let params = PaginationParams {
            page: 3,
            per_page: 50,
        };
        assert_eq!(params.offset(), 100);

        let oversized = PaginationParams {
            page: 1,
            per_page: 10_000,
        };
        assert_eq!(oversized.limit(), 200);
    }

    #[test]
    fn test_pagination_info_total_pages() {
        let info = PaginationInfo::new(
            41,
            PaginationParams {
                page: 1,
                per_page: 20,
            },
        );
        assert_eq!(info.total_pages, 3);
    }

    #[test]
    fn test_generic_record_flatten() {
        let record = GenericRecord {
            id: 7,
            data: serde_json::json!({"name": "Alice", "age": 30}),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        };
        let json = record.into_json();
        assert_eq!(json["id"], 7);
        assert_eq!(json["name"], "Alice");
        assert!(json.get("createdAt").is_some());
    }
}
