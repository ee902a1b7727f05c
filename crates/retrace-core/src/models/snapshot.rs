//! Request snapshot model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where the geo context for a request came from
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "geo_source", rename_all = "lowercase")]
pub enum GeoSource {
    /// Edge-runtime metadata or CDN viewer headers
    Platform,

    /// Explicit x-geo-* headers
    Header,

    /// IP range lookup
    Ip,

    /// Nothing resolved
    None,
}

impl fmt::Display for GeoSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeoSource::Platform => write!(f, "platform"),
            GeoSource::Header => write!(f, "header"),
            GeoSource::Ip => write!(f, "ip"),
            GeoSource::None => write!(f, "none"),
        }
    }
}

/// Geo context resolved once per request and attached to request extensions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoContext {
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub source: GeoSource,
}

impl GeoContext {
    pub fn empty() -> Self {
        Self {
            country: None,
            region: None,
            city: None,
            lat: None,
            lon: None,
            source: GeoSource::None,
        }
    }

    pub fn has_country(&self) -> bool {
        self.country.as_deref().map(|c| !c.is_empty()).unwrap_or(false)
    }
}

impl Default for GeoContext {
    fn default() -> Self {
        Self::empty()
    }
}

/// A persisted request+response pair
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RequestSnapshot {
    pub id: i64,
    pub method: String,
    pub path: String,
    pub query: serde_json::Value,
    pub body: serde_json::Value,
    pub headers: serde_json::Value,
    pub user_id: Option<i64>,
    pub version: String,
    pub stage: String,
    pub status_code: i32,
    pub response_body: serde_json::Value,
    pub response_headers: serde_json::Value,
    pub duration_ms: i64,
    pub geo_country: Option<String>,
    pub geo_region: Option<String>,
    pub geo_city: Option<String>,
    pub geo_lat: Option<f64>,
    pub geo_lon: Option<f64>,
    pub geo_source: GeoSource,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Snapshot fields produced by the middleware before insert
#[derive(Debug, Clone)]
pub struct NewSnapshot {
    pub method: String,
    pub path: String,
    pub query: serde_json::Value,
    pub body: serde_json::Value,
    pub headers: serde_json::Value,
    pub user_id: Option<i64>,
    pub version: String,
    pub stage: String,
    pub status_code: i32,
    pub response_body: serde_json::Value,
    pub response_headers: serde_json::Value,
    pub duration_ms: i64,
    pub geo: GeoContext,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geo_source_display() {
        assert_eq!(GeoSource::Platform.to_string(), "platform");
        assert_eq!(GeoSource::None.to_string(), "none");
    }

    #[test]
    fn test_geo_context_has_country() {
        let mut geo = GeoContext::empty();
        assert!(!geo.has_country());

        geo.country = Some(String::new());
        assert!(!geo.has_country());

        geo.country = Some("GB".to_string());
        assert!(geo.has_country());
    }
}
