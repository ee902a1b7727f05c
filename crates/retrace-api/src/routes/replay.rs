//! Snapshot listing, detail, and replay

use axum::extract::{Path, RawQuery, State};
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde_json::json;

use crate::envelope::{ok, ok_with_meta, ApiResult};
use crate::replay::replay_snapshot;
use crate::state::AppState;
use retrace_core::repository::SnapshotFilter;
use retrace_core::{AuthContext, Error, PaginationParams};

/// GET /replay: list snapshots with typed filters
pub async fn list(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> ApiResult<Json<serde_json::Value>> {
    let (filter, pagination) = parse_query(query.as_deref())?;
    let (snapshots, info) = state.snapshots.list(&filter, pagination).await?;
    Ok(ok_with_meta(json!(snapshots), json!(info)))
}

/// GET /replay/:id: snapshot detail
pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let id = parse_id(&id)?;
    let snapshot = state
        .snapshots
        .get(id)
        .await?
        .ok_or_else(|| Error::not_found(format!("Snapshot {} not found", id)))?;
    Ok(ok(json!(snapshot)))
}

/// POST /replay/:id/replay: re-execute the captured request
pub async fn replay(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Extension(caller): Extension<AuthContext>,
) -> ApiResult<Json<serde_json::Value>> {
    let id = parse_id(&id)?;
    let snapshot = state
        .snapshots
        .get(id)
        .await?
        .ok_or_else(|| Error::not_found(format!("Snapshot {} not found", id)))?;

    let outcome = replay_snapshot(&state, &snapshot, &caller).await?;
    Ok(ok(json!(outcome)))
}

fn parse_id(raw: &str) -> Result<i64, Error> {
    raw.parse()
        .map_err(|_| Error::validation("id", "invalid_id", "id must be an integer"))
}

fn parse_query(query: Option<&str>) -> Result<(SnapshotFilter, PaginationParams), Error> {
    let mut filter = SnapshotFilter::default();
    let mut pagination = PaginationParams::default();

    if let Some(query) = query {
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "method" => filter.method = Some(value.to_uppercase()),
                "path" => filter.path = Some(value.into_owned()),
                "statusCode" => {
                    filter.status_code = Some(value.parse().map_err(|_| {
                        Error::validation(
                            "statusCode",
                            "invalid_number",
                            "statusCode must be an integer",
                        )
                    })?);
                }
                "startDate" => filter.start_date = Some(parse_date("startDate", &value)?),
                "endDate" => filter.end_date = Some(parse_date("endDate", &value)?),
                "page" => {
                    pagination.page = value.parse().map_err(|_| {
                        Error::validation("page", "invalid_number", "page must be a positive integer")
                    })?;
                }
                "per_page" => {
                    pagination.per_page = value.parse().map_err(|_| {
                        Error::validation(
                            "per_page",
                            "invalid_number",
                            "per_page must be a positive integer",
                        )
                    })?;
                }
                other => {
                    return Err(Error::validation(
                        other,
                        "unknown_filter",
                        "Unknown snapshot filter",
                    ))
                }
            }
        }
    }

    Ok((filter, pagination))
}

fn parse_date(field: &str, value: &str) -> Result<DateTime<Utc>, Error> {
    value
        .parse::<DateTime<Utc>>()
        .map_err(|_| Error::validation(field, "invalid_date", "Expected an RFC 3339 timestamp"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query_full_filter_set() {
        let (filter, pagination) = parse_query(Some(
            "method=post&path=/api/v1/users&statusCode=201&startDate=2026-01-01T00:00:00Z&endDate=2026-02-01T00:00:00Z&page=2&per_page=5",
        ))
        .unwrap();
        assert_eq!(filter.method.as_deref(), Some("POST"));
        assert_eq!(filter.path.as_deref(), Some("/api/v1/users"));
        assert_eq!(filter.status_code, Some(201));
        assert!(filter.start_date.is_some());
        assert!(filter.end_date.is_some());
        assert_eq!(pagination.page, 2);
        assert_eq!(pagination.per_page, 5);
    }

    #[test]
    fn test_parse_query_rejects_unknown_filter() {
        let err = parse_query(Some("verb=GET")).unwrap_err();
        assert_eq!(err.status_code(), 422);
    }

    #[test]
    fn test_parse_query_rejects_bad_date() {
        let err = parse_query(Some("startDate=yesterday")).unwrap_err();
        assert_eq!(err.status_code(), 422);
    }

    #[test]
    fn test_parse_id_rejects_non_integer() {
        assert!(parse_id("abc").is_err());
        assert_eq!(parse_id("7").unwrap(), 7);
    }
}
