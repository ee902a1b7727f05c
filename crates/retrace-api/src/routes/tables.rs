//! Generic table routes (users, logs, metrics)
//!
//! One set of handlers serves all three tables; the table name is a path
//! segment validated against the repository allow-list. Query-string
//! filters compile through the query builder.

use axum::extract::{Path, RawQuery, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;

use crate::envelope::{ok, ok_with_meta, ApiResult};
use crate::state::AppState;
use retrace_core::repository::QueryBuilder;
use retrace_core::{Error, PaginationParams, TableRepository};

/// GET /:table
pub async fn list(
    State(state): State<AppState>,
    Path(table): Path<String>,
    RawQuery(query): RawQuery,
) -> ApiResult<Json<serde_json::Value>> {
    let repo = TableRepository::new(state.db.clone(), &table)?;
    let params = parse_query(query.as_deref())?;

    let mut builder = QueryBuilder::new();
    builder.add_query_params(params.filters.iter().map(|(k, v)| (k.as_str(), v.as_str())))?;

    let (records, pagination) = repo
        .list(
            builder,
            params.pagination,
            params.sort.as_deref(),
            params.descending,
            params.search.as_deref(),
        )
        .await?;

    let data: Vec<serde_json::Value> = records.into_iter().map(|r| r.into_json()).collect();
    Ok(ok_with_meta(json!(data), json!(pagination)))
}

/// GET /:table/:id
pub async fn get_one(
    State(state): State<AppState>,
    Path((table, id)): Path<(String, String)>,
) -> ApiResult<Json<serde_json::Value>> {
    let repo = TableRepository::new(state.db.clone(), &table)?;
    let id = parse_id(&id)?;

    let record = repo
        .get(id)
        .await?
        .ok_or_else(|| Error::not_found(format!("Record {} not found", id)))?;
    Ok(ok(record.into_json()))
}

/// POST /:table
pub async fn create(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let repo = TableRepository::new(state.db.clone(), &table)?;
    let record = repo.create(body).await?;
    Ok((StatusCode::CREATED, ok(record.into_json())))
}

/// PATCH /:table/:id
pub async fn update(
    State(state): State<AppState>,
    Path((table, id)): Path<(String, String)>,
    Json(body): Json<serde_json::Value>,
) -> ApiResult<Json<serde_json::Value>> {
    let repo = TableRepository::new(state.db.clone(), &table)?;
    let id = parse_id(&id)?;
    let record = repo.update(id, body).await?;
    Ok(ok(record.into_json()))
}

/// DELETE /:table/:id (soft by default, `?hard=true` removes the row)
pub async fn remove(
    State(state): State<AppState>,
    Path((table, id)): Path<(String, String)>,
    RawQuery(query): RawQuery,
) -> ApiResult<Json<serde_json::Value>> {
    let repo = TableRepository::new(state.db.clone(), &table)?;
    let id = parse_id(&id)?;

    let hard = query
        .as_deref()
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .any(|(key, value)| key == "hard" && value == "true")
        })
        .unwrap_or(false);

    repo.delete(id, hard).await?;
    Ok(ok(json!({ "deleted": true, "hard": hard })))
}

#[derive(Debug)]
struct ListParams {
    filters: Vec<(String, String)>,
    pagination: PaginationParams,
    sort: Option<String>,
    descending: bool,
    search: Option<String>,
}

fn parse_id(raw: &str) -> Result<i64, Error> {
    raw.parse()
        .map_err(|_| Error::validation("id", "invalid_id", "id must be an integer"))
}

fn parse_query(query: Option<&str>) -> Result<ListParams, Error> {
    let mut filters = Vec::new();
    let mut pagination = PaginationParams::default();
    let mut sort = None;
    let mut descending = false;
    let mut search = None;

    if let Some(query) = query {
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
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
                "sort" => sort = Some(value.into_owned()),
                "order" => descending = value.eq_ignore_ascii_case("desc"),
                "search" => search = Some(value.into_owned()),
                "hard" => {}
                _ => filters.push((key.into_owned(), value.into_owned())),
            }
        }
    }

    Ok(ListParams {
        filters,
        pagination,
        sort,
        descending,
        search,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id("42").unwrap(), 42);
        assert_eq!(parse_id("x").unwrap_err().status_code(), 422);
    }

    #[test]
    fn test_parse_query_splits_reserved_and_filters() {
        let params =
            parse_query(Some("page=2&per_page=10&sort=name&order=desc&age__gte=30")).unwrap();
        assert_eq!(params.pagination.page, 2);
        assert_eq!(params.pagination.per_page, 10);
        assert_eq!(params.sort.as_deref(), Some("name"));
        assert!(params.descending);
        assert_eq!(params.filters, vec![("age__gte".to_string(), "30".to_string())]);
    }

    #[test]
    fn test_parse_query_rejects_bad_page() {
        assert_eq!(
            parse_query(Some("page=banana")).unwrap_err().status_code(),
            422
        );
    }

    #[test]
    fn test_parse_query_defaults() {
        let params = parse_query(None).unwrap();
        assert_eq!(params.pagination.page, 1);
        assert!(params.filters.is_empty());
        assert!(!params.descending);
    }
}
