//! Audit log API endpoints
//!
//! All endpoints require an admin. Listings are enriched with resource names;
//! exports return the raw stored entries.

use axum::{
    extract::{Path, Query, State},
    http::header::{CONTENT_DISPOSITION, CONTENT_TYPE},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::json;

use crate::{
    middleware::{AdminUser, AuditScope},
    models::{
        AuditFilter, AuditFilterValues, AuditLogQuery, AuditSort, AuditStatistics,
        EnrichedAuditEntry, PageRequest, SortField, SortOrder, ACTION_READ,
    },
    services::audit_query::to_csv,
    utils::{ApiResponse, AppError, AppResult},
    AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_audit_logs))
        .route("/statistics", get(get_statistics))
        .route("/filters", get(get_filters))
        .route("/export", get(export_audit_logs))
        .route("/date-range", get(list_by_date_range))
        .route(
            "/resource/{resource_type}/{resource_id}",
            get(list_by_resource),
        )
        .route("/user/{user_id}", get(list_by_user))
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Parse an RFC 3339 timestamp or a `YYYY-MM-DD` date.
///
/// A bare date used as an end bound covers the whole day.
fn parse_date(value: &str, end_of_day: bool) -> AppResult<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| {
            if end_of_day {
                date.and_hms_micro_opt(23, 59, 59, 999_999)
            } else {
                date.and_hms_opt(0, 0, 0)
            }
        })
        .map(|dt| dt.and_utc())
        .ok_or_else(|| AppError::bad_request(format!("Invalid date: {}", value)))
}

/// Range from `startDate`/`endDate`; applied only when both are present
fn date_range(query: &AuditLogQuery) -> AppResult<Option<(DateTime<Utc>, DateTime<Utc>)>> {
    match (non_empty(&query.start_date), non_empty(&query.end_date)) {
        (Some(start), Some(end)) => Ok(Some((parse_date(start, false)?, parse_date(end, true)?))),
        _ => Ok(None),
    }
}

fn query_filter(query: &AuditLogQuery) -> AppResult<AuditFilter> {
    Ok(AuditFilter {
        actions: non_empty(&query.action).map(|a| vec![a.to_uppercase()]),
        resource_type: non_empty(&query.resource_type).map(str::to_lowercase),
        user_id: non_empty(&query.user_id).map(str::to_string),
        ip_address: non_empty(&query.ip_address).map(str::to_string),
        range: date_range(query)?,
        ..Default::default()
    })
}

fn page_request(state: &AppState, query: &AuditLogQuery) -> PageRequest {
    let limits = &state.config.audit;
    query.page_request(limits.default_page_size, limits.max_page_size)
}

async fn list_audit_logs(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    audit: AuditScope,
    Query(query): Query<AuditLogQuery>,
) -> AppResult<ApiResponse<Vec<EnrichedAuditEntry>>> {
    let filter = query_filter(&query)?;
    let sort = AuditSort {
        field: SortField::parse(non_empty(&query.sort_by).unwrap_or("timestamp")),
        order: SortOrder::parse(non_empty(&query.sort_order).unwrap_or("desc")),
    };

    match state
        .audit_queries()
        .list(&filter, sort, page_request(&state, &query))
        .await
    {
        Ok(page) => Ok(ApiResponse::ok("Audit logs retrieved successfully", page.items)
            .with_pagination(page.page_info)),
        Err(e) => {
            audit.failure(ACTION_READ, "audit_logs", None, &e).await;
            Err(e.into())
        }
    }
}

async fn list_by_resource(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path((resource_type, resource_id)): Path<(String, String)>,
) -> AppResult<ApiResponse<Vec<EnrichedAuditEntry>>> {
    if resource_type.trim().is_empty() || resource_id.trim().is_empty() {
        return Err(AppError::bad_request(
            "Resource type and resource ID are required",
        ));
    }

    let logs = state
        .audit_queries()
        .for_resource(&resource_type, &resource_id)
        .await?;
    let count = logs.len();

    Ok(ApiResponse::ok("Resource audit logs retrieved successfully", logs).with_count(count))
}

async fn list_by_user(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(user_id): Path<String>,
    Query(query): Query<AuditLogQuery>,
) -> AppResult<ApiResponse<Vec<EnrichedAuditEntry>>> {
    if user_id.trim().is_empty() {
        return Err(AppError::bad_request("User ID is required"));
    }

    let page = state
        .audit_queries()
        .for_user(&user_id, page_request(&state, &query))
        .await?;

    Ok(ApiResponse::ok("User audit logs retrieved successfully", page.items)
        .with_pagination(page.page_info))
}

async fn list_by_date_range(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Query(query): Query<AuditLogQuery>,
) -> AppResult<ApiResponse<Vec<EnrichedAuditEntry>>> {
    let Some((start, end)) = date_range(&query)? else {
        return Err(AppError::bad_request("Start date and end date are required"));
    };

    let page = state
        .audit_queries()
        .in_range(start, end, page_request(&state, &query))
        .await?;

    Ok(
        ApiResponse::ok("Audit logs by date range retrieved successfully", page.items)
            .with_pagination(page.page_info),
    )
}

async fn get_statistics(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
) -> AppResult<ApiResponse<AuditStatistics>> {
    let stats = state.audit_queries().statistics(Utc::now()).await?;
    Ok(ApiResponse::ok("Audit statistics retrieved successfully", stats))
}

async fn get_filters(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
) -> AppResult<ApiResponse<AuditFilterValues>> {
    let values = state.audit_queries().filter_values().await?;
    Ok(ApiResponse::ok("Audit filters retrieved successfully", values))
}

async fn export_audit_logs(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Query(query): Query<AuditLogQuery>,
) -> AppResult<Response> {
    let filter = query_filter(&query)?;
    let logs = state.audit_queries().export(&filter).await?;

    if non_empty(&query.format).is_some_and(|f| f.eq_ignore_ascii_case("csv")) {
        return Ok((
            [
                (CONTENT_TYPE, "text/csv; charset=utf-8"),
                (CONTENT_DISPOSITION, "attachment; filename=audit_logs.csv"),
            ],
            to_csv(&logs),
        )
            .into_response());
    }

    let total = logs.len();
    Ok((
        [(CONTENT_DISPOSITION, "attachment; filename=audit_logs.json")],
        Json(json!({
            "success": true,
            "data": logs,
            "exportedAt": Utc::now().to_rfc3339(),
            "totalRecords": total,
        })),
    )
        .into_response())
}
