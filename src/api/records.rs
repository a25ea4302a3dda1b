//! CRUD endpoints for farmers, crops, barangays, pests and reports
//!
//! Records are schemaless JSON objects. Updates and deletes write their own
//! audit entries with the real before/after state; creates are recorded by
//! the request interceptor.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Extension, Json, Router,
};
use serde_json::Value;

use crate::{
    db::DocumentRepository,
    middleware::AuditScope,
    models::{RecordKind, ACTION_CREATE, ACTION_DELETE, ACTION_UPDATE},
    utils::{ApiResponse, AppError, AppResult},
    AppState,
};

pub fn routes(kind: RecordKind) -> Router<AppState> {
    Router::new()
        .route("/", get(list_records).post(create_record))
        .route(
            "/{id}",
            get(get_record)
                .put(update_record)
                .patch(update_record)
                .delete(delete_record),
        )
        .layer(Extension(kind))
}

fn label(kind: RecordKind) -> String {
    let name = kind.resource_type();
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn require_object(body: &Value) -> AppResult<()> {
    if body.is_object() {
        Ok(())
    } else {
        Err(AppError::bad_request("Request body must be a JSON object"))
    }
}

async fn list_records(
    State(state): State<AppState>,
    Extension(kind): Extension<RecordKind>,
) -> AppResult<ApiResponse<Vec<Value>>> {
    let docs = DocumentRepository::new(&state.db).list(kind).await?;
    let data: Vec<Value> = docs.iter().map(|d| d.to_json()).collect();
    let count = data.len();

    Ok(ApiResponse::ok(format!("{}s retrieved successfully", label(kind)), data).with_count(count))
}

async fn get_record(
    State(state): State<AppState>,
    Extension(kind): Extension<RecordKind>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<Value>> {
    let doc = DocumentRepository::new(&state.db)
        .get(kind, &id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("{} not found", label(kind))))?;

    Ok(ApiResponse::ok(
        format!("{} retrieved successfully", label(kind)),
        doc.to_json(),
    ))
}

async fn create_record(
    State(state): State<AppState>,
    Extension(kind): Extension<RecordKind>,
    audit: AuditScope,
    Json(body): Json<Value>,
) -> AppResult<(StatusCode, ApiResponse<Value>)> {
    require_object(&body)?;

    match DocumentRepository::new(&state.db).insert(kind, &body).await {
        Ok(doc) => Ok((
            StatusCode::CREATED,
            ApiResponse::ok(format!("{} created successfully", label(kind)), doc.to_json()),
        )),
        Err(e) => {
            audit
                .failure(ACTION_CREATE, kind.resource_type(), None, &e)
                .await;
            Err(e.into())
        }
    }
}

async fn update_record(
    State(state): State<AppState>,
    Extension(kind): Extension<RecordKind>,
    audit: AuditScope,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> AppResult<ApiResponse<Value>> {
    require_object(&body)?;
    let repo = DocumentRepository::new(&state.db);

    let result = async {
        let Some(before) = repo.get(kind, &id).await? else {
            return Ok(None);
        };
        let after = repo.update(kind, &id, &body).await?;
        Ok::<_, anyhow::Error>(after.map(|after| (before, after)))
    }
    .await;

    match result {
        Ok(Some((before, after))) => {
            audit
                .update(kind.resource_type(), &id, before.data, after.data.clone())
                .await;
            Ok(ApiResponse::ok(
                format!("{} updated successfully", label(kind)),
                after.to_json(),
            ))
        }
        Ok(None) => Err(AppError::not_found(format!("{} not found", label(kind)))),
        Err(e) => {
            audit
                .failure(ACTION_UPDATE, kind.resource_type(), Some(&id), &e)
                .await;
            Err(e.into())
        }
    }
}

async fn delete_record(
    State(state): State<AppState>,
    Extension(kind): Extension<RecordKind>,
    audit: AuditScope,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<Value>> {
    match DocumentRepository::new(&state.db).delete(kind, &id).await {
        Ok(Some(removed)) => {
            audit
                .delete(kind.resource_type(), &id, removed.data.clone())
                .await;
            Ok(ApiResponse::ok(
                format!("{} deleted successfully", label(kind)),
                removed.to_json(),
            ))
        }
        Ok(None) => Err(AppError::not_found(format!("{} not found", label(kind)))),
        Err(e) => {
            audit
                .failure(ACTION_DELETE, kind.resource_type(), Some(&id), &e)
                .await;
            Err(e.into())
        }
    }
}
