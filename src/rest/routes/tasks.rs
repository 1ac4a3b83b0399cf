// rest/routes/tasks.rs — the shop to-do list.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{bad_request, internal_error, not_found, ApiError};
use crate::storage::TenantRow;
use crate::tasks;
use crate::AppContext;

#[derive(Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
    pub detail: Option<String>,
    pub due_at: Option<String>,
}

/// POST /api/v1/tasks — manual tasks only; the system opens its own.
pub async fn create_task(
    State(ctx): State<AppContext>,
    Extension(tenant): Extension<TenantRow>,
    Json(body): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    if body.title.trim().is_empty() {
        return Err(bad_request("title is required"));
    }
    let task = ctx
        .storage
        .create_task(
            &tenant.id,
            body.title.trim(),
            body.detail.as_deref(),
            "manual",
            None,
            body.due_at.as_deref(),
        )
        .await
        .map_err(internal_error)?;
    Ok((StatusCode::CREATED, Json(json!({ "task": task }))))
}

#[derive(Deserialize)]
pub struct ListTasksQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

pub async fn list_tasks(
    State(ctx): State<AppContext>,
    Extension(tenant): Extension<TenantRow>,
    Query(q): Query<ListTasksQuery>,
) -> Result<Json<Value>, ApiError> {
    if let Some(ref status) = q.status {
        if !tasks::is_valid_status(status) {
            return Err(bad_request(format!("unknown status '{status}'")));
        }
    }
    let list = ctx
        .storage
        .list_tasks(
            &tenant.id,
            q.status.as_deref(),
            q.limit.unwrap_or(100).clamp(1, 500),
        )
        .await
        .map_err(internal_error)?;
    Ok(Json(json!({ "tasks": list })))
}

#[derive(Deserialize)]
pub struct UpdateTaskRequest {
    pub status: String,
}

pub async fn update_task(
    State(ctx): State<AppContext>,
    Extension(tenant): Extension<TenantRow>,
    Path(id): Path<String>,
    Json(body): Json<UpdateTaskRequest>,
) -> Result<Json<Value>, ApiError> {
    if !tasks::is_valid_status(&body.status) {
        return Err(bad_request(format!("unknown status '{}'", body.status)));
    }
    let updated = ctx
        .storage
        .set_task_status(&tenant.id, &id, &body.status)
        .await
        .map_err(internal_error)?;
    if !updated {
        return Err(not_found("Task"));
    }
    Ok(Json(json!({ "status": body.status })))
}
