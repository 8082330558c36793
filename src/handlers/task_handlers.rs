use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::automation::actions::{normalize_priority, validate_deadline};
use crate::handlers::auth_middleware::AuthUser;
use crate::models::task_models::{NewCalendarTask, NewTask};
use crate::utils::time_utils::resolve_event_window;
use crate::AppState;

fn db_error(e: diesel::result::Error) -> (StatusCode, Json<serde_json::Value>) {
    tracing::error!("Database error: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Database error" })),
    )
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub description: String,
    #[serde(default)]
    pub deadline: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
}

pub async fn create_task(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Json(request): Json<CreateTaskRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    if request.description.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "description is required" })),
        ));
    }

    let task = state
        .task_repository
        .create_task(NewTask {
            user_id: auth_user.user_id,
            description: request.description.trim().to_string(),
            deadline: validate_deadline(request.deadline),
            priority: normalize_priority(request.priority.as_deref()),
            gmail_id: None,
            created_by_bot: false,
            bot_id: None,
            completed: false,
            created_at: chrono::Utc::now().timestamp() as i32,
        })
        .map_err(db_error)?;

    Ok(Json(json!({ "success": true, "task": task })))
}

pub async fn list_tasks(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let tasks = state
        .task_repository
        .get_tasks_for_user(auth_user.user_id)
        .map_err(db_error)?;
    Ok(Json(json!({ "tasks": tasks })))
}

#[derive(Debug, Deserialize)]
pub struct SetCompletedRequest {
    pub completed: bool,
}

pub async fn set_task_completed(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(task_id): Path<i32>,
    Json(request): Json<SetCompletedRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let updated = state
        .task_repository
        .set_task_completed(auth_user.user_id, task_id, request.completed)
        .map_err(db_error)?;
    if updated == 0 {
        return Err((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Task not found" })),
        ));
    }
    Ok(Json(json!({ "success": true })))
}

pub async fn delete_task(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(task_id): Path<i32>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let deleted = state
        .task_repository
        .delete_task(auth_user.user_id, task_id)
        .map_err(db_error)?;
    if deleted == 0 {
        return Err((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Task not found" })),
        ));
    }
    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
pub struct CreateCalendarTaskRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub date: String,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
}

pub async fn create_calendar_task(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Json(request): Json<CreateCalendarTaskRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    if request.title.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "title is required" })),
        ));
    }
    let Some((start, _end)) =
        resolve_event_window(Some(&request.date), request.time.as_deref(), None)
    else {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "date must be YYYY-MM-DD" })),
        ));
    };

    let task = state
        .task_repository
        .create_calendar_task(NewCalendarTask {
            user_id: auth_user.user_id,
            title: request.title.trim().to_string(),
            description: request.description,
            due_at: start.and_utc().timestamp() as i32,
            status: "pending".to_string(),
            priority: normalize_priority(request.priority.as_deref()),
            created_by_bot: false,
            bot_id: None,
            calendar_event_id: None,
            gmail_id: None,
            created_at: chrono::Utc::now().timestamp() as i32,
        })
        .map_err(db_error)?;

    Ok(Json(json!({ "success": true, "calendar_task": task })))
}

pub async fn list_calendar_tasks(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let tasks = state
        .task_repository
        .get_calendar_tasks_for_user(auth_user.user_id)
        .map_err(db_error)?;
    Ok(Json(json!({ "calendar_tasks": tasks })))
}

#[derive(Debug, Deserialize)]
pub struct SetStatusRequest {
    pub status: String,
}

pub async fn set_calendar_task_status(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(task_id): Path<i32>,
    Json(request): Json<SetStatusRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    if !matches!(request.status.as_str(), "pending" | "completed" | "cancelled") {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "status must be pending, completed or cancelled" })),
        ));
    }
    let updated = state
        .task_repository
        .set_calendar_task_status(auth_user.user_id, task_id, &request.status)
        .map_err(db_error)?;
    if updated == 0 {
        return Err((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Calendar task not found" })),
        ));
    }
    Ok(Json(json!({ "success": true })))
}
