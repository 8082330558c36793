use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde_json::json;

use crate::handlers::auth_middleware::AuthUser;
use crate::AppState;

fn db_error(e: diesel::result::Error) -> (StatusCode, Json<serde_json::Value>) {
    tracing::error!("Database error: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Database error" })),
    )
}

fn not_found() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "Notification not found" })),
    )
}

pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let notifications = state
        .notification_repository
        .get_active_for_user(auth_user.user_id)
        .map_err(db_error)?;
    Ok(Json(json!({ "notifications": notifications })))
}

pub async fn mark_notification_read(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(notification_id): Path<i32>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let updated = state
        .notification_repository
        .mark_read(auth_user.user_id, notification_id)
        .map_err(db_error)?;
    if updated == 0 {
        return Err(not_found());
    }
    Ok(Json(json!({ "success": true })))
}

pub async fn mark_notification_action_done(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(notification_id): Path<i32>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let updated = state
        .notification_repository
        .mark_action_done(auth_user.user_id, notification_id)
        .map_err(db_error)?;
    if updated == 0 {
        return Err(not_found());
    }
    Ok(Json(json!({ "success": true })))
}

pub async fn delete_notification(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(notification_id): Path<i32>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let deleted = state
        .notification_repository
        .soft_delete(auth_user.user_id, notification_id)
        .map_err(db_error)?;
    if deleted == 0 {
        return Err(not_found());
    }
    Ok(Json(json!({ "success": true })))
}
