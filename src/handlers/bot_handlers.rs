use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::handlers::auth_middleware::AuthUser;
use crate::models::bot_models::{NewAutomationBot, ReplyTone};
use crate::AppState;

fn db_error(e: diesel::result::Error) -> (StatusCode, Json<serde_json::Value>) {
    tracing::error!("Database error: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Database error" })),
    )
}

#[derive(Debug, Deserialize)]
pub struct CreateBotRequest {
    pub name: String,
    pub sender_emails: String,
    #[serde(default)]
    pub auto_summarize: bool,
    #[serde(default)]
    pub auto_extract_tasks: bool,
    #[serde(default)]
    pub auto_extract_meetings: bool,
    #[serde(default)]
    pub auto_reply: bool,
    #[serde(default)]
    pub reply_tone: Option<String>,
    #[serde(default)]
    pub custom_prompt: Option<String>,
    #[serde(default)]
    pub reply_template: Option<String>,
}

pub async fn create_bot(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Json(request): Json<CreateBotRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    if request.name.trim().is_empty() || request.sender_emails.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "name and sender_emails are required" })),
        ));
    }

    // Unknown tones are stored normalized rather than rejected
    let tone = request
        .reply_tone
        .as_deref()
        .map(ReplyTone::parse)
        .unwrap_or(ReplyTone::Professional);

    let bot = state
        .bot_repository
        .create_bot(NewAutomationBot {
            user_id: auth_user.user_id,
            name: request.name.trim().to_string(),
            sender_emails: request.sender_emails.trim().to_string(),
            is_active: true,
            auto_summarize: request.auto_summarize,
            auto_extract_tasks: request.auto_extract_tasks,
            auto_extract_meetings: request.auto_extract_meetings,
            auto_reply: request.auto_reply,
            reply_tone: tone.as_str().to_string(),
            custom_prompt: request.custom_prompt,
            reply_template: request.reply_template,
            created_at: chrono::Utc::now().timestamp() as i32,
        })
        .map_err(db_error)?;

    tracing::info!("User {} created bot {} ({})", auth_user.user_id, bot.id, bot.name);
    Ok(Json(json!({ "success": true, "bot": bot })))
}

pub async fn list_bots(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let bots = state
        .bot_repository
        .get_bots_for_user(auth_user.user_id)
        .map_err(db_error)?;
    Ok(Json(json!({ "bots": bots })))
}

pub async fn get_bot(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(bot_id): Path<i32>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let bot = state
        .bot_repository
        .find_bot_by_id(auth_user.user_id, bot_id)
        .map_err(db_error)?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "Bot not found" })),
            )
        })?;
    Ok(Json(json!({ "bot": bot })))
}

#[derive(Debug, Deserialize)]
pub struct SetActiveRequest {
    pub is_active: bool,
}

pub async fn set_bot_active(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(bot_id): Path<i32>,
    Json(request): Json<SetActiveRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let updated = state
        .bot_repository
        .set_bot_active(auth_user.user_id, bot_id, request.is_active)
        .map_err(db_error)?;
    if updated == 0 {
        return Err((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Bot not found" })),
        ));
    }
    Ok(Json(json!({ "success": true })))
}

pub async fn delete_bot(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(bot_id): Path<i32>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let deleted = state
        .bot_repository
        .delete_bot(auth_user.user_id, bot_id)
        .map_err(db_error)?;
    if deleted == 0 {
        return Err((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Bot not found" })),
        ));
    }
    tracing::info!("User {} deleted bot {}", auth_user.user_id, bot_id);
    Ok(Json(json!({ "success": true })))
}

pub async fn list_summaries(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let summaries = state
        .bot_repository
        .get_summaries_for_user(auth_user.user_id)
        .map_err(db_error)?;
    Ok(Json(json!({ "summaries": summaries })))
}
