use std::env;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Json, Redirect},
};
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use oauth2::{
    AuthorizationCode, CsrfToken, PkceCodeChallenge, PkceCodeVerifier, Scope, TokenResponse,
};
use serde::Deserialize;
use serde_json::json;

use crate::handlers::auth_dtos::{Claims, OAuthCallbackQuery};
use crate::handlers::auth_middleware::AuthUser;
use crate::handlers::gmail::GoogleClient;
use crate::AppState;

const SCOPES: [&str; 3] = [
    "https://www.googleapis.com/auth/gmail.modify",
    "https://www.googleapis.com/auth/calendar.events",
    "https://www.googleapis.com/auth/userinfo.email",
];

#[derive(Debug, Deserialize)]
struct UserInfo {
    email: String,
}

/// Starts the Google OAuth flow. The PKCE verifier is held server-side keyed
/// by the CSRF state until the callback comes back.
pub async fn google_login(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

    let mut request = state
        .oauth_client
        .authorize_url(CsrfToken::new_random)
        .set_pkce_challenge(pkce_challenge)
        .add_extra_param("access_type", "offline")
        .add_extra_param("prompt", "consent");
    for scope in SCOPES {
        request = request.add_scope(Scope::new(scope.to_string()));
    }
    let (auth_url, csrf_token) = request.url();

    state
        .pending_oauth
        .lock()
        .map_err(|_| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "oauth state unavailable" })),
            )
        })?
        .insert(
            csrf_token.secret().clone(),
            pkce_verifier.secret().to_string(),
        );

    Ok(Json(json!({ "auth_url": auth_url.to_string() })))
}

/// OAuth callback: exchanges the code, stores tokens, registers the Gmail
/// watch, and hands the browser back to the frontend with a session JWT.
pub async fn google_callback(
    State(state): State<Arc<AppState>>,
    Query(query): Query<OAuthCallbackQuery>,
) -> Result<Redirect, (StatusCode, Json<serde_json::Value>)> {
    let server_error = |message: String| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": message })),
        )
    };

    let verifier = state
        .pending_oauth
        .lock()
        .map_err(|_| server_error("oauth state unavailable".to_string()))?
        .remove(&query.state)
        .ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "unknown or expired oauth state" })),
            )
        })?;

    let http = reqwest::Client::new();
    let token = state
        .oauth_client
        .exchange_code(AuthorizationCode::new(query.code))
        .set_pkce_verifier(PkceCodeVerifier::new(verifier))
        .request_async(&http)
        .await
        .map_err(|e| server_error(format!("code exchange failed: {}", e)))?;

    let access_token = token.access_token().secret().to_string();
    let refresh_token = token.refresh_token().map(|t| t.secret().to_string());
    let expires_at =
        (Utc::now().timestamp() + token.expires_in().unwrap_or_default().as_secs() as i64) as i32;

    let user_info: UserInfo = http
        .get("https://www.googleapis.com/oauth2/v2/userinfo")
        .bearer_auth(&access_token)
        .send()
        .await
        .map_err(|e| server_error(format!("userinfo fetch failed: {}", e)))?
        .json()
        .await
        .map_err(|e| server_error(format!("userinfo parse failed: {}", e)))?;

    let user = state
        .user_repository
        .upsert_google_account(
            &user_info.email,
            &access_token,
            refresh_token.as_deref(),
            expires_at,
        )
        .map_err(|e| server_error(format!("could not store account: {}", e)))?;

    tracing::info!("Google account connected for user {} ({})", user.id, user.email);

    // Watch registration is best-effort; the renewal job retries it.
    match GoogleClient::for_user(&state, user.id).await {
        Ok(client) => {
            let topic = env::var("PUBSUB_TOPIC").unwrap_or_default();
            if let Err(e) = client.setup_watch(&topic).await {
                tracing::warn!("Initial Gmail watch setup failed for user {}: {}", user.id, e);
            }
        }
        Err(e) => tracing::warn!("Could not build Gmail client after login: {}", e),
    }

    let jwt = issue_jwt(user.id).map_err(server_error)?;
    let frontend = env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:8080".to_string());
    Ok(Redirect::to(&format!("{}/auth/success?token={}", frontend, jwt)))
}

fn issue_jwt(user_id: i32) -> Result<String, String> {
    let secret = env::var("JWT_SECRET_KEY").map_err(|_| "JWT_SECRET_KEY not set".to_string())?;
    let claims = Claims {
        sub: user_id,
        exp: (Utc::now().timestamp() + 30 * 24 * 3600) as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| format!("could not issue token: {}", e))
}

/// Disconnects Google: stops the watch if possible, then drops the tokens.
pub async fn google_disconnect(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    if let Ok(client) = GoogleClient::for_user(&state, auth_user.user_id).await {
        if let Err(e) = client.stop_watch().await {
            tracing::warn!("Gmail watch stop failed for user {}: {}", auth_user.user_id, e);
        }
    }

    state
        .user_repository
        .delete_google_connection(auth_user.user_id)
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
        })?;

    Ok(Json(json!({ "success": true })))
}

pub async fn connection_status(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let user = state
        .user_repository
        .find_by_id(auth_user.user_id)
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
        })?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "User not found" })),
            )
        })?;

    Ok(Json(json!({
        "connected": user.has_google_connection(),
        "email": user.email,
    })))
}
