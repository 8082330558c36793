use std::sync::Arc;

use axum::{body::Bytes, extract::State, response::Json};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Deserializer};
use serde_json::json;

use crate::automation::dispatcher::process_message;
use crate::automation::providers::{
    AutomationProviders, CalendarApi, Completion, Mailbox, OpenRouterCompletion,
};
use crate::handlers::gmail::GoogleClient;
use crate::models::user_models::User;
use crate::AppState;

/// Pub/Sub push envelope. Only `message.data` carries payload; the rest is
/// transport bookkeeping.
#[derive(Debug, Deserialize)]
pub struct PubSubEnvelope {
    pub message: PubSubMessage,
    #[serde(default)]
    pub subscription: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PubSubMessage {
    pub data: String,
    #[serde(default, rename = "messageId")]
    pub message_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GmailNotification {
    #[serde(rename = "emailAddress")]
    pub email_address: String,
    #[serde(rename = "historyId", deserialize_with = "string_or_number")]
    pub history_id: String,
}

// Gmail has sent historyId as both a JSON number and a string.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Value {
        Str(String),
        Num(u64),
    }
    Ok(match Value::deserialize(deserializer)? {
        Value::Str(s) => s,
        Value::Num(n) => n.to_string(),
    })
}

pub fn decode_envelope(envelope: &PubSubEnvelope) -> Result<GmailNotification, String> {
    let bytes = STANDARD
        .decode(envelope.message.data.trim())
        .map_err(|e| format!("invalid base64 payload: {}", e))?;
    serde_json::from_slice(&bytes).map_err(|e| format!("invalid notification payload: {}", e))
}

/// Gmail push endpoint. Pub/Sub redelivers on anything but a fast 2xx, so the
/// raw body is decoded here rather than by an extractor (a malformed envelope
/// must still get a 200, not a framework 4xx), and all work happens in a
/// detached task.
pub async fn handle_gmail_notification(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Json<serde_json::Value> {
    let envelope: PubSubEnvelope = match serde_json::from_slice(&body) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!("Dropping malformed Gmail push envelope: {}", e);
            return Json(json!({ "status": "ok" }));
        }
    };

    tracing::debug!(
        "Received Gmail push (pubsub message {:?}, subscription {:?})",
        envelope.message.message_id,
        envelope.subscription
    );

    tokio::spawn(async move {
        process_push(state, envelope).await;
    });

    Json(json!({ "status": "ok" }))
}

async fn process_push(state: Arc<AppState>, envelope: PubSubEnvelope) {
    let notification = match decode_envelope(&envelope) {
        Ok(notification) => notification,
        Err(e) => {
            tracing::warn!("Dropping undecodable Gmail push: {}", e);
            return;
        }
    };

    let user = match state.user_repository.find_by_email(&notification.email_address) {
        Ok(Some(user)) => user,
        Ok(None) => {
            tracing::warn!(
                "Gmail push for unknown address {}, ignoring",
                notification.email_address
            );
            return;
        }
        Err(e) => {
            tracing::error!("User lookup failed for Gmail push: {}", e);
            return;
        }
    };

    let client = match GoogleClient::for_user(&state, user.id).await {
        Ok(client) => client,
        Err(e) => {
            tracing::error!("Could not build Gmail client for user {}: {}", user.id, e);
            return;
        }
    };

    let providers = AutomationProviders {
        mailbox: client.clone(),
        calendar: client,
        completion: OpenRouterCompletion::new(),
    };
    run_automation_batch(&state, &providers, &user, &notification.history_id).await;
}

/// Processes every message added since the user's stored cursor, then
/// advances the cursor to the notification's historyId exactly once. If the
/// history listing itself fails the cursor stays put so nothing is skipped;
/// per-message failures are logged and do not hold the cursor back, since a
/// stuck cursor would replay the whole batch forever.
pub async fn run_automation_batch<M, C, L>(
    state: &AppState,
    providers: &AutomationProviders<M, C, L>,
    user: &User,
    history_id: &str,
) where
    M: Mailbox,
    C: CalendarApi,
    L: Completion,
{
    let checkpoint = user.history_cursor.as_deref().unwrap_or(history_id);

    let message_ids = match providers.mailbox.list_new_message_ids(checkpoint).await {
        Ok(ids) => ids,
        Err(e) => {
            tracing::error!(
                "History listing from {} failed for user {}: {}",
                checkpoint,
                user.id,
                e
            );
            return;
        }
    };

    tracing::info!(
        "Processing {} new message(s) for user {} (checkpoint {})",
        message_ids.len(),
        user.id,
        checkpoint
    );

    for message_id in &message_ids {
        match providers.mailbox.get_message(message_id).await {
            Ok(email) => process_message(state, providers, user, &email).await,
            Err(e) => {
                tracing::error!("Could not fetch message {} for user {}: {}", message_id, user.id, e);
            }
        }
    }

    if let Err(e) = state.user_repository.update_history_cursor(user.id, history_id) {
        tracing::error!("Could not advance history cursor for user {}: {}", user.id, e);
    }
}
