use std::collections::HashSet;
use std::sync::Arc;

use axum::{extract::{Path, State}, http::StatusCode, response::Json};
use base64::{engine::general_purpose::URL_SAFE, Engine};
use chrono::{DateTime, Utc};
use futures::{stream, StreamExt};
use oauth2::TokenResponse;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::Deserialize;
use serde_json::json;

use crate::automation::providers::{
    InboundEmail, Mailbox, ProviderError, ReplyDraft, ThreadHeaders,
};
use crate::handlers::auth_middleware::AuthUser;
use crate::utils::mime_utils::{collect_attachments, decode_bodies, MessagePart};
use crate::AppState;

const GMAIL_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

#[derive(Debug)]
pub enum GmailError {
    NoConnection,
    TokenError(String),
    ApiError(String),
    ParseError(String),
    InvalidRefreshToken,
}

impl std::fmt::Display for GmailError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GmailError::NoConnection => write!(f, "no Gmail connection"),
            GmailError::TokenError(msg) => write!(f, "token error: {}", msg),
            GmailError::ApiError(msg) => write!(f, "Gmail API error: {}", msg),
            GmailError::ParseError(msg) => write!(f, "Gmail parse error: {}", msg),
            GmailError::InvalidRefreshToken => write!(f, "refresh token invalid"),
        }
    }
}

impl From<GmailError> for ProviderError {
    fn from(e: GmailError) -> Self {
        match e {
            GmailError::NoConnection | GmailError::InvalidRefreshToken => {
                ProviderError::Auth(e.to_string())
            }
            GmailError::TokenError(msg) => ProviderError::Auth(msg),
            GmailError::ApiError(msg) => ProviderError::Api(msg),
            GmailError::ParseError(msg) => ProviderError::Parse(msg),
        }
    }
}

fn error_response(e: GmailError) -> (StatusCode, Json<serde_json::Value>) {
    let (status, message) = match e {
        GmailError::NoConnection => (StatusCode::BAD_REQUEST, "No Gmail connection found".to_string()),
        GmailError::TokenError(msg) => (StatusCode::UNAUTHORIZED, msg),
        GmailError::InvalidRefreshToken => {
            (StatusCode::UNAUTHORIZED, "Refresh token invalid, please re-authenticate".to_string())
        }
        GmailError::ApiError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        GmailError::ParseError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
    };
    (status, Json(json!({ "error": message })))
}

#[derive(Debug, Deserialize)]
struct GmailMessageDetail {
    pub id: String,
    #[serde(rename = "threadId")]
    pub thread_id: String,
    pub snippet: Option<String>,
    pub payload: MessagePart,
    #[serde(with = "gmail_date_format", rename = "internalDate")]
    pub internal_date: DateTime<Utc>,
    #[serde(default, rename = "labelIds")]
    pub label_ids: Vec<String>,
}

mod gmail_date_format {
    use chrono::{DateTime, TimeZone, Utc};
    use serde::{self, Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let timestamp_str = String::deserialize(deserializer)?;
        let timestamp_ms = timestamp_str
            .parse::<i64>()
            .map_err(|e| serde::de::Error::custom(format!("failed to parse timestamp: {}", e)))?;
        Utc.timestamp_millis_opt(timestamp_ms)
            .single()
            .ok_or_else(|| serde::de::Error::custom("invalid timestamp"))
    }
}

#[derive(Debug, Deserialize)]
struct MessageListResponse {
    pub messages: Option<Vec<MessageRef>>,
    #[serde(rename = "nextPageToken")]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    pub id: String,
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    pub history: Option<Vec<HistoryRecord>>,
    #[serde(rename = "nextPageToken")]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HistoryRecord {
    #[serde(default, rename = "messagesAdded")]
    pub messages_added: Vec<HistoryMessage>,
}

#[derive(Debug, Deserialize)]
struct HistoryMessage {
    pub message: MessageRef,
}

#[derive(Debug, Deserialize)]
pub struct WatchResponse {
    #[serde(rename = "historyId")]
    pub history_id: String,
    pub expiration: String,
}

/// Per-call Gmail client scoped to one user's freshly validated access token.
/// Never shared between requests, so credentials cannot bleed across users.
#[derive(Clone)]
pub struct GoogleClient {
    access_token: String,
    http: reqwest::Client,
}

impl GoogleClient {
    pub async fn for_user(state: &AppState, user_id: i32) -> Result<Self, GmailError> {
        let http = reqwest::Client::new();
        let access_token = get_valid_access_token(state, user_id, &http).await?;
        Ok(Self { access_token, http })
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, GmailError> {
        self.get_json_with_query(url, &[]).await
    }

    async fn get_json_with_query<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, GmailError> {
        let response = self
            .http
            .get(url)
            .query(query)
            .header(AUTHORIZATION, format!("Bearer {}", self.access_token))
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| GmailError::ApiError(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(GmailError::TokenError("access token rejected".to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GmailError::ApiError(format!("status {}: {}", status, body)));
        }
        let text = response
            .text()
            .await
            .map_err(|e| GmailError::ParseError(e.to_string()))?;
        serde_json::from_str(&text).map_err(|e| {
            tracing::error!("Failed to parse Gmail response: {} (body: {})", e, text);
            GmailError::ParseError(e.to_string())
        })
    }

    async fn fetch_message_detail(&self, message_id: &str) -> Result<GmailMessageDetail, GmailError> {
        let url = format!(
            "{}/messages/{}?format=full&fields=id,threadId,snippet,payload,internalDate,labelIds",
            GMAIL_BASE, message_id
        );
        self.get_json(&url).await
    }

    pub async fn fetch_inbound_email(&self, message_id: &str) -> Result<InboundEmail, GmailError> {
        let detail = self.fetch_message_detail(message_id).await?;
        Ok(inbound_from_detail(detail))
    }

    pub async fn fetch_thread_headers(&self, message_id: &str) -> Result<ThreadHeaders, GmailError> {
        let url = format!(
            "{}/messages/{}?format=metadata&metadataHeaders=Message-ID&metadataHeaders=References",
            GMAIL_BASE, message_id
        );
        let detail: GmailMessageDetail = self.get_json(&url).await?;
        let header = |name: &str| {
            detail
                .payload
                .headers
                .iter()
                .find(|h| h.name.eq_ignore_ascii_case(name))
                .map(|h| h.value.clone())
        };
        Ok(ThreadHeaders {
            message_id: header("Message-ID"),
            references: header("References"),
        })
    }

    /// Ids of messages added since `checkpoint`, in provider-returned order.
    pub async fn list_messages_since(&self, checkpoint: &str) -> Result<Vec<String>, GmailError> {
        let mut ids = Vec::new();
        let mut seen = HashSet::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query: Vec<(&str, &str)> = vec![
                ("startHistoryId", checkpoint),
                ("historyTypes", "messageAdded"),
            ];
            if let Some(token) = &page_token {
                query.push(("pageToken", token));
            }
            let page: HistoryResponse = self
                .get_json_with_query(&format!("{}/history", GMAIL_BASE), &query)
                .await?;
            for record in page.history.unwrap_or_default() {
                for added in record.messages_added {
                    if seen.insert(added.message.id.clone()) {
                        ids.push(added.message.id);
                    }
                }
            }
            page_token = page.next_page_token;
            if page_token.is_none() {
                break;
            }
        }
        Ok(ids)
    }

    /// Sends an HTML reply as a raw RFC 2822 message, keeping it in the
    /// original thread via In-Reply-To/References and the threadId.
    pub async fn send_html_reply(&self, draft: &ReplyDraft) -> Result<(), GmailError> {
        let mut raw = String::new();
        raw.push_str(&format!("To: {}\r\n", draft.to));
        raw.push_str(&format!("Subject: {}\r\n", draft.subject));
        if let Some(in_reply_to) = &draft.in_reply_to {
            raw.push_str(&format!("In-Reply-To: {}\r\n", in_reply_to));
        }
        if let Some(references) = &draft.references {
            raw.push_str(&format!("References: {}\r\n", references));
        }
        raw.push_str("MIME-Version: 1.0\r\n");
        raw.push_str("Content-Type: text/html; charset=utf-8\r\n\r\n");
        raw.push_str(&draft.html_body);

        let body = json!({
            "raw": URL_SAFE.encode(raw.as_bytes()),
            "threadId": draft.thread_id,
        });
        let response = self
            .http
            .post(format!("{}/messages/send", GMAIL_BASE))
            .header(AUTHORIZATION, format!("Bearer {}", self.access_token))
            .json(&body)
            .send()
            .await
            .map_err(|e| GmailError::ApiError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GmailError::ApiError(format!("send failed {}: {}", status, body)));
        }
        Ok(())
    }

    /// Registers the Pub/Sub push subscription. Gmail expires watches after
    /// about seven days, so this is re-run on a schedule.
    pub async fn setup_watch(&self, topic_name: &str) -> Result<WatchResponse, GmailError> {
        let response = self
            .http
            .post(format!("{}/watch", GMAIL_BASE))
            .header(AUTHORIZATION, format!("Bearer {}", self.access_token))
            .json(&json!({
                "topicName": topic_name,
                "labelIds": ["INBOX"],
                "labelFilterBehavior": "INCLUDE",
            }))
            .send()
            .await
            .map_err(|e| GmailError::ApiError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GmailError::ApiError(format!("watch failed {}: {}", status, body)));
        }
        response
            .json::<WatchResponse>()
            .await
            .map_err(|e| GmailError::ParseError(e.to_string()))
    }

    pub async fn stop_watch(&self) -> Result<(), GmailError> {
        let response = self
            .http
            .post(format!("{}/stop", GMAIL_BASE))
            .header(AUTHORIZATION, format!("Bearer {}", self.access_token))
            .send()
            .await
            .map_err(|e| GmailError::ApiError(e.to_string()))?;
        if !response.status().is_success() {
            return Err(GmailError::ApiError(format!("stop failed: {}", response.status())));
        }
        Ok(())
    }

    pub async fn unread_count(&self) -> Result<i64, GmailError> {
        let label: serde_json::Value = self.get_json(&format!("{}/labels/INBOX", GMAIL_BASE)).await?;
        Ok(label["messagesUnread"].as_i64().unwrap_or(0))
    }
}

impl Mailbox for GoogleClient {
    async fn get_message(&self, message_id: &str) -> Result<InboundEmail, ProviderError> {
        Ok(self.fetch_inbound_email(message_id).await?)
    }

    async fn get_thread_headers(&self, message_id: &str) -> Result<ThreadHeaders, ProviderError> {
        Ok(self.fetch_thread_headers(message_id).await?)
    }

    async fn list_new_message_ids(&self, checkpoint: &str) -> Result<Vec<String>, ProviderError> {
        Ok(self.list_messages_since(checkpoint).await?)
    }

    async fn send_reply(&self, draft: &ReplyDraft) -> Result<(), ProviderError> {
        Ok(self.send_html_reply(draft).await?)
    }
}

fn inbound_from_detail(detail: GmailMessageDetail) -> InboundEmail {
    let header = |name: &str| {
        detail
            .payload
            .headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.clone())
    };

    let sender_header = header("from").unwrap_or_default();
    let sender_email = extract_address(&sender_header);
    let bodies = decode_bodies(&detail.payload);

    InboundEmail {
        id: detail.id,
        thread_id: detail.thread_id,
        sender_email,
        sender_header,
        subject: header("subject").unwrap_or_default(),
        date: header("date").unwrap_or_else(|| detail.internal_date.to_rfc2822()),
        snippet: detail.snippet.unwrap_or_default(),
        body_text: bodies.text,
        body_html: bodies.html,
    }
}

/// Pulls the bare address out of a From header like `Name <a@b.com>`.
pub fn extract_address(from_header: &str) -> String {
    if let (Some(start), Some(end)) = (from_header.find('<'), from_header.find('>')) {
        if start < end {
            return from_header[start + 1..end].trim().to_string();
        }
    }
    from_header.trim().to_string()
}

/// Refreshes the user's access token when missing or about to expire.
/// A failed refresh drops the connection so the user re-authenticates.
async fn get_valid_access_token(
    state: &AppState,
    user_id: i32,
    client: &reqwest::Client,
) -> Result<String, GmailError> {
    let user = state
        .user_repository
        .find_by_id(user_id)
        .map_err(|e| GmailError::TokenError(e.to_string()))?
        .ok_or(GmailError::NoConnection)?;

    let refresh_token = user.google_refresh_token.clone().ok_or(GmailError::NoConnection)?;

    let now = Utc::now().timestamp() as i32;
    if let (Some(access), Some(expires_at)) = (&user.google_access_token, user.token_expires_at) {
        if expires_at > now + 60 {
            return Ok(access.clone());
        }
    }

    let token_result = state
        .oauth_client
        .exchange_refresh_token(&oauth2::RefreshToken::new(refresh_token))
        .request_async(client)
        .await;

    match token_result {
        Ok(token) => {
            let new_access_token = token.access_token().secret().to_string();
            let expires_in = token.expires_in().unwrap_or_default().as_secs() as i32;
            state
                .user_repository
                .update_google_access_token(user_id, &new_access_token, expires_in)
                .map_err(|e| GmailError::TokenError(e.to_string()))?;
            Ok(new_access_token)
        }
        Err(e) => {
            tracing::error!("Refresh token failed for user {}: {}", user_id, e);
            state
                .user_repository
                .delete_google_connection(user_id)
                .map_err(|e| GmailError::TokenError(e.to_string()))?;
            Err(GmailError::InvalidRefreshToken)
        }
    }
}

pub async fn fetch_single_email(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(message_id): Path<String>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    tracing::info!("Fetching Gmail message {} for user {}", message_id, auth_user.user_id);

    let client = GoogleClient::for_user(&state, auth_user.user_id)
        .await
        .map_err(error_response)?;
    let detail = client
        .fetch_message_detail(&message_id)
        .await
        .map_err(error_response)?;
    let attachments: Vec<serde_json::Value> = collect_attachments(&detail.payload)
        .into_iter()
        .map(|a| {
            json!({
                "filename": a.filename,
                "attachment_id": a.attachment_id,
                "size": a.size,
                "too_large": a.too_large,
            })
        })
        .collect();
    let email = inbound_from_detail(detail);

    Ok(Json(json!({
        "success": true,
        "email": {
            "id": email.id,
            "thread_id": email.thread_id,
            "subject": email.subject,
            "from": email.sender_header,
            "from_email": email.sender_email,
            "date": email.date,
            "snippet": email.snippet,
            "body": email.body_text.or(email.body_html).unwrap_or_else(|| "No content".to_string()),
            "attachments": attachments,
        }
    })))
}

/// Recent inbox previews. Metadata fetches are chunked to ten in flight to
/// respect upstream rate limits.
pub async fn fetch_email_previews(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    tracing::info!("Fetching Gmail previews for user {}", auth_user.user_id);

    let client = GoogleClient::for_user(&state, auth_user.user_id)
        .await
        .map_err(error_response)?;

    let list: MessageListResponse = client
        .get_json(&format!("{}/messages?maxResults=10", GMAIL_BASE))
        .await
        .map_err(error_response)?;
    let ids: Vec<String> = list
        .messages
        .unwrap_or_default()
        .into_iter()
        .map(|m| m.id)
        .collect();

    let previews: Vec<serde_json::Value> = stream::iter(ids)
        .map(|id| {
            let client = client.clone();
            async move {
                let url = format!(
                    "{}/messages/{}?format=metadata&metadataHeaders=From&metadataHeaders=Subject&metadataHeaders=Date",
                    GMAIL_BASE, id
                );
                client.get_json::<GmailMessageDetail>(&url).await
            }
        })
        .buffered(10)
        .filter_map(|result| async move {
            match result {
                Ok(detail) => {
                    let header = |name: &str| {
                        detail
                            .payload
                            .headers
                            .iter()
                            .find(|h| h.name.eq_ignore_ascii_case(name))
                            .map(|h| h.value.clone())
                    };
                    Some(json!({
                        "id": detail.id,
                        "thread_id": detail.thread_id,
                        "subject": header("subject").unwrap_or_else(|| "No subject".to_string()),
                        "from": header("from").unwrap_or_else(|| "Unknown sender".to_string()),
                        "date": detail.internal_date.to_rfc3339(),
                        "snippet": detail.snippet.unwrap_or_default(),
                        "is_read": !detail.label_ids.contains(&"UNREAD".to_string()),
                    }))
                }
                Err(e) => {
                    tracing::warn!("Skipping preview: {}", e);
                    None
                }
            }
        })
        .collect()
        .await;

    Ok(Json(json!({ "success": true, "previews": previews })))
}

pub async fn gmail_unread_count(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let client = GoogleClient::for_user(&state, auth_user.user_id)
        .await
        .map_err(error_response)?;
    let unread = client.unread_count().await.map_err(error_response)?;
    Ok(Json(json!({ "unread": unread })))
}
