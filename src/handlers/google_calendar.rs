use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::Json};
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use serde_json::json;

use crate::automation::providers::{CalendarApi, EventDraft, ProviderError};
use crate::handlers::auth_middleware::AuthUser;
use crate::handlers::gmail::GoogleClient;
use crate::AppState;

const CALENDAR_EVENTS: &str = "https://www.googleapis.com/calendar/v3/calendars/primary/events";
const EVENT_TIME_ZONE: &str = "UTC";

#[derive(Debug, Deserialize)]
struct CreatedEvent {
    id: String,
}

#[derive(Debug, Deserialize)]
struct EventListResponse {
    #[serde(default)]
    items: Vec<CalendarEvent>,
}

#[derive(Debug, Deserialize)]
struct CalendarEvent {
    id: String,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    start: Option<EventTime>,
    #[serde(default)]
    end: Option<EventTime>,
}

#[derive(Debug, Deserialize)]
struct EventTime {
    #[serde(rename = "dateTime")]
    date_time: Option<String>,
    date: Option<String>,
}

impl EventTime {
    fn display(&self) -> String {
        self.date_time
            .clone()
            .or_else(|| self.date.clone())
            .unwrap_or_default()
    }
}

impl GoogleClient {
    /// Inserts an event into the user's primary calendar and returns its id.
    pub async fn insert_calendar_event(&self, event: &EventDraft) -> Result<String, ProviderError> {
        let body = json!({
            "summary": event.title,
            "description": event.description,
            "start": {
                "dateTime": event.start.format("%Y-%m-%dT%H:%M:%S").to_string(),
                "timeZone": EVENT_TIME_ZONE,
            },
            "end": {
                "dateTime": event.end.format("%Y-%m-%dT%H:%M:%S").to_string(),
                "timeZone": EVENT_TIME_ZONE,
            },
        });

        let response = self
            .http()
            .post(CALENDAR_EVENTS)
            .header(AUTHORIZATION, format!("Bearer {}", self.access_token()))
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Api(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api(format!(
                "calendar insert failed {}: {}",
                status, body
            )));
        }
        let created: CreatedEvent = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        Ok(created.id)
    }
}

impl CalendarApi for GoogleClient {
    async fn create_event(&self, event: &EventDraft) -> Result<String, ProviderError> {
        self.insert_calendar_event(event).await
    }
}

/// Upcoming events in the next seven days, for the dashboard.
pub async fn fetch_upcoming_events(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let client = GoogleClient::for_user(&state, auth_user.user_id)
        .await
        .map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": e.to_string() })),
            )
        })?;

    let now = chrono::Utc::now();
    let url = format!(
        "{}?timeMin={}&timeMax={}&singleEvents=true&orderBy=startTime&maxResults=50",
        CALENDAR_EVENTS,
        now.format("%Y-%m-%dT%H:%M:%SZ"),
        (now + chrono::Duration::days(7)).format("%Y-%m-%dT%H:%M:%SZ"),
    );

    let response = client
        .http()
        .get(&url)
        .header(AUTHORIZATION, format!("Bearer {}", client.access_token()))
        .send()
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
        })?;

    if !response.status().is_success() {
        let status = response.status();
        tracing::error!("Calendar list failed with status {}", status);
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": format!("calendar list failed: {}", status) })),
        ));
    }

    let list: EventListResponse = response.json().await.map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
    })?;

    let events: Vec<serde_json::Value> = list
        .items
        .into_iter()
        .map(|event| {
            json!({
                "id": event.id,
                "title": event.summary.unwrap_or_else(|| "(no title)".to_string()),
                "description": event.description,
                "start": event.start.map(|t| t.display()),
                "end": event.end.map(|t| t.display()),
            })
        })
        .collect();

    Ok(Json(json!({ "success": true, "events": events })))
}
