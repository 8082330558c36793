use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::automation::providers::{
    CalendarApi, Completion, EventDraft, InboundEmail, Mailbox, ProviderError, ReplyDraft,
    ResponseSchema,
};
use crate::models::bot_models::AutomationBot;
use crate::models::bot_models::NewEmailSummary;
use crate::models::task_models::{NewCalendarTask, NewTask};
use crate::models::user_models::User;
use crate::utils::llm_utils::{safe_parse_json, strip_code_fence};
use crate::utils::mime_utils::strip_html;
use crate::utils::time_utils::resolve_event_window;
use crate::AppState;

#[derive(Debug, Error)]
pub enum AutomationError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("database error: {0}")]
    Db(#[from] diesel::result::Error),
}

#[derive(Debug, Default, Deserialize)]
pub struct SummaryResponse {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub priority_score: i32,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExtractionResponse {
    #[serde(default)]
    pub tasks: Vec<ExtractedTaskItem>,
    #[serde(default)]
    pub meeting: Option<MeetingItem>,
}

#[derive(Debug, Deserialize)]
pub struct ExtractedTaskItem {
    pub description: String,
    #[serde(default)]
    pub deadline: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MeetingItem {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub agenda: Option<String>,
}

fn summary_schema() -> ResponseSchema {
    ResponseSchema {
        name: "summarize_email",
        schema: json!({
            "type": "object",
            "properties": {
                "summary": {"type": "string", "description": "2-3 sentence summary of the email"},
                "priority_score": {"type": "integer", "minimum": 0, "maximum": 100}
            },
            "required": ["summary", "priority_score"]
        }),
    }
}

fn extraction_schema() -> ResponseSchema {
    ResponseSchema {
        name: "extract_items",
        schema: json!({
            "type": "object",
            "properties": {
                "tasks": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "description": {"type": "string"},
                            "deadline": {"type": "string", "description": "YYYY-MM-DD, omit if none"},
                            "priority": {"type": "string", "enum": ["High", "Medium", "Low"]}
                        },
                        "required": ["description"]
                    }
                },
                "meeting": {
                    "type": "object",
                    "properties": {
                        "title": {"type": "string"},
                        "date": {"type": "string", "description": "YYYY-MM-DD"},
                        "time": {"type": "string", "description": "HH:MM, 24h"},
                        "duration": {"type": "string", "description": "e.g. '1 hour', '30 minutes'"},
                        "agenda": {"type": "string"}
                    }
                }
            }
        }),
    }
}

/// Best body for the model: plain text, stripped HTML, then snippet.
fn body_for_model(email: &InboundEmail) -> String {
    if let Some(text) = &email.body_text {
        return text.clone();
    }
    if let Some(html) = &email.body_html {
        return strip_html(html);
    }
    email.snippet.clone()
}

pub fn normalize_priority(priority: Option<&str>) -> String {
    match priority.map(|p| p.trim().to_lowercase()) {
        Some(p) if p == "high" || p == "medium" || p == "low" => p,
        _ => "medium".to_string(),
    }
}

pub fn validate_deadline(deadline: Option<String>) -> Option<String> {
    let deadline = deadline?;
    NaiveDate::parse_from_str(deadline.trim(), "%Y-%m-%d")
        .ok()
        .map(|_| deadline.trim().to_string())
}

/// `Re: ` is prefixed exactly once; an already-prefixed subject passes through.
pub fn build_reply_subject(subject: &str) -> String {
    if subject.starts_with("Re: ") {
        subject.to_string()
    } else {
        format!("Re: {}", subject)
    }
}

pub async fn run_summarize<L: Completion>(
    state: &AppState,
    completion: &L,
    user: &User,
    email: &InboundEmail,
) -> Result<(), AutomationError> {
    if state.bot_repository.summary_exists(user.id, &email.id)? {
        tracing::debug!("Summary already exists for message {}, skipping", email.id);
        return Ok(());
    }

    let system = "You summarize emails for a busy professional. Produce a concise summary \
                  and a priority score from 0 (ignorable) to 100 (drop everything).";
    let input = format!(
        "From: {}\nSubject: {}\n\n{}",
        email.sender_header,
        email.subject,
        body_for_model(email)
    );

    let raw = completion
        .complete(system, &input, Some(&summary_schema()))
        .await?;
    let parsed = match safe_parse_json::<SummaryResponse>(&raw) {
        Some((value, recovery)) => {
            tracing::debug!("Parsed summary response via {:?}", recovery);
            value
        }
        None => {
            tracing::warn!("Unparseable summary response for message {}", email.id);
            SummaryResponse::default()
        }
    };

    state.bot_repository.create_summary(NewEmailSummary {
        user_id: user.id,
        gmail_id: email.id.clone(),
        summary: parsed.summary,
        priority_score: parsed.priority_score.clamp(0, 100),
        created_at: Utc::now().timestamp() as i32,
    })?;
    tracing::info!("Stored summary for message {} (user {})", email.id, user.id);
    Ok(())
}

pub async fn run_extraction<L: Completion, C: CalendarApi>(
    state: &AppState,
    completion: &L,
    calendar: &C,
    user: &User,
    bot: &AutomationBot,
    email: &InboundEmail,
) -> Result<(), AutomationError> {
    // Redelivery of the same push event must not duplicate extracted rows
    if state.task_repository.tasks_exist_for_message(user.id, &email.id)?
        || state
            .task_repository
            .calendar_tasks_exist_for_message(user.id, &email.id)?
    {
        tracing::debug!("Extraction already ran for message {}, skipping", email.id);
        return Ok(());
    }

    let now = Utc::now();
    // The model needs today's date to resolve "tomorrow" into YYYY-MM-DD
    let system = format!(
        "You extract actionable items from emails. Today is {} ({}). Resolve relative \
         dates like 'tomorrow' or 'next Friday' into absolute YYYY-MM-DD dates. Extract \
         tasks with deadlines and priority, and at most one meeting if the email proposes one.",
        now.format("%Y-%m-%d"),
        now.format("%A")
    );
    let input = format!("Subject: {}\n\n{}", email.subject, body_for_model(email));

    let raw = completion
        .complete(&system, &input, Some(&extraction_schema()))
        .await?;
    let parsed = match safe_parse_json::<ExtractionResponse>(&raw) {
        Some((value, recovery)) => {
            tracing::debug!("Parsed extraction response via {:?}", recovery);
            value
        }
        None => {
            tracing::warn!("Unparseable extraction response for message {}", email.id);
            ExtractionResponse::default()
        }
    };

    if bot.auto_extract_tasks {
        for item in &parsed.tasks {
            let task = state.task_repository.create_task(NewTask {
                user_id: user.id,
                description: item.description.clone(),
                deadline: validate_deadline(item.deadline.clone()),
                priority: normalize_priority(item.priority.as_deref()),
                gmail_id: Some(email.id.clone()),
                created_by_bot: true,
                bot_id: Some(bot.id),
                completed: false,
                created_at: now.timestamp() as i32,
            })?;
            tracing::info!("Extracted task {} from message {}", task.id, email.id);
        }
    }

    if bot.auto_extract_meetings {
        if let Some(meeting) = &parsed.meeting {
            create_meeting(state, calendar, user, bot, email, meeting).await?;
        }
    }

    Ok(())
}

async fn create_meeting<C: CalendarApi>(
    state: &AppState,
    calendar: &C,
    user: &User,
    bot: &AutomationBot,
    email: &InboundEmail,
    meeting: &MeetingItem,
) -> Result<(), AutomationError> {
    let Some((start, end)) = resolve_event_window(
        meeting.date.as_deref(),
        meeting.time.as_deref(),
        meeting.duration.as_deref(),
    ) else {
        tracing::warn!(
            "Meeting in message {} has no usable date, skipping calendar task",
            email.id
        );
        return Ok(());
    };

    let title = meeting
        .title
        .clone()
        .unwrap_or_else(|| email.subject.clone());

    // Calendar-side failure downgrades to a record without an external id
    let calendar_event_id = match calendar
        .create_event(&EventDraft {
            title: title.clone(),
            description: meeting.agenda.clone(),
            start,
            end,
        })
        .await
    {
        Ok(event_id) => Some(event_id),
        Err(e) => {
            tracing::warn!("Calendar event creation failed for message {}: {}", email.id, e);
            None
        }
    };

    let task = state.task_repository.create_calendar_task(NewCalendarTask {
        user_id: user.id,
        title,
        description: meeting.agenda.clone(),
        due_at: start.and_utc().timestamp() as i32,
        status: "pending".to_string(),
        priority: "high".to_string(),
        created_by_bot: true,
        bot_id: Some(bot.id),
        calendar_event_id,
        gmail_id: Some(email.id.clone()),
        created_at: Utc::now().timestamp() as i32,
    })?;
    tracing::info!("Created calendar task {} from message {}", task.id, email.id);
    Ok(())
}

pub async fn run_auto_reply<M: Mailbox, L: Completion>(
    mailbox: &M,
    completion: &L,
    bot: &AutomationBot,
    email: &InboundEmail,
) -> Result<(), AutomationError> {
    let mut system = format!(
        "You write email replies on behalf of the recipient. Write in a {} tone. \
         Reply with HTML body content only, no subject line.",
        bot.tone().as_str()
    );
    if let Some(prompt) = &bot.custom_prompt {
        system.push_str("\nAdditional instructions: ");
        system.push_str(prompt);
    }
    if let Some(template) = &bot.reply_template {
        system.push_str("\nBase the reply on this template:\n");
        system.push_str(template);
    }

    let input = format!(
        "From: {}\nSubject: {}\nDate: {}\n\n{}\n\nSnippet: {}",
        email.sender_header,
        email.subject,
        email.date,
        body_for_model(email),
        email.snippet
    );

    let raw = completion.complete(&system, &input, None).await?;
    let html_body = strip_code_fence(&raw).unwrap_or(&raw).trim().to_string();

    // Thread continuity: reply references the original Message-ID
    let headers = match mailbox.get_thread_headers(&email.id).await {
        Ok(headers) => headers,
        Err(e) => {
            tracing::warn!("Could not fetch thread headers for {}: {}", email.id, e);
            Default::default()
        }
    };
    let references = match (&headers.references, &headers.message_id) {
        (Some(refs), Some(msg_id)) => Some(format!("{} {}", refs, msg_id)),
        (Some(refs), None) => Some(refs.clone()),
        (None, Some(msg_id)) => Some(msg_id.clone()),
        (None, None) => None,
    };

    mailbox
        .send_reply(&ReplyDraft {
            thread_id: email.thread_id.clone(),
            to: email.sender_header.clone(),
            subject: build_reply_subject(&email.subject),
            html_body,
            in_reply_to: headers.message_id.clone(),
            references,
        })
        .await?;
    tracing::info!("Sent auto-reply for message {}", email.id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::providers::fakes::{sample_email, FakeCompletion, FakeMailbox};
    use crate::automation::providers::ThreadHeaders;

    fn reply_bot() -> AutomationBot {
        AutomationBot {
            id: 1,
            user_id: 1,
            name: "responder".to_string(),
            sender_emails: "boss@corp.com".to_string(),
            is_active: true,
            auto_summarize: false,
            auto_extract_tasks: false,
            auto_extract_meetings: false,
            auto_reply: true,
            reply_tone: "professional".to_string(),
            custom_prompt: None,
            reply_template: None,
            created_at: 0,
        }
    }

    #[tokio::test]
    async fn reply_appends_message_id_to_existing_references() {
        let mut mailbox = FakeMailbox::default().with_message(sample_email("m1", "boss@corp.com"));
        mailbox.thread_headers.insert(
            "m1".to_string(),
            ThreadHeaders {
                message_id: Some("<msg-3@corp.com>".to_string()),
                references: Some("<msg-1@corp.com> <msg-2@corp.com>".to_string()),
            },
        );

        let email = sample_email("m1", "boss@corp.com");
        run_auto_reply(&mailbox, &FakeCompletion::default(), &reply_bot(), &email)
            .await
            .unwrap();

        let sent = mailbox.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].in_reply_to.as_deref(), Some("<msg-3@corp.com>"));
        assert_eq!(
            sent[0].references.as_deref(),
            Some("<msg-1@corp.com> <msg-2@corp.com> <msg-3@corp.com>")
        );
        assert_eq!(sent[0].thread_id, "thread-m1");
    }

    #[tokio::test]
    async fn reply_starts_references_from_message_id_on_first_reply() {
        let mut mailbox = FakeMailbox::default().with_message(sample_email("m1", "boss@corp.com"));
        mailbox.thread_headers.insert(
            "m1".to_string(),
            ThreadHeaders {
                message_id: Some("<msg-1@corp.com>".to_string()),
                references: None,
            },
        );

        let email = sample_email("m1", "boss@corp.com");
        run_auto_reply(&mailbox, &FakeCompletion::default(), &reply_bot(), &email)
            .await
            .unwrap();

        let sent = mailbox.sent.lock().unwrap();
        assert_eq!(sent[0].in_reply_to.as_deref(), Some("<msg-1@corp.com>"));
        assert_eq!(sent[0].references.as_deref(), Some("<msg-1@corp.com>"));
    }

    #[tokio::test]
    async fn reply_keeps_prior_references_when_message_id_is_missing() {
        let mut mailbox = FakeMailbox::default().with_message(sample_email("m1", "boss@corp.com"));
        mailbox.thread_headers.insert(
            "m1".to_string(),
            ThreadHeaders {
                message_id: None,
                references: Some("<msg-1@corp.com>".to_string()),
            },
        );

        let email = sample_email("m1", "boss@corp.com");
        run_auto_reply(&mailbox, &FakeCompletion::default(), &reply_bot(), &email)
            .await
            .unwrap();

        let sent = mailbox.sent.lock().unwrap();
        assert_eq!(sent[0].in_reply_to, None);
        assert_eq!(sent[0].references.as_deref(), Some("<msg-1@corp.com>"));
    }

    #[tokio::test]
    async fn reply_without_thread_headers_sends_bare_draft() {
        let mailbox = FakeMailbox::default().with_message(sample_email("m1", "boss@corp.com"));

        let email = sample_email("m1", "boss@corp.com");
        run_auto_reply(&mailbox, &FakeCompletion::default(), &reply_bot(), &email)
            .await
            .unwrap();

        let sent = mailbox.sent.lock().unwrap();
        assert_eq!(sent[0].in_reply_to, None);
        assert_eq!(sent[0].references, None);
        assert_eq!(sent[0].subject, "Re: Quarterly planning");
    }

    #[test]
    fn reply_subject_is_prefixed_once() {
        assert_eq!(build_reply_subject("Hello"), "Re: Hello");
        assert_eq!(build_reply_subject("Re: Hello"), "Re: Hello");
        // Exact, case-sensitive prefix check
        assert_eq!(build_reply_subject("RE: Hello"), "Re: RE: Hello");
    }

    #[test]
    fn model_priority_maps_to_lowercase_with_medium_fallback() {
        assert_eq!(normalize_priority(Some("High")), "high");
        assert_eq!(normalize_priority(Some("LOW")), "low");
        assert_eq!(normalize_priority(Some("urgent")), "medium");
        assert_eq!(normalize_priority(None), "medium");
    }

    #[test]
    fn deadlines_must_be_absolute_dates() {
        assert_eq!(
            validate_deadline(Some("2026-03-01".to_string())),
            Some("2026-03-01".to_string())
        );
        assert_eq!(validate_deadline(Some("tomorrow".to_string())), None);
        assert_eq!(validate_deadline(None), None);
    }
}
