use chrono::NaiveDateTime;
use openai_api_rs::v1::chat_completion;
use thiserror::Error;

use crate::utils::llm_utils::{create_openai_client, COMPLETION_MODEL};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("provider call failed: {0}")]
    Api(String),
    #[error("could not parse provider response: {0}")]
    Parse(String),
}

/// One new message as seen by the automation pipeline. Built once per
/// webhook-delivered message id, never persisted as such.
#[derive(Debug, Clone)]
pub struct InboundEmail {
    pub id: String,
    pub thread_id: String,
    pub sender_email: String,
    pub sender_header: String, // raw From header, used as reply target
    pub subject: String,
    pub date: String,
    pub snippet: String,
    pub body_text: Option<String>,
    pub body_html: Option<String>,
}

/// Message-ID / References of the original message, needed to keep a reply in
/// its thread.
#[derive(Debug, Clone, Default)]
pub struct ThreadHeaders {
    pub message_id: Option<String>,
    pub references: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ReplyDraft {
    pub thread_id: String,
    pub to: String,
    pub subject: String,
    pub html_body: String,
    pub in_reply_to: Option<String>,
    pub references: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EventDraft {
    pub title: String,
    pub description: Option<String>,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

/// Mailbox provider seam: the subset of Gmail the automation path touches.
pub trait Mailbox {
    fn get_message(
        &self,
        message_id: &str,
    ) -> impl std::future::Future<Output = Result<InboundEmail, ProviderError>> + Send;

    fn get_thread_headers(
        &self,
        message_id: &str,
    ) -> impl std::future::Future<Output = Result<ThreadHeaders, ProviderError>> + Send;

    fn list_new_message_ids(
        &self,
        checkpoint: &str,
    ) -> impl std::future::Future<Output = Result<Vec<String>, ProviderError>> + Send;

    fn send_reply(
        &self,
        draft: &ReplyDraft,
    ) -> impl std::future::Future<Output = Result<(), ProviderError>> + Send;
}

/// Calendar provider seam; returns the external event id.
pub trait CalendarApi {
    fn create_event(
        &self,
        event: &EventDraft,
    ) -> impl std::future::Future<Output = Result<String, ProviderError>> + Send;
}

/// Text-completion seam. With a schema the returned string is expected to be
/// JSON, but callers must run it through the recovery ladder regardless.
pub trait Completion {
    fn complete(
        &self,
        system_prompt: &str,
        input: &str,
        schema: Option<&ResponseSchema>,
    ) -> impl std::future::Future<Output = Result<String, ProviderError>> + Send;
}

#[derive(Debug, Clone)]
pub struct ResponseSchema {
    pub name: &'static str,
    pub schema: serde_json::Value,
}

/// Everything the dispatcher needs, bundled so call sites stay readable.
pub struct AutomationProviders<M, C, L> {
    pub mailbox: M,
    pub calendar: C,
    pub completion: L,
}

/// Production completion provider: OpenRouter via the OpenAI-compatible API.
/// Structured output is requested by appending the schema to the system prompt
/// and switching the response format to JSON.
pub struct OpenRouterCompletion {
    model: String,
}

impl OpenRouterCompletion {
    pub fn new() -> Self {
        Self {
            model: COMPLETION_MODEL.to_string(),
        }
    }
}

impl Completion for OpenRouterCompletion {
    async fn complete(
        &self,
        system_prompt: &str,
        input: &str,
        schema: Option<&ResponseSchema>,
    ) -> Result<String, ProviderError> {
        let client = create_openai_client().map_err(|e| ProviderError::Auth(e.to_string()))?;

        let mut system = system_prompt.to_string();
        if let Some(schema) = schema {
            system.push_str(
                "\n\nRespond with a single JSON object matching this schema and nothing else:\n",
            );
            system.push_str(&schema.schema.to_string());
        }

        let messages = vec![
            chat_completion::ChatCompletionMessage {
                role: chat_completion::MessageRole::system,
                content: chat_completion::Content::Text(system),
                name: None,
                tool_calls: None,
                tool_call_id: None,
            },
            chat_completion::ChatCompletionMessage {
                role: chat_completion::MessageRole::user,
                content: chat_completion::Content::Text(input.to_string()),
                name: None,
                tool_calls: None,
                tool_call_id: None,
            },
        ];

        let mut request =
            chat_completion::ChatCompletionRequest::new(self.model.clone(), messages)
                .max_tokens(1024);
        if schema.is_some() {
            request = request.response_format(serde_json::json!({"type": "json_object"}));
        }

        match client.chat_completion(request).await {
            Ok(result) => result
                .choices
                .first()
                .and_then(|choice| choice.message.content.clone())
                .ok_or_else(|| ProviderError::Parse("empty completion".to_string())),
            Err(e) => Err(ProviderError::Api(e.to_string())),
        }
    }
}

#[cfg(test)]
pub mod fakes {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory mailbox: canned messages, recorded sends.
    #[derive(Default)]
    pub struct FakeMailbox {
        pub messages: HashMap<String, InboundEmail>,
        pub order: Vec<String>,
        pub thread_headers: HashMap<String, ThreadHeaders>,
        pub sent: Mutex<Vec<ReplyDraft>>,
        pub list_checkpoints: Mutex<Vec<String>>,
    }

    impl FakeMailbox {
        pub fn with_message(mut self, email: InboundEmail) -> Self {
            self.order.push(email.id.clone());
            self.messages.insert(email.id.clone(), email);
            self
        }
    }

    impl Mailbox for FakeMailbox {
        async fn get_message(&self, message_id: &str) -> Result<InboundEmail, ProviderError> {
            self.messages
                .get(message_id)
                .cloned()
                .ok_or_else(|| ProviderError::Api(format!("unknown message {message_id}")))
        }

        async fn get_thread_headers(&self, message_id: &str) -> Result<ThreadHeaders, ProviderError> {
            Ok(self
                .thread_headers
                .get(message_id)
                .cloned()
                .unwrap_or_default())
        }

        async fn list_new_message_ids(&self, checkpoint: &str) -> Result<Vec<String>, ProviderError> {
            self.list_checkpoints
                .lock()
                .unwrap()
                .push(checkpoint.to_string());
            Ok(self.order.clone())
        }

        async fn send_reply(&self, draft: &ReplyDraft) -> Result<(), ProviderError> {
            self.sent.lock().unwrap().push(draft.clone());
            Ok(())
        }
    }

    /// Calendar fake that either hands out event ids or always fails.
    pub struct FakeCalendar {
        pub fail: bool,
        pub created: Mutex<Vec<EventDraft>>,
    }

    impl FakeCalendar {
        pub fn working() -> Self {
            Self {
                fail: false,
                created: Mutex::new(Vec::new()),
            }
        }

        pub fn broken() -> Self {
            Self {
                fail: true,
                created: Mutex::new(Vec::new()),
            }
        }
    }

    impl CalendarApi for FakeCalendar {
        async fn create_event(&self, event: &EventDraft) -> Result<String, ProviderError> {
            if self.fail {
                return Err(ProviderError::Api("calendar unavailable".to_string()));
            }
            let mut created = self.created.lock().unwrap();
            created.push(event.clone());
            Ok(format!("event-{}", created.len()))
        }
    }

    /// Completion fake keyed by schema name; schemaless calls get `reply_body`.
    pub struct FakeCompletion {
        pub by_schema: HashMap<&'static str, String>,
        pub reply_body: String,
        pub fail_schemas: Vec<&'static str>,
    }

    impl Default for FakeCompletion {
        fn default() -> Self {
            Self {
                by_schema: HashMap::new(),
                reply_body: "<p>Thanks, noted.</p>".to_string(),
                fail_schemas: Vec::new(),
            }
        }
    }

    impl Completion for FakeCompletion {
        async fn complete(
            &self,
            _system_prompt: &str,
            _input: &str,
            schema: Option<&ResponseSchema>,
        ) -> Result<String, ProviderError> {
            match schema {
                Some(schema) => {
                    if self.fail_schemas.contains(&schema.name) {
                        return Err(ProviderError::Api("completion unavailable".to_string()));
                    }
                    self.by_schema
                        .get(schema.name)
                        .cloned()
                        .ok_or_else(|| ProviderError::Api("no canned response".to_string()))
                }
                None => Ok(self.reply_body.clone()),
            }
        }
    }

    pub fn sample_email(id: &str, sender: &str) -> InboundEmail {
        InboundEmail {
            id: id.to_string(),
            thread_id: format!("thread-{id}"),
            sender_email: sender.to_string(),
            sender_header: format!("Sender <{sender}>"),
            subject: "Quarterly planning".to_string(),
            date: "Mon, 2 Feb 2026 10:00:00 +0000".to_string(),
            snippet: "Let's meet to plan the quarter".to_string(),
            body_text: Some("Let's meet tomorrow at 14:00 to plan the quarter.".to_string()),
            body_html: None,
        }
    }
}
