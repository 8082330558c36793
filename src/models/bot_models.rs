use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use crate::schema::{automation_bots, email_summaries};

/// Tone applied to generated replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyTone {
    Professional,
    Friendly,
    Concise,
    Detailed,
}

impl ReplyTone {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplyTone::Professional => "professional",
            ReplyTone::Friendly => "friendly",
            ReplyTone::Concise => "concise",
            ReplyTone::Detailed => "detailed",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "friendly" => ReplyTone::Friendly,
            "concise" => ReplyTone::Concise,
            "detailed" => ReplyTone::Detailed,
            _ => ReplyTone::Professional,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = automation_bots)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct AutomationBot {
    pub id: i32,
    pub user_id: i32,
    pub name: String,
    pub sender_emails: String, // comma-separated sender addresses this bot applies to
    pub is_active: bool,
    pub auto_summarize: bool,
    pub auto_extract_tasks: bool,
    pub auto_extract_meetings: bool,
    pub auto_reply: bool,
    pub reply_tone: String,
    pub custom_prompt: Option<String>,
    pub reply_template: Option<String>,
    pub created_at: i32,
}

impl AutomationBot {
    pub fn matches_sender(&self, sender: &str) -> bool {
        let sender = sender.trim().to_lowercase();
        self.sender_emails
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .any(|s| !s.is_empty() && s == sender)
    }

    pub fn tone(&self) -> ReplyTone {
        ReplyTone::parse(&self.reply_tone)
    }
}

#[derive(Insertable)]
#[diesel(table_name = automation_bots)]
pub struct NewAutomationBot {
    pub user_id: i32,
    pub name: String,
    pub sender_emails: String,
    pub is_active: bool,
    pub auto_summarize: bool,
    pub auto_extract_tasks: bool,
    pub auto_extract_meetings: bool,
    pub auto_reply: bool,
    pub reply_tone: String,
    pub custom_prompt: Option<String>,
    pub reply_template: Option<String>,
    pub created_at: i32,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = email_summaries)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct EmailSummary {
    pub id: i32,
    pub user_id: i32,
    pub gmail_id: String,
    pub summary: String,
    pub priority_score: i32, // 0-100, model-assigned
    pub created_at: i32,
}

#[derive(Insertable)]
#[diesel(table_name = email_summaries)]
pub struct NewEmailSummary {
    pub user_id: i32,
    pub gmail_id: String,
    pub summary: String,
    pub priority_score: i32,
    pub created_at: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bot_with_senders(senders: &str) -> AutomationBot {
        AutomationBot {
            id: 1,
            user_id: 1,
            name: "test".to_string(),
            sender_emails: senders.to_string(),
            is_active: true,
            auto_summarize: true,
            auto_extract_tasks: false,
            auto_extract_meetings: false,
            auto_reply: false,
            reply_tone: "professional".to_string(),
            custom_prompt: None,
            reply_template: None,
            created_at: 0,
        }
    }

    #[test]
    fn sender_match_is_case_insensitive_and_trimmed() {
        let bot = bot_with_senders("Boss@Corp.com , team@corp.com");
        assert!(bot.matches_sender("boss@corp.com"));
        assert!(bot.matches_sender(" TEAM@CORP.COM "));
        assert!(!bot.matches_sender("other@corp.com"));
    }

    #[test]
    fn empty_sender_list_matches_nothing() {
        let bot = bot_with_senders("");
        assert!(!bot.matches_sender("anyone@corp.com"));
    }

    #[test]
    fn unknown_tone_falls_back_to_professional() {
        assert_eq!(ReplyTone::parse("sarcastic"), ReplyTone::Professional);
        assert_eq!(ReplyTone::parse("Friendly"), ReplyTone::Friendly);
    }
}
