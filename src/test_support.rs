use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use diesel::r2d2::{self, ConnectionManager};
use diesel::RunQueryDsl;
use diesel::SqliteConnection;

use crate::models::bot_models::{AutomationBot, NewAutomationBot};
use crate::models::user_models::User;
use crate::repositories::bot_repository::BotRepository;
use crate::repositories::notification_repository::NotificationRepository;
use crate::repositories::task_repository::TaskRepository;
use crate::repositories::user_repository::UserRepository;
use crate::{build_oauth_client, AppState, DbPool};

const TEST_SCHEMA: &str = r#"
CREATE TABLE users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    email TEXT NOT NULL UNIQUE,
    google_access_token TEXT,
    google_refresh_token TEXT,
    token_expires_at INTEGER,
    history_cursor TEXT,
    created_at INTEGER NOT NULL
);
CREATE TABLE automation_bots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    sender_emails TEXT NOT NULL,
    is_active BOOLEAN NOT NULL DEFAULT TRUE,
    auto_summarize BOOLEAN NOT NULL DEFAULT FALSE,
    auto_extract_tasks BOOLEAN NOT NULL DEFAULT FALSE,
    auto_extract_meetings BOOLEAN NOT NULL DEFAULT FALSE,
    auto_reply BOOLEAN NOT NULL DEFAULT FALSE,
    reply_tone TEXT NOT NULL DEFAULT 'professional',
    custom_prompt TEXT,
    reply_template TEXT,
    created_at INTEGER NOT NULL
);
CREATE TABLE email_summaries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    gmail_id TEXT NOT NULL,
    summary TEXT NOT NULL,
    priority_score INTEGER NOT NULL,
    created_at INTEGER NOT NULL
);
CREATE TABLE tasks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    description TEXT NOT NULL,
    deadline TEXT,
    priority TEXT NOT NULL DEFAULT 'medium',
    gmail_id TEXT,
    created_by_bot BOOLEAN NOT NULL DEFAULT FALSE,
    bot_id INTEGER,
    completed BOOLEAN NOT NULL DEFAULT FALSE,
    created_at INTEGER NOT NULL
);
CREATE TABLE calendar_tasks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    title TEXT NOT NULL,
    description TEXT,
    due_at INTEGER NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    priority TEXT NOT NULL DEFAULT 'medium',
    created_by_bot BOOLEAN NOT NULL DEFAULT FALSE,
    bot_id INTEGER,
    calendar_event_id TEXT,
    gmail_id TEXT,
    created_at INTEGER NOT NULL
);
CREATE TABLE notifications (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    notification_type TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT NOT NULL,
    priority TEXT NOT NULL DEFAULT 'low',
    source_task_id INTEGER NOT NULL,
    is_read BOOLEAN NOT NULL DEFAULT FALSE,
    action_done BOOLEAN NOT NULL DEFAULT FALSE,
    deleted BOOLEAN NOT NULL DEFAULT FALSE,
    created_at INTEGER NOT NULL
);
"#;

/// In-memory state for tests. The pool is capped at one connection because
/// every r2d2 connection to `:memory:` would otherwise get its own database.
pub fn test_state() -> Arc<AppState> {
    let manager = ConnectionManager::<SqliteConnection>::new(":memory:");
    let pool: DbPool = r2d2::Pool::builder()
        .max_size(1)
        .build(manager)
        .expect("failed to build test pool");

    {
        let mut conn = pool.get().expect("failed to get test connection");
        diesel::sql_query("PRAGMA foreign_keys = ON")
            .execute(&mut conn)
            .expect("failed to enable foreign keys");
        for statement in TEST_SCHEMA.split(';').filter(|s| !s.trim().is_empty()) {
            diesel::sql_query(statement)
                .execute(&mut conn)
                .expect("failed to create test table");
        }
    }

    Arc::new(AppState {
        db_pool: pool.clone(),
        user_repository: Arc::new(UserRepository::new(pool.clone())),
        bot_repository: Arc::new(BotRepository::new(pool.clone())),
        task_repository: Arc::new(TaskRepository::new(pool.clone())),
        notification_repository: Arc::new(NotificationRepository::new(pool)),
        oauth_client: build_oauth_client(
            "test-client-id".to_string(),
            "test-client-secret".to_string(),
            "http://localhost/auth/google/callback".to_string(),
        ),
        pending_oauth: Mutex::new(HashMap::new()),
    })
}

pub fn seed_user(state: &AppState, email: &str) -> User {
    state
        .user_repository
        .upsert_google_account(
            email,
            "test-access-token",
            Some("test-refresh-token"),
            (chrono::Utc::now().timestamp() + 3600) as i32,
        )
        .expect("failed to seed user")
}

/// Which automation actions a seeded bot has enabled.
#[derive(Debug, Clone, Copy)]
pub struct BotFlags {
    pub summarize: bool,
    pub extract_tasks: bool,
    pub extract_meetings: bool,
    pub reply: bool,
    pub active: bool,
}

impl BotFlags {
    pub fn summarize_only() -> Self {
        Self {
            summarize: true,
            extract_tasks: false,
            extract_meetings: false,
            reply: false,
            active: true,
        }
    }

    pub fn extract_all() -> Self {
        Self {
            summarize: false,
            extract_tasks: true,
            extract_meetings: true,
            reply: false,
            active: true,
        }
    }

    pub fn all() -> Self {
        Self {
            summarize: true,
            extract_tasks: true,
            extract_meetings: true,
            reply: true,
            active: true,
        }
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

pub fn seed_bot(state: &AppState, user_id: i32, sender: &str, flags: BotFlags) -> AutomationBot {
    state
        .bot_repository
        .create_bot(NewAutomationBot {
            user_id,
            name: format!("bot for {sender}"),
            sender_emails: sender.to_string(),
            is_active: flags.active,
            auto_summarize: flags.summarize,
            auto_extract_tasks: flags.extract_tasks,
            auto_extract_meetings: flags.extract_meetings,
            auto_reply: flags.reply,
            reply_tone: "professional".to_string(),
            custom_prompt: None,
            reply_template: None,
            created_at: chrono::Utc::now().timestamp() as i32,
        })
        .expect("failed to seed bot")
}
