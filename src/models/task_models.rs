use diesel::prelude::*;
use serde::Serialize;
use crate::schema::{calendar_tasks, notifications, tasks};

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = tasks)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Task {
    pub id: i32,
    pub user_id: i32,
    pub description: String,
    pub deadline: Option<String>, // YYYY-MM-DD
    pub priority: String,         // high | medium | low
    pub gmail_id: Option<String>, // originating message, when bot-created
    pub created_by_bot: bool,
    pub bot_id: Option<i32>,
    pub completed: bool,
    pub created_at: i32,
}

#[derive(Insertable)]
#[diesel(table_name = tasks)]
pub struct NewTask {
    pub user_id: i32,
    pub description: String,
    pub deadline: Option<String>,
    pub priority: String,
    pub gmail_id: Option<String>,
    pub created_by_bot: bool,
    pub bot_id: Option<i32>,
    pub completed: bool,
    pub created_at: i32,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = calendar_tasks)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct CalendarTask {
    pub id: i32,
    pub user_id: i32,
    pub title: String,
    pub description: Option<String>,
    pub due_at: i32,    // epoch seconds
    pub status: String, // pending | completed | cancelled
    pub priority: String,
    pub created_by_bot: bool,
    pub bot_id: Option<i32>,
    pub calendar_event_id: Option<String>, // null when calendar-side creation failed
    pub gmail_id: Option<String>,
    pub created_at: i32,
}

#[derive(Insertable)]
#[diesel(table_name = calendar_tasks)]
pub struct NewCalendarTask {
    pub user_id: i32,
    pub title: String,
    pub description: Option<String>,
    pub due_at: i32,
    pub status: String,
    pub priority: String,
    pub created_by_bot: bool,
    pub bot_id: Option<i32>,
    pub calendar_event_id: Option<String>,
    pub gmail_id: Option<String>,
    pub created_at: i32,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = notifications)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Notification {
    pub id: i32,
    pub user_id: i32,
    pub notification_type: String, // task | calendar_task
    pub title: String,
    pub description: String,
    pub priority: String, // high | low
    pub source_task_id: i32,
    pub is_read: bool,
    pub action_done: bool,
    pub deleted: bool,
    pub created_at: i32,
}

#[derive(Insertable)]
#[diesel(table_name = notifications)]
pub struct NewNotification {
    pub user_id: i32,
    pub notification_type: String,
    pub title: String,
    pub description: String,
    pub priority: String,
    pub source_task_id: i32,
    pub is_read: bool,
    pub action_done: bool,
    pub deleted: bool,
    pub created_at: i32,
}
