use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use crate::handlers::gmail::GoogleClient;
use crate::models::task_models::NewNotification;
use crate::AppState;

// How far ahead the materializer looks, and the cutoff for "urgent".
const SCAN_AHEAD_HOURS: i64 = 72;
const URGENT_WITHIN_HOURS: i64 = 24;

pub async fn start_scheduler(state: Arc<AppState>) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    let materializer_state = state.clone();
    scheduler
        .add(Job::new_async("0 */5 * * * *", move |_uuid, _lock| {
            let state = materializer_state.clone();
            Box::pin(async move {
                materialize_due_notifications(&state);
            })
        })?)
        .await?;

    // Gmail watches expire after about seven days; re-register daily.
    let watch_state = state.clone();
    scheduler
        .add(Job::new_async("0 0 3 * * *", move |_uuid, _lock| {
            let state = watch_state.clone();
            Box::pin(async move {
                renew_gmail_watches(&state).await;
            })
        })?)
        .await?;

    scheduler.start().await?;
    tracing::info!("Scheduler started");
    Ok(scheduler)
}

/// Turns soon-due tasks and calendar tasks into notifications, at most one per
/// source row. Running it again is a no-op for anything already materialized.
pub fn materialize_due_notifications(state: &AppState) {
    let now = Utc::now();
    let horizon_date = (now + Duration::hours(SCAN_AHEAD_HOURS))
        .format("%Y-%m-%d")
        .to_string();
    let urgent_date = (now + Duration::hours(URGENT_WITHIN_HOURS))
        .format("%Y-%m-%d")
        .to_string();

    match state.task_repository.get_tasks_due_by(&horizon_date) {
        Ok(tasks) => {
            for task in tasks {
                let deadline = match &task.deadline {
                    Some(deadline) => deadline.clone(),
                    None => continue,
                };
                match state.notification_repository.exists_for_task(task.id, "task") {
                    Ok(true) => continue,
                    Ok(false) => {}
                    Err(e) => {
                        tracing::error!("Notification lookup failed for task {}: {}", task.id, e);
                        continue;
                    }
                }
                let priority = if deadline.as_str() <= urgent_date.as_str() {
                    "high"
                } else {
                    "low"
                };
                let result = state.notification_repository.create_notification(NewNotification {
                    user_id: task.user_id,
                    notification_type: "task".to_string(),
                    title: format!("Task due {}", deadline),
                    description: task.description.clone(),
                    priority: priority.to_string(),
                    source_task_id: task.id,
                    is_read: false,
                    action_done: false,
                    deleted: false,
                    created_at: now.timestamp() as i32,
                });
                if let Err(e) = result {
                    tracing::error!("Could not create notification for task {}: {}", task.id, e);
                }
            }
        }
        Err(e) => tracing::error!("Due-task scan failed: {}", e),
    }

    let horizon_ts = (now + Duration::hours(SCAN_AHEAD_HOURS)).timestamp() as i32;
    let urgent_ts = (now + Duration::hours(URGENT_WITHIN_HOURS)).timestamp() as i32;
    match state.task_repository.get_calendar_tasks_due_by(horizon_ts) {
        Ok(calendar_tasks) => {
            for task in calendar_tasks {
                match state
                    .notification_repository
                    .exists_for_task(task.id, "calendar_task")
                {
                    Ok(true) => continue,
                    Ok(false) => {}
                    Err(e) => {
                        tracing::error!(
                            "Notification lookup failed for calendar task {}: {}",
                            task.id,
                            e
                        );
                        continue;
                    }
                }
                let priority = if task.due_at <= urgent_ts { "high" } else { "low" };
                let result = state.notification_repository.create_notification(NewNotification {
                    user_id: task.user_id,
                    notification_type: "calendar_task".to_string(),
                    title: format!("Upcoming: {}", task.title),
                    description: task.description.clone().unwrap_or_default(),
                    priority: priority.to_string(),
                    source_task_id: task.id,
                    is_read: false,
                    action_done: false,
                    deleted: false,
                    created_at: now.timestamp() as i32,
                });
                if let Err(e) = result {
                    tracing::error!(
                        "Could not create notification for calendar task {}: {}",
                        task.id,
                        e
                    );
                }
            }
        }
        Err(e) => tracing::error!("Due calendar-task scan failed: {}", e),
    }
}

async fn renew_gmail_watches(state: &AppState) {
    let topic = match std::env::var("PUBSUB_TOPIC") {
        Ok(topic) => topic,
        Err(_) => {
            tracing::warn!("PUBSUB_TOPIC not set, skipping watch renewal");
            return;
        }
    };

    let users = match state.user_repository.get_connected_users() {
        Ok(users) => users,
        Err(e) => {
            tracing::error!("Could not list connected users: {}", e);
            return;
        }
    };

    for user in users {
        match GoogleClient::for_user(state, user.id).await {
            Ok(client) => match client.setup_watch(&topic).await {
                Ok(watch) => tracing::debug!(
                    "Renewed watch for user {} (expires {})",
                    user.id,
                    watch.expiration
                ),
                Err(e) => tracing::warn!("Watch renewal failed for user {}: {}", user.id, e),
            },
            Err(e) => tracing::warn!("Skipping watch renewal for user {}: {}", user.id, e),
        }
    }
}
