use diesel::prelude::*;
use diesel::result::Error as DieselError;
use crate::{
    models::task_models::{NewNotification, Notification},
    schema::notifications,
    DbPool,
};

pub struct NotificationRepository {
    pool: DbPool,
}

impl NotificationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Dedup guard for the materializer: at most one notification per
    /// `(source_task_id, notification_type)` pair.
    pub fn exists_for_task(
        &self,
        source_task_id: i32,
        notification_type: &str,
    ) -> Result<bool, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        let existing: Option<Notification> = notifications::table
            .filter(notifications::source_task_id.eq(source_task_id))
            .filter(notifications::notification_type.eq(notification_type))
            .first::<Notification>(&mut conn)
            .optional()?;
        Ok(existing.is_some())
    }

    pub fn create_notification(&self, new_notification: NewNotification) -> Result<(), DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        diesel::insert_into(notifications::table)
            .values(&new_notification)
            .execute(&mut conn)?;
        Ok(())
    }

    pub fn get_active_for_user(&self, user_id: i32) -> Result<Vec<Notification>, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        notifications::table
            .filter(notifications::user_id.eq(user_id))
            .filter(notifications::deleted.eq(false))
            .order(notifications::created_at.desc())
            .load::<Notification>(&mut conn)
    }

    pub fn mark_read(&self, user_id: i32, notification_id: i32) -> Result<usize, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        diesel::update(
            notifications::table
                .find(notification_id)
                .filter(notifications::user_id.eq(user_id)),
        )
        .set(notifications::is_read.eq(true))
        .execute(&mut conn)
    }

    pub fn mark_action_done(&self, user_id: i32, notification_id: i32) -> Result<usize, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        diesel::update(
            notifications::table
                .find(notification_id)
                .filter(notifications::user_id.eq(user_id)),
        )
        .set(notifications::action_done.eq(true))
        .execute(&mut conn)
    }

    pub fn soft_delete(&self, user_id: i32, notification_id: i32) -> Result<usize, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        diesel::update(
            notifications::table
                .find(notification_id)
                .filter(notifications::user_id.eq(user_id)),
        )
        .set(notifications::deleted.eq(true))
        .execute(&mut conn)
    }
}
