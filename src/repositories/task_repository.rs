use diesel::prelude::*;
use diesel::result::Error as DieselError;
use crate::{
    models::task_models::{CalendarTask, NewCalendarTask, NewTask, Task},
    schema::{calendar_tasks, tasks},
    DbPool,
};

pub struct TaskRepository {
    pool: DbPool,
}

impl TaskRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn create_task(&self, new_task: NewTask) -> Result<Task, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        diesel::insert_into(tasks::table)
            .values(&new_task)
            .execute(&mut conn)?;
        tasks::table.order(tasks::id.desc()).first::<Task>(&mut conn)
    }

    pub fn get_tasks_for_user(&self, user_id: i32) -> Result<Vec<Task>, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        tasks::table
            .filter(tasks::user_id.eq(user_id))
            .order(tasks::created_at.desc())
            .load::<Task>(&mut conn)
    }

    // Redelivery guard: has this message already produced tasks for this user?
    pub fn tasks_exist_for_message(&self, user_id: i32, gmail_id: &str) -> Result<bool, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        let existing: Option<Task> = tasks::table
            .filter(tasks::user_id.eq(user_id))
            .filter(tasks::gmail_id.eq(gmail_id))
            .first::<Task>(&mut conn)
            .optional()?;
        Ok(existing.is_some())
    }

    pub fn set_task_completed(
        &self,
        user_id: i32,
        task_id: i32,
        completed: bool,
    ) -> Result<usize, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        diesel::update(tasks::table.find(task_id).filter(tasks::user_id.eq(user_id)))
            .set(tasks::completed.eq(completed))
            .execute(&mut conn)
    }

    pub fn delete_task(&self, user_id: i32, task_id: i32) -> Result<usize, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        diesel::delete(tasks::table.find(task_id).filter(tasks::user_id.eq(user_id)))
            .execute(&mut conn)
    }

    // Open tasks whose deadline falls on or before `until_date` (YYYY-MM-DD,
    // lexicographic order matches date order)
    pub fn get_tasks_due_by(&self, until_date: &str) -> Result<Vec<Task>, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        tasks::table
            .filter(tasks::completed.eq(false))
            .filter(tasks::deadline.is_not_null())
            .filter(tasks::deadline.le(until_date))
            .load::<Task>(&mut conn)
    }

    pub fn create_calendar_task(
        &self,
        new_task: NewCalendarTask,
    ) -> Result<CalendarTask, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        diesel::insert_into(calendar_tasks::table)
            .values(&new_task)
            .execute(&mut conn)?;
        calendar_tasks::table
            .order(calendar_tasks::id.desc())
            .first::<CalendarTask>(&mut conn)
    }

    pub fn get_calendar_tasks_for_user(
        &self,
        user_id: i32,
    ) -> Result<Vec<CalendarTask>, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        calendar_tasks::table
            .filter(calendar_tasks::user_id.eq(user_id))
            .order(calendar_tasks::due_at.asc())
            .load::<CalendarTask>(&mut conn)
    }

    pub fn calendar_tasks_exist_for_message(
        &self,
        user_id: i32,
        gmail_id: &str,
    ) -> Result<bool, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        let existing: Option<CalendarTask> = calendar_tasks::table
            .filter(calendar_tasks::user_id.eq(user_id))
            .filter(calendar_tasks::gmail_id.eq(gmail_id))
            .first::<CalendarTask>(&mut conn)
            .optional()?;
        Ok(existing.is_some())
    }

    pub fn set_calendar_task_status(
        &self,
        user_id: i32,
        task_id: i32,
        status: &str,
    ) -> Result<usize, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        diesel::update(
            calendar_tasks::table
                .find(task_id)
                .filter(calendar_tasks::user_id.eq(user_id)),
        )
        .set(calendar_tasks::status.eq(status))
        .execute(&mut conn)
    }

    // Pending calendar tasks due on or before `until` (epoch seconds)
    pub fn get_calendar_tasks_due_by(&self, until: i32) -> Result<Vec<CalendarTask>, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        calendar_tasks::table
            .filter(calendar_tasks::status.eq("pending"))
            .filter(calendar_tasks::due_at.le(until))
            .load::<CalendarTask>(&mut conn)
    }
}
