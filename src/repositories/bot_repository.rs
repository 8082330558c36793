use diesel::prelude::*;
use diesel::result::Error as DieselError;
use crate::{
    models::bot_models::{AutomationBot, EmailSummary, NewAutomationBot, NewEmailSummary},
    schema::{automation_bots, calendar_tasks, email_summaries, tasks},
    DbPool,
};

pub struct BotRepository {
    pool: DbPool,
}

impl BotRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn create_bot(&self, new_bot: NewAutomationBot) -> Result<AutomationBot, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        diesel::insert_into(automation_bots::table)
            .values(&new_bot)
            .execute(&mut conn)?;
        automation_bots::table
            .order(automation_bots::id.desc())
            .first::<AutomationBot>(&mut conn)
    }

    pub fn get_bots_for_user(&self, user_id: i32) -> Result<Vec<AutomationBot>, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        automation_bots::table
            .filter(automation_bots::user_id.eq(user_id))
            .order((automation_bots::created_at.asc(), automation_bots::id.asc()))
            .load::<AutomationBot>(&mut conn)
    }

    pub fn find_bot_by_id(
        &self,
        user_id: i32,
        bot_id: i32,
    ) -> Result<Option<AutomationBot>, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        automation_bots::table
            .find(bot_id)
            .filter(automation_bots::user_id.eq(user_id))
            .first::<AutomationBot>(&mut conn)
            .optional()
    }

    /// First active bot whose sender set contains `sender`, in `(created_at, id)`
    /// order. At most one bot is applied per message.
    pub fn find_bot_for_sender(
        &self,
        user_id: i32,
        sender: &str,
    ) -> Result<Option<AutomationBot>, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        let bots = automation_bots::table
            .filter(automation_bots::user_id.eq(user_id))
            .filter(automation_bots::is_active.eq(true))
            .order((automation_bots::created_at.asc(), automation_bots::id.asc()))
            .load::<AutomationBot>(&mut conn)?;
        Ok(bots.into_iter().find(|bot| bot.matches_sender(sender)))
    }

    pub fn set_bot_active(
        &self,
        user_id: i32,
        bot_id: i32,
        active: bool,
    ) -> Result<usize, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        diesel::update(
            automation_bots::table
                .find(bot_id)
                .filter(automation_bots::user_id.eq(user_id)),
        )
        .set(automation_bots::is_active.eq(active))
        .execute(&mut conn)
    }

    // Bot removal keeps bot-created records but clears their provenance link
    pub fn delete_bot(&self, user_id: i32, bot_id: i32) -> Result<usize, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        conn.transaction(|conn| {
            diesel::update(tasks::table.filter(tasks::bot_id.eq(bot_id)))
                .set(tasks::bot_id.eq(None::<i32>))
                .execute(conn)?;
            diesel::update(calendar_tasks::table.filter(calendar_tasks::bot_id.eq(bot_id)))
                .set(calendar_tasks::bot_id.eq(None::<i32>))
                .execute(conn)?;
            diesel::delete(
                automation_bots::table
                    .find(bot_id)
                    .filter(automation_bots::user_id.eq(user_id)),
            )
            .execute(conn)
        })
    }

    pub fn summary_exists(&self, user_id: i32, gmail_id: &str) -> Result<bool, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        let existing: Option<EmailSummary> = email_summaries::table
            .filter(email_summaries::user_id.eq(user_id))
            .filter(email_summaries::gmail_id.eq(gmail_id))
            .first::<EmailSummary>(&mut conn)
            .optional()?;
        Ok(existing.is_some())
    }

    pub fn create_summary(&self, new_summary: NewEmailSummary) -> Result<(), DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        diesel::insert_into(email_summaries::table)
            .values(&new_summary)
            .execute(&mut conn)?;
        Ok(())
    }

    pub fn get_summaries_for_user(&self, user_id: i32) -> Result<Vec<EmailSummary>, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        email_summaries::table
            .filter(email_summaries::user_id.eq(user_id))
            .order(email_summaries::created_at.desc())
            .load::<EmailSummary>(&mut conn)
    }
}
