use diesel::prelude::*;
use diesel::result::Error as DieselError;
use crate::{
    models::user_models::{NewUser, User},
    schema::users,
    DbPool,
};

pub struct UserRepository {
    pool: DbPool,
}

impl UserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    // Find a user by their Gmail address
    pub fn find_by_email(&self, search_email: &str) -> Result<Option<User>, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        let user = users::table
            .filter(users::email.eq(search_email))
            .first::<User>(&mut conn)
            .optional()?;
        Ok(user)
    }

    // Find a user by ID
    pub fn find_by_id(&self, user_id: i32) -> Result<Option<User>, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        let user = users::table
            .find(user_id)
            .first::<User>(&mut conn)
            .optional()?;
        Ok(user)
    }

    // Users holding a refresh token, i.e. with a live Gmail connection
    pub fn get_connected_users(&self) -> Result<Vec<User>, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        let users_list = users::table
            .filter(users::google_refresh_token.is_not_null())
            .load::<User>(&mut conn)?;
        Ok(users_list)
    }

    // Create the user on first login, or refresh their credential triple on re-login
    pub fn upsert_google_account(
        &self,
        email: &str,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: i32,
    ) -> Result<User, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        let existing = users::table
            .filter(users::email.eq(email))
            .first::<User>(&mut conn)
            .optional()?;

        match existing {
            Some(user) => {
                diesel::update(users::table.find(user.id))
                    .set((
                        users::google_access_token.eq(Some(access_token)),
                        // Google only returns a refresh token on first consent
                        users::google_refresh_token
                            .eq(refresh_token.or(user.google_refresh_token.as_deref())),
                        users::token_expires_at.eq(Some(expires_at)),
                    ))
                    .execute(&mut conn)?;
                users::table.find(user.id).first::<User>(&mut conn)
            }
            None => {
                let new_user = NewUser {
                    email: email.to_string(),
                    google_access_token: Some(access_token.to_string()),
                    google_refresh_token: refresh_token.map(str::to_string),
                    token_expires_at: Some(expires_at),
                    history_cursor: None,
                    created_at: chrono::Utc::now().timestamp() as i32,
                };
                diesel::insert_into(users::table)
                    .values(&new_user)
                    .execute(&mut conn)?;
                users::table
                    .filter(users::email.eq(email))
                    .first::<User>(&mut conn)
            }
        }
    }

    pub fn update_google_access_token(
        &self,
        user_id: i32,
        access_token: &str,
        expires_in: i32,
    ) -> Result<(), DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        let expires_at = chrono::Utc::now().timestamp() as i32 + expires_in;
        diesel::update(users::table.find(user_id))
            .set((
                users::google_access_token.eq(Some(access_token)),
                users::token_expires_at.eq(Some(expires_at)),
            ))
            .execute(&mut conn)?;
        Ok(())
    }

    // Drop the credential triple after a failed refresh so the user re-authenticates
    pub fn delete_google_connection(&self, user_id: i32) -> Result<(), DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        diesel::update(users::table.find(user_id))
            .set((
                users::google_access_token.eq(None::<String>),
                users::google_refresh_token.eq(None::<String>),
                users::token_expires_at.eq(None::<i32>),
            ))
            .execute(&mut conn)?;
        Ok(())
    }

    // Advance the mailbox checkpoint; called once per processed webhook batch
    pub fn update_history_cursor(&self, user_id: i32, cursor: &str) -> Result<(), DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        diesel::update(users::table.find(user_id))
            .set(users::history_cursor.eq(Some(cursor)))
            .execute(&mut conn)?;
        Ok(())
    }
}
