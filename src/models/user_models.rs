use diesel::prelude::*;
use crate::schema::users;

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct User {
    pub id: i32,
    pub email: String,
    pub google_access_token: Option<String>,
    pub google_refresh_token: Option<String>,
    pub token_expires_at: Option<i32>, // epoch seconds when the access token expires
    pub history_cursor: Option<String>, // opaque Gmail historyId checkpoint, advances per processed batch
    pub created_at: i32,
}

#[derive(Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub email: String,
    pub google_access_token: Option<String>,
    pub google_refresh_token: Option<String>,
    pub token_expires_at: Option<i32>,
    pub history_cursor: Option<String>,
    pub created_at: i32,
}

impl User {
    pub fn has_google_connection(&self) -> bool {
        self.google_refresh_token.is_some()
    }
}
