use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;

/// User record in the database.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    #[sqlx(try_from = "i64")]
    pub id: u64,                      // BIGSERIAL, never reused
    pub username: String,
    #[serde(skip_serializing)]
    #[sqlx(rename = "password")]
    pub password_hash: String,        // Argon2 PHC string, not exposed in JSON
    pub email: Option<String>,        // NULL does not take part in uniqueness
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Row to insert; the store assigns id and timestamps.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub email: Option<String>,
}
