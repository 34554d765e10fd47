//! The users table: row type and queries. Users are managed by the auth
//! subsystem, not by the generic entity engine.

use crate::error::AppError;
use crate::service::entity::timestamp;
use serde_json::{json, Value};
use sqlx::SqlitePool;

#[derive(Clone, Debug, sqlx::FromRow)]
#[sqlx(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: String,
    pub status: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub last_login: Option<String>,
    pub password_changed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    /// API shape of a user; the password hash never leaves the server.
    pub fn public_json(&self) -> Value {
        json!({
            "id": self.id,
            "username": self.username,
            "email": self.email,
            "role": self.role,
            "status": self.status,
            "firstName": self.first_name,
            "lastName": self.last_name,
            "lastLogin": self.last_login,
            "createdAt": self.created_at,
            "updatedAt": self.updated_at,
        })
    }
}

const USER_COLUMNS: &str = r#""id", "username", "email", "password", "role", "status",
    "firstName", "lastName", "lastLogin", "passwordChangedAt", "createdAt", "updatedAt""#;

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> Result<Option<User>, AppError> {
    let sql = format!(r#"SELECT {} FROM "users" WHERE "id" = ?"#, USER_COLUMNS);
    Ok(sqlx::query_as::<_, User>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?)
}

/// Lookup for login: either column may match.
pub async fn find_by_email_or_username(
    pool: &SqlitePool,
    identifier: &str,
) -> Result<Option<User>, AppError> {
    let sql = format!(
        r#"SELECT {} FROM "users" WHERE "email" = ? OR "username" = ? LIMIT 1"#,
        USER_COLUMNS
    );
    Ok(sqlx::query_as::<_, User>(&sql)
        .bind(identifier)
        .bind(identifier)
        .fetch_optional(pool)
        .await?)
}

pub async fn email_or_username_taken(
    pool: &SqlitePool,
    email: &str,
    username: &str,
) -> Result<bool, AppError> {
    let count: i64 = sqlx::query_scalar(
        r#"SELECT COUNT(*) FROM "users" WHERE "email" = ? OR "username" = ?"#,
    )
    .bind(email)
    .bind(username)
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}

pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub first_name: Option<&'a str>,
    pub last_name: Option<&'a str>,
}

pub async fn insert(pool: &SqlitePool, new: NewUser<'_>) -> Result<User, AppError> {
    let now = timestamp();
    let sql = format!(
        r#"INSERT INTO "users"
            ("username", "email", "password", "role", "status", "firstName", "lastName", "createdAt", "updatedAt")
        VALUES (?, ?, ?, 'user', 'active', ?, ?, ?, ?)
        RETURNING {}"#,
        USER_COLUMNS
    );
    Ok(sqlx::query_as::<_, User>(&sql)
        .bind(new.username)
        .bind(new.email)
        .bind(new.password_hash)
        .bind(new.first_name)
        .bind(new.last_name)
        .bind(&now)
        .bind(&now)
        .fetch_one(pool)
        .await?)
}

pub async fn touch_last_login(pool: &SqlitePool, id: i64) -> Result<(), AppError> {
    let now = timestamp();
    sqlx::query(r#"UPDATE "users" SET "lastLogin" = ?, "updatedAt" = ? WHERE "id" = ?"#)
        .bind(&now)
        .bind(&now)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_password(pool: &SqlitePool, id: i64, password_hash: &str) -> Result<(), AppError> {
    let now = timestamp();
    sqlx::query(
        r#"UPDATE "users" SET "password" = ?, "passwordChangedAt" = ?, "updatedAt" = ? WHERE "id" = ?"#,
    )
    .bind(password_hash)
    .bind(&now)
    .bind(&now)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}
