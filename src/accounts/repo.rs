use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;

use crate::accounts::repo_types::{NewUser, User};

#[derive(Debug, Error)]
pub enum CreateUserError {
    #[error("username already exists")]
    DuplicateUsername,
    #[error("email already registered")]
    DuplicateEmail,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Durable storage of user records.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn username_exists(&self, username: &str) -> anyhow::Result<bool>;
    async fn email_exists(&self, email: &str) -> anyhow::Result<bool>;
    async fn find_by_username(&self, username: &str) -> anyhow::Result<Option<User>>;
    /// Insert a user. Uniqueness is decided here, not by earlier lookups.
    async fn create(&self, user: NewUser<'_>) -> Result<User, CreateUserError>;
    /// Returns `false` when no row matched.
    async fn update_password_hash(&self, username: &str, password_hash: &str) -> anyhow::Result<bool>;
    /// Returns `false` when no row matched.
    async fn set_profile_picture(&self, username: &str, url: Option<&str>) -> anyhow::Result<bool>;
}

#[derive(Clone)]
pub struct PgUserRepository {
    db: PgPool,
}

impl PgUserRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn username_exists(&self, username: &str) -> anyhow::Result<bool> {
        let found = sqlx::query_scalar::<_, i32>(
            r#"SELECT 1 FROM users WHERE lower(username) = lower($1)"#,
        )
        .bind(username)
        .fetch_optional(&self.db)
        .await
        .context("check username")?;
        Ok(found.is_some())
    }

    async fn email_exists(&self, email: &str) -> anyhow::Result<bool> {
        let found = sqlx::query_scalar::<_, i32>(r#"SELECT 1 FROM users WHERE email = $1"#)
            .bind(email)
            .fetch_optional(&self.db)
            .await
            .context("check email")?;
        Ok(found.is_some())
    }

    async fn find_by_username(&self, username: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, fullname, username, email, password_hash, profile_picture, created_at
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.db)
        .await
        .context("find user by username")?;
        Ok(user)
    }

    async fn create(&self, user: NewUser<'_>) -> Result<User, CreateUserError> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (fullname, username, email, password_hash)
            VALUES ($1, $2, $3, $4)
            RETURNING id, fullname, username, email, password_hash, profile_picture, created_at
            "#,
        )
        .bind(user.fullname)
        .bind(user.username)
        .bind(user.email)
        .bind(user.password_hash)
        .fetch_one(&self.db)
        .await
        .map_err(classify_insert_error)
    }

    async fn update_password_hash(&self, username: &str, password_hash: &str) -> anyhow::Result<bool> {
        let res = sqlx::query(r#"UPDATE users SET password_hash = $1 WHERE username = $2"#)
            .bind(password_hash)
            .bind(username)
            .execute(&self.db)
            .await
            .context("update password hash")?;
        Ok(res.rows_affected() > 0)
    }

    async fn set_profile_picture(&self, username: &str, url: Option<&str>) -> anyhow::Result<bool> {
        let res = sqlx::query(r#"UPDATE users SET profile_picture = $1 WHERE username = $2"#)
            .bind(url) // None -> NULL
            .bind(username)
            .execute(&self.db)
            .await
            .context("update profile picture")?;
        Ok(res.rows_affected() > 0)
    }
}

fn classify_insert_error(e: sqlx::Error) -> CreateUserError {
    if let Some(db) = e.as_database_error() {
        if db.is_unique_violation() {
            return duplicate_for_constraint(db.constraint());
        }
    }
    CreateUserError::Other(anyhow::Error::new(e).context("insert user"))
}

/// Pick the duplicated field from the violated constraint or index name.
fn duplicate_for_constraint(constraint: Option<&str>) -> CreateUserError {
    match constraint {
        Some(c) if c.contains("email") => CreateUserError::DuplicateEmail,
        _ => CreateUserError::DuplicateUsername,
    }
}
