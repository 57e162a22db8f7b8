use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::auth::repo_types::User;

const USERNAME_CONSTRAINT: &str = "users_username_key";

/// Column whose uniqueness an insert violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    Email,
    Username,
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("duplicate {0:?}")]
    Duplicate(UniqueField),
    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl From<sqlx::Error> for DirectoryError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() {
                let field = match db.constraint() {
                    Some(USERNAME_CONSTRAINT) => UniqueField::Username,
                    // users_email_key
                    _ => UniqueField::Email,
                };
                return DirectoryError::Duplicate(field);
            }
        }
        DirectoryError::Storage(err.into())
    }
}

pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// Persisted user records. Callers pass already lower-cased values.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// First user whose email or username matches.
    async fn find_by_email_or_username(
        &self,
        email: &str,
        username: &str,
    ) -> DirectoryResult<Option<User>>;

    async fn find_by_email(&self, email: &str) -> DirectoryResult<Option<User>>;

    async fn find_by_id(&self, id: Uuid) -> DirectoryResult<Option<User>>;

    /// Insert a user. A concurrent duplicate surfaces as `DirectoryError::Duplicate`.
    async fn create(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> DirectoryResult<User>;
}

#[derive(Clone)]
pub struct PgUserDirectory {
    db: PgPool,
}

impl PgUserDirectory {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_by_email_or_username(
        &self,
        email: &str,
        username: &str,
    ) -> DirectoryResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, password_hash, created_at
            FROM users
            WHERE email = $1 OR username = $2
            LIMIT 1
            "#,
        )
        .bind(email)
        .bind(username)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> DirectoryResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, password_hash, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> DirectoryResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"SELECT id, username, email, password_hash, created_at FROM users WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn create(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> DirectoryResult<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id, username, email, password_hash, created_at
            "#,
        )
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .fetch_one(&self.db)
        .await?;
        Ok(user)
    }
}
