//! User accounts behind the token lifecycle.
//!
//! The lifecycle core only needs to know that a user id exists; registration
//! and credential checks live here so the HTTP surface has something to mint
//! tokens for. Password digests go through the same [`CredentialHasher`]
//! seam the token secrets use.

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Row};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info_span, Instrument};
use uuid::Uuid;

use crate::token::hasher::CredentialHasher;
use crate::token::store::is_unique_violation;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryUser {
    pub id: Uuid,
    pub email: String,
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("email already registered")]
    DuplicateEmail,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Register a user under an already-normalized email.
    async fn create(&self, email: &str, password: &str) -> Result<DirectoryUser, DirectoryError>;

    /// Look up by email and check the password. `None` covers both an
    /// unknown email and a wrong password.
    async fn verify_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<DirectoryUser>, DirectoryError>;

    /// Whether the user id is known. Token operations never mint records
    /// for ids the directory has not seen.
    async fn exists(&self, user_id: Uuid) -> Result<bool, DirectoryError>;
}

struct UserRow {
    id: Uuid,
    email: String,
    password_hash: String,
}

impl FromRow<'_, PgRow> for UserRow {
    fn from_row(row: &PgRow) -> sqlx::Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
        })
    }
}

pub struct PgUserDirectory {
    pool: PgPool,
    hasher: Arc<dyn CredentialHasher>,
}

impl PgUserDirectory {
    #[must_use]
    pub fn new(pool: PgPool, hasher: Arc<dyn CredentialHasher>) -> Self {
        Self { pool, hasher }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn create(&self, email: &str, password: &str) -> Result<DirectoryUser, DirectoryError> {
        let id = Uuid::new_v4();
        let password_hash = self
            .hasher
            .hash(password)
            .context("failed to hash password")?;
        let query = r"
            INSERT INTO users (id, email, password_hash, created_at)
            VALUES ($1, $2, $3, $4)
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(id)
            .bind(email)
            .bind(&password_hash)
            .bind(Utc::now())
            .execute(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| {
                if is_unique_violation(&err) {
                    DirectoryError::DuplicateEmail
                } else {
                    DirectoryError::Backend(
                        anyhow::Error::new(err).context("failed to insert user"),
                    )
                }
            })?;
        Ok(DirectoryUser {
            id,
            email: email.to_string(),
        })
    }

    async fn verify_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<DirectoryUser>, DirectoryError> {
        let query = r"
            SELECT id, email, password_hash
            FROM users
            WHERE email = $1
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row: Option<UserRow> = sqlx::query_as(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to fetch user by email")?;
        let Some(row) = row else {
            return Ok(None);
        };
        if !self.hasher.verify(password, &row.password_hash) {
            return Ok(None);
        }
        Ok(Some(DirectoryUser {
            id: row.id,
            email: row.email,
        }))
    }

    async fn exists(&self, user_id: Uuid) -> Result<bool, DirectoryError> {
        let query = r"
            SELECT EXISTS (SELECT 1 FROM users WHERE id = $1) AS known
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let known: bool = sqlx::query_scalar(query)
            .bind(user_id)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to check user existence")?;
        Ok(known)
    }
}

struct MemoryUser {
    id: Uuid,
    password_hash: String,
}

/// Process-local directory for single-node and test deployments.
pub struct MemoryUserDirectory {
    users: RwLock<HashMap<String, MemoryUser>>,
    hasher: Arc<dyn CredentialHasher>,
}

impl MemoryUserDirectory {
    #[must_use]
    pub fn new(hasher: Arc<dyn CredentialHasher>) -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            hasher,
        }
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn create(&self, email: &str, password: &str) -> Result<DirectoryUser, DirectoryError> {
        let password_hash = self
            .hasher
            .hash(password)
            .context("failed to hash password")?;
        let mut users = self.users.write().await;
        if users.contains_key(email) {
            return Err(DirectoryError::DuplicateEmail);
        }
        let id = Uuid::new_v4();
        users.insert(email.to_string(), MemoryUser { id, password_hash });
        Ok(DirectoryUser {
            id,
            email: email.to_string(),
        })
    }

    async fn verify_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<DirectoryUser>, DirectoryError> {
        let users = self.users.read().await;
        let Some(user) = users.get(email) else {
            return Ok(None);
        };
        if !self.hasher.verify(password, &user.password_hash) {
            return Ok(None);
        }
        Ok(Some(DirectoryUser {
            id: user.id,
            email: email.to_string(),
        }))
    }

    async fn exists(&self, user_id: Uuid) -> Result<bool, DirectoryError> {
        let users = self.users.read().await;
        Ok(users.values().any(|user| user.id == user_id))
    }
}
