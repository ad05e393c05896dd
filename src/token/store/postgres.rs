//! PostgreSQL-backed store. Schema lives in `sql/schema.sql`.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{Instrument, info_span};
use uuid::Uuid;

use crate::token::model::RefreshTokenRecord;
use crate::token::store::{StoreError, TokenStore};

#[derive(Clone, Debug)]
pub struct PgTokenStore {
    pool: PgPool,
}

impl PgTokenStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

#[async_trait]
impl TokenStore for PgTokenStore {
    async fn insert(&self, record: &RefreshTokenRecord) -> Result<(), StoreError> {
        let query = r"
            INSERT INTO refresh_tokens
                (id, jti, lineage_id, user_id, secret_hash, issued_at, expires_at,
                 ip_address, user_agent, is_used, is_revoked)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, FALSE, FALSE)
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(record.id)
            .bind(record.jti)
            .bind(record.lineage_id)
            .bind(record.user_id)
            .bind(&record.secret_hash)
            .bind(record.issued_at)
            .bind(record.expires_at)
            .bind(record.ip_address)
            .bind(record.user_agent.as_deref())
            .execute(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| {
                if is_unique_violation(&err) {
                    StoreError::Duplicate
                } else {
                    StoreError::Backend(
                        anyhow::Error::new(err).context("failed to insert refresh token"),
                    )
                }
            })?;
        Ok(())
    }

    async fn find(&self, jti: Uuid) -> Result<Option<RefreshTokenRecord>, StoreError> {
        let query = r"
            SELECT id, jti, lineage_id, user_id, secret_hash, issued_at, expires_at,
                   ip_address, user_agent, last_used_at, is_used, is_revoked, replaced_by_jti
            FROM refresh_tokens
            WHERE jti = $1
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let record = sqlx::query_as::<_, RefreshTokenRecord>(query)
            .bind(jti)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to load refresh token")?;
        Ok(record)
    }

    async fn mark_rotated(
        &self,
        jti: Uuid,
        replaced_by: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        // The WHERE clause is the compare-and-set: only an unused, unrevoked
        // record can be retired, and only one concurrent caller sees a row.
        let query = r"
            UPDATE refresh_tokens
            SET is_used = TRUE,
                replaced_by_jti = $2,
                last_used_at = $3
            WHERE jti = $1
              AND is_used = FALSE
              AND is_revoked = FALSE
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(jti)
            .bind(replaced_by)
            .bind(now)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to retire refresh token")?;
        Ok(result.rows_affected() == 1)
    }

    async fn touch_last_used(&self, jti: Uuid, now: DateTime<Utc>) -> Result<(), StoreError> {
        let query = r"
            UPDATE refresh_tokens
            SET last_used_at = $2
            WHERE jti = $1
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(jti)
            .bind(now)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to update refresh token last use")?;
        Ok(())
    }

    async fn revoke(&self, jti: Uuid) -> Result<bool, StoreError> {
        let query = r"
            UPDATE refresh_tokens
            SET is_revoked = TRUE
            WHERE jti = $1
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(jti)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to revoke refresh token")?;
        Ok(result.rows_affected() == 1)
    }

    async fn revoke_lineage(&self, lineage_id: Uuid, user_id: Uuid) -> Result<u64, StoreError> {
        let query = r"
            UPDATE refresh_tokens
            SET is_revoked = TRUE
            WHERE lineage_id = $1
              AND user_id = $2
              AND is_revoked = FALSE
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(lineage_id)
            .bind(user_id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to revoke token lineage")?;
        Ok(result.rows_affected())
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let query = r"
            UPDATE refresh_tokens
            SET is_revoked = TRUE
            WHERE user_id = $1
              AND is_revoked = FALSE
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(user_id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to revoke user tokens")?;
        Ok(result.rows_affected())
    }

    async fn list_active(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<RefreshTokenRecord>, StoreError> {
        let query = r"
            SELECT id, jti, lineage_id, user_id, secret_hash, issued_at, expires_at,
                   ip_address, user_agent, last_used_at, is_used, is_revoked, replaced_by_jti
            FROM refresh_tokens
            WHERE user_id = $1
              AND is_used = FALSE
              AND is_revoked = FALSE
              AND expires_at > $2
            ORDER BY issued_at DESC
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let records = sqlx::query_as::<_, RefreshTokenRecord>(query)
            .bind(user_id)
            .bind(now)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to list active sessions")?;
        Ok(records)
    }

    async fn count_active(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let query = r"
            SELECT COUNT(*) AS active
            FROM refresh_tokens
            WHERE user_id = $1
              AND is_used = FALSE
              AND is_revoked = FALSE
              AND expires_at > $2
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let count: i64 = sqlx::query_scalar(query)
            .bind(user_id)
            .bind(now)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to count active sessions")?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let query = r"
            DELETE FROM refresh_tokens
            WHERE expires_at <= $1
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(now)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to delete expired refresh tokens")?;
        Ok(result.rows_affected())
    }
}
