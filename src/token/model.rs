use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Row, postgres::PgRow};
use std::net::IpAddr;
use uuid::Uuid;

/// One issued or rotated refresh credential.
///
/// `jti` is the external handle presented by the client; `lineage_id` is
/// shared by a login's initial token and every successor produced by
/// rotation. Only a hash of the secret half is ever stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
    pub id: Uuid,
    pub jti: Uuid,
    pub lineage_id: Uuid,
    pub user_id: Uuid,
    pub secret_hash: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub ip_address: Option<IpAddr>,
    pub user_agent: Option<String>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub is_used: bool,
    pub is_revoked: bool,
    pub replaced_by_jti: Option<Uuid>,
}

impl RefreshTokenRecord {
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Derive the lifecycle state at a given instant.
    ///
    /// Expiry is clock-derived and wins over the stored flags, matching the
    /// order validation applies: an expired record reveals nothing about
    /// whether it was rotated or revoked.
    #[must_use]
    pub fn state(&self, now: DateTime<Utc>) -> TokenState {
        if self.is_expired(now) {
            TokenState::Expired
        } else if self.is_revoked {
            TokenState::Revoked
        } else if self.is_used {
            TokenState::Rotated
        } else {
            TokenState::Active
        }
    }
}

impl<'r> FromRow<'r, PgRow> for RefreshTokenRecord {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            jti: row.try_get("jti")?,
            lineage_id: row.try_get("lineage_id")?,
            user_id: row.try_get("user_id")?,
            secret_hash: row.try_get("secret_hash")?,
            issued_at: row.try_get("issued_at")?,
            expires_at: row.try_get("expires_at")?,
            ip_address: row.try_get("ip_address")?,
            user_agent: row.try_get("user_agent")?,
            last_used_at: row.try_get("last_used_at")?,
            is_used: row.try_get("is_used")?,
            is_revoked: row.try_get("is_revoked")?,
            replaced_by_jti: row.try_get("replaced_by_jti")?,
        })
    }
}

/// Lifecycle of one record: `Active` until rotated, revoked, or past expiry;
/// deletion by the sweeper is the terminal state and leaves no row behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenState {
    Active,
    Rotated,
    Revoked,
    Expired,
}
