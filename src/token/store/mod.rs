//! Keyed storage for refresh-token records.
//!
//! Records are looked up flat by `jti`, with secondary lookups by lineage and
//! user; the `replaced_by_jti` forward link is just another key, never an
//! in-memory object graph. Both backends expose the same conditional update
//! for rotation so exactly one of two concurrent callers wins.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::token::model::RefreshTokenRecord;

mod memory;
mod postgres;

pub use memory::MemoryTokenStore;
pub use postgres::PgTokenStore;
pub(crate) use postgres::is_unique_violation;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A record with the same `jti` already exists.
    #[error("duplicate token identifier")]
    Duplicate,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Persist a new record. Fails with [`StoreError::Duplicate`] when the
    /// `jti` is already taken.
    async fn insert(&self, record: &RefreshTokenRecord) -> Result<(), StoreError>;

    async fn find(&self, jti: Uuid) -> Result<Option<RefreshTokenRecord>, StoreError>;

    /// Conditionally retire a record: set `is_used = true` and link the
    /// successor, only if the record is still unused and unrevoked. Returns
    /// whether this caller won the flip. This is the single atomic step that
    /// closes the rotation race.
    async fn mark_rotated(
        &self,
        jti: Uuid,
        replaced_by: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn touch_last_used(&self, jti: Uuid, now: DateTime<Utc>) -> Result<(), StoreError>;

    /// Revoke one record. Returns whether a record was found.
    async fn revoke(&self, jti: Uuid) -> Result<bool, StoreError>;

    /// Revoke every record in a lineage. Returns how many flipped.
    async fn revoke_lineage(&self, lineage_id: Uuid, user_id: Uuid) -> Result<u64, StoreError>;

    /// Revoke every non-revoked record of a user. Returns how many flipped.
    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, StoreError>;

    /// Unrevoked, unrotated, unexpired records for a user, newest first.
    async fn list_active(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<RefreshTokenRecord>, StoreError>;

    async fn count_active(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<u64, StoreError>;

    /// Delete every record past its expiry. Returns how many were removed;
    /// zero is a normal result.
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}
