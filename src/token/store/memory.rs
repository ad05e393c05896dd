//! In-memory store backing development mode and the test suite.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::token::model::RefreshTokenRecord;
use crate::token::store::{StoreError, TokenStore};

/// Records keyed by `jti`, with lineage and user indexes kept alongside.
/// All writes go through one lock, so the rotation flip is naturally atomic.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    records: HashMap<Uuid, RefreshTokenRecord>,
    by_lineage: HashMap<Uuid, Vec<Uuid>>,
    by_user: HashMap<Uuid, Vec<Uuid>>,
}

impl MemoryTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently held, regardless of state.
    pub async fn len(&self) -> usize {
        self.inner.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.records.is_empty()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn insert(&self, record: &RefreshTokenRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner.records.contains_key(&record.jti) {
            return Err(StoreError::Duplicate);
        }
        inner
            .by_lineage
            .entry(record.lineage_id)
            .or_default()
            .push(record.jti);
        inner
            .by_user
            .entry(record.user_id)
            .or_default()
            .push(record.jti);
        inner.records.insert(record.jti, record.clone());
        Ok(())
    }

    async fn find(&self, jti: Uuid) -> Result<Option<RefreshTokenRecord>, StoreError> {
        Ok(self.inner.read().await.records.get(&jti).cloned())
    }

    async fn mark_rotated(
        &self,
        jti: Uuid,
        replaced_by: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        let Some(record) = inner.records.get_mut(&jti) else {
            return Ok(false);
        };
        if record.is_used || record.is_revoked {
            return Ok(false);
        }
        record.is_used = true;
        record.replaced_by_jti = Some(replaced_by);
        record.last_used_at = Some(now);
        Ok(true)
    }

    async fn touch_last_used(&self, jti: Uuid, now: DateTime<Utc>) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if let Some(record) = inner.records.get_mut(&jti) {
            record.last_used_at = Some(now);
        }
        Ok(())
    }

    async fn revoke(&self, jti: Uuid) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        match inner.records.get_mut(&jti) {
            Some(record) => {
                record.is_revoked = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn revoke_lineage(&self, lineage_id: Uuid, user_id: Uuid) -> Result<u64, StoreError> {
        let mut inner = self.inner.write().await;
        let members = inner
            .by_lineage
            .get(&lineage_id)
            .cloned()
            .unwrap_or_default();
        let mut flipped = 0;
        for jti in members {
            if let Some(record) = inner.records.get_mut(&jti) {
                if record.user_id == user_id && !record.is_revoked {
                    record.is_revoked = true;
                    flipped += 1;
                }
            }
        }
        Ok(flipped)
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let mut inner = self.inner.write().await;
        let members = inner.by_user.get(&user_id).cloned().unwrap_or_default();
        let mut flipped = 0;
        for jti in members {
            if let Some(record) = inner.records.get_mut(&jti) {
                if !record.is_revoked {
                    record.is_revoked = true;
                    flipped += 1;
                }
            }
        }
        Ok(flipped)
    }

    async fn list_active(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<RefreshTokenRecord>, StoreError> {
        let inner = self.inner.read().await;
        let mut active: Vec<RefreshTokenRecord> = inner
            .by_user
            .get(&user_id)
            .map(|jtis| {
                jtis.iter()
                    .filter_map(|jti| inner.records.get(jti))
                    .filter(|record| {
                        !record.is_revoked && !record.is_used && !record.is_expired(now)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        active.sort_by(|a, b| b.issued_at.cmp(&a.issued_at));
        Ok(active)
    }

    async fn count_active(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<u64, StoreError> {
        Ok(self.list_active(user_id, now).await?.len() as u64)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut inner = self.inner.write().await;
        let expired: Vec<Uuid> = inner
            .records
            .values()
            .filter(|record| record.is_expired(now))
            .map(|record| record.jti)
            .collect();
        for jti in &expired {
            if let Some(record) = inner.records.remove(jti) {
                if let Some(members) = inner.by_lineage.get_mut(&record.lineage_id) {
                    members.retain(|member| member != jti);
                    if members.is_empty() {
                        inner.by_lineage.remove(&record.lineage_id);
                    }
                }
                if let Some(members) = inner.by_user.get_mut(&record.user_id) {
                    members.retain(|member| member != jti);
                    if members.is_empty() {
                        inner.by_user.remove(&record.user_id);
                    }
                }
            }
        }
        Ok(expired.len() as u64)
    }
}
